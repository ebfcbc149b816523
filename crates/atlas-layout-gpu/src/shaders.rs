//! WGSL bodies for the k-means clusterer and the force kernel.
//!
//! The force kernel is assembled from [`FORCE_COMMON`], one repulsion
//! strategy defining `fn repulsion(index: u32, node: vec4<f32>) -> vec2<f32>`,
//! and [`FORCE_KERNEL`]. Mode switches are compile-time constants, so each
//! configuration compiles to its own straight-line kernel.

// =============================================================================
// K-means
// =============================================================================

/// Centroid seeding: evenly strided samples, or a golden-ratio jitter inside
/// each stride when `GROUPED`.
pub const KMEANS_INIT: &str = r#"
fn kernel(index: u32) {
    let stride = f32(NODES_COUNT) / f32(CENTROIDS_COUNT);
    var sample = u32(round(stride * f32(index)));
    if (GROUPED) {
        let jitter = fract(f32(index + 1u) * 0.6180339887);
        sample = u32(floor(f32(index) * stride + jitter * stride));
    }
    sample = min(sample, NODES_COUNT - 1u);
    centroids[index] = vec4<f32>(nodes[sample].xy, 0.0, 0.0);
}
"#;

/// Nearest centroid per node; ties go to the lower index.
pub const KMEANS_ASSIGN: &str = r#"
fn kernel(index: u32) {
    let p = nodes[index].xy;
    var best = 0u;
    let first = centroids[0].xy - p;
    var best_distance = dot(first, first);
    for (var c = 1u; c < CENTROIDS_COUNT; c++) {
        let delta = centroids[c].xy - p;
        let candidate = dot(delta, delta);
        if (candidate < best_distance) {
            best_distance = candidate;
            best = c;
        }
    }
    closest[index] = f32(best);
}
"#;

/// Mass-weighted barycenter of each centroid's members. Empty centroids keep
/// their previous position.
pub const KMEANS_RECENTER: &str = r#"
fn kernel(index: u32) {
    let id = f32(index);
    var weighted = vec2<f32>(0.0);
    var mass = 0.0;
    var members = 0.0;
    for (var i = 0u; i < NODES_COUNT; i++) {
        if (closest[i] == id) {
            let node = nodes[i];
            weighted += node.xy * node.z;
            mass += node.z;
            members += 1.0;
        }
    }
    if (mass > 0.0) {
        centroids_next[index] = vec4<f32>(weighted / mass, mass, members);
    } else {
        centroids_next[index] = vec4<f32>(centroids[index].xy, 0.0, 0.0);
    }
}
"#;

/// `(members, first sorted slot)` per centroid.
pub const KMEANS_OFFSETS: &str = r#"
fn kernel(index: u32) {
    var offset = 0.0;
    for (var c = 0u; c < index; c++) {
        offset += centroids[c].w;
    }
    centroid_offsets[index] = vec2<f32>(centroids[index].w, offset);
}
"#;

/// Sort entries keyed by assigned centroid; padding gets `SENTINEL`.
pub const KMEANS_GROUPING: &str = r#"
fn kernel(index: u32) {
    if (index < CLOSEST_COUNT) {
        centroid_sort[index] = vec2<f32>(f32(index), closest[index]);
    } else {
        centroid_sort[index] = vec2<f32>(f32(index), SENTINEL);
    }
}
"#;

// =============================================================================
// Force integration
// =============================================================================

/// Pairwise force laws shared by every repulsion strategy.
pub const FORCE_COMMON: &str = r#"
// Repulsion on `node` from a body at `other`; bodies without extent pass size 0.
fn repel(node: vec4<f32>, other: vec2<f32>, other_mass: f32, other_size: f32) -> vec2<f32> {
    let delta = node.xy - other;
    let dist = length(delta);
    if (dist == 0.0) {
        return vec2<f32>(0.0);
    }
    let strength = params.scaling_ratio * node.z * other_mass;
    if (ADJUST_SIZES) {
        let gap = dist - node.w - other_size;
        if (gap > 0.0) {
            return delta * (strength / (gap * gap));
        }
        if (gap < 0.0) {
            return delta * (100.0 * strength);
        }
        return vec2<f32>(0.0);
    }
    return delta * (strength / (dist * dist));
}

fn edge_coefficient(weight: f32) -> f32 {
    if (params.edge_weight_influence == 0.0) {
        return 1.0;
    }
    if (params.edge_weight_influence == 1.0) {
        return weight;
    }
    return pow(weight, params.edge_weight_influence);
}

fn attract(node: vec4<f32>, other: vec4<f32>, weight: f32) -> vec2<f32> {
    let delta = node.xy - other.xy;
    var dist = length(delta);
    if (ADJUST_SIZES) {
        dist = dist - node.w - other.w;
        if (dist <= 0.0) {
            return vec2<f32>(0.0);
        }
    }
    var coefficient = edge_coefficient(weight);
    if (OUTBOUND_ATTRACTION) {
        coefficient = coefficient * params.outbound_compensation / node.z;
    }
    if (LIN_LOG) {
        if (dist <= 0.0) {
            return vec2<f32>(0.0);
        }
        coefficient = coefficient * log(1.0 + dist) / dist;
    }
    return -delta * coefficient;
}
"#;

/// Exact repulsion against every other node.
pub const REPULSION_ALL_PAIRS: &str = r#"
fn repulsion(index: u32, node: vec4<f32>) -> vec2<f32> {
    var force = vec2<f32>(0.0);
    for (var j = 0u; j < NODES_COUNT; j++) {
        if (j != index) {
            let other = nodes[j];
            force += repel(node, other.xy, other.z, other.w);
        }
    }
    return force;
}
"#;

/// Barnes-Hut walk over regions in ID order (parents before children).
/// `{{REGION_WORDS}}` is replaced by the bitset length for the depth.
pub const REPULSION_QUAD_TREE: &str = r#"
fn region_marked(used: ptr<function, array<u32, {{REGION_WORDS}}>>, region: u32) -> bool {
    return ((*used)[region / 32u] & (1u << (region % 32u))) != 0u;
}

fn repulsion(index: u32, node: vec4<f32>) -> vec2<f32> {
    var used: array<u32, {{REGION_WORDS}}>;
    var force = vec2<f32>(0.0);
    let extent = bounds[0];
    let root_side = extent.y - extent.x;
    let theta_sq = params.theta * params.theta;

    for (var r = 0u; r < REGION_STATS_COUNT; r++) {
        let depth = depth_of(r);
        if (depth > 1u && region_marked(&used, parent_of(r))) {
            // Covered by an ancestor; mark so descendants skip too.
            used[r / 32u] |= 1u << (r % 32u);
            continue;
        }
        let body = region_stats[r];
        if (body.w == 0.0) {
            continue;
        }
        let side = root_side / f32(1u << depth);
        let delta = node.xy - body.xy;
        if (4.0 * side * side < theta_sq * dot(delta, delta)) {
            force += repel(node, body.xy, body.z, 0.0);
            used[r / 32u] |= 1u << (r % 32u);
        } else if (depth == DEPTH) {
            let range = region_offsets[r];
            let start = u32(range.y);
            let end = start + u32(range.x);
            for (var k = start; k < end; k++) {
                let j = u32(region_sort[k].x);
                if (j != index) {
                    let other = nodes[j];
                    force += repel(node, other.xy, other.z, other.w);
                }
            }
        }
    }
    return force;
}
"#;

/// Every non-empty centroid as a single body, including the node's own.
pub const REPULSION_KMEANS: &str = r#"
fn repulsion(index: u32, node: vec4<f32>) -> vec2<f32> {
    var force = vec2<f32>(0.0);
    for (var c = 0u; c < CENTROIDS_COUNT; c++) {
        let body = centroids[c];
        if (body.z > 0.0) {
            force += repel(node, body.xy, body.z, 0.0);
        }
    }
    return force;
}
"#;

/// Other centroids as bodies, exact pairs with members of the own centroid.
pub const REPULSION_KMEANS_GROUPED: &str = r#"
fn repulsion(index: u32, node: vec4<f32>) -> vec2<f32> {
    var force = vec2<f32>(0.0);
    let own = u32(closest[index]);
    for (var c = 0u; c < CENTROIDS_COUNT; c++) {
        let body = centroids[c];
        if (c != own && body.z > 0.0) {
            force += repel(node, body.xy, body.z, 0.0);
        }
    }
    let range = centroid_offsets[own];
    let start = u32(range.y);
    let end = start + u32(range.x);
    for (var k = start; k < end; k++) {
        let j = u32(centroid_sort[k].x);
        if (j != index) {
            let other = nodes[j];
            force += repel(node, other.xy, other.z, other.w);
        }
    }
    return force;
}
"#;

/// One integration step per node: forces, clamp, adaptive speed, move.
pub const FORCE_KERNEL: &str = r#"
fn kernel(index: u32) {
    let node = nodes[index];
    let motion = movement[index];

    var force = repulsion(index, node);

    let origin_distance = length(node.xy);
    if (STRONG_GRAVITY) {
        force -= node.xy * (node.z * params.gravity);
    } else if (origin_distance > 0.0) {
        force -= node.xy * (node.z * params.gravity / origin_distance);
    }

    let range = adjacency[index];
    let first = u32(range.x);
    let last = first + u32(range.y);
    for (var e = first; e < last; e++) {
        let edge = edges[e];
        force += attract(node, nodes[u32(edge.x)], edge.y);
    }

    let magnitude = length(force);
    if (magnitude > params.max_force) {
        force = force * (params.max_force / magnitude);
    }

    let previous = motion.xy;
    let swinging = node.z * length(previous - force);
    let traction = length(previous + force) * 0.5;
    let damping = 1.0 / (1.0 + sqrt(swinging));

    var convergence = motion.z;
    var speed = 0.0;
    if (ADJUST_SIZES) {
        speed = 0.1 * log(1.0 + traction) * damping;
    } else {
        speed = convergence * log(1.0 + traction) * damping;
        convergence = clamp(sqrt(speed * dot(force, force) * damping), 0.0, 1.0);
    }

    var position = node.xy;
    if (motion.w == 0.0) {
        position += force * (speed / params.slow_down);
    }
    nodes_out[index] = vec4<f32>(position, node.z, node.w);
    movement_out[index] = vec4<f32>(force, convergence, motion.w);
}
"#;
