//! WGSL kernels for the on-device spatial index.
//!
//! Multi-pass approach, no pointer tree:
//! 1. BOUNDS_KERNEL: single-invocation min/max over all nodes, squared
//! 2. TAGGING_KERNEL: per node, the Morton region ID at every depth
//! 3. AGGREGATION_KERNEL: per region, mass and barycenter of its members
//! 4. OFFSETS_KERNEL: per region, member count and same-depth prefix sum
//! 5. GROUPING_KERNEL: per node, `(index, deepest region)` for the sorter
//!
//! Bodies are compiled through [`crate::KernelProgram`], which supplies the
//! bindings and the `<NAME>_COUNT` constants referenced below.

/// Closed-form region arithmetic, mirrored by [`crate::morton`].
pub const MORTON_WGSL: &str = r#"
fn level_base(level: u32) -> u32 {
    return ((1u << (2u * level)) - 4u) / 3u;
}

fn depth_of(region: u32) -> u32 {
    var depth = 1u;
    loop {
        if (region < level_base(depth + 1u)) {
            break;
        }
        depth = depth + 1u;
    }
    return depth;
}

// Only meaningful for regions deeper than 1.
fn parent_of(region: u32) -> u32 {
    let depth = depth_of(region);
    return (region - level_base(depth)) / 4u + level_base(depth - 1u);
}
"#;

/// Pass 1: bounding box `(x_min, x_max, y_min, y_max)`, square and centered.
pub const BOUNDS_KERNEL: &str = r#"
fn kernel(index: u32) {
    var lo = nodes[0].xy;
    var hi = nodes[0].xy;
    for (var i = 1u; i < NODES_COUNT; i++) {
        let p = nodes[i].xy;
        lo = min(lo, p);
        hi = max(hi, p);
    }
    let center = (lo + hi) * 0.5;
    // Degenerate layouts (one node, or all coincident) still get a box.
    let half_side = max(max(hi.x - lo.x, hi.y - lo.y) * 0.5, 1e-3);
    bounds[0] = vec4<f32>(
        center.x - half_side,
        center.x + half_side,
        center.y - half_side,
        center.y + half_side
    );
}
"#;

/// Pass 2: region tags, one per depth, `-1` past `DEPTH`.
pub const TAGGING_KERNEL: &str = r#"
fn kernel(index: u32) {
    let p = nodes[index].xy;
    var extent = bounds[0];
    var code = 0u;
    var tags = vec4<f32>(-1.0);
    for (var level = 1u; level <= DEPTH; level++) {
        let cx = (extent.x + extent.y) * 0.5;
        let cy = (extent.z + extent.w) * 0.5;
        var quadrant = 0u;
        if (p.x > cx) {
            quadrant += 1u;
            extent.x = cx;
        } else {
            extent.y = cx;
        }
        if (p.y > cy) {
            quadrant += 2u;
            extent.z = cy;
        } else {
            extent.w = cy;
        }
        code = quadrant + code * 4u;
        tags[level - 1u] = f32(code + level_base(level));
    }
    regions[index] = tags;
}
"#;

/// Pass 3: `(barycenter.x, barycenter.y, mass, members)`, zero when empty.
pub const AGGREGATION_KERNEL: &str = r#"
fn kernel(index: u32) {
    let depth = depth_of(index);
    let id = f32(index);
    var weighted = vec2<f32>(0.0);
    var mass = 0.0;
    var members = 0.0;
    for (var i = 0u; i < NODES_COUNT; i++) {
        if (regions[i][depth - 1u] == id) {
            let node = nodes[i];
            weighted += node.xy * node.z;
            mass += node.z;
            members += 1.0;
        }
    }
    if (mass > 0.0) {
        region_stats[index] = vec4<f32>(weighted / mass, mass, members);
    } else {
        region_stats[index] = vec4<f32>(0.0);
    }
}
"#;

/// Pass 4: `(members, first sorted slot)`; IDs are contiguous per depth.
pub const OFFSETS_KERNEL: &str = r#"
fn kernel(index: u32) {
    let first = level_base(depth_of(index));
    var offset = 0.0;
    for (var r = first; r < index; r++) {
        offset += region_stats[r].w;
    }
    region_offsets[index] = vec2<f32>(region_stats[index].w, offset);
}
"#;

/// Pass 5: sort entries keyed by the deepest tag; padding gets `SENTINEL`.
pub const GROUPING_KERNEL: &str = r#"
fn kernel(index: u32) {
    if (index < REGIONS_COUNT) {
        region_sort[index] = vec2<f32>(f32(index), regions[index][DEPTH - 1u]);
    } else {
        region_sort[index] = vec2<f32>(f32(index), SENTINEL);
    }
}
"#;

/// Prefix `body` with the Morton helpers.
pub fn with_morton(body: &str) -> String {
    format!("{MORTON_WGSL}\n{body}")
}
