//! Closed-form arithmetic over flat Morton region IDs.
//!
//! Regions of every depth share one ID space. Depth `d` owns the
//! contiguous range `level_base(d) .. level_base(d + 1)`, so parents,
//! depths and per-depth counts never need stored links.

/// Deepest subdivision the spatial index supports.
pub const MAX_DEPTH: u32 = 4;

/// Number of regions at all depths shallower than `level`: `(4^level - 4) / 3`.
pub fn level_base(level: u32) -> u32 {
    debug_assert!(level >= 1);
    ((1u32 << (2 * level)) - 4) / 3
}

/// Regions at exactly `depth`.
pub fn regions_at_depth(depth: u32) -> u32 {
    1u32 << (2 * depth)
}

/// Total regions for depths `1..=depth`.
pub fn region_count(depth: u32) -> u32 {
    level_base(depth + 1)
}

/// Depth of a region ID.
pub fn depth_of(region: u32) -> u32 {
    let mut depth = 1;
    while region >= level_base(depth + 1) {
        depth += 1;
    }
    depth
}

/// Parent region, or `None` for depth-1 regions.
pub fn parent_of(region: u32) -> Option<u32> {
    let depth = depth_of(region);
    if depth == 1 {
        return None;
    }
    let code = region - level_base(depth);
    Some(code / 4 + level_base(depth - 1))
}

/// Region IDs containing a point, one per depth, for the square box
/// `[x_min, x_max] x [y_min, y_max]`. Mirrors the tagging kernel.
pub fn region_path(x: f32, y: f32, bounds: [f32; 4], depth: u32) -> Vec<u32> {
    let [mut x_lo, mut x_hi, mut y_lo, mut y_hi] = bounds;
    let mut code = 0u32;
    let mut path = Vec::with_capacity(depth as usize);
    for level in 1..=depth {
        let cx = (x_lo + x_hi) * 0.5;
        let cy = (y_lo + y_hi) * 0.5;
        let mut quadrant = 0;
        if x > cx {
            quadrant += 1;
            x_lo = cx;
        } else {
            x_hi = cx;
        }
        if y > cy {
            quadrant += 2;
            y_lo = cy;
        } else {
            y_hi = cy;
        }
        code = quadrant + code * 4;
        path.push(code + level_base(level));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_base_matches_shallower_region_counts() {
        assert_eq!(level_base(1), 0);
        assert_eq!(level_base(2), 4);
        assert_eq!(level_base(3), 20);
        assert_eq!(level_base(4), 84);
        assert_eq!(region_count(4), 340);
        for depth in 1..=MAX_DEPTH {
            assert_eq!(
                level_base(depth + 1) - level_base(depth),
                regions_at_depth(depth)
            );
        }
    }

    #[test]
    fn test_depth_of_region_boundaries() {
        assert_eq!(depth_of(0), 1);
        assert_eq!(depth_of(3), 1);
        assert_eq!(depth_of(4), 2);
        assert_eq!(depth_of(19), 2);
        assert_eq!(depth_of(20), 3);
        assert_eq!(depth_of(84), 4);
        assert_eq!(depth_of(339), 4);
    }

    #[test]
    fn test_parent_of_inverts_child_numbering() {
        assert_eq!(parent_of(2), None);
        for region in 4..region_count(MAX_DEPTH) {
            let depth = depth_of(region);
            let parent = parent_of(region).unwrap();
            assert_eq!(depth_of(parent), depth - 1);
            let code = region - level_base(depth);
            assert_eq!(parent - level_base(depth - 1), code / 4);
        }
    }

    #[test]
    fn test_region_path_nests() {
        let bounds = [-8.0, 8.0, -8.0, 8.0];
        let path = region_path(5.0, -3.0, bounds, MAX_DEPTH);
        assert_eq!(path.len(), 4);
        // right of center, above center
        assert_eq!(path[0], 1);
        for pair in path.windows(2) {
            assert_eq!(parent_of(pair[1]), Some(pair[0]));
        }
    }
}
