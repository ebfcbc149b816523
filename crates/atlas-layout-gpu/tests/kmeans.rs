//! K-means clustering on the device.
//!
//! Run with: `cargo test --package atlas-layout-gpu --test kmeans`

mod common;

use atlas_layout_gpu::{KMeans, NodeRecord};

fn three_clusters() -> Vec<NodeRecord> {
    let centers = [(-100.0, -100.0), (0.0, 100.0), (100.0, -50.0)];
    centers
        .iter()
        .flat_map(|&(x, y)| {
            [(0.0, 0.0), (0.5, 0.0), (0.0, 0.5)]
                .into_iter()
                .map(move |(dx, dy)| common::unit_node(x + dx, y + dy))
        })
        .collect()
}

fn assert_clusters_recovered(closest: &[u32]) {
    for cluster in closest.chunks(3) {
        assert!(cluster.iter().all(|&c| c == cluster[0]), "{closest:?}");
    }
    assert_ne!(closest[0], closest[3]);
    assert_ne!(closest[0], closest[6]);
    assert_ne!(closest[3], closest[6]);
}

#[test]
fn test_one_step_separates_three_tight_clusters() {
    let Some(ctx) = common::gpu() else { return };

    for grouped in [false, true] {
        let nodes = three_clusters();
        let mut kmeans = KMeans::new(&ctx, nodes.len(), 3, 1, grouped).unwrap();
        kmeans.set_nodes(&ctx, &nodes).unwrap();
        kmeans.initialize(&ctx).unwrap();
        kmeans.advance(&ctx).unwrap();

        assert_clusters_recovered(&kmeans.closest(&ctx).unwrap());
    }
}

#[test]
fn test_single_centroid_lands_on_barycenter() {
    let Some(ctx) = common::gpu() else { return };

    let nodes: Vec<NodeRecord> = common::random_nodes(200, 9, 40.0)
        .into_iter()
        .map(|n| common::unit_node(n.x, n.y))
        .collect();
    let mut kmeans = KMeans::new(&ctx, nodes.len(), 1, 1, false).unwrap();
    kmeans.set_nodes(&ctx, &nodes).unwrap();
    kmeans.initialize(&ctx).unwrap();
    kmeans.advance(&ctx).unwrap();

    let centroid = kmeans.centroids(&ctx).unwrap()[0];
    let x = nodes.iter().map(|n| n.x).sum::<f32>() / nodes.len() as f32;
    let y = nodes.iter().map(|n| n.y).sum::<f32>() / nodes.len() as f32;
    assert!((centroid.x - x).abs() < 1e-3, "{} vs {x}", centroid.x);
    assert!((centroid.y - y).abs() < 1e-3, "{} vs {y}", centroid.y);
    assert_eq!(centroid.count as usize, nodes.len());
}

#[test]
fn test_assignments_cover_every_node() {
    let Some(ctx) = common::gpu() else { return };

    let nodes = common::random_nodes(300, 5, 80.0);
    let mut kmeans = KMeans::new(&ctx, nodes.len(), 7, 5, false).unwrap();
    kmeans.set_nodes(&ctx, &nodes).unwrap();
    kmeans.initialize(&ctx).unwrap();
    for _ in 0..3 {
        kmeans.advance(&ctx).unwrap();
        let centroids = kmeans.centroids(&ctx).unwrap();
        let members: f32 = centroids.iter().map(|c| c.count).sum();
        assert_eq!(members as usize, nodes.len());
        assert!(centroids.iter().all(|c| c.x.is_finite() && c.y.is_finite()));
        assert!(kmeans.closest(&ctx).unwrap().iter().all(|&c| c < 7));
    }
}

#[test]
fn test_empty_centroid_keeps_its_position() {
    let Some(ctx) = common::gpu() else { return };

    // Both centroids seed on (5, 5); ties go to centroid 0, leaving 1 empty.
    let nodes = vec![
        common::unit_node(5.0, 5.0),
        common::unit_node(-5.0, -5.0),
        common::unit_node(5.0, 5.0),
        common::unit_node(5.0, 5.0),
    ];
    let mut kmeans = KMeans::new(&ctx, nodes.len(), 2, 1, false).unwrap();
    kmeans.set_nodes(&ctx, &nodes).unwrap();
    kmeans.initialize(&ctx).unwrap();
    kmeans.advance(&ctx).unwrap();

    let centroids = kmeans.centroids(&ctx).unwrap();
    assert_eq!((centroids[0].x, centroids[0].y), (2.5, 2.5));
    assert_eq!(centroids[0].count, 4.0);
    assert_eq!((centroids[1].x, centroids[1].y), (5.0, 5.0));
    assert_eq!((centroids[1].mass, centroids[1].count), (0.0, 0.0));
}

#[test]
fn test_grouped_offsets_partition_sorted_nodes() {
    let Some(ctx) = common::gpu() else { return };

    let nodes = common::random_nodes(250, 21, 60.0);
    let mut kmeans = KMeans::new(&ctx, nodes.len(), 6, 3, true).unwrap();
    kmeans.set_nodes(&ctx, &nodes).unwrap();
    kmeans.initialize(&ctx).unwrap();
    kmeans.advance(&ctx).unwrap();

    let closest = kmeans.closest(&ctx).unwrap();
    let offsets = kmeans.centroid_offsets(&ctx).unwrap();
    let sorted = kmeans.sorted_nodes(&ctx).unwrap();

    let mut running = 0.0;
    for (centroid, range) in offsets.iter().enumerate() {
        assert_eq!(range.offset, running);
        running += range.count;
        let start = range.offset as usize;
        for &node in &sorted[start..start + range.count as usize] {
            assert_eq!(closest[node as usize] as usize, centroid);
        }
    }
    assert_eq!(running as usize, nodes.len());
}

#[test]
fn test_centroid_count_is_validated() {
    let Some(ctx) = common::gpu() else { return };

    assert!(KMeans::new(&ctx, 10, 0, 1, false).is_err());
    assert!(KMeans::new(&ctx, 10, 11, 1, false).is_err());
    assert!(KMeans::new(&ctx, 10, 10, 0, false).is_err());
}
