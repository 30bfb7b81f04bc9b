// BVH layout transforms: leaf permutation coverage, reverse-index
// bijection, 4-wide collapse and the sidecar cache round trip.

use glam::{Vec2, Vec3};
use raywave::accel::{self, BvhType, BvhVariant};
use raywave::scene::Triangle;

fn triangle_at(center: Vec3) -> Triangle {
    Triangle {
        position_0: center + Vec3::new(-0.4, -0.4, 0.0),
        position_1: center + Vec3::new(0.4, -0.4, 0.0),
        position_2: center + Vec3::new(0.0, 0.5, 0.0),
        normal_0: Vec3::Z,
        normal_1: Vec3::Z,
        normal_2: Vec3::Z,
        tex_coord_0: Vec2::ZERO,
        tex_coord_1: Vec2::ZERO,
        tex_coord_2: Vec2::ZERO,
        material_id: 0,
    }
}

fn scattered_triangles(count: usize) -> Vec<Triangle> {
    // Deterministic pseudo-scatter keeps splits meaningful
    (0..count)
        .map(|i| {
            let f = i as f32;
            triangle_at(Vec3::new(
                (f * 7.3) % 29.0,
                (f * 3.1) % 13.0,
                (f * 11.7) % 41.0,
            ))
        })
        .collect()
}

#[test]
fn reverse_permutation_is_a_bijection_over_a_real_build() {
    let triangles = scattered_triangles(257);
    let bvh = accel::build_bvh(&triangles);
    let reverse = accel::reverse_indices(&bvh.indices);

    assert_eq!(bvh.indices.len(), triangles.len());
    for original in 0..triangles.len() {
        assert_eq!(bvh.indices[reverse[original] as usize], original as u32);
    }
}

#[test]
fn every_triangle_is_reachable_from_some_leaf() {
    let triangles = scattered_triangles(64);
    let bvh = accel::build_bvh(&triangles);

    let mut covered = vec![false; triangles.len()];
    for node in bvh.binary_nodes() {
        if node.is_leaf() {
            for i in node.left_or_first..node.left_or_first + node.count {
                covered[bvh.indices[i as usize] as usize] = true;
            }
        }
    }
    assert!(covered.iter().all(|&c| c));
}

#[test]
fn qbvh_collapse_preserves_leaf_ranges() {
    let triangles = scattered_triangles(96);
    let bvh = accel::build_bvh(&triangles);

    let binary_leaf_total: u32 = bvh
        .binary_nodes()
        .iter()
        .filter(|n| n.is_leaf())
        .map(|n| n.count)
        .sum();

    let qbvh = bvh.with_type(BvhType::Qbvh);
    assert_eq!(qbvh.bvh_type(), BvhType::Qbvh);

    let BvhVariant::Qbvh(nodes) = &qbvh.variant else {
        panic!("expected qbvh nodes");
    };
    let qbvh_leaf_total: u32 = nodes
        .iter()
        .flat_map(|n| {
            n.count
                .iter()
                .filter(|&&c| c != u32::MAX && c > 0)
                .copied()
                .collect::<Vec<_>>()
        })
        .sum();

    assert_eq!(binary_leaf_total, triangles.len() as u32);
    assert_eq!(qbvh_leaf_total, binary_leaf_total);
}

#[test]
fn cache_round_trip_preserves_nodes_and_indices() {
    let dir = std::env::temp_dir().join("raywave-bvh-integration");
    std::fs::create_dir_all(&dir).expect("temp dir");
    let scene_path = dir.join("scatter.obj");

    let triangles = scattered_triangles(40);
    let bvh = accel::build_bvh(&triangles);
    accel::cache::store(&scene_path, &bvh);

    let loaded = accel::cache::load(&scene_path, 40).expect("cache load");
    assert_eq!(loaded.binary_nodes(), bvh.binary_nodes());
    assert_eq!(loaded.indices, bvh.indices);

    // Stale cache (different triangle count) must be rejected
    assert!(accel::cache::load(&scene_path, 41).is_none());
}
