// src/accel/build.rs
// Binned-SAH binary BVH builder. Runs once per scene on the host; sessions
// normally load the sidecar cache instead of rebuilding.
// RELEVANT FILES: src/accel/types.rs, src/accel/cache.rs, src/scene/mod.rs

use glam::Vec3;

use crate::accel::types::{Aabb, BvhNode};
use crate::accel::Bvh;
use crate::scene::Triangle;

const SAH_BINS: usize = 12;
const MAX_LEAF_SIZE: u32 = 4;

/// Build a binary BVH over the triangle list. The returned `indices` array
/// is the permutation referenced by leaf ranges; triangle `indices[i]` on
/// the device corresponds to original triangle `i` of the input.
pub fn build_bvh(triangles: &[Triangle]) -> Bvh {
    let mut aabbs = Vec::with_capacity(triangles.len());
    let mut centers = Vec::with_capacity(triangles.len());
    for tri in triangles {
        let mut aabb = Aabb::empty();
        aabb.expand_point(tri.position_0);
        aabb.expand_point(tri.position_1);
        aabb.expand_point(tri.position_2);
        aabbs.push(aabb);
        centers.push((tri.position_0 + tri.position_1 + tri.position_2) / 3.0);
    }

    let mut builder = Builder {
        aabbs,
        centers,
        indices: (0..triangles.len() as u32).collect(),
        nodes: Vec::with_capacity(triangles.len() * 2),
    };

    if triangles.is_empty() {
        // Inverted root bounds: the ray-box test never passes, so traversal
        // of an empty scene terminates at the root
        builder.nodes.push(BvhNode {
            aabb_min: [f32::INFINITY; 3],
            left_or_first: 0,
            aabb_max: [f32::NEG_INFINITY; 3],
            count: 0,
        });
    } else {
        builder.nodes.push(BvhNode::zeroed_root());
        builder.build_range(0, 0, triangles.len() as u32);
    }

    Bvh::binary(builder.nodes, builder.indices)
}

struct Builder {
    aabbs: Vec<Aabb>,
    centers: Vec<Vec3>,
    indices: Vec<u32>,
    nodes: Vec<BvhNode>,
}

impl BvhNode {
    fn zeroed_root() -> Self {
        BvhNode {
            aabb_min: [0.0; 3],
            left_or_first: 0,
            aabb_max: [0.0; 3],
            count: 0,
        }
    }
}

impl Builder {
    fn range_aabb(&self, first: u32, count: u32) -> Aabb {
        let mut aabb = Aabb::empty();
        for &i in &self.indices[first as usize..(first + count) as usize] {
            aabb.expand_aabb(&self.aabbs[i as usize]);
        }
        aabb
    }

    fn build_range(&mut self, node: u32, first: u32, count: u32) {
        let aabb = self.range_aabb(first, count);
        self.nodes[node as usize].aabb_min = aabb.min;
        self.nodes[node as usize].aabb_max = aabb.max;

        if count <= MAX_LEAF_SIZE {
            self.make_leaf(node, first, count);
            return;
        }

        let Some((axis, split_pos)) = self.find_split(&aabb, first, count) else {
            self.make_leaf(node, first, count);
            return;
        };

        // Partition the index range around the split plane
        let range = &mut self.indices[first as usize..(first + count) as usize];
        let centers = &self.centers;
        let mut mid = 0usize;
        for i in 0..range.len() {
            if centers[range[i] as usize][axis] < split_pos {
                range.swap(i, mid);
                mid += 1;
            }
        }
        if mid == 0 || mid == count as usize {
            // All centroids fell on one side; fall back to a median split
            mid = count as usize / 2;
        }

        let left = self.nodes.len() as u32;
        self.nodes.push(BvhNode::zeroed_root());
        self.nodes.push(BvhNode::zeroed_root());
        self.nodes[node as usize].left_or_first = left;
        self.nodes[node as usize].count = 0;

        self.build_range(left, first, mid as u32);
        self.build_range(left + 1, first + mid as u32, count - mid as u32);
    }

    fn make_leaf(&mut self, node: u32, first: u32, count: u32) {
        self.nodes[node as usize].left_or_first = first;
        self.nodes[node as usize].count = count;
    }

    /// Binned SAH over the widest centroid axis. Returns None when no split
    /// beats keeping the range as a leaf.
    fn find_split(&self, aabb: &Aabb, first: u32, count: u32) -> Option<(usize, f32)> {
        let mut centroid_min = Vec3::splat(f32::INFINITY);
        let mut centroid_max = Vec3::splat(f32::NEG_INFINITY);
        for &i in &self.indices[first as usize..(first + count) as usize] {
            centroid_min = centroid_min.min(self.centers[i as usize]);
            centroid_max = centroid_max.max(self.centers[i as usize]);
        }
        let extent = centroid_max - centroid_min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        if extent[axis] <= 1e-8 {
            return None;
        }

        let mut bin_aabbs = [Aabb::empty(); SAH_BINS];
        let mut bin_counts = [0u32; SAH_BINS];
        let scale = SAH_BINS as f32 / extent[axis];
        for &i in &self.indices[first as usize..(first + count) as usize] {
            let offset = (self.centers[i as usize][axis] - centroid_min[axis]) * scale;
            let bin = (offset as usize).min(SAH_BINS - 1);
            bin_aabbs[bin].expand_aabb(&self.aabbs[i as usize]);
            bin_counts[bin] += 1;
        }

        // Sweep the candidate planes between bins
        let mut best_cost = f32::INFINITY;
        let mut best_plane = 0usize;
        for plane in 1..SAH_BINS {
            let mut left = Aabb::empty();
            let mut right = Aabb::empty();
            let mut left_count = 0u32;
            let mut right_count = 0u32;
            for bin in 0..plane {
                left.expand_aabb(&bin_aabbs[bin]);
                left_count += bin_counts[bin];
            }
            for bin in plane..SAH_BINS {
                right.expand_aabb(&bin_aabbs[bin]);
                right_count += bin_counts[bin];
            }
            if left_count == 0 || right_count == 0 {
                continue;
            }
            let cost = left.surface_area() * left_count as f32
                + right.surface_area() * right_count as f32;
            if cost < best_cost {
                best_cost = cost;
                best_plane = plane;
            }
        }

        let leaf_cost = aabb.surface_area() * count as f32;
        if best_cost >= leaf_cost || best_plane == 0 {
            return None;
        }
        let split_pos = centroid_min[axis] + best_plane as f32 / scale;
        Some((axis, split_pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Triangle;
    use glam::{Vec2, Vec3};

    fn quad_at(x: f32) -> [Triangle; 2] {
        let tri = |p0: Vec3, p1: Vec3, p2: Vec3| Triangle {
            position_0: p0,
            position_1: p1,
            position_2: p2,
            normal_0: Vec3::Z,
            normal_1: Vec3::Z,
            normal_2: Vec3::Z,
            tex_coord_0: Vec2::ZERO,
            tex_coord_1: Vec2::ZERO,
            tex_coord_2: Vec2::ZERO,
            material_id: 0,
        };
        [
            tri(
                Vec3::new(x, 0.0, 0.0),
                Vec3::new(x + 1.0, 0.0, 0.0),
                Vec3::new(x, 1.0, 0.0),
            ),
            tri(
                Vec3::new(x + 1.0, 0.0, 0.0),
                Vec3::new(x + 1.0, 1.0, 0.0),
                Vec3::new(x, 1.0, 0.0),
            ),
        ]
    }

    #[test]
    fn builds_a_valid_tree_over_spread_quads() {
        let mut triangles = Vec::new();
        for i in 0..16 {
            triangles.extend_from_slice(&quad_at(i as f32 * 10.0));
        }
        let bvh = build_bvh(&triangles);

        // Permutation covers every triangle exactly once
        let mut seen = vec![false; triangles.len()];
        for &i in &bvh.indices {
            assert!(!seen[i as usize], "duplicate index {i}");
            seen[i as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));

        // Every leaf range is in bounds, every internal child is in bounds
        let nodes = bvh.binary_nodes();
        for node in nodes {
            if node.is_leaf() {
                assert!(
                    (node.left_or_first + node.count) as usize <= bvh.indices.len(),
                    "leaf range out of bounds"
                );
                assert!(node.count <= MAX_LEAF_SIZE);
            } else if nodes.len() > 1 {
                assert!(((node.left_or_first + 1) as usize) < nodes.len());
            }
        }
    }

    #[test]
    fn single_triangle_is_a_leaf_root() {
        let triangles = quad_at(0.0)[..1].to_vec();
        let bvh = build_bvh(&triangles);
        let nodes = bvh.binary_nodes();
        assert!(nodes[0].is_leaf());
        assert_eq!(nodes[0].count, 1);
        assert_eq!(bvh.indices, vec![0]);
    }
}
