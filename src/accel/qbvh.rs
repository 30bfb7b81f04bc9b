// src/accel/qbvh.rs
// Collapse a binary BVH into 4-wide nodes. Pure layout transform: leaf
// ranges and the triangle permutation are taken over unchanged.

use crate::accel::types::{BvhNode, QbvhNode};

/// Convert binary nodes into QBVH nodes. Internal binary children are
/// repeatedly replaced by their own children until each 4-wide node holds up
/// to four subtrees.
pub fn qbvh_from_binary(nodes: &[BvhNode]) -> Vec<QbvhNode> {
    let mut out = Vec::with_capacity(nodes.len() / 2 + 1);
    if nodes.is_empty() {
        return out;
    }
    out.push(empty_node());
    collapse(nodes, 0, &mut out, 0);
    out
}

fn empty_node() -> QbvhNode {
    QbvhNode {
        min_x: [f32::INFINITY; 4],
        max_x: [f32::NEG_INFINITY; 4],
        min_y: [f32::INFINITY; 4],
        max_y: [f32::NEG_INFINITY; 4],
        min_z: [f32::INFINITY; 4],
        max_z: [f32::NEG_INFINITY; 4],
        index: [0; 4],
        count: [QbvhNode::EMPTY; 4],
    }
}

fn collapse(nodes: &[BvhNode], binary_index: u32, out: &mut Vec<QbvhNode>, qbvh_index: usize) {
    let root = &nodes[binary_index as usize];

    // Gather up to four subtrees under this node
    let mut children: Vec<u32> = if root.is_leaf() {
        vec![binary_index]
    } else {
        vec![root.left_or_first, root.left_or_first + 1]
    };
    loop {
        if children.len() >= 4 {
            break;
        }
        // Split the internal child with the largest surface area
        let mut best: Option<(usize, f32)> = None;
        for (slot, &c) in children.iter().enumerate() {
            let node = &nodes[c as usize];
            if node.is_leaf() {
                continue;
            }
            let mut aabb = crate::accel::types::Aabb::empty();
            aabb.min = node.aabb_min;
            aabb.max = node.aabb_max;
            let area = aabb.surface_area();
            if best.map_or(true, |(_, a)| area > a) {
                best = Some((slot, area));
            }
        }
        let Some((slot, _)) = best else {
            break;
        };
        let node = &nodes[children[slot] as usize];
        children[slot] = node.left_or_first;
        children.insert(slot + 1, node.left_or_first + 1);
    }

    for (slot, &c) in children.iter().enumerate() {
        let node = &nodes[c as usize];
        let mut entry = out[qbvh_index];
        entry.min_x[slot] = node.aabb_min[0];
        entry.min_y[slot] = node.aabb_min[1];
        entry.min_z[slot] = node.aabb_min[2];
        entry.max_x[slot] = node.aabb_max[0];
        entry.max_y[slot] = node.aabb_max[1];
        entry.max_z[slot] = node.aabb_max[2];
        if node.is_leaf() {
            entry.index[slot] = node.left_or_first;
            entry.count[slot] = node.count;
            out[qbvh_index] = entry;
        } else {
            let child_q = out.len();
            entry.index[slot] = child_q as u32;
            entry.count[slot] = 0;
            out[qbvh_index] = entry;
            out.push(empty_node());
            collapse(nodes, c, out, child_q);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(first: u32, count: u32) -> BvhNode {
        BvhNode {
            aabb_min: [first as f32, 0.0, 0.0],
            left_or_first: first,
            aabb_max: [first as f32 + 1.0, 1.0, 1.0],
            count,
        }
    }

    fn internal(left: u32, min: f32, max: f32) -> BvhNode {
        BvhNode {
            aabb_min: [min, 0.0, 0.0],
            left_or_first: left,
            aabb_max: [max, 1.0, 1.0],
            count: 0,
        }
    }

    #[test]
    fn collapses_two_binary_levels_into_one_node() {
        // root -> (a, b), a -> (leaf0, leaf1), b -> (leaf2, leaf3)
        let nodes = vec![
            internal(1, 0.0, 4.0),
            internal(3, 0.0, 2.0),
            internal(5, 2.0, 4.0),
            leaf(0, 1),
            leaf(1, 1),
            leaf(2, 1),
            leaf(3, 1),
        ];
        let qbvh = qbvh_from_binary(&nodes);
        assert_eq!(qbvh.len(), 1);

        let counts: Vec<u32> = qbvh[0].count.to_vec();
        assert!(counts.iter().all(|&c| c == 1));
        let mut firsts: Vec<u32> = qbvh[0].index.to_vec();
        firsts.sort();
        assert_eq!(firsts, vec![0, 1, 2, 3]);
    }

    #[test]
    fn leaf_root_stays_a_single_slot() {
        let nodes = vec![leaf(0, 3)];
        let qbvh = qbvh_from_binary(&nodes);
        assert_eq!(qbvh.len(), 1);
        assert_eq!(qbvh[0].count[0], 3);
        assert_eq!(qbvh[0].count[1], QbvhNode::EMPTY);
    }
}
