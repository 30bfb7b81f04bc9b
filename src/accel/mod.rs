// src/accel/mod.rs
// Bounding volume hierarchy: flat node arrays plus the permuted triangle
// index sequence. The engine consumes a built BVH and transforms its layout;
// every device-side triangle reference uses the permuted index space.

pub mod build;
pub mod cache;
pub mod qbvh;
pub mod types;

pub use build::build_bvh;
pub use types::{Aabb, BvhNode, BvhType, CwbvhNode, QbvhNode};

/// Node storage for the selected branching factor.
pub enum BvhVariant {
    Binary(Vec<BvhNode>),
    Qbvh(Vec<QbvhNode>),
    Cwbvh(Vec<CwbvhNode>),
}

/// A built BVH: nodes plus the triangle permutation referenced by leaves.
pub struct Bvh {
    pub variant: BvhVariant,
    /// `indices[device_triangle] == original_triangle`
    pub indices: Vec<u32>,
}

impl Bvh {
    pub fn binary(nodes: Vec<BvhNode>, indices: Vec<u32>) -> Self {
        Self {
            variant: BvhVariant::Binary(nodes),
            indices,
        }
    }

    pub fn bvh_type(&self) -> BvhType {
        match self.variant {
            BvhVariant::Binary(_) => BvhType::Binary,
            BvhVariant::Qbvh(_) => BvhType::Qbvh,
            BvhVariant::Cwbvh(_) => BvhType::Cwbvh,
        }
    }

    pub fn node_count(&self) -> usize {
        match &self.variant {
            BvhVariant::Binary(n) => n.len(),
            BvhVariant::Qbvh(n) => n.len(),
            BvhVariant::Cwbvh(n) => n.len(),
        }
    }

    /// Raw node bytes for upload under `bvh_type().node_symbol()`.
    pub fn node_bytes(&self) -> &[u8] {
        match &self.variant {
            BvhVariant::Binary(n) => bytemuck::cast_slice(n),
            BvhVariant::Qbvh(n) => bytemuck::cast_slice(n),
            BvhVariant::Cwbvh(n) => bytemuck::cast_slice(n),
        }
    }

    /// The binary node array. Panics for other variants; callers that
    /// collapse or cache operate on binary trees only.
    pub fn binary_nodes(&self) -> &[BvhNode] {
        match &self.variant {
            BvhVariant::Binary(n) => n,
            _ => panic!("binary_nodes on a non-binary BVH"),
        }
    }

    /// Re-express this BVH with the requested branching factor.
    pub fn with_type(self, ty: BvhType) -> Self {
        match (ty, &self.variant) {
            (BvhType::Binary, BvhVariant::Binary(_))
            | (BvhType::Qbvh, BvhVariant::Qbvh(_))
            | (BvhType::Cwbvh, BvhVariant::Cwbvh(_)) => self,
            (BvhType::Qbvh, BvhVariant::Binary(nodes)) => Bvh {
                variant: BvhVariant::Qbvh(qbvh::qbvh_from_binary(nodes)),
                indices: self.indices,
            },
            _ => panic!("unsupported BVH conversion"),
        }
    }
}

/// Invert the leaf permutation: `reverse[original] == device`. The result is
/// a bijection whenever `indices` is one.
pub fn reverse_indices(indices: &[u32]) -> Vec<u32> {
    let mut reverse = vec![0u32; indices.len()];
    for (device, &original) in indices.iter().enumerate() {
        reverse[original as usize] = device as u32;
    }
    reverse
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_permutation_is_a_bijection() {
        let indices = vec![3u32, 1, 4, 0, 2];
        let reverse = reverse_indices(&indices);
        for original in 0..indices.len() {
            assert_eq!(indices[reverse[original] as usize], original as u32);
        }
        for device in 0..indices.len() {
            assert_eq!(reverse[indices[device] as usize], device as u32);
        }
    }
}
