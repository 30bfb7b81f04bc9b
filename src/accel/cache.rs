// src/accel/cache.rs
// Sidecar BVH cache: `<scene>.bvh` next to the scene file holds the flat
// binary node array and triangle permutation so sessions skip the rebuild.

use std::fs;
use std::path::{Path, PathBuf};

use crate::accel::types::BvhNode;
use crate::accel::Bvh;
use crate::error::{RenderError, RenderResult};

const MAGIC: u32 = 0x4856_4252; // "RBVH"
const VERSION: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Header {
    magic: u32,
    version: u32,
    triangle_count: u32,
    node_count: u32,
    index_count: u32,
    _pad: u32,
}

/// Sidecar path for a scene file: `cornellbox.obj` -> `cornellbox.obj.bvh`.
pub fn sidecar_path(scene_path: &Path) -> PathBuf {
    let mut name = scene_path.as_os_str().to_os_string();
    name.push(".bvh");
    PathBuf::from(name)
}

/// Load a cached binary BVH if the sidecar exists and matches the scene's
/// triangle count. A stale or corrupt cache is treated as absent.
pub fn load(scene_path: &Path, triangle_count: u32) -> Option<Bvh> {
    let path = sidecar_path(scene_path);
    let bytes = fs::read(&path).ok()?;
    match parse(&bytes, triangle_count) {
        Ok(bvh) => {
            log::info!("loaded cached BVH from {}", path.display());
            Some(bvh)
        }
        Err(e) => {
            log::warn!("ignoring BVH cache {}: {e}", path.display());
            None
        }
    }
}

fn parse(bytes: &[u8], triangle_count: u32) -> RenderResult<Bvh> {
    let header_size = std::mem::size_of::<Header>();
    if bytes.len() < header_size {
        return Err(RenderError::scene("cache truncated"));
    }
    let header: Header = bytemuck::pod_read_unaligned(&bytes[..header_size]);
    if header.magic != MAGIC {
        return Err(RenderError::scene("bad cache magic"));
    }
    if header.version != VERSION {
        return Err(RenderError::scene(format!(
            "cache version {} != {VERSION}",
            header.version
        )));
    }
    if header.triangle_count != triangle_count {
        return Err(RenderError::scene("triangle count changed"));
    }

    let node_bytes = header.node_count as usize * std::mem::size_of::<BvhNode>();
    let index_bytes = header.index_count as usize * 4;
    if bytes.len() != header_size + node_bytes + index_bytes {
        return Err(RenderError::scene("cache size mismatch"));
    }

    let nodes: Vec<BvhNode> =
        bytemuck::pod_collect_to_vec(&bytes[header_size..header_size + node_bytes]);
    let indices: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes[header_size + node_bytes..]);
    Ok(Bvh::binary(nodes, indices))
}

/// Write the sidecar. Failure is non-fatal; the next session simply rebuilds.
pub fn store(scene_path: &Path, bvh: &Bvh) {
    let nodes = bvh.binary_nodes();
    let header = Header {
        magic: MAGIC,
        version: VERSION,
        triangle_count: bvh.indices.len() as u32,
        node_count: nodes.len() as u32,
        index_count: bvh.indices.len() as u32,
        _pad: 0,
    };

    let mut bytes = Vec::with_capacity(
        std::mem::size_of::<Header>() + nodes.len() * std::mem::size_of::<BvhNode>(),
    );
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(bytemuck::cast_slice(nodes));
    bytes.extend_from_slice(bytemuck::cast_slice(&bvh.indices));

    let path = sidecar_path(scene_path);
    if let Err(e) = fs::write(&path, bytes) {
        log::warn!("could not write BVH cache {}: {e}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_name_appends_extension() {
        assert_eq!(
            sidecar_path(Path::new("scenes/cornellbox.obj")),
            PathBuf::from("scenes/cornellbox.obj.bvh")
        );
    }

    #[test]
    fn cache_round_trips_through_bytes() {
        let nodes = vec![
            BvhNode {
                aabb_min: [0.0; 3],
                left_or_first: 1,
                aabb_max: [1.0; 3],
                count: 0,
            },
            BvhNode {
                aabb_min: [0.0; 3],
                left_or_first: 0,
                aabb_max: [0.5; 3],
                count: 2,
            },
            BvhNode {
                aabb_min: [0.5; 3],
                left_or_first: 2,
                aabb_max: [1.0; 3],
                count: 1,
            },
        ];
        let indices = vec![2u32, 0, 1];
        let bvh = Bvh::binary(nodes.clone(), indices.clone());

        let dir = std::env::temp_dir().join("raywave-cache-test");
        std::fs::create_dir_all(&dir).expect("temp dir");
        let scene = dir.join("scene.obj");

        store(&scene, &bvh);
        let loaded = load(&scene, 3).expect("cache should load");
        assert_eq!(loaded.binary_nodes(), &nodes[..]);
        assert_eq!(loaded.indices, indices);

        // Triangle count mismatch invalidates
        assert!(load(&scene, 4).is_none());
    }
}
