// src/wavefront/queues.rs
// Persistent ray pools: five fixed-capacity queues holding per-path state
// across bounces. Columns live in one record per ray; the record layouts
// mirror the WGSL structs field for field.
// Capacity is allocated once per session and never changes; live sizes are
// tracked only in the BufferSizes counters.

use bytemuck::{Pod, Zeroable};
use wgpu::BufferUsages;

use crate::arena::{BufferHandle, Lifetime, MemoryArena};
use crate::error::RenderResult;
use crate::module::{GlobalResource, KernelModule};
use crate::wavefront::BufferSizes;

/// Trace queue record, 64 bytes: ray, hit, path state.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TraceRay {
    pub origin: [f32; 3],
    pub last_material_type: u32,
    pub direction: [f32; 3],
    pub last_pdf: f32,
    pub hit_triangle_id: i32,
    pub hit_u: f32,
    pub hit_v: f32,
    pub pixel_index: i32,
    pub throughput: [f32; 3],
    pub _pad0: f32,
}

/// Material shade queue record, 48 bytes, shared by the diffuse, dielectric
/// and glossy queues.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialRay {
    pub direction: [f32; 3],
    pub _pad0: f32,
    pub hit_triangle_id: i32,
    pub hit_u: f32,
    pub hit_v: f32,
    pub pixel_index: i32,
    pub throughput: [f32; 3],
    pub _pad1: f32,
}

/// Shadow queue record, 48 bytes: occlusion segment plus the illumination
/// added to the direct channel when unoccluded.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowRay {
    pub ray_origin: [f32; 3],
    pub max_distance: f32,
    pub ray_direction: [f32; 3],
    pub _pad0: f32,
    pub illumination: [f32; 3],
    pub pixel_index: i32,
}

/// The five persistent queues plus the counters buffer.
pub struct RayPools {
    /// Queue capacity; every column of every pool has this many entries.
    pub capacity: u32,
    pub trace: BufferHandle,
    pub shade_diffuse: BufferHandle,
    pub shade_dielectric: BufferHandle,
    pub shade_glossy: BufferHandle,
    pub shadow: BufferHandle,
    pub buffer_sizes: BufferHandle,
}

impl RayPools {
    /// Allocate all pools at `capacity` rays and register their symbols.
    pub fn new(
        arena: &mut MemoryArena,
        module: &mut KernelModule,
        capacity: u32,
    ) -> RenderResult<Self> {
        let usage = BufferUsages::STORAGE | BufferUsages::COPY_DST;
        let trace = arena.alloc_buffer(
            "ray_buffer_trace",
            capacity as u64 * std::mem::size_of::<TraceRay>() as u64,
            usage,
            Lifetime::Scene,
        )?;
        let shade_diffuse = arena.alloc_buffer(
            "ray_buffer_shade_diffuse",
            capacity as u64 * std::mem::size_of::<MaterialRay>() as u64,
            usage,
            Lifetime::Scene,
        )?;
        let shade_dielectric = arena.alloc_buffer(
            "ray_buffer_shade_dielectric",
            capacity as u64 * std::mem::size_of::<MaterialRay>() as u64,
            usage,
            Lifetime::Scene,
        )?;
        let shade_glossy = arena.alloc_buffer(
            "ray_buffer_shade_glossy",
            capacity as u64 * std::mem::size_of::<MaterialRay>() as u64,
            usage,
            Lifetime::Scene,
        )?;
        let shadow = arena.alloc_buffer(
            "ray_buffer_shadow",
            capacity as u64 * std::mem::size_of::<ShadowRay>() as u64,
            usage,
            Lifetime::Scene,
        )?;
        let buffer_sizes = arena.alloc_buffer(
            "buffer_sizes",
            std::mem::size_of::<BufferSizes>() as u64,
            usage | BufferUsages::COPY_SRC,
            Lifetime::Scene,
        )?;

        module.set_global("ray_buffer_trace", GlobalResource::Buffer(trace));
        module.set_global("ray_buffer_shade_diffuse", GlobalResource::Buffer(shade_diffuse));
        module.set_global(
            "ray_buffer_shade_dielectric",
            GlobalResource::Buffer(shade_dielectric),
        );
        module.set_global("ray_buffer_shade_glossy", GlobalResource::Buffer(shade_glossy));
        module.set_global("ray_buffer_shadow", GlobalResource::Buffer(shadow));
        module.set_global("buffer_sizes", GlobalResource::Buffer(buffer_sizes));

        Ok(Self {
            capacity,
            trace,
            shade_diffuse,
            shade_dielectric,
            shade_glossy,
            shadow,
            buffer_sizes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_match_kernel_abi() {
        assert_eq!(std::mem::size_of::<TraceRay>(), 64);
        assert_eq!(std::mem::size_of::<MaterialRay>(), 48);
        assert_eq!(std::mem::size_of::<ShadowRay>(), 48);
    }
}
