// src/wavefront/mod.rs
// Wavefront orchestration: shared constants, the per-bounce queue counters,
// the render-globals uniform and the screen-dependent framebuffer set.

pub mod driver;
pub mod pipeline;
pub mod queues;

use bytemuck::{Pod, Zeroable};
use wgpu::BufferUsages;

use crate::arena::{BufferHandle, Lifetime, MemoryArena};
use crate::error::RenderResult;
use crate::module::{GlobalResource, KernelModule};

/// Bounces per path, including the primary segment.
pub const NUM_BOUNCES: usize = 5;

/// Upper bound of rays in flight per batch. The effective batch size is
/// `min(BATCH_SIZE, screen pixel count)`.
pub const BATCH_SIZE: u32 = 1 << 20;

/// Block shape of the queue-driven wavefront stages.
pub const WAVEFRONT_BLOCK: (u32, u32) = (crate::gpu::WARP_SIZE * 2, 1);

/// Block shape of the persistent-thread trace stages and their fixed grid.
pub const TRACE_BLOCK: (u32, u32) = (crate::gpu::WARP_SIZE, 4);
pub const TRACE_GRID: (u32, u32) = (32, 32);

/// Block shape of image-space stages.
pub const IMAGE_BLOCK: (u32, u32) = (crate::gpu::WARP_SIZE, 4);

/// Live queue counts per bounce, mirrored on the device. The host writes
/// `trace[0]` per batch; kernels atomically bump the rest. Retired counters
/// feed the persistent-thread trace loops.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BufferSizes {
    pub trace: [i32; NUM_BOUNCES],
    pub diffuse: [i32; NUM_BOUNCES],
    pub dielectric: [i32; NUM_BOUNCES],
    pub glossy: [i32; NUM_BOUNCES],
    pub shadow: [i32; NUM_BOUNCES],
    pub rays_retired: [i32; NUM_BOUNCES],
    pub rays_retired_shadow: [i32; NUM_BOUNCES],
}

impl BufferSizes {
    pub fn reset(batch_size: u32) -> Self {
        let mut sizes = BufferSizes::zeroed();
        sizes.trace[0] = batch_size as i32;
        sizes
    }
}

/// Frame-constant scalars shared by every stage, one uniform buffer under
/// the `render_globals` symbol.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RenderGlobals {
    pub screen_width: u32,
    pub screen_height: u32,
    pub screen_pitch: u32,
    pub light_count: u32,
    pub light_area_total: f32,
    pub sky_size: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Denoiser tuning, uploaded under `svgf_settings` whenever it changes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SvgfSettings {
    pub alpha_color: f32,
    pub alpha_moment: f32,
    pub sigma_z: f32,
    pub sigma_n: f32,
    pub sigma_l: f32,
    pub atrous_iterations: i32,
    pub _pad0: u32,
    pub _pad1: u32,
}

impl Default for SvgfSettings {
    fn default() -> Self {
        Self {
            alpha_color: 0.2,
            alpha_moment: 0.2,
            sigma_z: 1.0,
            sigma_n: 128.0,
            sigma_l: 4.0,
            atrous_iterations: 5,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

/// Renderer toggles. Any change resets temporal history on the next update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub enable_rasterization: bool,
    pub enable_svgf: bool,
    pub enable_spatial_variance: bool,
    pub enable_taa: bool,
    pub enable_albedo: bool,
    pub svgf: SvgfSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_rasterization: true,
            enable_svgf: false,
            enable_spatial_variance: true,
            enable_taa: false,
            enable_albedo: true,
            svgf: SvgfSettings::default(),
        }
    }
}

/// Next value of `frames_since_camera_moved`: reset on a settings change or
/// camera motion, saturate modulo 256 while SVGF owns the history.
pub fn advance_history_frames(
    current: u32,
    settings_changed: bool,
    svgf_enabled: bool,
    camera_moved: bool,
) -> u32 {
    if settings_changed {
        0
    } else if svgf_enabled {
        (current + 1) & 255
    } else if camera_moved {
        0
    } else {
        current + 1
    }
}

/// Screen-dependent framebuffer set: four working channels, the SVGF
/// ping-pong pair, retained history, the TAA pair and the accumulator the
/// presentation blit reads. All are `pitch * height` vec4 columns.
pub struct Framebuffers {
    pub albedo: BufferHandle,
    pub direct: BufferHandle,
    pub indirect: BufferHandle,
    pub moment: BufferHandle,
    pub direct_alt: BufferHandle,
    pub indirect_alt: BufferHandle,
    pub history_length: BufferHandle,
    pub history_direct: BufferHandle,
    pub history_indirect: BufferHandle,
    pub history_moment: BufferHandle,
    pub history_normal_and_depth: BufferHandle,
    pub history_triangle_id: BufferHandle,
    pub taa_frame_prev: BufferHandle,
    pub taa_frame_curr: BufferHandle,
    pub accumulator: BufferHandle,
}

impl Framebuffers {
    /// Allocate the full set for a `pitch * height` screen and register the
    /// kernel-visible symbols. Existing screen allocations must have been
    /// freed beforehand.
    pub fn create(
        arena: &mut MemoryArena,
        module: &mut KernelModule,
        pitch: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let texels = pitch as u64 * height as u64;
        let usage = BufferUsages::STORAGE | BufferUsages::COPY_DST;

        let mut alloc = |name: &'static str, bytes_per_texel: u64| -> RenderResult<BufferHandle> {
            let handle = arena.alloc_buffer(name, texels * bytes_per_texel, usage, Lifetime::Screen)?;
            module.set_global(name, GlobalResource::Buffer(handle));
            Ok(handle)
        };

        Ok(Self {
            albedo: alloc("frame_buffer_albedo", 16)?,
            direct: alloc("frame_buffer_direct", 16)?,
            indirect: alloc("frame_buffer_indirect", 16)?,
            moment: alloc("frame_buffer_moment", 16)?,
            direct_alt: alloc("frame_buffer_direct_alt", 16)?,
            indirect_alt: alloc("frame_buffer_indirect_alt", 16)?,
            history_length: alloc("history_length", 4)?,
            history_direct: alloc("history_direct", 16)?,
            history_indirect: alloc("history_indirect", 16)?,
            history_moment: alloc("history_moment", 16)?,
            history_normal_and_depth: alloc("history_normal_and_depth", 16)?,
            history_triangle_id: alloc("history_triangle_id", 4)?,
            taa_frame_prev: alloc("taa_frame_prev", 16)?,
            taa_frame_curr: alloc("taa_frame_curr", 16)?,
            accumulator: alloc("accumulator", 16)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sizes_reset_seeds_first_trace_queue() {
        let sizes = BufferSizes::reset(1234);
        assert_eq!(sizes.trace[0], 1234);
        assert_eq!(&sizes.trace[1..], &[0; NUM_BOUNCES - 1]);
        assert_eq!(sizes.diffuse, [0; NUM_BOUNCES]);
        assert_eq!(sizes.shadow, [0; NUM_BOUNCES]);
        assert_eq!(sizes.rays_retired, [0; NUM_BOUNCES]);
    }

    #[test]
    fn counter_struct_is_tightly_packed() {
        assert_eq!(
            std::mem::size_of::<BufferSizes>(),
            7 * NUM_BOUNCES * std::mem::size_of::<i32>()
        );
    }
}
