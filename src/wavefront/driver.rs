// src/wavefront/driver.rs
// Frame pipeline driver: primary-ray generation, the bounce loop
// (trace -> sort -> shade per material -> shadow trace), then the post
// chain. Owns the queue counters that feed kernel grids and the per-frame
// RNG seeding.

use bytemuck::{Pod, Zeroable};
use wgpu::BufferUsages;

use crate::arena::{BufferHandle, Lifetime, MemoryArena};
use crate::camera::Camera;
use crate::error::RenderResult;
use crate::gbuffer::GBuffer;
use crate::module::{GlobalResource, KernelModule};
use crate::scene::layout::SceneLayout;
use crate::scene::SceneFlags;
use crate::svgf::SvgfDriver;
use crate::taa::TaaDriver;
use crate::timing::{EventId, EventRecorder};
use crate::wavefront::pipeline::WavefrontKernels;
use crate::wavefront::queues::RayPools;
use crate::wavefront::{
    BufferSizes, Framebuffers, RenderGlobals, Settings, BATCH_SIZE, IMAGE_BLOCK, NUM_BOUNCES,
    WAVEFRONT_BLOCK,
};

/// Staging slots for mid-frame counter uploads; copies are ordered in the
/// command stream so each batch sees its own value.
const COUNTER_SLOTS: u32 = 32;

/// Small PCG stream seeding every kernel launch with a fresh 32-bit value.
struct Pcg32 {
    state: u64,
}

impl Pcg32 {
    fn new(seed: u64) -> Self {
        let mut rng = Self {
            state: seed.wrapping_add(0x853c_49e6_748f_ea9b),
        };
        rng.next();
        rng
    }

    fn next(&mut self) -> u32 {
        let old = self.state;
        self.state = old
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let rot = (old >> 59) as u32;
        xorshifted.rotate_right(rot)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CameraVectors {
    position: [f32; 3],
    _pad0: f32,
    bottom_left_corner: [f32; 3],
    _pad1: f32,
    x_axis: [f32; 3],
    _pad2: f32,
    y_axis: [f32; 3],
    _pad3: f32,
}

impl CameraVectors {
    fn from_camera(camera: &Camera) -> Self {
        Self {
            position: camera.position.into(),
            _pad0: 0.0,
            bottom_left_corner: camera.bottom_left_corner_rotated.into(),
            _pad1: 0.0,
            x_axis: camera.x_axis_rotated.into(),
            _pad2: 0.0,
            y_axis: camera.y_axis_rotated.into(),
            _pad3: 0.0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GenerateArgs {
    seed: u32,
    sample_index: u32,
    pixel_offset: u32,
    pixel_count: u32,
    camera: CameraVectors,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PrimaryArgs {
    seed: u32,
    sample_index: u32,
    pixel_offset: u32,
    pixel_count: u32,
    taa_enabled: u32,
    _pad: [u32; 3],
    camera: CameraVectors,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BounceArgs {
    seed: u32,
    bounce: u32,
    sample_index: u32,
    _pad: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct AccumulateArgs {
    enable_albedo: u32,
    frames_since_camera_moved: f32,
    _pad: [u32; 2],
}

/// Offsets and live sizes of the batches covering `pixel_count` pixels.
pub fn batch_sizes(pixel_count: u32, batch_size: u32) -> Vec<(u32, u32)> {
    let mut batches = Vec::new();
    let mut offset = 0;
    while offset < pixel_count {
        let count = (pixel_count - offset).min(batch_size);
        batches.push((offset, count));
        offset += count;
    }
    batches
}

pub struct Pathtracer {
    pub kernels: WavefrontKernels,
    pub svgf: SvgfDriver,
    pub taa: TaaDriver,
    pub pools: RayPools,
    framebuffers: Option<Framebuffers>,

    pub settings: Settings,
    settings_changed: bool,
    pub frames_since_camera_moved: u32,

    flags: SceneFlags,
    globals: RenderGlobals,
    vertex_buffer: Option<BufferHandle>,
    vertex_count: u32,

    pixel_count: u32,
    batch_size: u32,

    counter_staging: BufferHandle,
    counter_cursor: u32,

    rng: Pcg32,

    event_primary: EventId,
    event_trace: [EventId; NUM_BOUNCES],
    event_sort: [EventId; NUM_BOUNCES],
    event_shade_diffuse: [EventId; NUM_BOUNCES],
    event_shade_dielectric: [EventId; NUM_BOUNCES],
    event_shade_glossy: [EventId; NUM_BOUNCES],
    event_shadow_trace: [EventId; NUM_BOUNCES],
    event_accumulate: EventId,
    event_end: EventId,
}

impl Pathtracer {
    pub fn new(
        arena: &mut MemoryArena,
        module: &mut KernelModule,
        recorder: &mut EventRecorder,
    ) -> RenderResult<Self> {
        // Frame-constant uniforms live for the whole session; their values
        // are rewritten at resize and on settings changes
        let globals_handle = arena.alloc_buffer(
            "render_globals",
            std::mem::size_of::<RenderGlobals>() as u64,
            BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            Lifetime::Scene,
        )?;
        module.set_global("render_globals", GlobalResource::Buffer(globals_handle));

        let svgf_handle = arena.alloc_buffer(
            "svgf_settings",
            std::mem::size_of::<crate::wavefront::SvgfSettings>() as u64,
            BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            Lifetime::Scene,
        )?;
        module.set_global("svgf_settings", GlobalResource::Buffer(svgf_handle));

        let pools = RayPools::new(arena, module, BATCH_SIZE)?;

        let counter_staging = arena.alloc_buffer(
            "buffer-sizes-staging",
            COUNTER_SLOTS as u64 * std::mem::size_of::<BufferSizes>() as u64,
            BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            Lifetime::Scene,
        )?;

        let kernels = WavefrontKernels::new(module);

        let event_primary = recorder.register("Primary", "Primary");
        let bounce_events =
            |recorder: &mut EventRecorder, label: &str| -> [EventId; NUM_BOUNCES] {
                std::array::from_fn(|i| recorder.register(&format!("Bounce {i}"), label))
            };
        let event_trace = bounce_events(recorder, "Trace");
        let event_sort = bounce_events(recorder, "Sort");
        let event_shade_diffuse = bounce_events(recorder, "Diffuse");
        let event_shade_dielectric = bounce_events(recorder, "Dielectric");
        let event_shade_glossy = bounce_events(recorder, "Glossy");
        let event_shadow_trace = bounce_events(recorder, "Shadow");

        let svgf = SvgfDriver::new(module, recorder);
        let taa = TaaDriver::new(module, recorder);

        let event_accumulate = recorder.register("Post", "Accumulate");
        let event_end = recorder.register("END", "END");

        let settings = Settings::default();
        module.write_global(arena, "svgf_settings", &settings.svgf);

        Ok(Self {
            kernels,
            svgf,
            taa,
            pools,
            framebuffers: None,
            settings,
            settings_changed: false,
            frames_since_camera_moved: 0,
            flags: SceneFlags::default(),
            globals: RenderGlobals::zeroed(),
            vertex_buffer: None,
            vertex_count: 0,
            pixel_count: 0,
            batch_size: BATCH_SIZE,
            counter_staging,
            counter_cursor: 0,
            rng: Pcg32::new(0x1735_72a8_9b0d_c1e5),
            event_primary,
            event_trace,
            event_sort,
            event_shade_diffuse,
            event_shade_dielectric,
            event_shade_glossy,
            event_shadow_trace,
            event_accumulate,
            event_end,
        })
    }

    /// Adopt the uploaded scene: stage-skip flags, light and sky scalars,
    /// the rasterization vertex stream, and the session-static bind groups.
    pub fn set_scene(
        &mut self,
        layout: &SceneLayout,
        bvh_symbol: &'static str,
        arena: &MemoryArena,
        module: &KernelModule,
    ) -> RenderResult<()> {
        self.flags = layout.flags;
        self.globals.light_count = layout.light_count;
        self.globals.light_area_total = layout.light_area_total;
        self.globals.sky_size = layout.sky_size;
        self.vertex_buffer = Some(layout.vertex_buffer);
        self.vertex_count = layout.vertex_count;
        self.kernels.create_static_groups(arena, module, bvh_symbol)
    }

    pub fn scene_flags(&self) -> SceneFlags {
        self.flags
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn buffer_sizes_default(&self) -> BufferSizes {
        BufferSizes::reset(self.batch_size)
    }

    /// Recreate every screen-dependent resource. The arena must already
    /// have dropped the previous screen set.
    pub fn resize(
        &mut self,
        width: u32,
        height: u32,
        arena: &mut MemoryArena,
        module: &mut KernelModule,
        gbuffer: &GBuffer,
    ) -> RenderResult<()> {
        let pitch = crate::gpu::screen_pitch(width);
        self.pixel_count = width * height;
        self.batch_size = BATCH_SIZE.min(self.pixel_count);

        self.globals.screen_width = width;
        self.globals.screen_height = height;
        self.globals.screen_pitch = pitch;
        module.write_global(arena, "render_globals", &self.globals);

        self.framebuffers = Some(Framebuffers::create(arena, module, pitch, height)?);

        self.kernels.create_screen_groups(arena, module, gbuffer)?;
        self.svgf.create_screen_groups(arena, module, gbuffer)?;
        self.taa.create_screen_groups(arena, module, gbuffer)?;

        // Queue stages launch one thread per pooled ray; image stages cover
        // the pitched screen
        let queue_grid = (self.batch_size + WAVEFRONT_BLOCK.0 - 1) / WAVEFRONT_BLOCK.0;
        self.kernels.generate.set_grid_dim(queue_grid, 1);
        self.kernels.primary.set_grid_dim(queue_grid, 1);
        self.kernels.sort.set_grid_dim(queue_grid, 1);
        self.kernels.shade_diffuse.set_grid_dim(queue_grid, 1);
        self.kernels.shade_dielectric.set_grid_dim(queue_grid, 1);
        self.kernels.shade_glossy.set_grid_dim(queue_grid, 1);
        self.kernels.accumulate.set_grid_dim(
            pitch / IMAGE_BLOCK.0,
            (height + IMAGE_BLOCK.1 - 1) / IMAGE_BLOCK.1,
        );
        self.svgf.set_grid_dims(pitch, height);
        self.taa.set_grid_dims(pitch, height);

        self.frames_since_camera_moved = 0;
        Ok(())
    }

    /// Replace the settings; any actual change invalidates temporal history
    /// on the next update.
    pub fn set_settings(&mut self, settings: Settings) {
        if settings != self.settings {
            self.settings = settings;
            self.settings_changed = true;
        }
    }

    /// Per-frame bookkeeping of `frames_since_camera_moved`: reset on
    /// settings change or camera motion, saturate modulo 256 under SVGF.
    pub fn update(&mut self, camera_moved: bool, arena: &MemoryArena, module: &KernelModule) {
        self.frames_since_camera_moved = crate::wavefront::advance_history_frames(
            self.frames_since_camera_moved,
            self.settings_changed,
            self.settings.enable_svgf,
            camera_moved,
        );
        if self.settings_changed {
            module.write_global(arena, "svgf_settings", &self.settings.svgf);
            self.settings_changed = false;
        }
    }

    fn upload_buffer_sizes(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        arena: &MemoryArena,
        module: &KernelModule,
        sizes: &BufferSizes,
    ) -> RenderResult<()> {
        let stride = std::mem::size_of::<BufferSizes>() as u64;
        let slot = self.counter_cursor % COUNTER_SLOTS;
        self.counter_cursor += 1;
        let staging = arena.buffer(self.counter_staging);
        module
            .queue()
            .write_buffer(staging, slot as u64 * stride, bytemuck::bytes_of(sizes));
        encoder.copy_buffer_to_buffer(
            staging,
            slot as u64 * stride,
            arena.buffer(self.pools.buffer_sizes),
            0,
            stride,
        );
        Ok(())
    }

    /// Render one frame into the accumulator.
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        arena: &MemoryArena,
        module: &mut KernelModule,
        recorder: &mut EventRecorder,
        camera: &Camera,
        gbuffer: &GBuffer,
    ) -> RenderResult<()> {
        module.begin_frame();
        recorder.begin_frame();
        self.counter_cursor = 0;

        // The sampling stages accumulate with +=; start the frame from zero
        let framebuffers = self.framebuffers.as_ref().expect("not resized");
        for handle in [
            framebuffers.albedo,
            framebuffers.direct,
            framebuffers.indirect,
        ] {
            encoder.clear_buffer(arena.buffer(handle), 0, None);
        }

        if self.settings.enable_rasterization {
            let vertex_buffer = self.vertex_buffer.expect("scene not set");
            gbuffer.render(
                encoder,
                module.queue(),
                arena,
                camera,
                arena.buffer(vertex_buffer),
                self.vertex_count,
            );
        }

        let camera_vectors = CameraVectors::from_camera(camera);
        let batches = batch_sizes(self.pixel_count, self.batch_size);
        let batch_count = batches.len();

        for (batch_index, (pixel_offset, pixel_count)) in batches.into_iter().enumerate() {
            recorder.record(self.event_primary, encoder);

            if self.settings.enable_rasterization {
                // Consume the rasterized GBuffer into the shade queues,
                // skipping bounce 0's trace and sort
                let args = module.push_args(&PrimaryArgs {
                    seed: self.rng.next(),
                    sample_index: self.frames_since_camera_moved,
                    pixel_offset,
                    pixel_count,
                    taa_enabled: self.settings.enable_taa as u32,
                    _pad: [0; 3],
                    camera: camera_vectors,
                })?;
                module.dispatch(
                    encoder,
                    &self.kernels.primary,
                    args,
                    &[
                        self.kernels.sort_queues_group.as_ref().expect("groups"),
                        self.kernels.primary_scene_group.as_ref().expect("groups"),
                        self.kernels.gbuffer_group.as_ref().expect("groups"),
                    ],
                );
            } else {
                let args = module.push_args(&GenerateArgs {
                    seed: self.rng.next(),
                    sample_index: self.frames_since_camera_moved,
                    pixel_offset,
                    pixel_count,
                    camera: camera_vectors,
                })?;
                module.dispatch(
                    encoder,
                    &self.kernels.generate,
                    args,
                    &[self.kernels.gen_queues_group.as_ref().expect("groups")],
                );
            }

            for bounce in 0..NUM_BOUNCES {
                self.dispatch_bounce(encoder, module, recorder, bounce)?;
            }

            if batch_index + 1 < batch_count {
                // Seed the next batch's trace queue with its live size
                let (_, next_count) = batch_sizes(self.pixel_count, self.batch_size)
                    [batch_index + 1];
                let sizes = BufferSizes::reset(next_count);
                self.upload_buffer_sizes(encoder, arena, module, &sizes)?;
            }
        }

        if self.settings.enable_svgf {
            self.svgf.run(encoder, module, recorder, &self.settings)?;
            if self.settings.enable_taa {
                self.taa.run(encoder, module, recorder)?;
            }
        } else {
            recorder.record(self.event_accumulate, encoder);
            let args = module.push_args(&AccumulateArgs {
                enable_albedo: self.settings.enable_albedo as u32,
                frames_since_camera_moved: self.frames_since_camera_moved as f32,
                _pad: [0; 2],
            })?;
            module.dispatch(
                encoder,
                &self.kernels.accumulate,
                args,
                &[self.kernels.accum_group.as_ref().expect("groups")],
            );
        }

        recorder.record(self.event_end, encoder);
        recorder.end_frame(encoder);

        // Reset the counters to the default before the next frame begins
        let sizes = BufferSizes::reset(self.batch_size);
        self.upload_buffer_sizes(encoder, arena, module, &sizes)?;

        Ok(())
    }

    fn dispatch_bounce(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        module: &mut KernelModule,
        recorder: &mut EventRecorder,
        bounce: usize,
    ) -> RenderResult<()> {
        let skip_trace = bounce == 0 && self.settings.enable_rasterization;

        if !skip_trace {
            recorder.record(self.event_trace[bounce], encoder);
            let args = module.push_args(&BounceArgs {
                seed: self.rng.next(),
                bounce: bounce as u32,
                sample_index: self.frames_since_camera_moved,
                _pad: 0,
            })?;
            module.dispatch(
                encoder,
                &self.kernels.trace,
                args,
                &[
                    self.kernels.gen_queues_group.as_ref().expect("groups"),
                    self.kernels.trace_scene_group.as_ref().expect("groups"),
                ],
            );

            recorder.record(self.event_sort[bounce], encoder);
            let args = module.push_args(&BounceArgs {
                seed: self.rng.next(),
                bounce: bounce as u32,
                sample_index: self.frames_since_camera_moved,
                _pad: 0,
            })?;
            module.dispatch(
                encoder,
                &self.kernels.sort,
                args,
                &[
                    self.kernels.sort_queues_group.as_ref().expect("groups"),
                    self.kernels.sort_scene_group.as_ref().expect("groups"),
                    self.kernels.frame_write_group.as_ref().expect("groups"),
                ],
            );
        }

        let shade_stages: [(bool, &EventId, &crate::module::Kernel, usize); 3] = [
            (
                self.flags.has_diffuse,
                &self.event_shade_diffuse[bounce],
                &self.kernels.shade_diffuse,
                0,
            ),
            (
                self.flags.has_dielectric,
                &self.event_shade_dielectric[bounce],
                &self.kernels.shade_dielectric,
                1,
            ),
            (
                self.flags.has_glossy,
                &self.event_shade_glossy[bounce],
                &self.kernels.shade_glossy,
                2,
            ),
        ];

        for (enabled, event, kernel, queue_index) in shade_stages {
            if !enabled {
                continue;
            }
            recorder.record(*event, encoder);
            let args = module.push_args(&BounceArgs {
                seed: self.rng.next(),
                bounce: bounce as u32,
                sample_index: self.frames_since_camera_moved,
                _pad: 0,
            })?;
            let queues = self.kernels.shade_queues_groups.as_ref().expect("groups");
            module.dispatch(
                encoder,
                kernel,
                args,
                &[
                    &queues[queue_index],
                    self.kernels.shade_scene_group.as_ref().expect("groups"),
                    self.kernels.frame_write_group.as_ref().expect("groups"),
                ],
            );
        }

        if self.flags.has_lights {
            recorder.record(self.event_shadow_trace[bounce], encoder);
            let args = module.push_args(&BounceArgs {
                seed: self.rng.next(),
                bounce: bounce as u32,
                sample_index: self.frames_since_camera_moved,
                _pad: 0,
            })?;
            module.dispatch(
                encoder,
                &self.kernels.shadow_trace,
                args,
                &[
                    self.kernels.shadow_queues_group.as_ref().expect("groups"),
                    self.kernels.trace_scene_group.as_ref().expect("groups"),
                    self.kernels.frame_write_group.as_ref().expect("groups"),
                ],
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batching_splits_the_screen_into_batch_size_chunks() {
        // 1920x1080 with the default batch size: two batches
        let batches = batch_sizes(1920 * 1080, BATCH_SIZE);
        assert_eq!(
            batches,
            vec![(0, BATCH_SIZE), (BATCH_SIZE, 1920 * 1080 - BATCH_SIZE)]
        );
    }

    #[test]
    fn one_pixel_screen_runs_a_single_batch() {
        let batches = batch_sizes(1, BATCH_SIZE.min(1));
        assert_eq!(batches, vec![(0, 1)]);
    }

    #[test]
    fn exact_multiple_has_no_tail_batch() {
        let batches = batch_sizes(2 * BATCH_SIZE, BATCH_SIZE);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|&(_, count)| count == BATCH_SIZE));
    }

    #[test]
    fn pcg_stream_is_deterministic() {
        let mut a = Pcg32::new(42);
        let mut b = Pcg32::new(42);
        let first: Vec<u32> = (0..8).map(|_| a.next()).collect();
        let second: Vec<u32> = (0..8).map(|_| b.next()).collect();
        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);
    }
}
