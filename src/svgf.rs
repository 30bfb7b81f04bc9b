// src/svgf.rs
// SVGF denoiser driver: temporal reprojection, optional spatial variance
// estimation, iterated A-Trous filtering over the direct/indirect channels
// with ping-pong buffers, then the albedo-modulated finalize.
// The ping-pong schedule is planned as data first; the driver records which
// buffer holds the final result instead of assuming iteration parity.

use bytemuck::{Pod, Zeroable};
use wgpu::{BindGroup, BindGroupLayout};

use crate::arena::MemoryArena;
use crate::error::RenderResult;
use crate::module::{storage_entry, uniform_entry, Kernel, KernelModule};
use crate::timing::{EventId, EventRecorder};
use crate::wavefront::pipeline::gbuffer_bind_group_layout;
use crate::wavefront::{Settings, IMAGE_BLOCK};

/// Upper bound on A-Trous iterations; sizes the per-iteration event table.
pub const MAX_ATROUS_ITERATIONS: usize = 10;

/// One A-Trous dispatch: which ping-pong orientation to bind, the dilation
/// step, and whether this iteration's output seeds next frame's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtrousStep {
    /// 0 binds (direct, indirect) as input, 1 binds the alt pair.
    pub group: usize,
    pub step_size: i32,
    pub feeds_history: bool,
}

/// The frame's denoising schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgfPlan {
    /// Ping-pong orientation for the variance estimate, when enabled.
    pub variance_group: Option<usize>,
    pub steps: Vec<AtrousStep>,
    /// Orientation whose "out" half holds the filtered result for finalize.
    pub finalize_group: usize,
    /// True when the final result lives in the alt pair.
    pub final_output_alt: bool,
}

/// Walk the ping-pong discipline: `in = (direct, indirect)`,
/// `out = (alt, alt)`; variance consumes in and produces out, a disabled
/// variance stage swaps instead; every iteration swaps before dispatch.
pub fn svgf_plan(spatial_variance: bool, iterations: usize) -> SvgfPlan {
    let mut input = 0usize;
    let mut output = 1usize;

    let variance_group = if spatial_variance {
        Some(input)
    } else {
        std::mem::swap(&mut input, &mut output);
        None
    };

    let mut steps = Vec::with_capacity(iterations);
    for i in 0..iterations {
        std::mem::swap(&mut input, &mut output);
        steps.push(AtrousStep {
            group: input,
            step_size: 1 << i,
            feeds_history: i == 0,
        });
    }

    SvgfPlan {
        variance_group,
        steps,
        finalize_group: input,
        final_output_alt: output == 1,
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct TemporalArgs {
    /// Nonzero when no A-Trous iteration will run, telling the kernel to
    /// seed history itself.
    seeds_history: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct AtrousArgs {
    step_size: i32,
    feed_history: u32,
    _pad: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FinalizeArgs {
    enable_albedo: u32,
    _pad: [u32; 3],
}

pub struct SvgfDriver {
    pub temporal: Kernel,
    pub variance: Kernel,
    pub atrous: Kernel,
    pub finalize: Kernel,

    temporal_frame_layout: BindGroupLayout,
    params_layout: BindGroupLayout,
    finalize_layout: BindGroupLayout,
    pingpong_layout: BindGroupLayout,
    history_layout: BindGroupLayout,
    gbuffer_layout: BindGroupLayout,

    temporal_frame_group: Option<BindGroup>,
    params_group: Option<BindGroup>,
    finalize_group: Option<BindGroup>,
    history_group: Option<BindGroup>,
    gbuffer_group: Option<BindGroup>,
    pingpong_groups: Option<[BindGroup; 2]>,

    event_temporal: EventId,
    event_variance: EventId,
    event_atrous: [EventId; MAX_ATROUS_ITERATIONS],
    event_finalize: EventId,
}

impl SvgfDriver {
    pub fn new(module: &KernelModule, recorder: &mut EventRecorder) -> Self {
        let device = module.device();

        let temporal_frame_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("svgf-temporal-frame-layout"),
                entries: &[
                    uniform_entry(0),
                    uniform_entry(1),
                    storage_entry(2, false),
                    storage_entry(3, false),
                    storage_entry(4, false),
                ],
            });

        let params_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("svgf-params-layout"),
            entries: &[
                uniform_entry(0),
                uniform_entry(1),
                storage_entry(2, true),
            ],
        });

        let finalize_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("svgf-finalize-layout"),
            entries: &[
                uniform_entry(0),
                uniform_entry(1),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        });

        let pingpong_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("svgf-pingpong-layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, false),
            ],
        });

        let history_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("svgf-history-layout"),
            entries: &[
                storage_entry(0, false),
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });

        let gbuffer_layout = gbuffer_bind_group_layout(device);

        let temporal = module.create_kernel(
            "svgf_temporal",
            "svgf_temporal",
            IMAGE_BLOCK,
            &[&temporal_frame_layout, &history_layout, &gbuffer_layout],
        );
        let variance = module.create_kernel(
            "svgf_variance",
            "svgf_filter",
            IMAGE_BLOCK,
            &[&params_layout, &pingpong_layout, &history_layout],
        );
        let atrous = module.create_kernel(
            "svgf_atrous",
            "svgf_filter",
            IMAGE_BLOCK,
            &[&params_layout, &pingpong_layout, &history_layout],
        );
        let finalize = module.create_kernel(
            "svgf_finalize",
            "svgf_finalize",
            IMAGE_BLOCK,
            &[&finalize_layout, &pingpong_layout],
        );

        let event_temporal = recorder.register("SVGF", "Temporal");
        let event_variance = recorder.register("SVGF", "Variance");
        let event_atrous =
            std::array::from_fn(|i| recorder.register("SVGF", &format!("A Trous {i}")));
        let event_finalize = recorder.register("SVGF", "Finalize");

        Self {
            temporal,
            variance,
            atrous,
            finalize,
            temporal_frame_layout,
            params_layout,
            finalize_layout,
            pingpong_layout,
            history_layout,
            gbuffer_layout,
            temporal_frame_group: None,
            params_group: None,
            finalize_group: None,
            history_group: None,
            gbuffer_group: None,
            pingpong_groups: None,
            event_temporal,
            event_variance,
            event_atrous,
            event_finalize,
        }
    }

    /// Rebuild every bind group after resize; the GBuffer and framebuffer
    /// symbols all point at fresh allocations.
    pub fn create_screen_groups(
        &mut self,
        arena: &MemoryArena,
        module: &KernelModule,
        gbuffer: &crate::gbuffer::GBuffer,
    ) -> RenderResult<()> {
        let device = module.device();
        let buf = |name: &str, binding: u32| wgpu::BindGroupEntry {
            binding,
            resource: arena.buffer(module.global_buffer(name)).as_entire_binding(),
        };

        self.temporal_frame_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("svgf-temporal-frame-group"),
            layout: &self.temporal_frame_layout,
            entries: &[
                buf("render_globals", 0),
                buf("svgf_settings", 1),
                buf("frame_buffer_direct", 2),
                buf("frame_buffer_indirect", 3),
                buf("frame_buffer_moment", 4),
            ],
        }));

        self.params_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("svgf-params-group"),
            layout: &self.params_layout,
            entries: &[
                buf("render_globals", 0),
                buf("svgf_settings", 1),
                buf("frame_buffer_moment", 2),
            ],
        }));

        self.finalize_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("svgf-finalize-group"),
            layout: &self.finalize_layout,
            entries: &[
                buf("render_globals", 0),
                buf("svgf_settings", 1),
                buf("frame_buffer_albedo", 2),
                buf("accumulator", 3),
            ],
        }));

        self.history_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("svgf-history-group"),
            layout: &self.history_layout,
            entries: &[
                buf("history_length", 0),
                buf("history_direct", 1),
                buf("history_indirect", 2),
                buf("history_moment", 3),
                buf("history_normal_and_depth", 4),
                buf("history_triangle_id", 5),
            ],
        }));

        self.gbuffer_group = Some(gbuffer.create_bind_group(device, arena, &self.gbuffer_layout));

        // Orientation 0 reads the primary pair, orientation 1 the alt pair
        let pingpong = |label: &'static str, input: [&'static str; 2], output: [&'static str; 2]| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.pingpong_layout,
                entries: &[
                    buf(input[0], 0),
                    buf(input[1], 1),
                    buf(output[0], 2),
                    buf(output[1], 3),
                ],
            })
        };
        self.pingpong_groups = Some([
            pingpong(
                "svgf-pingpong-a",
                ["frame_buffer_direct", "frame_buffer_indirect"],
                ["frame_buffer_direct_alt", "frame_buffer_indirect_alt"],
            ),
            pingpong(
                "svgf-pingpong-b",
                ["frame_buffer_direct_alt", "frame_buffer_indirect_alt"],
                ["frame_buffer_direct", "frame_buffer_indirect"],
            ),
        ]);

        Ok(())
    }

    pub fn set_grid_dims(&mut self, pitch: u32, height: u32) {
        let gx = pitch / IMAGE_BLOCK.0;
        let gy = (height + IMAGE_BLOCK.1 - 1) / IMAGE_BLOCK.1;
        self.temporal.set_grid_dim(gx, gy);
        self.variance.set_grid_dim(gx, gy);
        self.atrous.set_grid_dim(gx, gy);
        self.finalize.set_grid_dim(gx, gy);
    }

    /// Run the denoising chain for one frame.
    pub fn run(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        module: &mut KernelModule,
        recorder: &mut EventRecorder,
        settings: &Settings,
    ) -> RenderResult<()> {
        let iterations = (settings.svgf.atrous_iterations.max(0) as usize)
            .min(MAX_ATROUS_ITERATIONS);
        let plan = svgf_plan(settings.enable_spatial_variance, iterations);

        let temporal_frame = self.temporal_frame_group.as_ref().expect("groups not built");
        let params = self.params_group.as_ref().expect("groups not built");
        let finalize = self.finalize_group.as_ref().expect("groups not built");
        let history = self.history_group.as_ref().expect("groups not built");
        let gbuffer = self.gbuffer_group.as_ref().expect("groups not built");
        let pingpong = self.pingpong_groups.as_ref().expect("groups not built");

        recorder.record(self.event_temporal, encoder);
        let args = module.push_args(&TemporalArgs {
            seeds_history: (plan.steps.is_empty()) as u32,
            _pad: [0; 3],
        })?;
        module.dispatch(
            encoder,
            &self.temporal,
            args,
            &[temporal_frame, history, gbuffer],
        );

        if let Some(group) = plan.variance_group {
            recorder.record(self.event_variance, encoder);
            let args = module.push_args(&0u32)?;
            module.dispatch(
                encoder,
                &self.variance,
                args,
                &[params, &pingpong[group], history],
            );
        }

        for (i, step) in plan.steps.iter().enumerate() {
            recorder.record(self.event_atrous[i], encoder);
            let args = module.push_args(&AtrousArgs {
                step_size: step.step_size,
                feed_history: step.feeds_history as u32,
                _pad: [0; 2],
            })?;
            module.dispatch(
                encoder,
                &self.atrous,
                args,
                &[params, &pingpong[step.group], history],
            );
        }

        recorder.record(self.event_finalize, encoder);
        let args = module.push_args(&FinalizeArgs {
            enable_albedo: settings.enable_albedo as u32,
            _pad: [0; 3],
        })?;
        module.dispatch(
            encoder,
            &self.finalize,
            args,
            &[finalize, &pingpong[plan.finalize_group]],
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variance_enabled_first_iteration_reads_the_alt_pair() {
        let plan = svgf_plan(true, 3);
        assert_eq!(plan.variance_group, Some(0));
        assert_eq!(
            plan.steps,
            vec![
                AtrousStep { group: 1, step_size: 1, feeds_history: true },
                AtrousStep { group: 0, step_size: 2, feeds_history: false },
                AtrousStep { group: 1, step_size: 4, feeds_history: false },
            ]
        );
        // Last write went into the primary-out of orientation 1
        assert_eq!(plan.finalize_group, 1);
        assert!(!plan.final_output_alt);
    }

    #[test]
    fn variance_disabled_swaps_before_filtering() {
        let plan = svgf_plan(false, 1);
        assert_eq!(plan.variance_group, None);
        assert_eq!(
            plan.steps,
            vec![AtrousStep { group: 0, step_size: 1, feeds_history: true }]
        );
        assert!(plan.final_output_alt);
    }

    #[test]
    fn even_iterations_return_to_the_starting_pair() {
        // The driver records the answer rather than assuming parity; this
        // pins the recorded result for even counts
        let plan = svgf_plan(true, 2);
        assert!(plan.final_output_alt);
        let plan = svgf_plan(true, 4);
        assert!(plan.final_output_alt);
        let plan = svgf_plan(true, 0);
        assert!(plan.final_output_alt);
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn step_sizes_are_powers_of_two() {
        let plan = svgf_plan(true, 5);
        let sizes: Vec<i32> = plan.steps.iter().map(|s| s.step_size).collect();
        assert_eq!(sizes, vec![1, 2, 4, 8, 16]);
        // Only the first post-variance iteration seeds history
        assert_eq!(
            plan.steps.iter().filter(|s| s.feeds_history).count(),
            1
        );
        assert!(plan.steps[0].feeds_history);
    }

    #[test]
    fn zero_iterations_without_variance_finalizes_the_primary_pair() {
        let plan = svgf_plan(false, 0);
        assert_eq!(plan.variance_group, None);
        assert!(plan.steps.is_empty());
        // Swap happened: out now points at the primary pair
        assert_eq!(plan.finalize_group, 1);
        assert!(!plan.final_output_alt);
    }
}
