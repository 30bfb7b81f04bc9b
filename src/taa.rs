// src/taa.rs
// Temporal anti-aliasing driver: motion-compensated history blend over the
// finalized frame, then the copy that feeds both the presentation surface
// and next frame's history.

use wgpu::{BindGroup, BindGroupLayout};

use crate::arena::MemoryArena;
use crate::error::RenderResult;
use crate::module::{storage_entry, uniform_entry, Kernel, KernelModule};
use crate::timing::{EventId, EventRecorder};
use crate::wavefront::pipeline::gbuffer_bind_group_layout;
use crate::wavefront::IMAGE_BLOCK;

pub struct TaaDriver {
    pub taa: Kernel,
    pub taa_finalize: Kernel,

    taa_layout: BindGroupLayout,
    finalize_layout: BindGroupLayout,
    gbuffer_layout: BindGroupLayout,

    taa_group: Option<BindGroup>,
    finalize_group: Option<BindGroup>,
    gbuffer_group: Option<BindGroup>,

    event_taa: EventId,
}

impl TaaDriver {
    pub fn new(module: &KernelModule, recorder: &mut EventRecorder) -> Self {
        let device = module.device();

        let taa_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("taa-layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
            ],
        });

        let finalize_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("taa-finalize-layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, true),
            ],
        });

        let gbuffer_layout = gbuffer_bind_group_layout(device);

        let taa = module.create_kernel(
            "taa",
            "taa",
            IMAGE_BLOCK,
            &[&taa_layout, &gbuffer_layout],
        );
        let taa_finalize =
            module.create_kernel("taa_finalize", "taa_finalize", IMAGE_BLOCK, &[&finalize_layout]);

        let event_taa = recorder.register("Post", "TAA");

        Self {
            taa,
            taa_finalize,
            taa_layout,
            finalize_layout,
            gbuffer_layout,
            taa_group: None,
            finalize_group: None,
            gbuffer_group: None,
            event_taa,
        }
    }

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

        self.taa_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("taa-group"),
            layout: &self.taa_layout,
            entries: &[
                buf("render_globals", 0),
                buf("accumulator", 1),
                buf("taa_frame_prev", 2),
                buf("taa_frame_curr", 3),
            ],
        }));

        self.finalize_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("taa-finalize-group"),
            layout: &self.finalize_layout,
            entries: &[
                buf("render_globals", 0),
                buf("accumulator", 1),
                buf("taa_frame_prev", 2),
                buf("taa_frame_curr", 3),
            ],
        }));

        self.gbuffer_group = Some(gbuffer.create_bind_group(device, arena, &self.gbuffer_layout));

        Ok(())
    }

    pub fn set_grid_dims(&mut self, pitch: u32, height: u32) {
        let gx = pitch / IMAGE_BLOCK.0;
        let gy = (height + IMAGE_BLOCK.1 - 1) / IMAGE_BLOCK.1;
        self.taa.set_grid_dim(gx, gy);
        self.taa_finalize.set_grid_dim(gx, gy);
    }

    /// Blend the finalized frame against history, then publish the blended
    /// frame to the surface and to `taa_frame_prev`.
    pub fn run(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        module: &mut KernelModule,
        recorder: &mut EventRecorder,
    ) -> RenderResult<()> {
        let taa_group = self.taa_group.as_ref().expect("groups not built");
        let finalize_group = self.finalize_group.as_ref().expect("groups not built");
        let gbuffer = self.gbuffer_group.as_ref().expect("groups not built");

        recorder.record(self.event_taa, encoder);
        let args = module.push_args(&0u32)?;
        module.dispatch(encoder, &self.taa, args, &[taa_group, gbuffer]);

        let args = module.push_args(&0u32)?;
        module.dispatch(encoder, &self.taa_finalize, args, &[finalize_group]);

        Ok(())
    }
}
