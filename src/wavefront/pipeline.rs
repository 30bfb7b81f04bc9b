// src/wavefront/pipeline.rs
// Stage ABI of the bounce loop: bind group layouts, resolved kernels and
// the bind groups wiring named globals into each stage.
// Scene and queue groups are built once after scene layout; image-space
// groups are rebuilt on every resize.

use wgpu::{BindGroup, BindGroupLayout};

use crate::arena::MemoryArena;
use crate::error::RenderResult;
use crate::gbuffer::GBuffer;
use crate::module::{
    sampler_entry, sint_texture_entry, storage_entry, texture_array_entry, texture_entry,
    uniform_entry, Kernel, KernelModule,
};
use crate::scene::textures::MAX_TEXTURES;
use crate::wavefront::{TRACE_GRID, WAVEFRONT_BLOCK};

pub struct WavefrontKernels {
    pub generate: Kernel,
    pub primary: Kernel,
    pub trace: Kernel,
    pub sort: Kernel,
    pub shade_diffuse: Kernel,
    pub shade_dielectric: Kernel,
    pub shade_glossy: Kernel,
    pub shadow_trace: Kernel,
    pub accumulate: Kernel,

    gen_queues_layout: BindGroupLayout,
    sort_queues_layout: BindGroupLayout,
    shade_queues_layout: BindGroupLayout,
    shadow_queues_layout: BindGroupLayout,
    trace_scene_layout: BindGroupLayout,
    sort_scene_layout: BindGroupLayout,
    primary_scene_layout: BindGroupLayout,
    shade_scene_layout: BindGroupLayout,
    frame_write_layout: BindGroupLayout,
    accum_layout: BindGroupLayout,
    gbuffer_layout: BindGroupLayout,

    // Session-static bind groups, created after scene layout
    pub gen_queues_group: Option<BindGroup>,
    pub sort_queues_group: Option<BindGroup>,
    pub shade_queues_groups: Option<[BindGroup; 3]>,
    pub shadow_queues_group: Option<BindGroup>,
    pub trace_scene_group: Option<BindGroup>,
    pub sort_scene_group: Option<BindGroup>,
    pub shade_scene_group: Option<BindGroup>,

    // Screen-dependent bind groups, rebuilt on resize
    pub primary_scene_group: Option<BindGroup>,
    pub frame_write_group: Option<BindGroup>,
    pub accum_group: Option<BindGroup>,
    pub gbuffer_group: Option<BindGroup>,
}

impl WavefrontKernels {
    pub fn new(module: &KernelModule) -> Self {
        let device = module.device();

        let gen_queues_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gen-queues-layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, false),
                storage_entry(2, false),
            ],
        });

        let sort_queues_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sort-queues-layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, false),
                storage_entry(2, false),
                storage_entry(3, false),
                storage_entry(4, false),
                storage_entry(5, false),
            ],
        });

        let shade_queues_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("shade-queues-layout"),
                entries: &[
                    uniform_entry(0),
                    storage_entry(1, false),
                    storage_entry(2, false),
                    storage_entry(3, false),
                    storage_entry(4, false),
                ],
            });

        let shadow_queues_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("shadow-queues-layout"),
                entries: &[
                    uniform_entry(0),
                    storage_entry(1, false),
                    storage_entry(2, false),
                ],
            });

        let trace_scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trace-scene-layout"),
            entries: &[storage_entry(0, true), storage_entry(1, true)],
        });

        let sort_scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sort-scene-layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
            ],
        });

        let primary_scene_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("primary-scene-layout"),
                entries: &[
                    storage_entry(0, true),
                    storage_entry(1, true),
                    storage_entry(2, true),
                    storage_entry(3, false),
                ],
            });

        let shade_scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shade-scene-layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, true),
                storage_entry(6, true),
                storage_entry(7, true),
                texture_array_entry(8, MAX_TEXTURES as u32),
                sampler_entry(9, true),
            ],
        });

        let frame_write_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame-write-layout"),
            entries: &[
                storage_entry(0, false),
                storage_entry(1, false),
                storage_entry(2, false),
            ],
        });

        let accum_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("accum-layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, true),
                storage_entry(4, false),
            ],
        });

        let gbuffer_layout = gbuffer_bind_group_layout(device);

        let generate = module.create_kernel(
            "generate",
            "generate",
            WAVEFRONT_BLOCK,
            &[&gen_queues_layout],
        );
        let primary = module.create_kernel(
            "primary",
            "primary",
            WAVEFRONT_BLOCK,
            &[&sort_queues_layout, &primary_scene_layout, &gbuffer_layout],
        );
        let mut trace = module.create_kernel(
            "trace",
            "trace",
            crate::wavefront::TRACE_BLOCK,
            &[&gen_queues_layout, &trace_scene_layout],
        );
        let sort = module.create_kernel(
            "sort",
            "sort",
            WAVEFRONT_BLOCK,
            &[&sort_queues_layout, &sort_scene_layout, &frame_write_layout],
        );
        let shade_diffuse = module.create_kernel(
            "shade_diffuse",
            "shade",
            WAVEFRONT_BLOCK,
            &[&shade_queues_layout, &shade_scene_layout, &frame_write_layout],
        );
        let shade_dielectric = module.create_kernel(
            "shade_dielectric",
            "shade",
            WAVEFRONT_BLOCK,
            &[&shade_queues_layout, &shade_scene_layout, &frame_write_layout],
        );
        let shade_glossy = module.create_kernel(
            "shade_glossy",
            "shade",
            WAVEFRONT_BLOCK,
            &[&shade_queues_layout, &shade_scene_layout, &frame_write_layout],
        );
        let mut shadow_trace = module.create_kernel(
            "shadow_trace",
            "shadow",
            crate::wavefront::TRACE_BLOCK,
            &[&shadow_queues_layout, &trace_scene_layout, &frame_write_layout],
        );
        let accumulate = module.create_kernel(
            "accumulate",
            "accumulate",
            crate::wavefront::IMAGE_BLOCK,
            &[&accum_layout],
        );

        // Persistent-thread stages run a fixed grid and pull work through
        // the retired-ray counters
        trace.set_grid_dim(TRACE_GRID.0, TRACE_GRID.1);
        shadow_trace.set_grid_dim(TRACE_GRID.0, TRACE_GRID.1);

        Self {
            generate,
            primary,
            trace,
            sort,
            shade_diffuse,
            shade_dielectric,
            shade_glossy,
            shadow_trace,
            accumulate,
            gen_queues_layout,
            sort_queues_layout,
            shade_queues_layout,
            shadow_queues_layout,
            trace_scene_layout,
            sort_scene_layout,
            primary_scene_layout,
            shade_scene_layout,
            frame_write_layout,
            accum_layout,
            gbuffer_layout,
            gen_queues_group: None,
            sort_queues_group: None,
            shade_queues_groups: None,
            shadow_queues_group: None,
            trace_scene_group: None,
            sort_scene_group: None,
            primary_scene_group: None,
            shade_scene_group: None,
            frame_write_group: None,
            accum_group: None,
            gbuffer_group: None,
        }
    }

    pub fn gbuffer_layout(&self) -> &BindGroupLayout {
        &self.gbuffer_layout
    }

    /// Wire the session-static groups after the scene and ray pools have
    /// registered their symbols.
    pub fn create_static_groups(
        &mut self,
        arena: &MemoryArena,
        module: &KernelModule,
        bvh_symbol: &'static str,
    ) -> RenderResult<()> {
        let device = module.device();
        let buf = |name: &str, binding: u32| wgpu::BindGroupEntry {
            binding,
            resource: arena.buffer(module.global_buffer(name)).as_entire_binding(),
        };

        self.gen_queues_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gen-queues-group"),
            layout: &self.gen_queues_layout,
            entries: &[
                buf("render_globals", 0),
                buf("buffer_sizes", 1),
                buf("ray_buffer_trace", 2),
            ],
        }));

        self.sort_queues_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sort-queues-group"),
            layout: &self.sort_queues_layout,
            entries: &[
                buf("render_globals", 0),
                buf("buffer_sizes", 1),
                buf("ray_buffer_trace", 2),
                buf("ray_buffer_shade_diffuse", 3),
                buf("ray_buffer_shade_dielectric", 4),
                buf("ray_buffer_shade_glossy", 5),
            ],
        }));

        let shade_group = |queue_symbol: &str| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("shade-queues-group"),
                layout: &self.shade_queues_layout,
                entries: &[
                    buf("render_globals", 0),
                    buf("buffer_sizes", 1),
                    buf("ray_buffer_trace", 2),
                    buf(queue_symbol, 3),
                    buf("ray_buffer_shadow", 4),
                ],
            })
        };
        self.shade_queues_groups = Some([
            shade_group("ray_buffer_shade_diffuse"),
            shade_group("ray_buffer_shade_dielectric"),
            shade_group("ray_buffer_shade_glossy"),
        ]);

        self.shadow_queues_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-queues-group"),
            layout: &self.shadow_queues_layout,
            entries: &[
                buf("render_globals", 0),
                buf("buffer_sizes", 1),
                buf("ray_buffer_shadow", 2),
            ],
        }));

        self.trace_scene_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trace-scene-group"),
            layout: &self.trace_scene_layout,
            entries: &[buf(bvh_symbol, 0), buf("triangles", 1)],
        }));

        self.sort_scene_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sort-scene-group"),
            layout: &self.sort_scene_layout,
            entries: &[
                buf("triangle_material_ids", 0),
                buf("materials", 1),
                buf("sky_data", 2),
            ],
        }));

        // The texture table pads to the layout's fixed count by repeating
        // the first entry
        let texture_handles = module.global_texture_array("textures");
        let mut views: Vec<&wgpu::TextureView> = texture_handles
            .iter()
            .map(|&h| arena.texture_view(h))
            .collect();
        while views.len() < MAX_TEXTURES {
            views.push(views[0]);
        }

        self.shade_scene_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shade-scene-group"),
            layout: &self.shade_scene_layout,
            entries: &[
                buf("materials", 0),
                buf("triangles", 1),
                buf("triangle_material_ids", 2),
                buf("light_indices", 3),
                buf("light_areas_cumulative", 4),
                buf("sobol_256spp_256d", 5),
                buf("scrambling_tile", 6),
                buf("ranking_tile", 7),
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureViewArray(&views),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::Sampler(&module.sampler_wrap_linear),
                },
            ],
        }));

        Ok(())
    }

    /// Rebuild the screen-dependent groups; called on every resize after the
    /// framebuffer set and GBuffer have been recreated.
    pub fn create_screen_groups(
        &mut self,
        arena: &MemoryArena,
        module: &KernelModule,
        gbuffer: &GBuffer,
    ) -> RenderResult<()> {
        let device = module.device();
        let buf = |name: &str, binding: u32| wgpu::BindGroupEntry {
            binding,
            resource: arena.buffer(module.global_buffer(name)).as_entire_binding(),
        };

        self.frame_write_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame-write-group"),
            layout: &self.frame_write_layout,
            entries: &[
                buf("frame_buffer_albedo", 0),
                buf("frame_buffer_direct", 1),
                buf("frame_buffer_indirect", 2),
            ],
        }));

        // The primary stage reads scene tables but also adds sky and
        // emission into the direct channel, so its group is screen-bound
        self.primary_scene_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("primary-scene-group"),
            layout: &self.primary_scene_layout,
            entries: &[
                buf("triangle_material_ids", 0),
                buf("materials", 1),
                buf("sky_data", 2),
                buf("frame_buffer_direct", 3),
            ],
        }));

        self.accum_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("accum-group"),
            layout: &self.accum_layout,
            entries: &[
                buf("render_globals", 0),
                buf("frame_buffer_albedo", 1),
                buf("frame_buffer_direct", 2),
                buf("frame_buffer_indirect", 3),
                buf("accumulator", 4),
            ],
        }));

        self.gbuffer_group = Some(gbuffer.create_bind_group(device, arena, &self.gbuffer_layout));

        Ok(())
    }
}

/// GBuffer attachments as sampled textures; consumed with `textureLoad`, so
/// no sampler is required.
pub fn gbuffer_bind_group_layout(device: &wgpu::Device) -> BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("gbuffer-layout"),
        entries: &[
            texture_entry(0, false), // normal + depth
            texture_entry(1, false), // uv
            texture_entry(2, false), // uv gradient
            sint_texture_entry(3),   // triangle id
            texture_entry(4, false), // screen position prev
            texture_entry(5, false), // depth gradient
        ],
    })
}
