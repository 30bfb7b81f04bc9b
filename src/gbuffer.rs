// src/gbuffer.rs
// Rasterized primary-hit attachments: normal+depth, uv, uv-gradient,
// triangle-id, previous screen position and depth-gradient, exposed to the
// compute kernels as sampled textures. Optional; the generate kernel covers
// the same ground when rasterization is off.

use bytemuck::{Pod, Zeroable};

use crate::arena::{Lifetime, MemoryArena, TextureHandle};
use crate::camera::Camera;
use crate::error::RenderResult;
use crate::module::{GlobalResource, KernelModule};
use crate::scene::RasterVertex;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GBufferUniforms {
    view_projection: [[f32; 4]; 4],
    view_projection_prev: [[f32; 4]; 4],
    jitter: [f32; 2],
    _pad: [f32; 2],
}

pub struct GBuffer {
    pipeline: wgpu::RenderPipeline,
    uniforms: wgpu::Buffer,
    uniforms_group: wgpu::BindGroup,
    pub normal_and_depth: Option<TextureHandle>,
    pub uv: Option<TextureHandle>,
    pub uv_gradient: Option<TextureHandle>,
    pub triangle_id: Option<TextureHandle>,
    pub screen_position_prev: Option<TextureHandle>,
    pub depth_gradient: Option<TextureHandle>,
    depth: Option<TextureHandle>,
}

const COLOR_FORMATS: [wgpu::TextureFormat; 6] = [
    wgpu::TextureFormat::Rgba32Float, // normal.xyz + linear depth
    wgpu::TextureFormat::Rg32Float,   // barycentric uv
    wgpu::TextureFormat::Rgba32Float, // uv gradient
    wgpu::TextureFormat::R32Sint,     // device triangle id
    wgpu::TextureFormat::Rg32Float,   // previous screen position
    wgpu::TextureFormat::Rg32Float,   // depth gradient
];

impl GBuffer {
    pub fn new(module: &KernelModule) -> Self {
        let device = module.device();

        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gbuffer-uniforms"),
            size: std::mem::size_of::<GBufferUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniforms_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gbuffer-uniforms-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniforms_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer-uniforms-group"),
            layout: &uniforms_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gbuffer-pipeline-layout"),
            bind_group_layouts: &[&uniforms_layout],
            push_constant_ranges: &[],
        });

        let targets: Vec<Option<wgpu::ColorTargetState>> = COLOR_FORMATS
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let shader = module.shader("gbuffer");
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gbuffer-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<RasterVertex>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 12,
                            shader_location: 1,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x2,
                            offset: 24,
                            shader_location: 2,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Sint32,
                            offset: 32,
                            shader_location: 3,
                        },
                    ],
                }],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: "fs_main",
                targets: &targets,
            }),
            multiview: None,
        });

        Self {
            pipeline,
            uniforms,
            uniforms_group,
            normal_and_depth: None,
            uv: None,
            uv_gradient: None,
            triangle_id: None,
            screen_position_prev: None,
            depth_gradient: None,
            depth: None,
        }
    }

    /// Recreate the attachments for a new screen size and re-register their
    /// sampled-texture symbols.
    pub fn resize(
        &mut self,
        arena: &mut MemoryArena,
        module: &mut KernelModule,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let mut tex = |label: &'static str, format: wgpu::TextureFormat| {
            let handle = arena.alloc_texture_2d(label, width, height, format, usage, Lifetime::Screen)?;
            module.set_global(label, GlobalResource::Texture(handle));
            Ok::<_, crate::error::RenderError>(handle)
        };

        self.normal_and_depth = Some(tex("gbuffer_normal_and_depth", COLOR_FORMATS[0])?);
        self.uv = Some(tex("gbuffer_uv", COLOR_FORMATS[1])?);
        self.uv_gradient = Some(tex("gbuffer_uv_gradient", COLOR_FORMATS[2])?);
        self.triangle_id = Some(tex("gbuffer_triangle_id", COLOR_FORMATS[3])?);
        self.screen_position_prev = Some(tex("gbuffer_screen_position_prev", COLOR_FORMATS[4])?);
        self.depth_gradient = Some(tex("gbuffer_depth_gradient", COLOR_FORMATS[5])?);
        self.depth = Some(arena.alloc_texture_2d(
            "gbuffer_depth",
            width,
            height,
            wgpu::TextureFormat::Depth32Float,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
            Lifetime::Screen,
        )?);
        Ok(())
    }

    /// Sampled-texture bind group for the compute stages.
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        arena: &MemoryArena,
        layout: &wgpu::BindGroupLayout,
    ) -> wgpu::BindGroup {
        let view = |handle: &Option<TextureHandle>| {
            arena.texture_view(handle.expect("gbuffer not resized"))
        };
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gbuffer-group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view(&self.normal_and_depth)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view(&self.uv)),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(view(&self.uv_gradient)),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(view(&self.triangle_id)),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(view(&self.screen_position_prev)),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::TextureView(view(&self.depth_gradient)),
                },
            ],
        })
    }

    /// Rasterize the scene into the attachments. The encoder's submission
    /// makes the result visible to the compute kernels that follow it.
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        arena: &MemoryArena,
        camera: &Camera,
        vertex_buffer: &wgpu::Buffer,
        vertex_count: u32,
    ) {
        let uniforms = GBufferUniforms {
            view_projection: camera.view_projection.to_cols_array_2d(),
            view_projection_prev: camera.view_projection_prev.to_cols_array_2d(),
            jitter: camera.jitter.into(),
            _pad: [0.0; 2],
        };
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));

        let view = |handle: &Option<TextureHandle>| {
            arena.texture_view(handle.expect("gbuffer not resized"))
        };
        fn clear(view: &wgpu::TextureView) -> Option<wgpu::RenderPassColorAttachment<'_>> {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })
        }

        let color_attachments = [
            clear(view(&self.normal_and_depth)),
            clear(view(&self.uv)),
            clear(view(&self.uv_gradient)),
            Some(wgpu::RenderPassColorAttachment {
                view: view(&self.triangle_id),
                resolve_target: None,
                ops: wgpu::Operations {
                    // id -1 marks "no hit" texels
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: -1.0,
                        g: 0.0,
                        b: 0.0,
                        a: 0.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            }),
            clear(view(&self.screen_position_prev)),
            clear(view(&self.depth_gradient)),
        ];

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("gbuffer-pass"),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: view(&self.depth),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.uniforms_group, &[]);
        rpass.set_vertex_buffer(0, vertex_buffer.slice(..));
        rpass.draw(0..vertex_count, 0..1);
    }
}
