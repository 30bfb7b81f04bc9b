// src/module.rs
// Kernel module handle: compiled WGSL packages, named entry points, and the
// named-global symbol table shared by every pipeline stage.
// Global state follows the lifecycle init -> many writes -> teardown; all
// writes go through this one collaborator.
// RELEVANT FILES: src/wavefront/driver.rs, src/svgf.rs, src/scene/layout.rs

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

use bytemuck::Pod;

use crate::arena::{BufferHandle, MemoryArena, TextureHandle};
use crate::error::{RenderError, RenderResult};

/// Per-dispatch argument ring: slot granularity matches the minimum uniform
/// buffer offset alignment so each dispatch binds its own region via a
/// dynamic offset.
const ARGS_SLOT: u32 = 256;
const ARGS_SLOTS: u32 = 1024;

/// A named device resource registered in the module's global symbol table.
pub enum GlobalResource {
    Buffer(BufferHandle),
    Texture(TextureHandle),
    TextureArray(Vec<TextureHandle>),
}

/// A resolved compute entry point with its launch geometry.
pub struct Kernel {
    pub name: &'static str,
    pipeline: wgpu::ComputePipeline,
    pub block_dim: (u32, u32),
    grid_dim: (u32, u32),
}

impl Kernel {
    /// Grid dimensions in workgroups, set once per resize (image-space
    /// kernels) or once per session (queue kernels).
    pub fn set_grid_dim(&mut self, x: u32, y: u32) {
        self.grid_dim = (x.max(1), y.max(1));
    }

    pub fn grid_dim(&self) -> (u32, u32) {
        self.grid_dim
    }
}

pub struct KernelModule {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    shaders: HashMap<&'static str, wgpu::ShaderModule>,
    globals: HashMap<&'static str, GlobalResource>,
    args_buffer: wgpu::Buffer,
    args_layout: wgpu::BindGroupLayout,
    args_group: wgpu::BindGroup,
    args_cursor: u32,
    pub sampler_wrap_linear: wgpu::Sampler,
    pub sampler_point_clamp: wgpu::Sampler,
}

impl KernelModule {
    /// Load the compiled kernel package. WGSL has no preprocessor, so shader
    /// families are assembled from shared snippets before compilation.
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> RenderResult<Self> {
        let common = include_str!("shaders/common.wgsl");
        let sampling = include_str!("shaders/sampling.wgsl");
        let traversal = include_str!("shaders/traversal.wgsl");

        let mut shaders = HashMap::new();
        let mut compile = |name: &'static str, source: String| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            shaders.insert(name, module);
        };

        // One module per stage family; binding tables are family-specific
        compile(
            "generate",
            [common, sampling, include_str!("shaders/pt_generate.wgsl")].join("\n"),
        );
        compile(
            "primary",
            [common, include_str!("shaders/pt_primary.wgsl")].join("\n"),
        );
        compile(
            "trace",
            [common, traversal, include_str!("shaders/pt_trace.wgsl")].join("\n"),
        );
        compile(
            "sort",
            [common, sampling, include_str!("shaders/pt_sort.wgsl")].join("\n"),
        );
        compile(
            "shade",
            [common, sampling, include_str!("shaders/pt_shade.wgsl")].join("\n"),
        );
        compile(
            "shadow",
            [common, traversal, include_str!("shaders/pt_shadow.wgsl")].join("\n"),
        );
        compile(
            "svgf_temporal",
            [common, include_str!("shaders/svgf_temporal.wgsl")].join("\n"),
        );
        compile(
            "svgf_filter",
            [common, include_str!("shaders/svgf_filter.wgsl")].join("\n"),
        );
        compile(
            "svgf_finalize",
            [common, include_str!("shaders/svgf_finalize.wgsl")].join("\n"),
        );
        compile(
            "taa",
            [common, include_str!("shaders/taa.wgsl")].join("\n"),
        );
        compile(
            "taa_finalize",
            [common, include_str!("shaders/taa_finalize.wgsl")].join("\n"),
        );
        compile(
            "accumulate",
            [common, include_str!("shaders/accumulate.wgsl")].join("\n"),
        );
        compile("gbuffer", include_str!("shaders/gbuffer.wgsl").to_string());
        compile("blit", include_str!("shaders/blit.wgsl").to_string());

        let args_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kernel-args-ring"),
            size: (ARGS_SLOT * ARGS_SLOTS) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let args_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel-args-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(ARGS_SLOT as u64),
                },
                count: None,
            }],
        });

        let args_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel-args-group"),
            layout: &args_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &args_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(ARGS_SLOT as u64),
                }),
            }],
        });

        let sampler_wrap_linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sampler-wrap-linear"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let sampler_point_clamp = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sampler-point-clamp"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            shaders,
            globals: HashMap::new(),
            args_buffer,
            args_layout,
            args_group,
            args_cursor: 0,
            sampler_wrap_linear,
            sampler_point_clamp,
        })
    }

    pub fn shader(&self, name: &str) -> &wgpu::ShaderModule {
        self.shaders.get(name).expect("unknown shader family")
    }

    /// Resolve a named entry point into a kernel. Group 0 is always the
    /// argument ring; the caller supplies the remaining group layouts.
    pub fn create_kernel(
        &self,
        name: &'static str,
        shader: &str,
        block_dim: (u32, u32),
        group_layouts: &[&wgpu::BindGroupLayout],
    ) -> Kernel {
        let mut layouts: Vec<&wgpu::BindGroupLayout> = vec![&self.args_layout];
        layouts.extend_from_slice(group_layouts);

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(name),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(name),
                layout: Some(&pipeline_layout),
                module: self.shader(shader),
                entry_point: name,
            });

        Kernel {
            name,
            pipeline,
            block_dim,
            grid_dim: (1, 1),
        }
    }

    /// Register or replace a named global. Bind groups referencing the old
    /// resource must be recreated by their owners (done on resize).
    pub fn set_global(&mut self, name: &'static str, resource: GlobalResource) {
        self.globals.insert(name, resource);
    }

    pub fn remove_global(&mut self, name: &str) {
        self.globals.remove(name);
    }

    pub fn global_buffer(&self, name: &str) -> BufferHandle {
        match self.globals.get(name) {
            Some(GlobalResource::Buffer(h)) => *h,
            _ => panic!("global '{name}' is not a registered buffer"),
        }
    }

    pub fn global_texture(&self, name: &str) -> TextureHandle {
        match self.globals.get(name) {
            Some(GlobalResource::Texture(h)) => *h,
            _ => panic!("global '{name}' is not a registered texture"),
        }
    }

    pub fn global_texture_array(&self, name: &str) -> &[TextureHandle] {
        match self.globals.get(name) {
            Some(GlobalResource::TextureArray(v)) => v,
            _ => panic!("global '{name}' is not a registered texture array"),
        }
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    /// Write a Pod value into the buffer registered under `name`.
    pub fn write_global<T: Pod>(&self, arena: &MemoryArena, name: &str, value: &T) {
        let handle = self.global_buffer(name);
        self.queue
            .write_buffer(arena.buffer(handle), 0, bytemuck::bytes_of(value));
    }

    /// Reset the argument ring. Called once per frame before any dispatch.
    pub fn begin_frame(&mut self) {
        self.args_cursor = 0;
    }

    /// Stage a typed argument struct for the next dispatch; returns the
    /// dynamic offset of its slot.
    pub fn push_args<T: Pod>(&mut self, args: &T) -> RenderResult<u32> {
        let bytes = bytemuck::bytes_of(args);
        if bytes.len() > ARGS_SLOT as usize {
            return Err(RenderError::launch(format!(
                "kernel args of {} bytes exceed the {ARGS_SLOT} byte slot",
                bytes.len()
            )));
        }
        if self.args_cursor >= ARGS_SLOTS {
            return Err(RenderError::launch(
                "argument ring exhausted; too many dispatches this frame",
            ));
        }
        let offset = self.args_cursor * ARGS_SLOT;
        self.queue.write_buffer(&self.args_buffer, offset as u64, bytes);
        self.args_cursor += 1;
        Ok(offset)
    }

    /// Enqueue one kernel launch. Dispatches are totally ordered by encoder
    /// submission order; the device stream provides inter-kernel fencing.
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        kernel: &Kernel,
        args_offset: u32,
        bind_groups: &[&wgpu::BindGroup],
    ) {
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.name),
            timestamp_writes: None,
        });
        cpass.set_pipeline(&kernel.pipeline);
        cpass.set_bind_group(0, &self.args_group, &[args_offset]);
        for (i, group) in bind_groups.iter().enumerate() {
            cpass.set_bind_group(i as u32 + 1, *group, &[]);
        }
        let (gx, gy) = kernel.grid_dim();
        cpass.dispatch_workgroups(gx, gy, 1);
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

// Bind group layout entry helpers. Stage ABIs declare their layouts with
// these instead of longhand descriptor literals.

pub fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub fn sint_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Sint,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub fn texture_array_entry(binding: u32, count: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: NonZeroU32::new(count),
    }
}

pub fn sampler_entry(binding: u32, filtering: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Sampler(if filtering {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        }),
        count: None,
    }
}

pub fn storage_texture_entry(
    binding: u32,
    format: wgpu::TextureFormat,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}
