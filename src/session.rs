// src/session.rs
// Session controller: device bring-up, scene layout, per-scene camera
// presets, resize of all screen-dependent state, the per-frame drive and
// the presentation blit.
// RELEVANT FILES: src/wavefront/driver.rs, src/scene/layout.rs, src/gpu.rs

use std::path::{Path, PathBuf};

use glam::{Quat, Vec3};

use crate::accel::{self, BvhType};
use crate::arena::MemoryArena;
use crate::camera::Camera;
use crate::error::{RenderError, RenderResult};
use crate::gbuffer::GBuffer;
use crate::gpu::GpuContext;
use crate::input::Input;
use crate::module::KernelModule;
use crate::scene::bluenoise::BlueNoise;
use crate::scene::sky::Sky;
use crate::scene::{layout, obj};
use crate::timing::EventRecorder;
use crate::wavefront::driver::Pathtracer;
use crate::wavefront::Settings;

/// Node layout the session traverses; the matching traversal lives in the
/// kernel package.
pub const BVH_TYPE: BvhType = BvhType::Binary;

const DEFAULT_FOV: f32 = 110.0 * std::f32::consts::PI / 180.0;

pub struct Session {
    pub gpu: GpuContext,
    surface: wgpu::Surface<'static>,
    surface_format: wgpu::TextureFormat,
    pub arena: MemoryArena,
    pub module: KernelModule,
    pub recorder: EventRecorder,
    pub camera: Camera,
    pub pathtracer: Pathtracer,
    gbuffer: GBuffer,
    blit: BlitPass,
    width: u32,
    height: u32,
}

impl Session {
    /// Bring up the device, lay out the scene and create the pipeline
    /// drivers. Fatal failures propagate; the binary reports and exits.
    pub fn init(
        scene_path: &Path,
        sky_path: &Path,
        target: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let (gpu, surface) = GpuContext::for_surface(target)?;

        let mut arena = MemoryArena::new(gpu.device.clone(), gpu.queue.clone());
        let mut module = KernelModule::new(gpu.device.clone(), gpu.queue.clone())?;
        let mut recorder =
            EventRecorder::new(gpu.device.clone(), gpu.queue.clone(), gpu.timestamps);

        let mut camera = Camera::new(DEFAULT_FOV);
        let (position, rotation) = camera_preset(&scene_path.to_string_lossy());
        camera.position = position;
        camera.rotation = rotation;

        let scene = obj::load_scene(scene_path)?;

        let bvh = match accel::cache::load(scene_path, scene.triangles.len() as u32) {
            Some(bvh) => bvh,
            None => {
                let bvh = accel::build_bvh(&scene.triangles);
                accel::cache::store(scene_path, &bvh);
                bvh
            }
        }
        .with_type(BVH_TYPE);

        let sky = Sky::load_or_fallback(sky_path);
        let noise = BlueNoise::load_or_fallback(&PathBuf::from("data/bluenoise.bin"));

        let mut pathtracer = Pathtracer::new(&mut arena, &mut module, &mut recorder)?;

        let scene_layout =
            layout::upload_scene(&scene, &bvh, &sky, &noise, &mut arena, &mut module)?;
        pathtracer.set_scene(&scene_layout, BVH_TYPE.node_symbol(), &arena, &module)?;

        let gbuffer = GBuffer::new(&module);

        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);
        let blit = BlitPass::new(&module, surface_format);

        let mut session = Self {
            gpu,
            surface,
            surface_format,
            arena,
            module,
            recorder,
            camera,
            pathtracer,
            gbuffer,
            blit,
            width: 0,
            height: 0,
        };
        session.resize(width, height)?;

        let bytes = session.arena.bytes_allocated();
        log::info!(
            "device memory allocated: {} KB ({} MB)",
            bytes >> 10,
            bytes >> 20
        );

        Ok(session)
    }

    /// Destroy and recreate every screen-dependent buffer and registration.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        let width = width.max(1);
        let height = height.max(1);
        self.width = width;
        self.height = height;

        self.surface.configure(
            &self.gpu.device,
            &wgpu::SurfaceConfiguration {
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                format: self.surface_format,
                width,
                height,
                present_mode: wgpu::PresentMode::Fifo,
                desired_maximum_frame_latency: 2,
                alpha_mode: wgpu::CompositeAlphaMode::Auto,
                view_formats: vec![],
            },
        );

        self.arena.free_screen();
        self.gbuffer
            .resize(&mut self.arena, &mut self.module, width, height)?;
        self.pathtracer.resize(
            width,
            height,
            &mut self.arena,
            &mut self.module,
            &self.gbuffer,
        )?;
        self.blit.create_screen_group(&self.arena, &self.module);

        self.camera.resize(width, height);
        Ok(())
    }

    /// Camera tick and history bookkeeping.
    pub fn update(&mut self, delta: f32, input: &Input) {
        let jitter = self.pathtracer.settings.enable_taa;
        self.camera.update(delta, jitter, input);
        self.pathtracer
            .update(self.camera.moved, &self.arena, &self.module);
    }

    pub fn settings(&self) -> Settings {
        self.pathtracer.settings
    }

    pub fn set_settings(&mut self, settings: Settings) {
        self.pathtracer.set_settings(settings);
    }

    /// Render one frame and present it.
    pub fn render(&mut self) -> RenderResult<()> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost) | Err(wgpu::SurfaceError::Outdated) => {
                self.resize(self.width, self.height)?;
                self.surface
                    .get_current_texture()
                    .map_err(|e| RenderError::launch(format!("surface unavailable: {e}")))?
            }
            Err(e) => return Err(RenderError::launch(format!("surface error: {e}"))),
        };

        let mut encoder =
            self.gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame"),
                });

        self.pathtracer.render(
            &mut encoder,
            &self.arena,
            &mut self.module,
            &mut self.recorder,
            &self.camera,
            &self.gbuffer,
        )?;

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.blit.run(&mut encoder, &view);

        self.gpu.queue.submit(Some(encoder.finish()));
        frame.present();

        self.recorder.try_collect();
        Ok(())
    }
}

/// Initial camera pose by scene filename substring.
pub fn camera_preset(scene_name: &str) -> (Vec3, Quat) {
    let name = scene_name.to_lowercase();
    let preset = |p: [f32; 3], r: [f32; 4]| {
        (
            Vec3::from(p),
            Quat::from_xyzw(r[0], r[1], r[2], r[3]),
        )
    };

    if name.contains("pica.obj") {
        preset(
            [-7.640668, 16.404673, 17.845022],
            [-0.256006, -0.069205, -0.018378, 0.964019],
        )
    } else if name.contains("sponza.obj") {
        preset(
            [116.927467, 15.586369, -2.997146],
            [0.000000, 0.692966, 0.000000, 0.720969],
        )
    } else if name.contains("scene.obj") {
        preset(
            [-0.126737, 0.613379, 3.716630],
            [-0.107255, -0.002421, 0.000262, -0.994227],
        )
    } else if name.contains("cornellbox.obj") {
        preset(
            [0.528027, 1.004323, -0.774033],
            [0.035059, -0.963870, 0.208413, 0.162142],
        )
    } else if name.contains("glossy.obj") {
        preset(
            [-5.438800, 5.910520, -7.185338],
            [0.242396, 0.716713, 0.298666, -0.581683],
        )
    } else if name.contains("bunny.obj") {
        preset(
            [-27.662603, 26.719784, -15.835464],
            [0.076750, 0.900785, 0.177892, -0.388638],
        )
    } else if name.contains("test.obj") {
        preset(
            [4.157419, 4.996608, 8.337481],
            [0.000000, 0.310172, 0.000000, 0.950679],
        )
    } else if name.contains("bistro.obj") {
        preset(
            [-13.665823, 2.480730, -2.920546],
            [0.000000, -0.772662, 0.000000, 0.634818],
        )
    } else if name.contains("rungholt.obj") {
        preset(
            [-22.413084, 18.681219, -23.566196],
            [0.000000, 0.716948, 0.000000, -0.697125],
        )
    } else {
        preset(
            [1.272743, 3.097532, -3.189943],
            [0.000000, 0.995683, 0.000000, -0.092814],
        )
    }
}

/// Fullscreen copy of the accumulator into the acquired surface frame.
struct BlitPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    group: Option<wgpu::BindGroup>,
}

impl BlitPass {
    fn new(module: &KernelModule, format: wgpu::TextureFormat) -> Self {
        let device = module.device();

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit-pipeline-layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let shader = module.shader("blit");
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blit-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: "vs_main",
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        Self {
            pipeline,
            layout,
            group: None,
        }
    }

    fn create_screen_group(&mut self, arena: &MemoryArena, module: &KernelModule) {
        let device = module.device();
        self.group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit-group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: arena
                        .buffer(module.global_buffer("render_globals"))
                        .as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: arena
                        .buffer(module.global_buffer("accumulator"))
                        .as_entire_binding(),
                },
            ],
        }));
    }

    fn run(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("present-blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, self.group.as_ref().expect("blit group not built"), &[]);
        rpass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cornell_box_preset_matches_the_expected_pose() {
        let (position, rotation) = camera_preset("scenes/CornellBox.obj");
        assert_eq!(position, Vec3::new(0.528027, 1.004323, -0.774033));
        assert_eq!(
            rotation,
            Quat::from_xyzw(0.035059, -0.963870, 0.208413, 0.162142)
        );
    }

    #[test]
    fn preset_matching_is_case_insensitive_substring() {
        let (sponza_pos, _) = camera_preset("/assets/SPONZA.OBJ");
        assert_eq!(sponza_pos.x, 116.927467);
    }

    #[test]
    fn unknown_scene_uses_the_default_pose() {
        let (position, rotation) = camera_preset("whatever.obj");
        assert_eq!(position, Vec3::new(1.272743, 3.097532, -3.189943));
        assert!((rotation.length() - 1.0).abs() < 1e-4);
    }
}
