// src/gpu.rs
// Compute device bring-up and shared wgpu context
// Exists to select an interop-capable adapter and create the device/queue pair
// RELEVANT FILES: src/session.rs, src/module.rs, src/arena.rs

use std::sync::Arc;

use crate::error::{RenderError, RenderResult};

/// Width of a device SIMD group. Screen pitches and wavefront block shapes
/// are multiples of this.
pub const WARP_SIZE: u32 = 32;

pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    /// TIMESTAMP_QUERY was granted; the event recorder degrades to labels
    /// without durations when false.
    pub timestamps: bool,
}

fn backends_from_env() -> wgpu::Backends {
    use std::env;
    if let Ok(s) = env::var("WGPU_BACKENDS").or_else(|_| env::var("WGPU_BACKEND")) {
        let s_l = s.to_lowercase();
        if s_l.contains("metal") {
            return wgpu::Backends::METAL;
        }
        if s_l.contains("vulkan") {
            return wgpu::Backends::VULKAN;
        }
        if s_l.contains("dx12") {
            return wgpu::Backends::DX12;
        }
        if s_l.contains("gl") {
            return wgpu::Backends::GL;
        }
    }
    wgpu::Backends::all()
}

impl GpuContext {
    /// Bring up the compute device against a presentation target. Adapter
    /// selection is constrained to the surface so interop is guaranteed;
    /// failing to find such an adapter is fatal.
    pub fn for_surface(
        target: impl Into<wgpu::SurfaceTarget<'static>>,
    ) -> RenderResult<(Self, wgpu::Surface<'static>)> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: backends_from_env(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .map_err(|e| RenderError::device(format!("surface creation failed: {e}")))?;
        let ctx = Self::request(instance, Some(&surface))?;
        Ok((ctx, surface))
    }

    /// Headless bring-up, used by device-level tests.
    pub fn headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: backends_from_env(),
            ..Default::default()
        });
        Self::request(instance, None)
    }

    fn request(
        instance: wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface>,
    ) -> RenderResult<Self> {
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::device("no suitable adapter found"))?;

        let adapter_features = adapter.features();

        // The material texture table is a binding array; an adapter without
        // it cannot run the shade kernels at all
        let bindless = wgpu::Features::TEXTURE_BINDING_ARRAY
            | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING;
        if !adapter_features.contains(bindless) {
            return Err(RenderError::device(
                "adapter lacks texture binding arrays required by the shade kernels",
            ));
        }
        let mut features = bindless;

        let timestamps = adapter_features.contains(wgpu::Features::TIMESTAMP_QUERY);
        if timestamps {
            features |= wgpu::Features::TIMESTAMP_QUERY;
        }

        let mut limits = adapter.limits();
        let baseline = wgpu::Limits::downlevel_defaults();
        limits = limits.using_resolution(baseline);
        let desired_storage_buffers = 16;
        limits.max_storage_buffers_per_shader_stage = limits
            .max_storage_buffers_per_shader_stage
            .max(desired_storage_buffers);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                required_features: features,
                required_limits: limits,
                label: Some("raywave-device"),
            },
            None,
        ))
        .map_err(|e| RenderError::device(format!("request_device failed: {e}")))?;

        let info = adapter.get_info();
        log::info!(
            "device: {} ({:?}), timestamps: {}",
            info.name,
            info.backend,
            timestamps
        );

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            timestamps,
        })
    }
}

/// Round a screen width up to a multiple of the warp width. Image-space
/// buffers are pitched to this so rows begin on a warp boundary.
#[inline]
pub fn screen_pitch(width: u32) -> u32 {
    (width + WARP_SIZE - 1) / WARP_SIZE * WARP_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_rounds_to_warp_multiple() {
        assert_eq!(screen_pitch(1), WARP_SIZE);
        assert_eq!(screen_pitch(WARP_SIZE), WARP_SIZE);
        assert_eq!(screen_pitch(WARP_SIZE + 1), 2 * WARP_SIZE);
        assert_eq!(screen_pitch(1920), 1920);
        assert_eq!(screen_pitch(1918), 1920);
    }
}
