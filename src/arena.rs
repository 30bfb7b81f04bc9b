// src/arena.rs
// Device memory arena: owns every linear buffer and 2D array resource
// Allocations are handed out as stable opaque handles; teardown walks the
// arena once. Screen-lifetime entries are dropped as a group on resize.
// RELEVANT FILES: src/module.rs, src/session.rs, src/scene/layout.rs

use std::sync::Arc;

use crate::error::{RenderError, RenderResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u32);

/// Allocation lifetime class. Scene entries live for the whole session,
/// screen entries are recreated on every resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    Scene,
    Screen,
}

struct BufferEntry {
    label: String,
    buffer: wgpu::Buffer,
    size: u64,
    lifetime: Lifetime,
}

struct TextureEntry {
    label: String,
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: u64,
    lifetime: Lifetime,
}

pub struct MemoryArena {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    buffers: Vec<Option<BufferEntry>>,
    textures: Vec<Option<TextureEntry>>,
    bytes_allocated: u64,
}

impl MemoryArena {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            buffers: Vec::new(),
            textures: Vec::new(),
            bytes_allocated: 0,
        }
    }

    pub fn alloc_buffer(
        &mut self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
        lifetime: Lifetime,
    ) -> RenderResult<BufferHandle> {
        // wgpu rejects zero-sized buffers; an empty table still needs a binding
        let size = size.max(4);
        if size > self.device.limits().max_buffer_size {
            return Err(RenderError::allocation(format!(
                "buffer '{label}' of {size} bytes exceeds device limit"
            )));
        }
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        });
        self.bytes_allocated += size;
        let entry = BufferEntry {
            label: label.to_string(),
            buffer,
            size,
            lifetime,
        };
        Ok(BufferHandle(self.insert_buffer(entry)))
    }

    pub fn alloc_buffer_init(
        &mut self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
        lifetime: Lifetime,
    ) -> RenderResult<BufferHandle> {
        let handle = self.alloc_buffer(label, contents.len() as u64, usage, lifetime)?;
        if !contents.is_empty() {
            self.queue.write_buffer(self.buffer(handle), 0, contents);
        }
        Ok(handle)
    }

    pub fn alloc_texture_2d(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
        lifetime: Lifetime,
    ) -> RenderResult<TextureHandle> {
        if width == 0 || height == 0 {
            return Err(RenderError::allocation(format!(
                "texture '{label}' has zero extent"
            )));
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let size = texture_bytes(width, height, format);
        self.bytes_allocated += size;
        let entry = TextureEntry {
            label: label.to_string(),
            texture,
            view,
            size,
            lifetime,
        };
        Ok(TextureHandle(self.insert_texture(entry)))
    }

    pub fn buffer(&self, handle: BufferHandle) -> &wgpu::Buffer {
        &self.buffers[handle.0 as usize]
            .as_ref()
            .expect("stale buffer handle")
            .buffer
    }

    pub fn texture_view(&self, handle: TextureHandle) -> &wgpu::TextureView {
        &self.textures[handle.0 as usize]
            .as_ref()
            .expect("stale texture handle")
            .view
    }

    pub fn texture(&self, handle: TextureHandle) -> &wgpu::Texture {
        &self.textures[handle.0 as usize]
            .as_ref()
            .expect("stale texture handle")
            .texture
    }

    pub fn free_buffer(&mut self, handle: BufferHandle) {
        if let Some(entry) = self.buffers[handle.0 as usize].take() {
            self.bytes_allocated -= entry.size;
        }
    }

    pub fn free_texture(&mut self, handle: TextureHandle) {
        if let Some(entry) = self.textures[handle.0 as usize].take() {
            self.bytes_allocated -= entry.size;
        }
    }

    /// Drop every screen-lifetime allocation. Called before recreating the
    /// screen-dependent buffer set on resize.
    pub fn free_screen(&mut self) {
        for slot in self.buffers.iter_mut() {
            if matches!(slot, Some(e) if e.lifetime == Lifetime::Screen) {
                let entry = slot.take().expect("checked above");
                self.bytes_allocated -= entry.size;
            }
        }
        for slot in self.textures.iter_mut() {
            if matches!(slot, Some(e) if e.lifetime == Lifetime::Screen) {
                let entry = slot.take().expect("checked above");
                self.bytes_allocated -= entry.size;
            }
        }
    }

    pub fn bytes_allocated(&self) -> u64 {
        self.bytes_allocated
    }

    /// Live allocations as (label, size) pairs, sorted by label. Used by the
    /// init-time memory report and by resize idempotence checks.
    pub fn ledger(&self) -> Vec<(String, u64)> {
        let mut out: Vec<(String, u64)> = self
            .buffers
            .iter()
            .flatten()
            .map(|e| (e.label.clone(), e.size))
            .chain(self.textures.iter().flatten().map(|e| (e.label.clone(), e.size)))
            .collect();
        out.sort();
        out
    }

    fn insert_buffer(&mut self, entry: BufferEntry) -> u32 {
        for (i, slot) in self.buffers.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return i as u32;
            }
        }
        self.buffers.push(Some(entry));
        (self.buffers.len() - 1) as u32
    }

    fn insert_texture(&mut self, entry: TextureEntry) -> u32 {
        for (i, slot) in self.textures.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return i as u32;
            }
        }
        self.textures.push(Some(entry));
        (self.textures.len() - 1) as u32
    }
}

fn texture_bytes(width: u32, height: u32, format: wgpu::TextureFormat) -> u64 {
    let bpp = match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => 4,
        wgpu::TextureFormat::Rg32Float => 8,
        wgpu::TextureFormat::Rgba16Float => 8,
        wgpu::TextureFormat::Rgba32Float => 16,
        wgpu::TextureFormat::R32Sint | wgpu::TextureFormat::R32Float => 4,
        wgpu::TextureFormat::Depth32Float => 4,
        _ => 4,
    };
    width as u64 * height as u64 * bpp
}
