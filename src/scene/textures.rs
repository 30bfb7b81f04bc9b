// src/scene/textures.rs
// Material texture decode and upload. Each texture becomes a 2D device
// array sampled with wrap addressing, linear filtering, normalized
// coordinates and sRGB decode; failures substitute magenta and continue.

use std::path::Path;

use crate::arena::{Lifetime, MemoryArena, TextureHandle};
use crate::error::{RenderError, RenderResult};
use crate::scene::TextureData;

/// Compile-time bound of the device texture table.
pub const MAX_TEXTURES: usize = 64;

/// Decode an image file into the scene's texture list, returning its table
/// index. A failed decode registers the magenta stand-in instead.
pub fn load_or_fallback(path: &Path, textures: &mut Vec<TextureData>) -> usize {
    let index = textures.len();
    match load(path) {
        Ok(texture) => textures.push(texture),
        Err(e) => {
            log::warn!("texture {} failed to decode: {e}", path.display());
            textures.push(TextureData::magenta());
        }
    }
    index
}

fn load(path: &Path) -> RenderResult<TextureData> {
    let image = image::open(path)
        .map_err(|e| RenderError::scene(format!("{}: {e}", path.display())))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    Ok(TextureData {
        width,
        height,
        rgba: image.into_raw(),
        srgb: true,
    })
}

/// Upload the texture table. The returned handles back the
/// `binding_array` global; the table is padded to a single magenta entry
/// when the scene carries no textures.
pub fn upload(
    textures: &[TextureData],
    arena: &mut MemoryArena,
    queue: &wgpu::Queue,
) -> RenderResult<Vec<TextureHandle>> {
    if textures.len() > MAX_TEXTURES {
        return Err(RenderError::capacity(format!(
            "{} textures exceed the table limit of {MAX_TEXTURES}",
            textures.len()
        )));
    }

    let source: Vec<&TextureData> = if textures.is_empty() {
        Vec::new()
    } else {
        textures.iter().collect()
    };

    let fallback = TextureData::magenta();
    let mut handles = Vec::with_capacity(source.len().max(1));
    let upload_one = |arena: &mut MemoryArena, index: usize, data: &TextureData| {
        let format = if data.srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let handle = arena.alloc_texture_2d(
            &format!("texture-{index}"),
            data.width,
            data.height,
            format,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            Lifetime::Scene,
        )?;
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: arena.texture(handle),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data.rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * data.width),
                rows_per_image: Some(data.height),
            },
            wgpu::Extent3d {
                width: data.width,
                height: data.height,
                depth_or_array_layers: 1,
            },
        );
        Ok::<TextureHandle, RenderError>(handle)
    };

    if source.is_empty() {
        handles.push(upload_one(arena, 0, &fallback)?);
    } else {
        for (index, data) in source.iter().enumerate() {
            handles.push(upload_one(arena, index, data)?);
        }
    }

    Ok(handles)
}
