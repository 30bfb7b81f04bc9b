// src/scene/mod.rs
// Loaded-scene data model: triangles in original order, the tagged material
// table, decoded textures. External providers (the OBJ reader, sky and
// blue-noise loaders) fill this; the layout builder consumes it.

pub mod bluenoise;
pub mod layout;
pub mod lights;
pub mod obj;
pub mod sky;
pub mod textures;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// One triangle in original mesh order, with per-vertex attributes.
/// `material_id` is relative to the owning mesh's `material_offset`.
#[derive(Debug, Clone)]
pub struct Triangle {
    pub position_0: Vec3,
    pub position_1: Vec3,
    pub position_2: Vec3,
    pub normal_0: Vec3,
    pub normal_1: Vec3,
    pub normal_2: Vec3,
    pub tex_coord_0: Vec2,
    pub tex_coord_1: Vec2,
    pub tex_coord_2: Vec2,
    pub material_id: i32,
}

impl Triangle {
    pub fn area(&self) -> f32 {
        0.5 * (self.position_1 - self.position_0)
            .cross(self.position_2 - self.position_0)
            .length()
    }
}

/// Tagged material variant. Dispatch happens on the device by queue
/// partitioning; the host only needs the discriminator and a flat table.
#[derive(Debug, Clone)]
pub enum Material {
    Diffuse {
        diffuse: Vec3,
        texture: Option<usize>,
    },
    Dielectric {
        transmittance: Vec3,
        index_of_refraction: f32,
    },
    Glossy {
        reflection: Vec3,
    },
    Light {
        emission: Vec3,
    },
}

impl Material {
    /// The default magenta diffuse, substituted for broken references.
    pub fn default_diffuse() -> Self {
        Material::Diffuse {
            diffuse: Vec3::new(1.0, 0.0, 1.0),
            texture: None,
        }
    }

    pub fn kind(&self) -> MaterialKind {
        match self {
            Material::Diffuse { .. } => MaterialKind::Diffuse,
            Material::Dielectric { .. } => MaterialKind::Dielectric,
            Material::Glossy { .. } => MaterialKind::Glossy,
            Material::Light { .. } => MaterialKind::Light,
        }
    }
}

/// Material discriminator; numeric values are the sort kernel's queue tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MaterialKind {
    Diffuse = 0,
    Dielectric = 1,
    Glossy = 2,
    Light = 3,
}

/// Decoded texture pixels, RGBA8. `srgb` selects sRGB decode on sampling.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub srgb: bool,
}

impl TextureData {
    /// 1x1 magenta stand-in for textures that failed to decode.
    pub fn magenta() -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: vec![255, 0, 255, 255],
            srgb: false,
        }
    }
}

/// A loaded scene. `materials` is the global table (index 0 is the default
/// magenta diffuse); triangle material ids are offset by `material_offset`.
#[derive(Debug)]
pub struct Scene {
    pub triangles: Vec<Triangle>,
    pub materials: Vec<Material>,
    pub material_offset: i32,
    pub textures: Vec<TextureData>,
}

impl Scene {
    pub fn material_for(&self, triangle: &Triangle) -> &Material {
        let id = (self.material_offset + triangle.material_id) as usize;
        self.materials.get(id).unwrap_or(&self.materials[0])
    }
}

/// Which material classes appear in the table; stages with a guaranteed
/// empty consumer queue are skipped per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneFlags {
    pub has_diffuse: bool,
    pub has_dielectric: bool,
    pub has_glossy: bool,
    pub has_lights: bool,
}

impl SceneFlags {
    pub fn scan(materials: &[Material]) -> Self {
        let mut flags = SceneFlags::default();
        for material in materials {
            match material.kind() {
                MaterialKind::Diffuse => flags.has_diffuse = true,
                MaterialKind::Dielectric => flags.has_dielectric = true,
                MaterialKind::Glossy => flags.has_glossy = true,
                MaterialKind::Light => flags.has_lights = true,
            }
        }
        flags
    }
}

/// Device-side material record, 80 bytes, matching the WGSL `Material`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub kind: u32,
    /// Index into the texture table, -1 for none.
    pub texture_id: i32,
    pub index_of_refraction: f32,
    pub _pad0: f32,
    pub diffuse: [f32; 3],
    pub _pad1: f32,
    pub reflection: [f32; 3],
    pub _pad2: f32,
    pub transmittance: [f32; 3],
    pub _pad3: f32,
    pub emission: [f32; 3],
    pub _pad4: f32,
}

impl From<&Material> for GpuMaterial {
    fn from(material: &Material) -> Self {
        let mut out = GpuMaterial::zeroed();
        out.kind = material.kind() as u32;
        out.texture_id = -1;
        out.index_of_refraction = 1.0;
        match material {
            Material::Diffuse { diffuse, texture } => {
                out.diffuse = (*diffuse).into();
                out.texture_id = texture.map_or(-1, |t| t as i32);
            }
            Material::Dielectric {
                transmittance,
                index_of_refraction,
            } => {
                out.transmittance = (*transmittance).into();
                out.index_of_refraction = *index_of_refraction;
            }
            Material::Glossy { reflection } => {
                out.reflection = (*reflection).into();
            }
            Material::Light { emission } => {
                out.emission = (*emission).into();
            }
        }
        out
    }
}

/// Device-side triangle record, 128 bytes, edge-encoded per the trace and
/// shade kernels' expectations.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuTriangle {
    pub position_0: [f32; 3],
    pub _pad0: f32,
    pub position_edge_1: [f32; 3],
    pub _pad1: f32,
    pub position_edge_2: [f32; 3],
    pub _pad2: f32,
    pub normal_0: [f32; 3],
    pub _pad3: f32,
    pub normal_edge_1: [f32; 3],
    pub _pad4: f32,
    pub normal_edge_2: [f32; 3],
    pub _pad5: f32,
    pub tex_coord_0: [f32; 2],
    pub tex_coord_edge_1: [f32; 2],
    pub tex_coord_edge_2: [f32; 2],
    pub _pad6: [f32; 2],
}

impl From<&Triangle> for GpuTriangle {
    fn from(tri: &Triangle) -> Self {
        let mut out = GpuTriangle::zeroed();
        out.position_0 = tri.position_0.into();
        out.position_edge_1 = (tri.position_1 - tri.position_0).into();
        out.position_edge_2 = (tri.position_2 - tri.position_0).into();
        out.normal_0 = tri.normal_0.into();
        out.normal_edge_1 = (tri.normal_1 - tri.normal_0).into();
        out.normal_edge_2 = (tri.normal_2 - tri.normal_0).into();
        out.tex_coord_0 = tri.tex_coord_0.into();
        out.tex_coord_edge_1 = (tri.tex_coord_1 - tri.tex_coord_0).into();
        out.tex_coord_edge_2 = (tri.tex_coord_2 - tri.tex_coord_0).into();
        out
    }
}

/// Vertex of the rasterized-primary vertex buffer: `{position, normal,
/// barycentric uv, device triangle id}` with corner uvs (0,0), (1,0), (0,1).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RasterVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub triangle_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_struct_sizes_match_kernel_abi() {
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 80);
        assert_eq!(std::mem::size_of::<GpuTriangle>(), 128);
        assert_eq!(std::mem::size_of::<RasterVertex>(), 36);
    }

    #[test]
    fn flags_scan_covers_all_kinds() {
        let materials = vec![
            Material::default_diffuse(),
            Material::Light {
                emission: Vec3::ONE,
            },
        ];
        let flags = SceneFlags::scan(&materials);
        assert!(flags.has_diffuse);
        assert!(flags.has_lights);
        assert!(!flags.has_dielectric);
        assert!(!flags.has_glossy);
    }

    #[test]
    fn edge_encoding_subtracts_corner_zero() {
        let tri = Triangle {
            position_0: Vec3::new(1.0, 0.0, 0.0),
            position_1: Vec3::new(2.0, 0.0, 0.0),
            position_2: Vec3::new(1.0, 3.0, 0.0),
            normal_0: Vec3::Z,
            normal_1: Vec3::Z,
            normal_2: Vec3::Z,
            tex_coord_0: Vec2::new(0.5, 0.5),
            tex_coord_1: Vec2::new(1.0, 0.5),
            tex_coord_2: Vec2::new(0.5, 1.0),
            material_id: 0,
        };
        let gpu = GpuTriangle::from(&tri);
        assert_eq!(gpu.position_edge_1, [1.0, 0.0, 0.0]);
        assert_eq!(gpu.position_edge_2, [0.0, 3.0, 0.0]);
        assert_eq!(gpu.tex_coord_edge_1, [0.5, 0.0]);
        assert_eq!(gpu.tex_coord_edge_2, [0.0, 0.5]);
        assert_eq!(tri.area(), 1.5);
    }
}
