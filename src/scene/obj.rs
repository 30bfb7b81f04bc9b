// src/scene/obj.rs
// Wavefront OBJ + MTL reader filling the loaded-scene contract. A data
// provider for the binary, not part of the engine core; polygons are
// triangulated as fans and missing normals fall back to the face normal.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use glam::{Vec2, Vec3};

use crate::error::{RenderError, RenderResult};
use crate::scene::{textures, Material, Scene, TextureData, Triangle};

pub fn load_scene(path: &Path) -> RenderResult<Scene> {
    let text = fs::read_to_string(path)
        .map_err(|e| RenderError::scene(format!("cannot read {}: {e}", path.display())))?;

    let mut positions: Vec<Vec3> = Vec::new();
    let mut tex_coords: Vec<Vec2> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();
    let mut triangles: Vec<Triangle> = Vec::new();

    // Index 0 of the global table is the default magenta diffuse
    let mut materials: Vec<Material> = Vec::new();
    let mut textures_data: Vec<TextureData> = Vec::new();
    let mut material_names: HashMap<String, i32> = HashMap::new();
    let mut current_material: i32 = -1;

    for line in text.lines() {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("v") => positions.push(parse_vec3(&mut parts)),
            Some("vt") => {
                let uv = parse_vec2(&mut parts);
                // OBJ uv origin is bottom-left
                tex_coords.push(Vec2::new(uv.x, 1.0 - uv.y));
            }
            Some("vn") => normals.push(parse_vec3(&mut parts)),
            Some("mtllib") => {
                if let Some(name) = parts.next() {
                    let mtl_path = path.with_file_name(name);
                    load_mtl(
                        &mtl_path,
                        &mut materials,
                        &mut material_names,
                        &mut textures_data,
                    );
                }
            }
            Some("usemtl") => {
                let name = parts.next().unwrap_or("");
                current_material = *material_names.get(name).unwrap_or_else(|| {
                    log::warn!("unknown material '{name}', using default");
                    &-1
                });
            }
            Some("f") => {
                let corners: Vec<(i32, i32, i32)> = parts.map(parse_face_corner).collect();
                for i in 2..corners.len() {
                    push_triangle(
                        &mut triangles,
                        &positions,
                        &tex_coords,
                        &normals,
                        [corners[0], corners[i - 1], corners[i]],
                        current_material,
                    );
                }
            }
            _ => {}
        }
    }

    if triangles.is_empty() {
        return Err(RenderError::scene(format!(
            "{} contains no triangles",
            path.display()
        )));
    }

    let mut table = vec![Material::default_diffuse()];
    table.extend(materials);

    log::info!(
        "loaded {}: {} triangles, {} materials, {} textures",
        path.display(),
        triangles.len(),
        table.len(),
        textures_data.len()
    );

    Ok(Scene {
        triangles,
        materials: table,
        material_offset: 1,
        textures: textures_data,
    })
}

fn parse_vec3<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Vec3 {
    let mut v = [0.0f32; 3];
    for slot in v.iter_mut() {
        *slot = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    }
    Vec3::from(v)
}

fn parse_vec2<'a>(parts: &mut impl Iterator<Item = &'a str>) -> Vec2 {
    let mut v = [0.0f32; 2];
    for slot in v.iter_mut() {
        *slot = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
    }
    Vec2::from(v)
}

/// `v`, `v/vt`, `v//vn` or `v/vt/vn`, 1-based; negative indices count back
/// from the end.
fn parse_face_corner(corner: &str) -> (i32, i32, i32) {
    let mut ids = corner.split('/');
    let p = ids.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let t = ids.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let n = ids.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    (p, t, n)
}

fn resolve(index: i32, len: usize) -> usize {
    if index < 0 {
        (len as i32 + index) as usize
    } else {
        (index - 1) as usize
    }
}

fn push_triangle(
    triangles: &mut Vec<Triangle>,
    positions: &[Vec3],
    tex_coords: &[Vec2],
    normals: &[Vec3],
    corners: [(i32, i32, i32); 3],
    material_id: i32,
) {
    let fetch_pos = |i: i32| positions.get(resolve(i, positions.len())).copied();
    let Some(p0) = fetch_pos(corners[0].0) else { return };
    let Some(p1) = fetch_pos(corners[1].0) else { return };
    let Some(p2) = fetch_pos(corners[2].0) else { return };

    let face_normal = (p1 - p0).cross(p2 - p0).normalize_or_zero();
    let fetch_normal = |i: i32| {
        if i == 0 {
            face_normal
        } else {
            normals
                .get(resolve(i, normals.len()))
                .copied()
                .unwrap_or(face_normal)
        }
    };
    let fetch_uv = |i: i32| {
        if i == 0 {
            Vec2::ZERO
        } else {
            tex_coords
                .get(resolve(i, tex_coords.len()))
                .copied()
                .unwrap_or(Vec2::ZERO)
        }
    };

    triangles.push(Triangle {
        position_0: p0,
        position_1: p1,
        position_2: p2,
        normal_0: fetch_normal(corners[0].2),
        normal_1: fetch_normal(corners[1].2),
        normal_2: fetch_normal(corners[2].2),
        tex_coord_0: fetch_uv(corners[0].1),
        tex_coord_1: fetch_uv(corners[1].1),
        tex_coord_2: fetch_uv(corners[2].1),
        material_id,
    });
}

/// Map MTL statements onto the four material classes: emission wins, then
/// refraction, then specular reflection, else textured/plain diffuse.
fn load_mtl(
    path: &Path,
    materials: &mut Vec<Material>,
    names: &mut HashMap<String, i32>,
    textures_data: &mut Vec<TextureData>,
) {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("cannot read {}: {e}", path.display());
            return;
        }
    };

    struct MtlState {
        name: String,
        kd: Vec3,
        ks: Vec3,
        ke: Vec3,
        tf: Vec3,
        ni: f32,
        map_kd: Option<usize>,
    }

    let mut pending: Option<MtlState> = None;
    let mut finish = |state: MtlState, materials: &mut Vec<Material>| {
        let material = if state.ke.max_element() > 0.0 {
            Material::Light { emission: state.ke }
        } else if (state.ni - 1.0).abs() > 1e-4 {
            Material::Dielectric {
                transmittance: state.tf,
                index_of_refraction: state.ni,
            }
        } else if state.ks.max_element() > 0.0 {
            Material::Glossy {
                reflection: state.ks,
            }
        } else {
            Material::Diffuse {
                diffuse: state.kd,
                texture: state.map_kd,
            }
        };
        // material ids are offset by one for the default entry
        names.insert(state.name, materials.len() as i32);
        materials.push(material);
    };

    for line in text.lines() {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("newmtl") => {
                if let Some(done) = pending.take() {
                    finish(done, materials);
                }
                pending = Some(MtlState {
                    name: parts.next().unwrap_or("").to_string(),
                    kd: Vec3::ONE,
                    ks: Vec3::ZERO,
                    ke: Vec3::ZERO,
                    tf: Vec3::ONE,
                    ni: 1.0,
                    map_kd: None,
                });
            }
            Some("Kd") => {
                if let Some(state) = pending.as_mut() {
                    state.kd = parse_vec3(&mut parts);
                }
            }
            Some("Ks") => {
                if let Some(state) = pending.as_mut() {
                    state.ks = parse_vec3(&mut parts);
                }
            }
            Some("Ke") => {
                if let Some(state) = pending.as_mut() {
                    state.ke = parse_vec3(&mut parts);
                }
            }
            Some("Tf") => {
                if let Some(state) = pending.as_mut() {
                    state.tf = parse_vec3(&mut parts);
                }
            }
            Some("Ni") => {
                if let Some(state) = pending.as_mut() {
                    state.ni = parts.next().and_then(|s| s.parse().ok()).unwrap_or(1.0);
                }
            }
            Some("map_Kd") => {
                if let (Some(state), Some(file)) = (pending.as_mut(), parts.next()) {
                    let tex_path = path.with_file_name(file);
                    state.map_kd = Some(textures::load_or_fallback(&tex_path, textures_data));
                }
            }
            _ => {}
        }
    }
    if let Some(done) = pending.take() {
        finish(done, materials);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_corner_forms() {
        assert_eq!(parse_face_corner("3"), (3, 0, 0));
        assert_eq!(parse_face_corner("3/7"), (3, 7, 0));
        assert_eq!(parse_face_corner("3//9"), (3, 0, 9));
        assert_eq!(parse_face_corner("3/7/9"), (3, 7, 9));
    }

    #[test]
    fn loads_a_quad_as_two_triangles() {
        let dir = std::env::temp_dir().join("raywave-obj-test");
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("quad.obj");
        std::fs::write(
            &path,
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n",
        )
        .expect("write obj");

        let scene = load_scene(&path).expect("load");
        assert_eq!(scene.triangles.len(), 2);
        assert_eq!(scene.material_offset, 1);
        // Unassigned faces reference the default material
        assert_eq!(scene.triangles[0].material_id, -1);
        // Face normal generated for missing vn
        assert!((scene.triangles[0].normal_0.z.abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn missing_file_is_a_scene_error() {
        let err = load_scene(Path::new("/nonexistent/nope.obj")).unwrap_err();
        assert!(matches!(err, RenderError::Scene(_)));
    }
}
