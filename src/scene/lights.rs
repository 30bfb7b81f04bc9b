// src/scene/lights.rs
// Light sampling tables: emissive triangles sorted by area with a cumulative
// area prefix, so a uniform [0, total) sample binary-searches a light with
// probability proportional to its area.

use crate::scene::{Material, Scene};

/// Host-built light tables, uploaded as `light_indices` and
/// `light_areas_cumulative`. Empty when the scene has no emissive material.
pub struct LightTables {
    /// Device triangle indices of the lights, area-ascending.
    pub indices: Vec<u32>,
    /// Length `indices.len() + 1`, monotonically non-decreasing, last entry
    /// equals `total_area`.
    pub areas_cumulative: Vec<f32>,
    pub total_area: f32,
}

impl LightTables {
    pub fn light_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Scan the scene for emissive triangles and build the tables. Triangle
/// indices are translated into the device (BVH-permuted) index space via
/// `reverse_indices`.
pub fn build_light_tables(scene: &Scene, reverse_indices: &[u32]) -> LightTables {
    let mut lights: Vec<(u32, f32)> = Vec::new();

    for (i, triangle) in scene.triangles.iter().enumerate() {
        if matches!(scene.material_for(triangle), Material::Light { .. }) {
            lights.push((reverse_indices[i], triangle.area()));
        }
    }

    // Sort by area ascending so the cumulative sum accumulates small
    // contributions first
    lights.sort_by(|a, b| a.1.total_cmp(&b.1));

    let mut indices = Vec::with_capacity(lights.len());
    let mut areas_cumulative = Vec::with_capacity(lights.len() + 1);
    let mut total_area = 0.0f32;

    for (index, area) in &lights {
        indices.push(*index);
        areas_cumulative.push(total_area);
        total_area += area;
    }
    areas_cumulative.push(total_area);

    LightTables {
        indices,
        areas_cumulative,
        total_area,
    }
}

/// Host mirror of the device's light selection: binary search the cumulative
/// table for the last entry not exceeding `sample`.
pub fn select_light(tables: &LightTables, sample: f32) -> Option<u32> {
    if tables.is_empty() {
        return None;
    }
    let cumulative = &tables.areas_cumulative;
    let mut lo = 0usize;
    let mut hi = tables.indices.len();
    while lo + 1 < hi {
        let mid = (lo + hi) / 2;
        if cumulative[mid] <= sample {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(tables.indices[lo])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Scene, Triangle};
    use glam::{Vec2, Vec3};

    fn triangle(scale: f32, material_id: i32) -> Triangle {
        Triangle {
            position_0: Vec3::ZERO,
            position_1: Vec3::new(scale, 0.0, 0.0),
            position_2: Vec3::new(0.0, scale, 0.0),
            normal_0: Vec3::Z,
            normal_1: Vec3::Z,
            normal_2: Vec3::Z,
            tex_coord_0: Vec2::ZERO,
            tex_coord_1: Vec2::ZERO,
            tex_coord_2: Vec2::ZERO,
            material_id,
        }
    }

    fn scene_with(triangles: Vec<Triangle>, materials: Vec<Material>) -> Scene {
        let mut table = vec![Material::default_diffuse()];
        table.extend(materials);
        Scene {
            triangles,
            materials: table,
            material_offset: 1,
            textures: Vec::new(),
        }
    }

    #[test]
    fn single_emissive_triangle() {
        let scene = scene_with(
            vec![triangle(1.0, 0)],
            vec![Material::Light {
                emission: Vec3::ONE,
            }],
        );
        let tables = build_light_tables(&scene, &[0]);

        assert_eq!(tables.light_count(), 1);
        assert_eq!(tables.total_area, 0.5);
        assert_eq!(tables.areas_cumulative, vec![0.0, 0.5]);
        assert_eq!(select_light(&tables, 0.0), Some(0));
        assert_eq!(select_light(&tables, 0.49), Some(0));
    }

    #[test]
    fn cumulative_table_is_monotonic_and_sums_to_total() {
        let scene = scene_with(
            vec![
                triangle(2.0, 0),
                triangle(1.0, 0),
                triangle(4.0, 0),
                triangle(3.0, 1),
            ],
            vec![
                Material::Light {
                    emission: Vec3::ONE,
                },
                Material::default_diffuse(),
            ],
        );
        // Identity permutation for this test
        let tables = build_light_tables(&scene, &[0, 1, 2, 3]);

        // Non-light triangle excluded
        assert_eq!(tables.light_count(), 3);
        assert_eq!(tables.areas_cumulative.len(), 4);
        for pair in tables.areas_cumulative.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(
            *tables.areas_cumulative.last().expect("non-empty"),
            tables.total_area
        );

        // Sorted by area ascending: areas are 0.5, 2.0, 8.0
        assert_eq!(tables.indices, vec![1, 0, 2]);
    }

    #[test]
    fn selection_is_proportional_at_boundaries() {
        let scene = scene_with(
            vec![triangle(1.0, 0), triangle(2.0, 0)],
            vec![Material::Light {
                emission: Vec3::ONE,
            }],
        );
        let tables = build_light_tables(&scene, &[0, 1]);
        // areas 0.5 and 2.0; cumulative [0.0, 0.5, 2.5]
        assert_eq!(select_light(&tables, 0.25), Some(0));
        assert_eq!(select_light(&tables, 0.5), Some(1));
        assert_eq!(select_light(&tables, 2.4), Some(1));
    }

    #[test]
    fn empty_light_set_builds_empty_tables() {
        let scene = scene_with(vec![triangle(1.0, 0)], vec![Material::default_diffuse()]);
        let tables = build_light_tables(&scene, &[0]);
        assert!(tables.is_empty());
        assert_eq!(tables.total_area, 0.0);
        assert_eq!(select_light(&tables, 0.0), None);
    }
}
