// Light sampling table construction: area-ascending order, cumulative
// prefix shape, and proportional selection through the host-side mirror of
// the device binary search.

use glam::{Vec2, Vec3};
use raywave::scene::lights::{build_light_tables, select_light};
use raywave::scene::{Material, Scene, Triangle};

fn right_triangle(scale: f32, material_id: i32) -> Triangle {
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

fn scene(triangles: Vec<Triangle>, materials: Vec<Material>) -> Scene {
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
fn one_emissive_triangle_of_area_half() {
    let scene = scene(
        vec![right_triangle(1.0, 0)],
        vec![Material::Light {
            emission: Vec3::splat(10.0),
        }],
    );
    let tables = build_light_tables(&scene, &[0]);

    assert_eq!(tables.light_count(), 1);
    assert_eq!(tables.total_area, 0.5);
    assert_eq!(tables.areas_cumulative, vec![0.0, 0.5]);
    assert_eq!(select_light(&tables, 0.0), Some(0));
    assert_eq!(select_light(&tables, 0.4999), Some(0));
}

#[test]
fn cumulative_prefix_is_monotone_with_total_as_last_entry() {
    let mut triangles = Vec::new();
    for i in 0..12 {
        triangles.push(right_triangle(1.0 + i as f32 * 0.37, 0));
    }
    let reverse: Vec<u32> = (0..12).rev().collect();
    let scene = scene(
        triangles,
        vec![Material::Light {
            emission: Vec3::ONE,
        }],
    );
    let tables = build_light_tables(&scene, &reverse);

    assert_eq!(tables.light_count(), 12);
    assert_eq!(tables.areas_cumulative.len(), 13);
    for window in tables.areas_cumulative.windows(2) {
        assert!(window[0] <= window[1]);
    }
    // Floating-point equal: the last entry is produced by the same
    // accumulation order as the total
    assert_eq!(*tables.areas_cumulative.last().unwrap(), tables.total_area);
}

#[test]
fn indices_are_device_space_and_area_sorted() {
    // Original triangles 0..3 with areas 4.5, 0.5, 2.0; devices ids are a
    // permutation of the originals
    let triangles = vec![
        right_triangle(3.0, 0),
        right_triangle(1.0, 0),
        right_triangle(2.0, 0),
    ];
    let reverse = vec![2u32, 0, 1];
    let scene = scene(
        triangles,
        vec![Material::Light {
            emission: Vec3::ONE,
        }],
    );
    let tables = build_light_tables(&scene, &reverse);

    // Ascending by area: original 1 (device 0), original 2 (device 1),
    // original 0 (device 2)
    assert_eq!(tables.indices, vec![0, 1, 2]);
    assert_eq!(tables.areas_cumulative, vec![0.0, 0.5, 2.5, 7.0]);
}

#[test]
fn no_lights_no_tables() {
    let scene = scene(vec![right_triangle(1.0, 0)], vec![Material::default_diffuse()]);
    let tables = build_light_tables(&scene, &[0]);
    assert!(tables.is_empty());
    assert_eq!(select_light(&tables, 0.5), None);
}

#[test]
fn selection_respects_area_proportion_boundaries() {
    let scene = scene(
        vec![right_triangle(1.0, 0), right_triangle(3.0, 0)],
        vec![Material::Light {
            emission: Vec3::ONE,
        }],
    );
    let tables = build_light_tables(&scene, &[0, 1]);
    // areas: 0.5 and 4.5 -> cumulative [0, 0.5, 5.0]
    assert_eq!(select_light(&tables, 0.1), Some(0));
    assert_eq!(select_light(&tables, 0.6), Some(1));
    assert_eq!(select_light(&tables, 4.9), Some(1));
}
