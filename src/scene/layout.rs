// src/scene/layout.rs
// Scene layout builder: transforms the loaded scene plus its BVH into the
// device-resident tables the kernels consume. Runs once at session start.
// Triangle order on the device is the BVH leaf permutation; the reverse
// permutation maps original indices to device indices.

use wgpu::BufferUsages;

use crate::accel::{self, Bvh};
use crate::arena::{BufferHandle, Lifetime, MemoryArena};
use crate::error::RenderResult;
use crate::module::{GlobalResource, KernelModule};
use crate::scene::bluenoise::BlueNoise;
use crate::scene::lights::{self, LightTables};
use crate::scene::sky::Sky;
use crate::scene::{textures, GpuMaterial, GpuTriangle, RasterVertex, Scene, SceneFlags};

/// Host-side summary of the uploaded scene.
pub struct SceneLayout {
    pub flags: SceneFlags,
    pub triangle_count: u32,
    pub light_count: u32,
    pub light_area_total: f32,
    pub sky_size: u32,
    pub vertex_buffer: BufferHandle,
    pub vertex_count: u32,
}

pub fn upload_scene(
    scene: &Scene,
    bvh: &Bvh,
    sky: &Sky,
    noise: &BlueNoise,
    arena: &mut MemoryArena,
    module: &mut KernelModule,
) -> RenderResult<SceneLayout> {
    // BVH nodes under the variant's own symbol
    let node_handle = arena.alloc_buffer_init(
        bvh.bvh_type().node_symbol(),
        bvh.node_bytes(),
        BufferUsages::STORAGE | BufferUsages::COPY_DST,
        Lifetime::Scene,
    )?;
    module.set_global(bvh.bvh_type().node_symbol(), GlobalResource::Buffer(node_handle));

    // Permuted triangle array and material ids: device triangle i is
    // original triangle indices[i]
    let reverse = accel::reverse_indices(&bvh.indices);
    let mut gpu_triangles = Vec::with_capacity(bvh.indices.len());
    let mut material_ids = Vec::with_capacity(bvh.indices.len());
    for &original in &bvh.indices {
        let triangle = &scene.triangles[original as usize];
        gpu_triangles.push(GpuTriangle::from(triangle));
        material_ids.push(scene.material_offset + triangle.material_id);
    }

    let triangle_handle = arena.alloc_buffer_init(
        "triangles",
        bytemuck::cast_slice(&gpu_triangles),
        BufferUsages::STORAGE | BufferUsages::COPY_DST,
        Lifetime::Scene,
    )?;
    module.set_global("triangles", GlobalResource::Buffer(triangle_handle));

    let material_id_handle = arena.alloc_buffer_init(
        "triangle_material_ids",
        bytemuck::cast_slice(&material_ids),
        BufferUsages::STORAGE | BufferUsages::COPY_DST,
        Lifetime::Scene,
    )?;
    module.set_global(
        "triangle_material_ids",
        GlobalResource::Buffer(material_id_handle),
    );

    // Rasterization vertex stream in original order, tagged with device
    // triangle ids so the GBuffer resolves to the permuted index space
    let mut vertices = Vec::with_capacity(scene.triangles.len() * 3);
    for (i, triangle) in scene.triangles.iter().enumerate() {
        let device_id = reverse[i] as i32;
        let corners = [
            (triangle.position_0, triangle.normal_0, [0.0f32, 0.0f32]),
            (triangle.position_1, triangle.normal_1, [1.0, 0.0]),
            (triangle.position_2, triangle.normal_2, [0.0, 1.0]),
        ];
        for (position, normal, uv) in corners {
            vertices.push(RasterVertex {
                position: position.into(),
                normal: normal.into(),
                uv,
                triangle_id: device_id,
            });
        }
    }
    let vertex_buffer = arena.alloc_buffer_init(
        "raster-vertices",
        bytemuck::cast_slice(&vertices),
        BufferUsages::VERTEX | BufferUsages::COPY_DST,
        Lifetime::Scene,
    )?;

    // Material table
    let gpu_materials: Vec<GpuMaterial> = scene.materials.iter().map(GpuMaterial::from).collect();
    let material_handle = arena.alloc_buffer_init(
        "materials",
        bytemuck::cast_slice(&gpu_materials),
        BufferUsages::STORAGE | BufferUsages::COPY_DST,
        Lifetime::Scene,
    )?;
    module.set_global("materials", GlobalResource::Buffer(material_handle));

    let flags = SceneFlags::scan(&scene.materials);

    // Texture table
    let texture_handles = textures::upload(&scene.textures, arena, module.queue())?;
    module.set_global("textures", GlobalResource::TextureArray(texture_handles));

    // Light sampling tables; an empty light set omits them entirely and the
    // shadow stage never runs
    let light_tables = build_and_upload_lights(scene, &reverse, arena, module)?;

    // Sky probe
    let sky_handle = arena.alloc_buffer_init(
        "sky_data",
        bytemuck::cast_slice(&sky.data),
        BufferUsages::STORAGE | BufferUsages::COPY_DST,
        Lifetime::Scene,
    )?;
    module.set_global("sky_data", GlobalResource::Buffer(sky_handle));

    // Blue-noise sampler tables
    for (name, table) in [
        ("sobol_256spp_256d", &noise.sobol_256spp_256d),
        ("scrambling_tile", &noise.scrambling_tile),
        ("ranking_tile", &noise.ranking_tile),
    ] {
        let handle = arena.alloc_buffer_init(
            name,
            bytemuck::cast_slice(table),
            BufferUsages::STORAGE | BufferUsages::COPY_DST,
            Lifetime::Scene,
        )?;
        module.set_global(name, GlobalResource::Buffer(handle));
    }

    log::info!(
        "scene: diffuse: {} dielectric: {} glossy: {} lights: {}",
        flags.has_diffuse,
        flags.has_dielectric,
        flags.has_glossy,
        flags.has_lights
    );

    Ok(SceneLayout {
        flags,
        triangle_count: bvh.indices.len() as u32,
        light_count: light_tables.light_count(),
        light_area_total: light_tables.total_area,
        sky_size: sky.size,
        vertex_buffer,
        vertex_count: vertices.len() as u32,
    })
}

fn build_and_upload_lights(
    scene: &Scene,
    reverse: &[u32],
    arena: &mut MemoryArena,
    module: &mut KernelModule,
) -> RenderResult<LightTables> {
    let tables = lights::build_light_tables(scene, reverse);

    if !tables.is_empty() {
        let index_handle = arena.alloc_buffer_init(
            "light_indices",
            bytemuck::cast_slice(&tables.indices),
            BufferUsages::STORAGE | BufferUsages::COPY_DST,
            Lifetime::Scene,
        )?;
        module.set_global("light_indices", GlobalResource::Buffer(index_handle));

        let area_handle = arena.alloc_buffer_init(
            "light_areas_cumulative",
            bytemuck::cast_slice(&tables.areas_cumulative),
            BufferUsages::STORAGE | BufferUsages::COPY_DST,
            Lifetime::Scene,
        )?;
        module.set_global("light_areas_cumulative", GlobalResource::Buffer(area_handle));
    } else {
        // The shade kernels still need valid bindings; a four-byte stub
        // backs the unused tables
        let stub_indices = arena.alloc_buffer(
            "light_indices",
            4,
            BufferUsages::STORAGE | BufferUsages::COPY_DST,
            Lifetime::Scene,
        )?;
        module.set_global("light_indices", GlobalResource::Buffer(stub_indices));
        let stub_areas = arena.alloc_buffer(
            "light_areas_cumulative",
            4,
            BufferUsages::STORAGE | BufferUsages::COPY_DST,
            Lifetime::Scene,
        )?;
        module.set_global("light_areas_cumulative", GlobalResource::Buffer(stub_areas));
    }

    Ok(tables)
}
