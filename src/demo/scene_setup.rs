//! 场景内容：地形、水面、铁丝网箱子
//!
//! 材质和渲染项的下标与常量缓冲中的位置一一对应。

use crate::core::config::SceneConfig;
use crate::core::error::{Result, SceneError};
use crate::core::math::matrix;
use crate::geometry::{shapes, MeshGeometry, SubmeshGeometry};
use crate::scene::land;
use crate::scene::{Id, Material, RenderItem, RenderLayer, Scene, Waves};

pub const LAND_GEO: &str = "landGeo";
pub const WATER_GEO: &str = "waterGeo";
pub const BOX_GEO: &str = "boxGeo";

pub const GRASS: &str = "grass";
pub const WATER: &str = "water";
pub const WIRE_FENCE: &str = "wirefence";

const LAND_SIZE: f32 = 160.0;
const LAND_DIVISIONS: usize = 50;
const BOX_SIZE: f32 = 8.0;

/// 构建完成的场景以及需要逐帧访问的 id
pub struct SceneContent {
    pub scene: Scene,
    pub waves: Waves,
    pub water_material: Id<Material>,
}

fn submesh(geo: &MeshGeometry, name: &str) -> Result<SubmeshGeometry> {
    geo.submesh(name)
        .ok_or_else(|| SceneError::UnknownName(format!("{}/{}", geo.name, name)).into())
}

fn build_materials(scene: &mut Scene, ring_size: usize) -> Result<Id<Material>> {
    let mut grass = Material::new(GRASS, 0, ring_size);
    grass.diffuse_albedo = [1.0, 1.0, 1.0, 1.0];
    grass.fresnel_r0 = [0.01, 0.01, 0.01];
    grass.roughness = 0.125;

    // 水面半透明
    let mut water = Material::new(WATER, 1, ring_size);
    water.diffuse_albedo = [1.0, 1.0, 1.0, 0.5];
    water.fresnel_r0 = [0.1, 0.1, 0.1];
    water.roughness = 0.0;

    let mut wire_fence = Material::new(WIRE_FENCE, 2, ring_size);
    wire_fence.diffuse_albedo = [1.0, 1.0, 1.0, 1.0];
    wire_fence.fresnel_r0 = [0.1, 0.1, 0.1];
    wire_fence.roughness = 0.25;

    scene.add_material(grass)?;
    let water = scene.add_material(water)?;
    scene.add_material(wire_fence)?;
    Ok(water)
}

fn build_geometry(scene: &mut Scene, waves: &Waves) -> Result<()> {
    let (mut vertices, indices) = shapes::grid(LAND_SIZE, LAND_SIZE, LAND_DIVISIONS, LAND_DIVISIONS);
    land::raise_to_hills(&mut vertices);
    scene.add_geometry(MeshGeometry::new_static(LAND_GEO, vertices, indices).with_whole_submesh("grid"))?;

    // 水面顶点每帧重新计算，只上传索引
    let indices = shapes::grid_indices(waves.row_count(), waves.column_count());
    scene.add_geometry(MeshGeometry::new_dynamic(WATER_GEO, waves.vertex_count(), indices).with_whole_submesh("grid"))?;

    let (vertices, indices) = shapes::cube(BOX_SIZE, BOX_SIZE, BOX_SIZE);
    scene.add_geometry(MeshGeometry::new_static(BOX_GEO, vertices, indices).with_whole_submesh("box"))?;

    Ok(())
}

fn build_render_items(scene: &mut Scene, ring_size: usize) -> Result<()> {
    let tex_scale = matrix::scaling(5.0, 5.0, 1.0);

    let water_geo = scene.geometries.id_of(WATER_GEO)?;
    let land_geo = scene.geometries.id_of(LAND_GEO)?;
    let box_geo = scene.geometries.id_of(BOX_GEO)?;

    let waves = RenderItem::new(
        0,
        scene.materials.id_of(WATER)?,
        water_geo,
        submesh(scene.geometries.get(water_geo), "grid")?,
        ring_size,
    )
    .with_tex_transform(tex_scale);

    let grid = RenderItem::new(
        1,
        scene.materials.id_of(GRASS)?,
        land_geo,
        submesh(scene.geometries.get(land_geo), "grid")?,
        ring_size,
    )
    .with_tex_transform(tex_scale);

    let wire_box = RenderItem::new(
        2,
        scene.materials.id_of(WIRE_FENCE)?,
        box_geo,
        submesh(scene.geometries.get(box_geo), "box")?,
        ring_size,
    )
    .with_world(matrix::translation(3.0, 2.0, -9.0));

    scene.add_render_item("waves", RenderLayer::Transparent, waves)?;
    scene.add_render_item("grid", RenderLayer::Opaque, grid)?;
    scene.add_render_item("box", RenderLayer::AlphaTested, wire_box)?;
    Ok(())
}

/// 构建并冻结场景
pub fn build(config: &SceneConfig, ring_size: usize) -> Result<SceneContent> {
    let waves = Waves::new(
        config.wave_rows,
        config.wave_cols,
        config.wave_spatial_step,
        config.wave_time_step,
        config.wave_speed,
        config.wave_damping,
    );

    let mut scene = Scene::new();
    let water_material = build_materials(&mut scene, ring_size)?;
    build_geometry(&mut scene, &waves)?;
    build_render_items(&mut scene, ring_size)?;
    scene.freeze();

    Ok(SceneContent {
        scene,
        waves,
        water_material,
    })
}
