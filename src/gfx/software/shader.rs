//! 软件着色器
//!
//! 与 `shaders/default.hlsl` 中的入口一一对应：
//!
//! - `VS` / `PS`：Lambert 漫反射 + 环境光 + 雾
//! - `AlphaTestedPS`：漫反射 alpha 乘以铁丝网图案，小于 0.1 丢弃
//! - `ColorQuadVS` / `ColorQuadPS`：由顶点编号生成全屏四边形，输出层级颜色

use crate::core::math::{matrix, saturate, Matrix4, Vector3, Vector4};
use crate::geometry::Vertex;
use crate::renderer::constants::{MaterialData, ObjectConstants, PassConstants, NUM_DIR_LIGHTS};
use crate::renderer::depth_complexity::{level_color, QUAD_NDC};

use super::raster::{ClipVertex, VARYING_COUNT};

/// alpha 测试阈值
pub const ALPHA_CLIP_THRESHOLD: f32 = 0.1;

/// 铁丝网每个纹理单位内的格子数与线宽
const WIRE_CELLS: f32 = 4.0;
const WIRE_WIDTH: f32 = 0.15;

/// 一次绘制中不变的常量，矩阵已从常量缓冲布局还原
#[derive(Debug, Clone)]
pub struct DrawConstants {
    world: Matrix4,
    tex_transform: Matrix4,
    view_proj: Matrix4,
    mat_transform: Matrix4,
    material: MaterialData,
    pass: PassConstants,
}

impl DrawConstants {
    pub fn new(object: &ObjectConstants, material: &MaterialData, pass: &PassConstants) -> Self {
        Self {
            world: matrix::from_cb(&object.world),
            tex_transform: matrix::from_cb(&object.tex_transform),
            view_proj: matrix::from_cb(&pass.view_proj),
            mat_transform: matrix::from_cb(&material.mat_transform),
            material: *material,
            pass: *pass,
        }
    }
}

/// `frac` 的 HLSL 语义，负数也落在 [0, 1)
fn frac(x: f32) -> f32 {
    x - x.floor()
}

/// 铁丝网图案的 alpha：线上为 1，格子内为 0
pub fn wire_mask(u: f32, v: f32) -> f32 {
    if frac(u * WIRE_CELLS) < WIRE_WIDTH || frac(v * WIRE_CELLS) < WIRE_WIDTH {
        1.0
    } else {
        0.0
    }
}

/// 标准顶点着色器
pub fn standard_vs(vertex: &Vertex, c: &DrawConstants) -> ClipVertex {
    let [px, py, pz] = vertex.pos;
    let pos_w = c.world * Vector4::new(px, py, pz, 1.0);

    // 假设世界矩阵是均匀缩放，否则需要逆转置
    let [nx, ny, nz] = vertex.normal;
    let normal_w = c.world.fixed_view::<3, 3>(0, 0) * Vector3::new(nx, ny, nz);

    let [u, v] = vertex.tex_c;
    let tex_c = c.mat_transform * (c.tex_transform * Vector4::new(u, v, 0.0, 1.0));

    let mut varyings = [0.0; VARYING_COUNT];
    varyings[0..3].copy_from_slice(&[pos_w.x, pos_w.y, pos_w.z]);
    varyings[3..6].copy_from_slice(&[normal_w.x, normal_w.y, normal_w.z]);
    varyings[6..8].copy_from_slice(&[tex_c.x, tex_c.y]);

    ClipVertex {
        position: c.view_proj * pos_w,
        varyings,
    }
}

/// 不透明与透明物体的像素着色器
pub fn standard_ps(varyings: &[f32; VARYING_COUNT], c: &DrawConstants) -> [f32; 4] {
    shade(varyings, c, c.material.diffuse_albedo)
}

/// alpha 测试像素着色器，返回 `None` 表示 clip
pub fn alpha_tested_ps(varyings: &[f32; VARYING_COUNT], c: &DrawConstants) -> Option<[f32; 4]> {
    let mut albedo = c.material.diffuse_albedo;
    albedo[3] *= wire_mask(varyings[6], varyings[7]);
    if albedo[3] - ALPHA_CLIP_THRESHOLD < 0.0 {
        return None;
    }
    Some(shade(varyings, c, albedo))
}

fn shade(varyings: &[f32; VARYING_COUNT], c: &DrawConstants, albedo: [f32; 4]) -> [f32; 4] {
    let pos_w = Vector3::new(varyings[0], varyings[1], varyings[2]);
    let normal = Vector3::new(varyings[3], varyings[4], varyings[5])
        .try_normalize(f32::EPSILON)
        .unwrap_or_else(Vector3::y);

    let pass = &c.pass;
    let eye = Vector3::from(pass.eye_pos_w);
    let dist_to_eye = (eye - pos_w).norm();

    let diffuse = Vector3::new(albedo[0], albedo[1], albedo[2]);
    let ambient = Vector3::new(pass.ambient_light[0], pass.ambient_light[1], pass.ambient_light[2]);
    let mut lit = ambient.component_mul(&diffuse);

    for light in &pass.lights[..NUM_DIR_LIGHTS] {
        let to_light = -Vector3::from(light.direction);
        let n_dot_l = normal.dot(&to_light).max(0.0);
        lit += Vector3::from(light.strength).component_mul(&diffuse) * n_dot_l;
    }

    let fog_amount = saturate((dist_to_eye - pass.fog_start) / pass.fog_range);
    let fog = Vector3::new(pass.fog_color[0], pass.fog_color[1], pass.fog_color[2]);
    let lit = lit.lerp(&fog, fog_amount);

    [lit.x, lit.y, lit.z, albedo[3]]
}

/// 全屏四边形的顶点着色器，只依赖顶点编号
pub fn color_quad_vs(vertex_id: u32) -> ClipVertex {
    let [x, y] = QUAD_NDC[vertex_id as usize % QUAD_NDC.len()];
    ClipVertex {
        position: Vector4::new(x, y, 0.0, 1.0),
        varyings: [0.0; VARYING_COUNT],
    }
}

/// 输出根常量选择的层级颜色
pub fn color_quad_ps(level: u32) -> [f32; 4] {
    level_color(level).to_array()
}
