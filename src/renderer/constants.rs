//! 着色器常量
//!
//! 与 HLSL 中的 cbuffer 和结构化缓冲逐字节对应（`#[repr(C)]`，float4 边界手动补齐）。
//! 矩阵按 nalgebra 的列主序直接上传，HLSL 侧用 `mul(M, v)`。
//!
//! 材质不再逐物体绑定：所有材质放进一个 `StructuredBuffer<MaterialData>`，
//! 物体常量里的 `material_index` 在着色器中索引它。

use bytemuck::{Pod, Zeroable};

use crate::core::math::{matrix, Color, Matrix4};
use crate::scene::{Material, RenderItem};

/// 每个光源的 float4 打包布局
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Light {
    pub strength: [f32; 3],
    /// 仅点光源/聚光灯
    pub falloff_start: f32,
    /// 仅方向光/聚光灯
    pub direction: [f32; 3],
    pub falloff_end: f32,
    pub position: [f32; 3],
    pub spot_power: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            strength: [0.5, 0.5, 0.5],
            falloff_start: 1.0,
            direction: [0.0, -1.0, 0.0],
            falloff_end: 10.0,
            position: [0.0, 0.0, 0.0],
            spot_power: 64.0,
        }
    }
}

impl Light {
    pub fn directional(direction: [f32; 3], strength: [f32; 3]) -> Self {
        Self {
            direction,
            strength,
            ..Self::default()
        }
    }
}

/// 最大光源数，与着色器中的 `MaxLights` 一致
pub const MAX_LIGHTS: usize = 16;

/// 前 3 个为方向光
pub const NUM_DIR_LIGHTS: usize = 3;

/// cbPerObject (b0)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    pub world: [[f32; 4]; 4],
    pub tex_transform: [[f32; 4]; 4],
    /// 材质结构化缓冲中的下标
    pub material_index: u32,
    pub obj_pad: [u32; 3],
}

impl Default for ObjectConstants {
    fn default() -> Self {
        Self {
            world: matrix::to_cb(&Matrix4::identity()),
            tex_transform: matrix::to_cb(&Matrix4::identity()),
            material_index: 0,
            obj_pad: [0; 3],
        }
    }
}

impl ObjectConstants {
    /// `material` 必须是渲染项引用的那个材质
    pub fn new(item: &RenderItem, material: &Material) -> Self {
        Self {
            world: matrix::to_cb(&item.world),
            tex_transform: matrix::to_cb(&item.tex_transform),
            material_index: material.mat_cb_index,
            obj_pad: [0; 3],
        }
    }
}

/// 材质结构化缓冲的元素（t0, space1）
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    pub diffuse_albedo: [f32; 4],
    pub fresnel_r0: [f32; 3],
    pub roughness: f32,
    pub mat_transform: [[f32; 4]; 4],
    pub diffuse_map_index: u32,
    pub mat_pad: [u32; 3],
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            diffuse_albedo: [1.0, 1.0, 1.0, 1.0],
            fresnel_r0: [0.01, 0.01, 0.01],
            roughness: 0.25,
            mat_transform: matrix::to_cb(&Matrix4::identity()),
            diffuse_map_index: 0,
            mat_pad: [0; 3],
        }
    }
}

impl From<&Material> for MaterialData {
    fn from(material: &Material) -> Self {
        Self {
            diffuse_albedo: material.diffuse_albedo,
            fresnel_r0: material.fresnel_r0,
            roughness: material.roughness,
            mat_transform: matrix::to_cb(&material.mat_transform),
            diffuse_map_index: material.diffuse_srv_heap_index,
            mat_pad: [0; 3],
        }
    }
}

/// cbPass (b1)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub eye_pos_w: [f32; 3],
    pub cb_per_object_pad1: f32,
    pub render_target_size: [f32; 2],
    pub inv_render_target_size: [f32; 2],
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: [f32; 4],

    pub fog_color: [f32; 4],
    pub fog_start: f32,
    pub fog_range: f32,
    pub cb_per_object_pad2: [f32; 2],

    /// [0, NUM_DIR_LIGHTS) 为方向光
    pub lights: [Light; MAX_LIGHTS],
}

impl Default for PassConstants {
    fn default() -> Self {
        let identity = matrix::to_cb(&Matrix4::identity());
        Self {
            view: identity,
            inv_view: identity,
            proj: identity,
            inv_proj: identity,
            view_proj: identity,
            inv_view_proj: identity,
            eye_pos_w: [0.0; 3],
            cb_per_object_pad1: 0.0,
            render_target_size: [0.0; 2],
            inv_render_target_size: [0.0; 2],
            near_z: 0.0,
            far_z: 0.0,
            total_time: 0.0,
            delta_time: 0.0,
            ambient_light: [0.0, 0.0, 0.0, 1.0],
            fog_color: Color::LIGHT_STEEL_BLUE.to_array(),
            fog_start: 5.0,
            fog_range: 150.0,
            cb_per_object_pad2: [0.0; 2],
            lights: [Light::default(); MAX_LIGHTS],
        }
    }
}

impl PassConstants {
    /// 由视图和投影矩阵填充全部 6 个矩阵
    pub fn set_view_proj(&mut self, view: &Matrix4, proj: &Matrix4) {
        let view_proj = proj * view;

        self.view = matrix::to_cb(view);
        self.inv_view = matrix::to_cb(&matrix::inverse_or_identity(view));
        self.proj = matrix::to_cb(proj);
        self.inv_proj = matrix::to_cb(&matrix::inverse_or_identity(proj));
        self.view_proj = matrix::to_cb(&view_proj);
        self.inv_view_proj = matrix::to_cb(&matrix::inverse_or_identity(&view_proj));
    }

    pub fn set_render_target_size(&mut self, width: u32, height: u32) {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        self.render_target_size = [w, h];
        self.inv_render_target_size = [1.0 / w, 1.0 / h];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_cbuffer_sizes() {
        assert_eq!(size_of::<Light>(), 48);
        assert_eq!(size_of::<ObjectConstants>(), 144);
        assert_eq!(offset_of!(ObjectConstants, material_index), 128);
        // 结构化缓冲步长，HLSL 端按 16 字节对齐
        assert_eq!(size_of::<MaterialData>(), 112);
        assert_eq!(offset_of!(MaterialData, diffuse_map_index), 96);
        assert_eq!(size_of::<PassConstants>(), 480 + 16 * 48);
    }

    #[test]
    fn test_pass_constants_float4_packing() {
        assert_eq!(offset_of!(PassConstants, eye_pos_w), 384);
        assert_eq!(offset_of!(PassConstants, render_target_size), 400);
        assert_eq!(offset_of!(PassConstants, near_z), 416);
        assert_eq!(offset_of!(PassConstants, ambient_light), 432);
        assert_eq!(offset_of!(PassConstants, fog_color), 448);
        assert_eq!(offset_of!(PassConstants, fog_start), 464);
        assert_eq!(offset_of!(PassConstants, lights), 480);
    }

    #[test]
    fn test_material_data_from_material() {
        let mut material = Material::new("water", 1, 3);
        material.diffuse_albedo = [1.0, 1.0, 1.0, 0.5];
        material.set_tex_offset(0.25, 0.5);

        let constants = MaterialData::from(&material);
        assert_eq!(constants.diffuse_albedo[3], 0.5);
        assert_eq!(constants.diffuse_map_index, 1);
        // 列主序：平移位于第 4 列
        assert_eq!(constants.mat_transform[3][0], 0.25);
        assert_eq!(constants.mat_transform[3][1], 0.5);
    }

    #[test]
    fn test_view_proj_matches_product() {
        let view = matrix::translation(0.0, 0.0, 10.0);
        let proj = matrix::perspective_fov_lh(1.0, 1.0, 1.0, 100.0);

        let mut pass = PassConstants::default();
        pass.set_view_proj(&view, &proj);
        assert_eq!(matrix::from_cb(&pass.view_proj), proj * view);

        let round_trip = matrix::from_cb(&pass.view) * matrix::from_cb(&pass.inv_view);
        assert!((round_trip - Matrix4::identity()).amax() < 1e-5);
    }
}
