use crate::core::math::Matrix4;

use super::dirty::DirtyFrames;

/// 材质
///
/// 由材质表持有，动画逻辑原地修改后调用 [`Material::touch`] 标记为脏。
#[derive(Debug)]
pub struct Material {
    pub name: String,

    /// 材质常量缓冲中的下标
    pub mat_cb_index: u32,

    /// 漫反射纹理在 SRV 堆中的下标
    pub diffuse_srv_heap_index: u32,

    pub diffuse_albedo: [f32; 4],
    pub fresnel_r0: [f32; 3],
    pub roughness: f32,

    /// 纹理坐标变换（用于滚动水面）
    pub mat_transform: Matrix4,

    pub dirty: DirtyFrames,
}

impl Material {
    pub fn new(name: impl Into<String>, mat_cb_index: u32, ring_size: usize) -> Self {
        Self {
            name: name.into(),
            mat_cb_index,
            diffuse_srv_heap_index: mat_cb_index,
            diffuse_albedo: [1.0, 1.0, 1.0, 1.0],
            fresnel_r0: [0.01, 0.01, 0.01],
            roughness: 0.25,
            mat_transform: Matrix4::identity(),
            dirty: DirtyFrames::new(ring_size),
        }
    }

    /// 数据已修改，接下来 N 帧都要刷新
    pub fn touch(&mut self) {
        self.dirty.mark();
    }

    /// 纹理平移量 (tu, tv)
    pub fn tex_offset(&self) -> (f32, f32) {
        (self.mat_transform[(0, 3)], self.mat_transform[(1, 3)])
    }

    /// 设置纹理平移量，并标记为脏
    pub fn set_tex_offset(&mut self, tu: f32, tv: f32) {
        self.mat_transform[(0, 3)] = tu;
        self.mat_transform[(1, 3)] = tv;
        self.touch();
    }
}
