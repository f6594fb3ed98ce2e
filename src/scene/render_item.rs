use crate::core::math::Matrix4;
use crate::geometry::{MeshGeometry, PrimitiveTopology, SubmeshGeometry};

use super::dirty::DirtyFrames;
use super::material::Material;
use super::table::Id;

/// 可见性层，绘制顺序即声明顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    Opaque,
    AlphaTested,
    Transparent,
}

impl RenderLayer {
    /// 按绘制顺序排列的所有层
    pub const ALL: [RenderLayer; 3] = [
        RenderLayer::Opaque,
        RenderLayer::AlphaTested,
        RenderLayer::Transparent,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            RenderLayer::Opaque => "opaque",
            RenderLayer::AlphaTested => "alphaTested",
            RenderLayer::Transparent => "transparent",
        }
    }
}

/// 渲染项
///
/// 由场景的渲染项列表独占；各层的绘制列表只保存 [`Id<RenderItem>`]。
/// 材质和几何通过表 id 引用，所有权留在各自的表中。
#[derive(Debug)]
pub struct RenderItem {
    pub world: Matrix4,
    pub tex_transform: Matrix4,
    pub dirty: DirtyFrames,

    /// 物体常量缓冲中的下标
    pub obj_cb_index: u32,

    pub material: Id<Material>,
    pub geometry: Id<MeshGeometry>,

    pub topology: PrimitiveTopology,
    pub index_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: i32,
}

impl RenderItem {
    /// 用子网格的绘制参数创建渲染项，世界与纹理变换为单位矩阵
    pub fn new(
        obj_cb_index: u32,
        material: Id<Material>,
        geometry: Id<MeshGeometry>,
        submesh: SubmeshGeometry,
        ring_size: usize,
    ) -> Self {
        Self {
            world: Matrix4::identity(),
            tex_transform: Matrix4::identity(),
            dirty: DirtyFrames::new(ring_size),
            obj_cb_index,
            material,
            geometry,
            topology: PrimitiveTopology::TriangleList,
            index_count: submesh.index_count,
            start_index_location: submesh.start_index_location,
            base_vertex_location: submesh.base_vertex_location,
        }
    }

    pub fn with_world(mut self, world: Matrix4) -> Self {
        self.world = world;
        self
    }

    pub fn with_tex_transform(mut self, tex_transform: Matrix4) -> Self {
        self.tex_transform = tex_transform;
        self
    }
}
