//! 场景模块
//!
//! 场景由三张拥有型表组成：材质、几何、渲染项。渲染项通过 id 引用材质和几何，
//! 每个可见性层只保存渲染项 id，绘制顺序为层顺序再按插入顺序。
//!
//! 初始化阶段单线程填充，完成后调用 [`Scene::freeze`]。

pub mod camera;
pub mod dirty;
pub mod land;
pub mod material;
pub mod render_item;
pub mod table;
pub mod waves;

pub use camera::{Camera, OrbitCamera};
pub use dirty::DirtyFrames;
pub use material::Material;
pub use render_item::{RenderItem, RenderLayer};
pub use table::{Id, Table};
pub use waves::{WaveDisturber, Waves};

use crate::core::error::Result;
use crate::geometry::MeshGeometry;

/// 场景
#[derive(Debug, Default)]
pub struct Scene {
    pub materials: Table<Material>,
    pub geometries: Table<MeshGeometry>,
    pub render_items: Table<RenderItem>,
    layers: [Vec<Id<RenderItem>>; 3],
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_material(&mut self, material: Material) -> Result<Id<Material>> {
        let name = material.name.clone();
        self.materials.insert(name, material)
    }

    pub fn add_geometry(&mut self, geometry: MeshGeometry) -> Result<Id<MeshGeometry>> {
        let name = geometry.name.clone();
        self.geometries.insert(name, geometry)
    }

    /// 添加渲染项并挂到指定层的末尾
    pub fn add_render_item(
        &mut self,
        name: &str,
        layer: RenderLayer,
        item: RenderItem,
    ) -> Result<Id<RenderItem>> {
        let id = self.render_items.insert(name, item)?;
        self.layers[layer.index()].push(id);
        Ok(id)
    }

    /// 某一层的渲染项，按插入顺序
    pub fn layer(&self, layer: RenderLayer) -> &[Id<RenderItem>] {
        &self.layers[layer.index()]
    }

    /// 初始化完成，之后所有表都不再接受插入
    pub fn freeze(&mut self) {
        self.materials.freeze();
        self.geometries.freeze();
        self.render_items.freeze();
    }
}
