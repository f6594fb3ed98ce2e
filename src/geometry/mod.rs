//! 几何数据模块
//!
//! # 模块结构
//!
//! - `vertex`: 顶点结构与输入布局
//! - `mesh`: 网格几何记录与子网格绘制参数
//! - `shapes`: 演示场景使用的固定几何

pub mod mesh;
pub mod shapes;
pub mod vertex;

pub use mesh::{IndexFormat, MeshGeometry, PrimitiveTopology, SubmeshGeometry};
pub use vertex::Vertex;
