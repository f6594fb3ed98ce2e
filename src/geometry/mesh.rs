//! 网格几何记录
//!
//! CPU 侧的顶点/索引数据，以及按名称索引的子网格绘制参数。
//! GPU 侧缓冲由 `renderer::dispatch::upload_scene_geometry` 写入后端分配的上传堆，按几何 id 的下标排列。

use std::collections::BTreeMap;
use std::mem::size_of;

use super::vertex::Vertex;

/// 子网格绘制参数
///
/// 对应一次 `DrawIndexedInstanced` 的 (index count, start index, base vertex) 三元组。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmeshGeometry {
    pub index_count: u32,
    pub start_index_location: u32,
    pub base_vertex_location: i32,
}

/// 图元拓扑
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
}

/// 索引格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    /// 16 位无符号索引（R16_UINT）
    U16,
}

impl IndexFormat {
    /// 单个索引的字节数
    pub fn byte_size(&self) -> u32 {
        match self {
            IndexFormat::U16 => size_of::<u16>() as u32,
        }
    }
}

/// 网格几何
#[derive(Debug, Clone)]
pub struct MeshGeometry {
    /// 名称，用于按名称查找
    pub name: String,

    /// CPU 侧顶点数据；动态几何为 `None`，顶点缓冲在每个帧资源中
    pub vertices: Option<Vec<Vertex>>,

    /// CPU 侧索引数据
    pub indices: Vec<u16>,

    pub vertex_byte_stride: u32,
    pub vertex_buffer_byte_size: u32,
    pub index_format: IndexFormat,
    pub index_buffer_byte_size: u32,

    /// 按名称索引的子网格
    pub draw_args: BTreeMap<String, SubmeshGeometry>,
}

impl MeshGeometry {
    /// 创建静态几何，顶点数据随几何一起上传
    pub fn new_static(name: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u16>) -> Self {
        let vertex_buffer_byte_size = (vertices.len() * size_of::<Vertex>()) as u32;
        Self::build(name.into(), Some(vertices), vertex_buffer_byte_size, indices)
    }

    /// 创建动态几何，只上传索引；顶点由每帧写入帧资源中的动态缓冲
    pub fn new_dynamic(name: impl Into<String>, vertex_count: usize, indices: Vec<u16>) -> Self {
        let vertex_buffer_byte_size = (vertex_count * size_of::<Vertex>()) as u32;
        Self::build(name.into(), None, vertex_buffer_byte_size, indices)
    }

    fn build(name: String, vertices: Option<Vec<Vertex>>, vb_size: u32, indices: Vec<u16>) -> Self {
        let index_format = IndexFormat::U16;
        Self {
            name,
            vertices,
            index_buffer_byte_size: indices.len() as u32 * index_format.byte_size(),
            indices,
            vertex_byte_stride: Vertex::STRIDE,
            vertex_buffer_byte_size: vb_size,
            index_format,
            draw_args: BTreeMap::new(),
        }
    }

    /// 顶点是否位于帧资源中
    pub fn is_dynamic(&self) -> bool {
        self.vertices.is_none()
    }

    /// 注册覆盖全部索引的子网格
    pub fn with_whole_submesh(self, submesh_name: impl Into<String>) -> Self {
        let index_count = self.indices.len() as u32;
        self.with_submesh(submesh_name, index_count, 0, 0)
    }

    /// 注册一段索引区间作为子网格，多个物体可以共用同一组缓冲
    pub fn with_submesh(
        mut self,
        submesh_name: impl Into<String>,
        index_count: u32,
        start_index_location: u32,
        base_vertex_location: i32,
    ) -> Self {
        let submesh = SubmeshGeometry {
            index_count,
            start_index_location,
            base_vertex_location,
        };
        self.draw_args.insert(submesh_name.into(), submesh);
        self
    }

    /// 按名称查找子网格
    pub fn submesh(&self, name: &str) -> Option<SubmeshGeometry> {
        self.draw_args.get(name).copied()
    }

    /// 顶点数据的字节视图
    pub fn vertex_bytes(&self) -> Option<&[u8]> {
        self.vertices.as_deref().map(bytemuck::cast_slice)
    }

    /// 索引数据的字节视图
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_geometry_sizes() {
        let vertices = vec![Vertex::default(); 4];
        let geo = MeshGeometry::new_static("quad", vertices, vec![0, 1, 2, 0, 2, 3])
            .with_whole_submesh("quad");

        assert!(!geo.is_dynamic());
        assert_eq!(geo.vertex_buffer_byte_size, 128);
        assert_eq!(geo.index_buffer_byte_size, 12);
        assert_eq!(geo.vertex_bytes().map(|b| b.len()), Some(128));
        assert_eq!(geo.index_bytes().len(), 12);
        assert_eq!(
            geo.submesh("quad"),
            Some(SubmeshGeometry { index_count: 6, start_index_location: 0, base_vertex_location: 0 })
        );
        assert_eq!(geo.submesh("missing"), None);
    }

    #[test]
    fn test_dynamic_geometry_has_no_cpu_vertices() {
        let geo = MeshGeometry::new_dynamic("waterGeo", 9, vec![0, 1, 3]);
        assert!(geo.is_dynamic());
        assert!(geo.vertex_bytes().is_none());
        assert_eq!(geo.vertex_buffer_byte_size, 9 * 32);
    }
}
