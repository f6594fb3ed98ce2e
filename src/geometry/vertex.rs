//! 顶点定义模块
//!
//! 定义场景几何使用的顶点结构及其输入布局描述。

use bytemuck::{Pod, Zeroable};
use std::mem::{offset_of, size_of};

/// 场景顶点
///
/// 内存布局与 GPU 兼容，使用 `#[repr(C)]` 保证顺序和对齐。
///
/// # 内存布局
///
/// - pos: 12 bytes (3 * f32)
/// - normal: 12 bytes (3 * f32)
/// - tex_c: 8 bytes (2 * f32)
/// - **总计**: 32 bytes
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// 顶点位置 (x, y, z)
    pub pos: [f32; 3],

    /// 法线向量，应为单位向量
    pub normal: [f32; 3],

    /// 纹理坐标 (u, v)
    pub tex_c: [f32; 2],
}

impl Vertex {
    #[inline]
    pub fn new(pos: [f32; 3], normal: [f32; 3], tex_c: [f32; 2]) -> Self {
        Self { pos, normal, tex_c }
    }

    /// 顶点步长（字节）
    pub const STRIDE: u32 = size_of::<Vertex>() as u32;

    /// 输入布局，交给管线创建使用
    pub const INPUT_LAYOUT: [InputElement; 3] = [
        InputElement {
            semantic: "POSITION",
            format: ElementFormat::Float3,
            offset: offset_of!(Vertex, pos) as u32,
        },
        InputElement {
            semantic: "NORMAL",
            format: ElementFormat::Float3,
            offset: offset_of!(Vertex, normal) as u32,
        },
        InputElement {
            semantic: "TEXCOORD",
            format: ElementFormat::Float2,
            offset: offset_of!(Vertex, tex_c) as u32,
        },
    ];
}

/// 顶点元素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFormat {
    Float2,
    Float3,
}

/// 输入布局中的单个元素（语义索引恒为 0，单一输入槽）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputElement {
    pub semantic: &'static str,
    pub format: ElementFormat,
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout() {
        assert_eq!(Vertex::STRIDE, 32);

        let offsets: Vec<u32> = Vertex::INPUT_LAYOUT.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(Vertex::INPUT_LAYOUT[2].semantic, "TEXCOORD");
    }

    #[test]
    fn test_vertex_bytes() {
        let v = Vertex::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.5, 0.25]);
        let bytes = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytemuck::pod_read_unaligned::<Vertex>(bytes), v);
    }
}
