//! 场景固定几何
//!
//! 只提供演示场景需要的平面网格和立方体，不是通用的网格生成器。

use super::vertex::Vertex;

/// m 行 n 列网格的三角形索引，每个四边形两个三角形
///
/// 行号沿 -z 递增，列号沿 +x 递增，从上方看为顺时针。
pub fn grid_indices(m: usize, n: usize) -> Vec<u16> {
    let mut indices = Vec::with_capacity(6 * (m.saturating_sub(1)) * (n.saturating_sub(1)));
    for i in 0..m.saturating_sub(1) {
        for j in 0..n.saturating_sub(1) {
            let idx = |r: usize, c: usize| (r * n + c) as u16;
            indices.extend_from_slice(&[
                idx(i, j),
                idx(i, j + 1),
                idx(i + 1, j),
                idx(i + 1, j),
                idx(i, j + 1),
                idx(i + 1, j + 1),
            ]);
        }
    }
    indices
}

/// xz 平面上居中的网格
///
/// # 参数
///
/// * `width` / `depth` - x / z 方向尺寸
/// * `m` / `n` - 行数 / 列数（顶点数）
pub fn grid(width: f32, depth: f32, m: usize, n: usize) -> (Vec<Vertex>, Vec<u16>) {
    let half_width = 0.5 * width;
    let half_depth = 0.5 * depth;

    let dx = width / (n - 1) as f32;
    let dz = depth / (m - 1) as f32;
    let du = 1.0 / (n - 1) as f32;
    let dv = 1.0 / (m - 1) as f32;

    let mut vertices = Vec::with_capacity(m * n);
    for i in 0..m {
        let z = half_depth - i as f32 * dz;
        for j in 0..n {
            let x = -half_width + j as f32 * dx;
            vertices.push(Vertex::new(
                [x, 0.0, z],
                [0.0, 1.0, 0.0],
                [j as f32 * du, i as f32 * dv],
            ));
        }
    }

    (vertices, grid_indices(m, n))
}

/// 以原点为中心的立方体，每个面 4 个顶点
pub fn cube(width: f32, height: f32, depth: f32) -> (Vec<Vertex>, Vec<u16>) {
    let (w, h, d) = (0.5 * width, 0.5 * height, 0.5 * depth);

    // (位置, 法线, 纹理坐标)，每个面按顺时针给出
    #[rustfmt::skip]
    let faces: [[([f32; 3], [f32; 2]); 4]; 6] = [
        // 前 (-z)
        [([-w, -h, -d], [0.0, 1.0]), ([-w, h, -d], [0.0, 0.0]), ([w, h, -d], [1.0, 0.0]), ([w, -h, -d], [1.0, 1.0])],
        // 后 (+z)
        [([-w, -h, d], [1.0, 1.0]), ([w, -h, d], [0.0, 1.0]), ([w, h, d], [0.0, 0.0]), ([-w, h, d], [1.0, 0.0])],
        // 上 (+y)
        [([-w, h, -d], [0.0, 1.0]), ([-w, h, d], [0.0, 0.0]), ([w, h, d], [1.0, 0.0]), ([w, h, -d], [1.0, 1.0])],
        // 下 (-y)
        [([-w, -h, -d], [1.0, 1.0]), ([w, -h, -d], [0.0, 1.0]), ([w, -h, d], [0.0, 0.0]), ([-w, -h, d], [1.0, 0.0])],
        // 左 (-x)
        [([-w, -h, d], [0.0, 1.0]), ([-w, h, d], [0.0, 0.0]), ([-w, h, -d], [1.0, 0.0]), ([-w, -h, -d], [1.0, 1.0])],
        // 右 (+x)
        [([w, -h, -d], [0.0, 1.0]), ([w, h, -d], [0.0, 0.0]), ([w, h, d], [1.0, 0.0]), ([w, -h, d], [1.0, 1.0])],
    ];
    let normals: [[f32; 3]; 6] = [
        [0.0, 0.0, -1.0],
        [0.0, 0.0, 1.0],
        [0.0, 1.0, 0.0],
        [0.0, -1.0, 0.0],
        [-1.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
    ];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, normal) in faces.iter().zip(normals) {
        let base = vertices.len() as u16;
        vertices.extend(face.iter().map(|&(pos, tex_c)| Vertex::new(pos, normal, tex_c)));
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}
