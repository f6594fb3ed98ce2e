//! 起伏地形的高度与法线

use crate::core::math::Vector3;
use crate::geometry::Vertex;

/// 高度 `0.3 (z sin 0.1x + x cos 0.1z)`
pub fn hills_height(x: f32, z: f32) -> f32 {
    0.3 * (z * (0.1 * x).sin() + x * (0.1 * z).cos())
}

/// 由偏导数得到的单位法线
///
/// n = (-df/dx, 1, -df/dz)
pub fn hills_normal(x: f32, z: f32) -> Vector3 {
    let n = Vector3::new(
        -0.03 * z * (0.1 * x).cos() - 0.3 * (0.1 * z).cos(),
        1.0,
        -0.3 * (0.1 * x).sin() + 0.03 * x * (0.1 * z).sin(),
    );
    n.normalize()
}

/// 把平面网格的顶点抬升到地形上，并替换法线
pub fn raise_to_hills(vertices: &mut [Vertex]) {
    for v in vertices {
        let [x, _, z] = v.pos;
        v.pos[1] = hills_height(x, z);
        let n = hills_normal(x, z);
        v.normal = [n.x, n.y, n.z];
    }
}
