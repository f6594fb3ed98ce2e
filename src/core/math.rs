//! 数学库模块
//!
//! 基于 `nalgebra`，补充 Direct3D 风格（左手系、深度范围 [0,1]）的矩阵构造函数。
//!
//! # 约定
//!
//! - 使用列向量：`clip = proj * view * world * p`
//! - 矩阵按 nalgebra 的列主序直接写入常量缓冲，HLSL 端以 `mul(M, v)` 使用
//! - 屏幕坐标 y 轴向下，顺时针三角形为正面

pub use nalgebra::{Point3, Vector2 as Vec2, Vector3 as Vec3, Vector4 as Vec4};

// 类型别名，使用更简洁的名称
pub type Vector2 = Vec2<f32>;
pub type Vector3 = Vec3<f32>;
pub type Vector4 = Vec4<f32>;
pub type Matrix4 = nalgebra::Matrix4<f32>;

/// 颜色类型（RGBA，范围 0.0-1.0）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// 创建新的颜色
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// 创建 RGB 颜色（alpha = 1.0）
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::new(r, g, b, 1.0)
    }

    /// 转为常量缓冲使用的数组
    pub const fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// 转为 8 位 RGBA，超出 [0,1] 的分量被截断
    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |c: f32| (saturate(c) * 255.0 + 0.5) as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 1.0, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const YELLOW: Color = Color::rgb(1.0, 1.0, 0.0);
    pub const LIGHT_STEEL_BLUE: Color = Color::rgb(0.690_196_1, 0.768_627_5, 0.870_588_3);
}

impl From<[f32; 4]> for Color {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// 数学常量
pub mod constants {
    /// π
    pub const PI: f32 = std::f32::consts::PI;

    /// π/4，默认的垂直视场角
    pub const QUARTER_PI: f32 = std::f32::consts::FRAC_PI_4;
}

/// 限制值在范围内
pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// 饱和函数（限制在 0.0-1.0）
pub fn saturate(value: f32) -> f32 {
    clamp(value, 0.0, 1.0)
}

/// 标量近似相等：`|a - b| <= epsilon`
pub fn scalar_near_equal(a: f32, b: f32, epsilon: f32) -> bool {
    (a - b).abs() <= epsilon
}

/// 三维向量逐分量近似相等
pub fn vector_near_equal(a: &Vector3, b: &Vector3, epsilon: &Vector3) -> bool {
    (0..3).all(|i| scalar_near_equal(a[i], b[i], epsilon[i]))
}

/// 球坐标转笛卡尔坐标（y 轴向上）
///
/// # 参数
///
/// * `radius` - 半径
/// * `theta` - 绕 y 轴的方位角
/// * `phi` - 与 +y 轴的夹角
pub fn spherical_to_cartesian(radius: f32, theta: f32, phi: f32) -> Vector3 {
    Vector3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.cos(),
        radius * phi.sin() * theta.sin(),
    )
}

/// 矩阵辅助函数
pub mod matrix {
    use super::*;

    /// 平移矩阵
    pub fn translation(x: f32, y: f32, z: f32) -> Matrix4 {
        Matrix4::new_translation(&Vector3::new(x, y, z))
    }

    /// 缩放矩阵
    pub fn scaling(x: f32, y: f32, z: f32) -> Matrix4 {
        Matrix4::new_nonuniform_scaling(&Vector3::new(x, y, z))
    }

    /// 左手系透视投影，深度映射到 [0, 1]
    ///
    /// # 参数
    ///
    /// * `fov_y` - 垂直视场角（弧度）
    /// * `aspect` - 宽高比
    /// * `near_z` / `far_z` - 近/远裁剪面
    pub fn perspective_fov_lh(fov_y: f32, aspect: f32, near_z: f32, far_z: f32) -> Matrix4 {
        let y_scale = 1.0 / (0.5 * fov_y).tan();
        let x_scale = y_scale / aspect;
        let range = far_z / (far_z - near_z);

        #[rustfmt::skip]
        let proj = Matrix4::new(
            x_scale, 0.0,     0.0,   0.0,
            0.0,     y_scale, 0.0,   0.0,
            0.0,     0.0,     range, -range * near_z,
            0.0,     0.0,     1.0,   0.0,
        );
        proj
    }

    /// 左手系观察矩阵
    pub fn look_at_lh(eye: &Vector3, target: &Vector3, up: &Vector3) -> Matrix4 {
        Matrix4::look_at_lh(&Point3::from(*eye), &Point3::from(*target), up)
    }

    /// 求逆，不可逆时返回单位矩阵
    pub fn inverse_or_identity(m: &Matrix4) -> Matrix4 {
        m.try_inverse().unwrap_or_else(Matrix4::identity)
    }

    /// 转为常量缓冲中的 float4x4（列主序）
    pub fn to_cb(m: &Matrix4) -> [[f32; 4]; 4] {
        (*m).into()
    }

    /// 从常量缓冲中的 float4x4 还原
    pub fn from_cb(m: &[[f32; 4]; 4]) -> Matrix4 {
        Matrix4::from(*m)
    }
}
