//! 相机模块
//!
//! - [`Camera`]：持有位置、正交基和透视参数，生成左手系的视图/投影矩阵；
//!   支持第一人称的 walk / strafe / pitch / rotate_y
//! - [`OrbitCamera`]：以球坐标绕原点旋转，驱动 `Camera::look_at`

use nalgebra::{Rotation3, Unit};

use crate::core::math::{self, clamp, constants, matrix, Matrix4, Vector3};

/// 相机
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vector3,
    right: Vector3,
    up: Vector3,
    look: Vector3,

    near_z: f32,
    far_z: f32,
    aspect: f32,
    fov_y: f32,

    view_matrix: Matrix4,
    proj_matrix: Matrix4,

    /// 位置或朝向修改后需要重建视图矩阵
    view_dirty: bool,
}

impl Camera {
    /// 创建相机，视场角 0.25π，近/远裁剪面 1 / 1000
    pub fn new(aspect: f32) -> Self {
        let mut camera = Self {
            position: Vector3::zeros(),
            right: Vector3::x(),
            up: Vector3::y(),
            look: Vector3::z(),
            near_z: 0.0,
            far_z: 0.0,
            aspect: 0.0,
            fov_y: 0.0,
            view_matrix: Matrix4::identity(),
            proj_matrix: Matrix4::identity(),
            view_dirty: true,
        };
        camera.set_lens(constants::QUARTER_PI, aspect, 1.0, 1000.0);
        camera
    }

    // ========== 设置透视投影 ==========

    /// 设置透视投影参数
    ///
    /// # 参数
    /// - `fov_y`: 垂直视场角（弧度）
    /// - `aspect`: 宽高比
    /// - `near_z`: 近裁剪面距离
    /// - `far_z`: 远裁剪面距离
    pub fn set_lens(&mut self, fov_y: f32, aspect: f32, near_z: f32, far_z: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near_z = near_z;
        self.far_z = far_z;

        self.proj_matrix = matrix::perspective_fov_lh(fov_y, aspect, near_z, far_z);
    }

    /// 设置宽高比（窗口尺寸变化时调用）
    pub fn set_aspect(&mut self, aspect: f32) {
        if !math::scalar_near_equal(self.aspect, aspect, f32::EPSILON) {
            self.set_lens(self.fov_y, aspect, self.near_z, self.far_z);
        }
    }

    pub fn near_z(&self) -> f32 {
        self.near_z
    }

    pub fn far_z(&self) -> f32 {
        self.far_z
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn position(&self) -> Vector3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vector3) {
        self.position = position;
        self.view_dirty = true;
    }

    // ========== 相机坐标系向量 ==========

    pub fn right(&self) -> Vector3 {
        self.right
    }

    pub fn up(&self) -> Vector3 {
        self.up
    }

    pub fn look(&self) -> Vector3 {
        self.look
    }

    // ========== 第一人称移动 ==========

    /// 沿 Right 方向平移，正值向右
    pub fn strafe(&mut self, distance: f32) {
        self.position += self.right * distance;
        self.view_dirty = true;
    }

    /// 沿 Look 方向平移，正值向前
    pub fn walk(&mut self, distance: f32) {
        self.position += self.look * distance;
        self.view_dirty = true;
    }

    /// 绕 Right 轴旋转 Up 和 Look（弧度）
    pub fn pitch(&mut self, angle: f32) {
        let rotation = Rotation3::from_axis_angle(&Unit::new_normalize(self.right), angle);

        self.up = (rotation * self.up).normalize();
        self.look = (rotation * self.look).normalize();

        self.view_dirty = true;
    }

    /// 绕世界 Y 轴旋转整个基（弧度）
    pub fn rotate_y(&mut self, angle: f32) {
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), angle);

        self.right = (rotation * self.right).normalize();
        self.up = (rotation * self.up).normalize();
        self.look = (rotation * self.look).normalize();

        self.view_dirty = true;
    }

    // ========== LookAt ==========

    /// 设置相机朝向目标点
    ///
    /// # 参数
    /// - `position`: 相机位置
    /// - `target`: 目标位置
    /// - `world_up`: 世界上向量（通常是 (0, 1, 0)）
    pub fn look_at(&mut self, position: Vector3, target: Vector3, world_up: Vector3) {
        let look = (target - position).normalize();
        let right = world_up.cross(&look).normalize();
        let up = look.cross(&right);

        self.position = position;
        self.look = look;
        self.right = right;
        self.up = up;

        self.view_dirty = true;
    }

    // ========== 获取矩阵 ==========

    /// 获取视图矩阵
    pub fn view_matrix(&mut self) -> Matrix4 {
        self.update_view_matrix();
        self.view_matrix
    }

    /// 获取投影矩阵
    pub fn proj_matrix(&self) -> Matrix4 {
        self.proj_matrix
    }

    /// 位置或朝向修改后重建视图矩阵，并重新正交化相机基
    pub fn update_view_matrix(&mut self) {
        if !self.view_dirty {
            return;
        }

        // 保持相机坐标轴正交归一化
        let look = self.look.normalize();
        let up = look.cross(&self.right).normalize();
        let right = up.cross(&look);

        let p = self.position;
        let x = -p.dot(&right);
        let y = -p.dot(&up);
        let z = -p.dot(&look);

        self.right = right;
        self.up = up;
        self.look = look;

        #[rustfmt::skip]
        let view = Matrix4::new(
            right.x, right.y, right.z, x,
            up.x,    up.y,    up.z,    y,
            look.x,  look.y,  look.z,  z,
            0.0,     0.0,     0.0,     1.0,
        );

        self.view_matrix = view;
        self.view_dirty = false;
    }
}

/// 轨道相机
///
/// 球坐标 (radius, theta, phi)，phi 限制在 [0.1, π-0.1]，半径限制在 [5, 150]。
#[derive(Debug, Clone, Copy)]
pub struct OrbitCamera {
    radius: f32,
    theta: f32,
    phi: f32,
}

impl OrbitCamera {
    pub const MIN_PHI: f32 = 0.1;
    pub const MAX_PHI: f32 = constants::PI - 0.1;
    pub const MIN_RADIUS: f32 = 5.0;
    pub const MAX_RADIUS: f32 = 150.0;

    pub fn new(radius: f32, theta: f32, phi: f32) -> Self {
        Self {
            radius: clamp(radius, Self::MIN_RADIUS, Self::MAX_RADIUS),
            theta,
            phi: clamp(phi, Self::MIN_PHI, Self::MAX_PHI),
        }
    }

    /// 调整球坐标角度，结果按范围截断
    pub fn rotate(&mut self, d_theta: f32, d_phi: f32) {
        self.theta += d_theta;
        self.phi = clamp(self.phi + d_phi, Self::MIN_PHI, Self::MAX_PHI);
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn phi(&self) -> f32 {
        self.phi
    }

    /// 眼睛位置（笛卡尔坐标）
    pub fn eye_position(&self) -> Vector3 {
        math::spherical_to_cartesian(self.radius, self.theta, self.phi)
    }

    /// 把当前位置写入相机，始终看向原点
    pub fn apply(&self, camera: &mut Camera) {
        camera.look_at(self.eye_position(), Vector3::zeros(), Vector3::y());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::{vector_near_equal, Vector4};

    #[test]
    fn test_orbit_limits() {
        let mut orbit = OrbitCamera::new(500.0, 0.0, 0.0);
        assert_eq!(orbit.radius(), OrbitCamera::MAX_RADIUS);
        assert_eq!(orbit.phi(), OrbitCamera::MIN_PHI);

        orbit.rotate(1.0, 10.0);
        assert_eq!(orbit.phi(), OrbitCamera::MAX_PHI);

        let near = OrbitCamera::new(1.0, 0.0, 1.0);
        assert_eq!(near.radius(), OrbitCamera::MIN_RADIUS);
    }

    #[test]
    fn test_eye_distance_matches_radius() {
        let orbit = OrbitCamera::new(50.0, 1.5 * constants::PI, 0.2 * constants::PI);
        assert!((orbit.eye_position().norm() - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_view_matrix_centres_target() {
        let mut camera = Camera::new(4.0 / 3.0);
        let orbit = OrbitCamera::new(50.0, 1.5 * constants::PI, 0.2 * constants::PI);
        orbit.apply(&mut camera);

        let view = camera.view_matrix();
        let origin = view * Vector4::new(0.0, 0.0, 0.0, 1.0);
        let expected = Vector3::new(0.0, 0.0, 50.0);
        assert!(vector_near_equal(&origin.xyz(), &expected, &Vector3::repeat(1e-3)));

        // 与 nalgebra 的左手系 look_at 一致
        let reference = matrix::look_at_lh(&orbit.eye_position(), &Vector3::zeros(), &Vector3::y());
        assert!((view - reference).amax() < 1e-4);
    }

    fn assert_orthonormal(camera: &Camera) {
        let (r, u, l) = (camera.right(), camera.up(), camera.look());
        for v in [r, u, l] {
            assert!((v.norm() - 1.0).abs() < 1e-5);
        }
        assert!(r.dot(&u).abs() < 1e-5);
        assert!(u.dot(&l).abs() < 1e-5);
        assert!(l.dot(&r).abs() < 1e-5);
        // 左手系：right × up = look
        assert!(vector_near_equal(&r.cross(&u), &l, &Vector3::repeat(1e-5)));
    }

    #[test]
    fn test_walk_and_strafe_follow_basis() {
        let mut camera = Camera::new(1.0);
        camera.look_at(Vector3::new(0.0, 2.0, -15.0), Vector3::new(0.0, 2.0, 0.0), Vector3::y());

        camera.walk(5.0);
        assert!(vector_near_equal(&camera.position(), &Vector3::new(0.0, 2.0, -10.0), &Vector3::repeat(1e-5)));

        camera.strafe(-3.0);
        assert!(vector_near_equal(&camera.position(), &Vector3::new(-3.0, 2.0, -10.0), &Vector3::repeat(1e-5)));

        // 视图矩阵把眼睛变换到原点
        let eye = camera.position();
        let view = camera.view_matrix();
        let p = view * Vector4::new(eye.x, eye.y, eye.z, 1.0);
        assert!(p.xyz().norm() < 1e-4);
    }

    #[test]
    fn test_pitch_keeps_basis_orthonormal() {
        let mut camera = Camera::new(1.0);
        let right = camera.right();

        for _ in 0..20 {
            camera.pitch(0.37);
            camera.update_view_matrix();
        }
        assert_orthonormal(&camera);
        // 俯仰不改变 right
        assert!(vector_near_equal(&camera.right(), &right, &Vector3::repeat(1e-4)));
    }

    #[test]
    fn test_rotate_y_turns_look_around_world_up() {
        let mut camera = Camera::new(1.0);
        camera.rotate_y(constants::PI / 2.0);
        camera.update_view_matrix();

        assert_orthonormal(&camera);
        // +Z 绕 Y 轴转 90° 落到水平面的 X 轴上
        assert!(camera.look().y.abs() < 1e-5);
        assert!((camera.look().x.abs() - 1.0).abs() < 1e-5);
        assert!(vector_near_equal(&camera.up(), &Vector3::y(), &Vector3::repeat(1e-5)));
    }

    #[test]
    fn test_set_position_marks_view_dirty() {
        let mut camera = Camera::new(1.0);
        let before = camera.view_matrix();
        camera.set_position(Vector3::new(1.0, 2.0, 3.0));
        let after = camera.view_matrix();
        assert_eq!(after[(0, 3)], -1.0);
        assert_ne!(before, after);
    }

    #[test]
    fn test_set_aspect_rebuilds_projection() {
        let mut camera = Camera::new(1.0);
        let before = camera.proj_matrix();
        camera.set_aspect(2.0);
        assert_eq!(camera.aspect(), 2.0);
        assert!((camera.proj_matrix()[(0, 0)] - before[(0, 0)] / 2.0).abs() < 1e-6);
        assert_eq!(camera.near_z(), 1.0);
        assert_eq!(camera.far_z(), 1000.0);
    }
}
