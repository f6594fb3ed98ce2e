//! 波浪模拟
//!
//! 在 m×n 网格上用有限差分求解带阻尼的二维波动方程。
//! 只有累计时间超过时间步长才推进一次，保证数值稳定。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::math::Vector3;
use crate::geometry::Vertex;

/// 波浪网格
#[derive(Debug, Clone)]
pub struct Waves {
    num_rows: usize,
    num_cols: usize,

    // 模拟常量
    k1: f32,
    k2: f32,
    k3: f32,

    time_step: f32,
    spatial_step: f32,

    /// 距离上一次推进累计的时间
    accumulated: f32,

    prev_solution: Vec<Vector3>,
    curr_solution: Vec<Vector3>,
    normals: Vec<Vector3>,
}

impl Waves {
    /// 创建波浪网格
    ///
    /// # 参数
    ///
    /// * `m` / `n` - 行数 / 列数
    /// * `dx` - 网格间距
    /// * `dt` - 时间步长
    /// * `speed` - 波速
    /// * `damping` - 阻尼
    pub fn new(m: usize, n: usize, dx: f32, dt: f32, speed: f32, damping: f32) -> Self {
        let d = damping * dt + 2.0;
        let e = (speed * speed) * (dt * dt) / (dx * dx);
        let k1 = (damping * dt - 2.0) / d;
        let k2 = (4.0 - 8.0 * e) / d;
        let k3 = (2.0 * e) / d;

        let half_width = (n - 1) as f32 * dx * 0.5;
        let half_depth = (m - 1) as f32 * dx * 0.5;

        let mut positions = Vec::with_capacity(m * n);
        for i in 0..m {
            let z = half_depth - i as f32 * dx;
            for j in 0..n {
                let x = -half_width + j as f32 * dx;
                positions.push(Vector3::new(x, 0.0, z));
            }
        }

        Self {
            num_rows: m,
            num_cols: n,
            k1,
            k2,
            k3,
            time_step: dt,
            spatial_step: dx,
            accumulated: 0.0,
            prev_solution: positions.clone(),
            curr_solution: positions,
            normals: vec![Vector3::y(); m * n],
        }
    }

    pub fn row_count(&self) -> usize {
        self.num_rows
    }

    pub fn column_count(&self) -> usize {
        self.num_cols
    }

    pub fn vertex_count(&self) -> usize {
        self.num_rows * self.num_cols
    }

    pub fn triangle_count(&self) -> usize {
        (self.num_rows - 1) * (self.num_cols - 1) * 2
    }

    pub fn width(&self) -> f32 {
        self.num_cols as f32 * self.spatial_step
    }

    pub fn depth(&self) -> f32 {
        self.num_rows as f32 * self.spatial_step
    }

    pub fn position(&self, i: usize) -> Vector3 {
        self.curr_solution[i]
    }

    pub fn normal(&self, i: usize) -> Vector3 {
        self.normals[i]
    }

    /// 推进模拟
    ///
    /// # 返回值
    ///
    /// 本次调用是否真正推进了一步
    pub fn update(&mut self, dt: f32) -> bool {
        self.accumulated += dt;
        if self.accumulated < self.time_step {
            return false;
        }

        let n = self.num_cols;
        // 边界保持为 0
        for i in 1..self.num_rows - 1 {
            for j in 1..n - 1 {
                // 用下一时刻的解覆盖上一时刻的解，之后交换
                let next = self.k1 * self.prev_solution[i * n + j].y
                    + self.k2 * self.curr_solution[i * n + j].y
                    + self.k3
                        * (self.curr_solution[(i + 1) * n + j].y
                            + self.curr_solution[(i - 1) * n + j].y
                            + self.curr_solution[i * n + j + 1].y
                            + self.curr_solution[i * n + j - 1].y);
                self.prev_solution[i * n + j].y = next;
            }
        }

        std::mem::swap(&mut self.prev_solution, &mut self.curr_solution);
        self.accumulated = 0.0;

        // 中心差分求法线
        for i in 1..self.num_rows - 1 {
            for j in 1..n - 1 {
                let l = self.curr_solution[i * n + j - 1].y;
                let r = self.curr_solution[i * n + j + 1].y;
                let t = self.curr_solution[(i - 1) * n + j].y;
                let b = self.curr_solution[(i + 1) * n + j].y;

                self.normals[i * n + j] =
                    Vector3::new(-r + l, 2.0 * self.spatial_step, b - t).normalize();
            }
        }

        true
    }

    /// 在 (i, j) 处施加扰动，相邻四点各加一半
    ///
    /// 要求 1 < i < rows-2 且 1 < j < cols-2。
    pub fn disturb(&mut self, i: usize, j: usize, magnitude: f32) {
        assert!(i > 1 && i < self.num_rows - 2, "disturb row {} out of range", i);
        assert!(j > 1 && j < self.num_cols - 2, "disturb column {} out of range", j);

        let n = self.num_cols;
        let half_mag = 0.5 * magnitude;

        self.curr_solution[i * n + j].y += magnitude;
        self.curr_solution[i * n + j + 1].y += half_mag;
        self.curr_solution[i * n + j - 1].y += half_mag;
        self.curr_solution[(i + 1) * n + j].y += half_mag;
        self.curr_solution[(i - 1) * n + j].y += half_mag;
    }

    /// 当前解对应的顶点，纹理坐标把 [-w/2, w/2] 映射到 [0, 1]
    pub fn vertex(&self, i: usize) -> Vertex {
        let pos = self.position(i);
        let normal = self.normal(i);
        Vertex::new(
            pos.into(),
            normal.into(),
            [0.5 + pos.x / self.width(), 0.5 - pos.z / self.depth()],
        )
    }
}

/// 周期性随机扰动
///
/// 上一次扰动的时间 `t_base` 是扰动器自身的状态，由调用方持有。
#[derive(Debug)]
pub struct WaveDisturber {
    t_base: f32,
    interval: f32,
    rng: StdRng,
}

/// 一次扰动的位置与幅度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Disturbance {
    pub row: usize,
    pub col: usize,
    pub magnitude: f32,
}

impl WaveDisturber {
    pub fn new(interval: f32, seed: u64) -> Self {
        Self {
            t_base: 0.0,
            interval,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 距离上次扰动满一个间隔时，在内部随机取点扰动一次
    ///
    /// 行列取自 [4, rows-5] / [4, cols-5]，幅度取自 [0.2, 0.5]。
    pub fn update(&mut self, total_time: f32, waves: &mut Waves) -> Option<Disturbance> {
        if total_time - self.t_base < self.interval {
            return None;
        }
        self.t_base += self.interval;

        let row = self.rng.gen_range(4..=waves.row_count() - 5);
        let col = self.rng.gen_range(4..=waves.column_count() - 5);
        let magnitude = self.rng.gen_range(0.2..=0.5);

        waves.disturb(row, col, magnitude);
        Some(Disturbance { row, col, magnitude })
    }
}
