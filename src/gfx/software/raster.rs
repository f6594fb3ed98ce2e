//! 三角形光栅化
//!
//! - 近平面裁剪（D3D 裁剪空间 z >= 0）
//! - 透视除法与视口变换，屏幕 y 轴向下
//! - 像素中心采样，D3D 的 top-left 填充规则
//! - 深度按屏幕空间线性插值，其余属性做透视校正

use crate::core::math::Vector4;
use crate::renderer::pipeline::RasterizerDesc;

/// 插值属性个数：世界坐标 3 + 法线 3 + 纹理坐标 2
pub const VARYING_COUNT: usize = 8;

/// 顶点着色器输出
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVertex {
    pub position: Vector4,
    pub varyings: [f32; VARYING_COUNT],
}

impl ClipVertex {
    fn lerp(&self, other: &ClipVertex, t: f32) -> ClipVertex {
        let mut varyings = [0.0; VARYING_COUNT];
        for (i, v) in varyings.iter_mut().enumerate() {
            *v = self.varyings[i] + (other.varyings[i] - self.varyings[i]) * t;
        }
        ClipVertex {
            position: self.position.lerp(&other.position, t),
            varyings,
        }
    }
}

/// 光栅化产生的片元
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fragment {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
    pub front_facing: bool,
    pub varyings: [f32; VARYING_COUNT],
}

/// 颜色、深度、模板三个平面
#[derive(Debug, Clone)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    color: Vec<[f32; 4]>,
    depth: Vec<f32>,
    stencil: Vec<u8>,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize);
        Self {
            width,
            height,
            color: vec![[0.0, 0.0, 0.0, 1.0]; len],
            depth: vec![1.0; len],
            stencil: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn clear_color(&mut self, color: [f32; 4]) {
        self.color.fill(color);
    }

    pub fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) {
        self.depth.fill(depth);
        self.stencil.fill(stencil);
    }

    pub fn color(&self, x: u32, y: u32) -> [f32; 4] {
        self.color[self.index(x, y)]
    }

    pub fn depth(&self, x: u32, y: u32) -> f32 {
        self.depth[self.index(x, y)]
    }

    pub fn stencil(&self, x: u32, y: u32) -> u8 {
        self.stencil[self.index(x, y)]
    }

    pub(crate) fn planes_mut(&mut self) -> (&mut [[f32; 4]], &mut [f32], &mut [u8]) {
        (&mut self.color, &mut self.depth, &mut self.stencil)
    }

    /// 量化为 8 位 RGBA
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.color
            .iter()
            .flat_map(|c| crate::core::math::Color::from(*c).to_rgba8())
            .collect()
    }
}

/// 对 z >= 0 半空间裁剪三角形（Sutherland-Hodgman），结果为凸多边形
fn clip_near(tri: &[ClipVertex; 3]) -> Vec<ClipVertex> {
    let mut out = Vec::with_capacity(4);
    for i in 0..3 {
        let a = &tri[i];
        let b = &tri[(i + 1) % 3];
        let da = a.position.z;
        let db = b.position.z;

        if da >= 0.0 {
            out.push(*a);
        }
        if (da >= 0.0) != (db >= 0.0) {
            let t = da / (da - db);
            out.push(a.lerp(b, t));
        }
    }
    out
}

/// 屏幕空间顶点
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    z: f32,
    inv_w: f32,
    varyings_over_w: [f32; VARYING_COUNT],
}

fn to_screen(v: &ClipVertex, width: u32, height: u32) -> ScreenVertex {
    let inv_w = 1.0 / v.position.w;
    let ndc_x = v.position.x * inv_w;
    let ndc_y = v.position.y * inv_w;

    let mut varyings_over_w = [0.0; VARYING_COUNT];
    for (i, out) in varyings_over_w.iter_mut().enumerate() {
        *out = v.varyings[i] * inv_w;
    }

    ScreenVertex {
        x: (ndc_x + 1.0) * 0.5 * width as f32,
        y: (1.0 - ndc_y) * 0.5 * height as f32,
        z: v.position.z * inv_w,
        inv_w,
        varyings_over_w,
    }
}

/// 边函数，(a, b, p) 在 y 向下的屏幕上顺时针时为正
#[inline]
fn edge(ax: f32, ay: f32, bx: f32, by: f32, px: f32, py: f32) -> f32 {
    (bx - ax) * (py - ay) - (by - ay) * (px - ax)
}

/// 顺时针三角形中的上边（水平向右）或左边（向上）
#[inline]
fn is_top_left(ax: f32, ay: f32, bx: f32, by: f32) -> bool {
    let dx = bx - ax;
    let dy = by - ay;
    (dy == 0.0 && dx > 0.0) || dy < 0.0
}

#[inline]
fn covers(w: f32, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}

/// 光栅化一个三角形，每个被覆盖的像素调用一次 `emit`
pub fn rasterize_triangle(
    tri: &[ClipVertex; 3],
    width: u32,
    height: u32,
    rasterizer: &RasterizerDesc,
    mut emit: impl FnMut(&Fragment),
) {
    let polygon = clip_near(tri);
    if polygon.len() < 3 {
        return;
    }

    let screen: Vec<ScreenVertex> = polygon.iter().map(|v| to_screen(v, width, height)).collect();
    for i in 1..screen.len() - 1 {
        rasterize_screen_triangle([screen[0], screen[i], screen[i + 1]], width, height, rasterizer, &mut emit);
    }
}

fn rasterize_screen_triangle(
    tri: [ScreenVertex; 3],
    width: u32,
    height: u32,
    rasterizer: &RasterizerDesc,
    emit: &mut impl FnMut(&Fragment),
) {
    let [a, b, c] = tri;
    let area = edge(a.x, a.y, b.x, b.y, c.x, c.y);
    if area == 0.0 || !area.is_finite() {
        return;
    }

    let clockwise = area > 0.0;
    let front_facing = clockwise != rasterizer.front_counter_clockwise;
    if rasterizer.culls(front_facing) {
        return;
    }

    // 统一为顺时针，边函数在内部为正
    let (b, c) = if clockwise { (b, c) } else { (c, b) };
    let area = area.abs();

    let min_x = a.x.min(b.x).min(c.x).floor().max(0.0) as u32;
    let min_y = a.y.min(b.y).min(c.y).floor().max(0.0) as u32;
    let max_x = (a.x.max(b.x).max(c.x).ceil().min(width as f32) as u32).min(width);
    let max_y = (a.y.max(b.y).max(c.y).ceil().min(height as f32) as u32).min(height);

    let tl_bc = is_top_left(b.x, b.y, c.x, c.y);
    let tl_ca = is_top_left(c.x, c.y, a.x, a.y);
    let tl_ab = is_top_left(a.x, a.y, b.x, b.y);

    for y in min_y..max_y {
        let py = y as f32 + 0.5;
        for x in min_x..max_x {
            let px = x as f32 + 0.5;

            let w0 = edge(b.x, b.y, c.x, c.y, px, py);
            let w1 = edge(c.x, c.y, a.x, a.y, px, py);
            let w2 = edge(a.x, a.y, b.x, b.y, px, py);
            if !(covers(w0, tl_bc) && covers(w1, tl_ca) && covers(w2, tl_ab)) {
                continue;
            }

            let l0 = w0 / area;
            let l1 = w1 / area;
            let l2 = w2 / area;

            let depth = l0 * a.z + l1 * b.z + l2 * c.z;
            // 远平面之外的片元被裁掉
            if depth > 1.0 {
                continue;
            }

            let inv_w = l0 * a.inv_w + l1 * b.inv_w + l2 * c.inv_w;
            let mut varyings = [0.0; VARYING_COUNT];
            for (i, v) in varyings.iter_mut().enumerate() {
                *v = (l0 * a.varyings_over_w[i] + l1 * b.varyings_over_w[i] + l2 * c.varyings_over_w[i]) / inv_w;
            }

            emit(&Fragment {
                x,
                y,
                depth,
                front_facing,
                varyings,
            });
        }
    }
}
