//! 深度复杂度演示程序
//!
//! 地形（不透明）、水面（透明）、铁丝网箱子（alpha 测试）组成的场景。
//! 每帧：
//!
//! 1. `update`：轨道相机 → `advance_frame` → 材质动画 → 物体/材质/Pass 常量 → 水面
//! 2. `draw`：记录命令（计数 + 可视化，或普通光照绘制） → 提交 → 呈现 → `submit_frame`

pub mod scene_setup;
pub mod update;

use crate::core::config::{Config, CountMode};
use crate::core::error::Result;
use crate::core::math::Color;
use crate::core::timer::{GameTimer, TimeSource};
use crate::gfx::backend::RenderBackend;
use crate::renderer::command::CommandList;
use crate::renderer::depth_complexity;
use crate::renderer::dispatch::{self, DrawContext, GeometryBuffers};
use crate::renderer::frame::{FrameResource, FrameResourceRing};
use crate::renderer::pipeline::{self, PipelineDesc};
use crate::scene::{Camera, Id, Material, OrbitCamera, Scene, Table, WaveDisturber, Waves};
use crate::{engine_debug, engine_info};

/// 清屏颜色与雾颜色相同
pub const CLEAR_COLOR: Color = Color::LIGHT_STEEL_BLUE;

/// 演示程序
pub struct DepthComplexityApp<B: RenderBackend> {
    backend: B,
    scene: Scene,
    geometry: Vec<GeometryBuffers>,
    pipelines: Table<PipelineDesc>,
    ring: FrameResourceRing,
    cmd_list: CommandList,

    waves: Waves,
    disturber: WaveDisturber,
    water_material: Id<Material>,

    camera: Camera,
    orbit: OrbitCamera,
    orbit_speed: f32,

    visualize: bool,
    frames_drawn: u64,
}

fn aspect_ratio((width, height): (u32, u32)) -> f32 {
    width.max(1) as f32 / height.max(1) as f32
}

impl<B: RenderBackend> DepthComplexityApp<B> {
    /// 构建场景、上传几何、创建全部管线和帧资源环
    pub fn new(config: &Config, mut backend: B) -> Result<Self> {
        let ring_size = config.graphics.frame_resources;
        let content = scene_setup::build(&config.scene, ring_size)?;
        let scene = content.scene;

        let geometry = dispatch::upload_scene_geometry(&backend, &scene.geometries)?;

        let pipelines = pipeline::build_pipeline_table(config.depth_complexity.mode)?;
        backend.create_pipelines(&pipelines)?;

        let frames = (0..ring_size)
            .map(|_| {
                FrameResource::new(
                    &backend,
                    1,
                    scene.render_items.len(),
                    scene.materials.len(),
                    content.waves.vertex_count(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        let ring = FrameResourceRing::new(frames)?;

        let sc = &config.scene;
        let orbit = OrbitCamera::new(sc.camera_radius, sc.camera_theta, sc.camera_phi);
        let mut camera = Camera::new(aspect_ratio(backend.client_size()));
        orbit.apply(&mut camera);

        engine_info!(
            backend = backend.backend_name(),
            frame_resources = ring_size,
            render_items = scene.render_items.len(),
            visualize = config.depth_complexity.enabled,
            overdraw = config.depth_complexity.mode == CountMode::Overdraw,
            "depth complexity demo initialized"
        );

        Ok(Self {
            backend,
            scene,
            geometry,
            pipelines,
            ring,
            cmd_list: CommandList::new(),
            waves: content.waves,
            disturber: WaveDisturber::new(sc.disturb_interval, sc.seed),
            water_material: content.water_material,
            camera,
            orbit,
            orbit_speed: sc.orbit_speed,
            visualize: config.depth_complexity.enabled,
            frames_drawn: 0,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn ring(&self) -> &FrameResourceRing {
        &self.ring
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// 推进到下一帧资源并写入这一帧的全部 CPU 数据
    pub fn update<C: TimeSource>(&mut self, timer: &GameTimer<C>) -> Result<()> {
        let dt = timer.delta_time();
        let total = timer.total_time();

        self.orbit.rotate(self.orbit_speed * dt, 0.0);
        self.orbit.apply(&mut self.camera);

        // 唯一的等待点
        self.ring.advance_frame(self.backend.fence())?;
        let frame = self.ring.current();

        update::animate_materials(&mut self.scene, self.water_material, dt);
        update::update_object_cbs(&mut self.scene, frame)?;
        update::update_material_cbs(&mut self.scene, frame)?;
        update::update_main_pass_cb(&mut self.camera, frame, self.backend.client_size(), total, dt)?;
        update::update_waves(&mut self.waves, &mut self.disturber, frame, total, dt)
    }

    /// 记录并提交当前帧
    pub fn draw<C: TimeSource>(&mut self, _timer: &GameTimer<C>) -> Result<()> {
        let frame_index = self.ring.current_index();

        let completed = self.backend.fence().completed_value();
        let frame = self.ring.current_mut();
        frame.cmd_list_alloc.reset(completed)?;
        self.cmd_list.reset(&frame.cmd_list_alloc)?;

        let frame = self.ring.current();
        self.cmd_list.clear_render_target(CLEAR_COLOR.to_array());
        self.cmd_list.clear_depth_stencil(1.0, 0);
        dispatch::bind_pass(&mut self.cmd_list, frame);

        let ctx = DrawContext {
            scene: &self.scene,
            geometry: &self.geometry,
            pipelines: &self.pipelines,
            frame,
        };
        if self.visualize {
            depth_complexity::record_count_pass(&mut self.cmd_list, &ctx)?;
            depth_complexity::record_visualize_pass(&mut self.cmd_list, &self.pipelines)?;
        } else {
            dispatch::draw_layers(&mut self.cmd_list, &ctx, false)?;
        }
        self.cmd_list.close()?;

        self.backend.execute(&self.cmd_list, frame_index)?;
        self.backend.present()?;
        let fence = self.ring.submit_frame(&mut self.backend)?;

        self.frames_drawn += 1;
        engine_debug!(frame = frame_index, fence = fence.value(), "frame submitted");
        Ok(())
    }

    /// 等 GPU 空闲后重建交换链，并更新投影
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.ring.flush(&mut self.backend)?;
        self.backend.resize(width, height)?;
        self.camera.set_aspect(aspect_ratio(self.backend.client_size()));
        engine_info!(width, height, "resized");
        Ok(())
    }

    /// 销毁之前等待 GPU 完全空闲
    pub fn shutdown(&mut self) -> Result<()> {
        self.ring.flush(&mut self.backend)?;
        engine_info!(frames = self.frames_drawn, "demo shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::software::SoftwareBackend;
    use crate::renderer::depth_complexity::LEVEL_COLORS;
    use crate::renderer::sync::CommandQueue;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct StepClock(Rc<Cell<i64>>);

    impl TimeSource for StepClock {
        fn counts(&self) -> i64 {
            self.0.get()
        }

        fn counts_per_second(&self) -> i64 {
            1000
        }
    }

    fn config(width: u32, height: u32) -> Config {
        let mut config = Config::default();
        config.window.width = width;
        config.window.height = height;
        config.scene.wave_rows = 16;
        config.scene.wave_cols = 16;
        config.scene.camera_radius = 60.0;
        config
    }

    fn run_frames(app: &mut DepthComplexityApp<SoftwareBackend>, frames: usize) {
        let clock = StepClock(Rc::new(Cell::new(0)));
        let mut timer = GameTimer::with_clock(clock.clone());
        timer.reset();
        for _ in 0..frames {
            clock.0.set(clock.0.get() + 16);
            timer.tick();
            app.update(&timer).unwrap();
            app.draw(&timer).unwrap();
        }
        app.shutdown().unwrap();
    }

    fn is_level_color(pixel: [u8; 4]) -> bool {
        LEVEL_COLORS.iter().any(|c| c.to_rgba8() == pixel)
    }

    #[test]
    fn test_visualized_frame_is_level_coded() {
        let cfg = config(48, 36);
        let mut app = DepthComplexityApp::new(&cfg, SoftwareBackend::new(&cfg).unwrap()).unwrap();
        run_frames(&mut app, 4);

        assert_eq!(app.frames_drawn(), 4);
        let front = app.backend().front_buffer().unwrap();
        assert_eq!(front.presented, 4);

        let pixels: Vec<[u8; 4]> = front
            .pixels
            .chunks_exact(4)
            .map(|p| [p[0], p[1], p[2], p[3]])
            .collect();

        // 计数超过最后一级的像素保留计数阶段的着色，其余都是层级颜色
        let coded = pixels.iter().filter(|&&p| is_level_color(p)).count();
        assert!(coded * 2 > pixels.len(), "{} of {} pixels level coded", coded, pixels.len());

        // 地形铺满画面，只被地形覆盖一次的像素为蓝色
        let blue = Color::BLUE.to_rgba8();
        assert!(pixels.contains(&blue));
    }

    #[test]
    fn test_lit_frame_is_not_level_coded() {
        let mut cfg = config(32, 24);
        cfg.depth_complexity.enabled = false;
        let mut app = DepthComplexityApp::new(&cfg, SoftwareBackend::new(&cfg).unwrap()).unwrap();
        run_frames(&mut app, 2);

        let front = app.backend().front_buffer().unwrap();
        let clear = CLEAR_COLOR.to_rgba8();
        assert!(front.pixels.chunks_exact(4).any(|p| p != clear));
    }

    #[test]
    fn test_ring_never_lags_more_than_its_size() {
        let mut cfg = config(16, 12);
        cfg.graphics.gpu_latency_ms = 2;
        let mut app = DepthComplexityApp::new(&cfg, SoftwareBackend::new(&cfg).unwrap()).unwrap();
        run_frames(&mut app, 7);

        let ring = app.ring();
        let completed = app.backend().fence().completed_value();
        assert_eq!(completed, ring.current_fence());
        for frame in ring.iter() {
            assert!(frame.fence() <= completed);
        }
    }

    #[test]
    fn test_resize_flushes_and_keeps_drawing() {
        let cfg = config(16, 12);
        let mut app = DepthComplexityApp::new(&cfg, SoftwareBackend::new(&cfg).unwrap()).unwrap();
        run_frames(&mut app, 1);

        app.resize(20, 10).unwrap();
        assert_eq!(app.backend().client_size(), (20, 10));
        run_frames(&mut app, 2);

        let front = app.backend().front_buffer().unwrap();
        assert_eq!((front.width, front.height), (20, 10));
    }
}
