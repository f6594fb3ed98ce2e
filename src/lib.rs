//! depth_complexity - 模板缓冲深度复杂度可视化
//!
//! 在一个由 Fence 保护的帧资源环上绘制场景，用模板缓冲统计每个像素被图元覆盖的次数，
//! 再按次数用不同颜色显示出来。支持软件光栅化（所有平台）和 DirectX 12（Windows）两种后端。
//!
//! # 模块结构
//!
//! - `core`: 核心功能模块（数学、日志、配置、错误处理、计时器）
//! - `geometry`: 顶点格式与网格几何
//! - `scene`: 材质、渲染项、相机和水面模拟
//! - `renderer`: 帧资源环、命令列表、管线描述和深度复杂度两阶段绘制
//! - `gfx`: 图形后端（软件光栅化、DirectX 12）
//! - `demo`: 演示程序
//!
//! # 使用示例
//!
//! ```no_run
//! use depth_complexity::core::{Config, GameTimer};
//! use depth_complexity::demo::DepthComplexityApp;
//! use depth_complexity::renderer::Renderer;
//!
//! let config = Config::default();
//! let mut app = DepthComplexityApp::new(&config, Renderer::software(&config)?)?;
//!
//! let mut timer = GameTimer::new();
//! timer.reset();
//! for _ in 0..10 {
//!     timer.tick();
//!     app.update(&timer)?;
//!     app.draw(&timer)?;
//! }
//! app.shutdown()?;
//! app.backend().save_png("frame.png")?;
//! # Ok::<(), depth_complexity::core::RenderError>(())
//! ```

pub mod core;
pub mod demo;
pub mod geometry;
pub mod gfx;
pub mod renderer;
pub mod scene;
