//! 深度复杂度演示程序入口
//!
//! # 使用方法
//!
//! ```bash
//! # 无头运行（软件后端），结果写入 depth_complexity.png
//! cargo run
//!
//! # 普通光照绘制，并指定输出
//! cargo run -- --no-visualize --output lit.png
//!
//! # DirectX 12 窗口（仅 Windows）
//! cargo run -- --dx12
//! ```
//!
//! # 命令行参数
//!
//! - `--dx12` / `--software`: 选择图形后端
//! - `--overdraw`: 计数阶段保留深度测试
//! - `--no-visualize`: 绘制普通光照场景
//! - `--width <value>` / `--height <value>`: 渲染目标尺寸
//! - `--frames <value>` / `--output <path>`: 无头运行的帧数与输出文件

use anyhow::{Context, Result};
use tracing::info;

use depth_complexity::core::config::GraphicsBackend;
use depth_complexity::core::timer::FrameStats;
use depth_complexity::core::{log, Config, GameTimer};
use depth_complexity::demo::DepthComplexityApp;
use depth_complexity::renderer::Renderer;

fn main() -> Result<()> {
    // 1. 加载配置（在初始化日志之前）
    let mut config = Config::from_file_or_default("config.toml");

    // 2. 应用命令行参数
    config.apply_args(std::env::args());

    // 3. 验证配置
    config.validate().context("invalid configuration")?;

    // 4. 初始化日志系统
    let log_file = config
        .logging
        .file_output
        .then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file)
        .context("failed to initialize logging")?;

    info!(version = env!("CARGO_PKG_VERSION"), "depth_complexity starting");
    info!(
        backend = config.graphics.backend.name(),
        width = config.window.width,
        height = config.window.height,
        frame_resources = config.graphics.frame_resources,
        mode = ?config.depth_complexity.mode,
        visualize = config.depth_complexity.enabled,
        "Graphics configuration"
    );

    match config.graphics.backend {
        GraphicsBackend::Software => run_headless(&config),
        GraphicsBackend::Dx12 => run_windowed(&config),
    }
}

/// 软件后端绘制固定帧数，保存最后一帧
fn run_headless(config: &Config) -> Result<()> {
    let renderer = Renderer::software(config).context("failed to initialize software backend")?;
    let mut app = DepthComplexityApp::new(config, renderer).context("failed to build the demo")?;

    let mut timer = GameTimer::new();
    let mut stats = FrameStats::new();
    timer.reset();

    for _ in 0..config.run.frames {
        timer.tick();
        app.update(&timer)?;
        app.draw(&timer)?;

        if let Some((fps, mspf)) = stats.frame(timer.total_time()) {
            info!(fps, mspf, "frame stats");
        }
    }

    app.shutdown()?;
    app.backend()
        .save_png(&config.run.output)
        .with_context(|| format!("failed to write {}", config.run.output))?;

    info!(frames = app.frames_drawn(), output = %config.run.output, "headless run finished");
    Ok(())
}

#[cfg(not(target_os = "windows"))]
fn run_windowed(_config: &Config) -> Result<()> {
    anyhow::bail!("DirectX 12 backend is only available on Windows")
}

/// DirectX 12 窗口主循环，直到窗口关闭
#[cfg(target_os = "windows")]
fn run_windowed(config: &Config) -> Result<()> {
    use std::sync::Arc;
    use std::time::Duration;

    use depth_complexity::engine_warn;
    use tracing::{debug, error};
    use winit::dpi::PhysicalSize;
    use winit::event::{Event, WindowEvent};
    use winit::event_loop::EventLoop;
    use winit::window::WindowBuilder;

    let event_loop = EventLoop::new().context("failed to create event loop")?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window.title.as_str())
            .with_inner_size(PhysicalSize::new(config.window.width, config.window.height))
            .build(&event_loop)
            .context("failed to create window")?,
    );

    let renderer = Renderer::dx12(Arc::clone(&window), config).context("failed to initialize DX12 backend")?;
    let mut app = DepthComplexityApp::new(config, renderer).context("failed to build the demo")?;

    let mut timer = GameTimer::new();
    let mut stats = FrameStats::new();
    let mut failure: Option<anyhow::Error> = None;
    timer.reset();

    info!("Entering main loop...");

    event_loop
        .run(|event, elwt| match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    info!("Close requested, shutting down...");
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    if size.width == 0 || size.height == 0 {
                        engine_warn!("window minimized, keeping the current swap chain");
                        return;
                    }
                    debug!(width = size.width, height = size.height, "Window resized");
                    if let Err(e) = app.resize(size.width, size.height) {
                        error!("Resize failed: {}", e);
                        failure = Some(e.into());
                        elwt.exit();
                    }
                }
                // 失去焦点时暂停计时
                WindowEvent::Focused(focused) => {
                    if focused {
                        timer.start();
                    } else {
                        timer.stop();
                    }
                }
                WindowEvent::RedrawRequested => {
                    timer.tick();
                    if timer.is_stopped() {
                        std::thread::sleep(Duration::from_millis(100));
                        return;
                    }

                    if let Err(e) = app.update(&timer).and_then(|_| app.draw(&timer)) {
                        error!("Draw failed: {}", e);
                        failure = Some(e.into());
                        elwt.exit();
                        return;
                    }

                    if let Some((fps, mspf)) = stats.frame(timer.total_time()) {
                        window.set_title(&format!(
                            "{}    fps: {:.0}   mspf: {:.3}",
                            config.window.title, fps, mspf
                        ));
                    }
                }
                _ => (),
            },
            Event::AboutToWait => window.request_redraw(),
            _ => (),
        })
        .context("event loop failed")?;

    app.shutdown()?;
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
