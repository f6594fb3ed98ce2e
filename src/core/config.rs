//! 配置管理模块
//!
//! 提供配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [window]
//! width = 800
//! height = 600
//! title = "Depth Complexity"
//!
//! [graphics]
//! backend = "software"  # 或 "dx12"
//! vsync = true
//! frame_resources = 3
//!
//! [depth_complexity]
//! enabled = true
//! mode = "depth_complexity"  # 或 "overdraw"
//!
//! [run]
//! frames = 120
//! output = "depth_complexity.png"
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};

/// 环形缓冲中帧资源数量的上限
pub const MAX_FRAME_RESOURCES: usize = 8;

/// 程序配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 窗口配置
    #[serde(default)]
    pub window: WindowConfig,

    /// 图形配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// 深度复杂度可视化配置
    #[serde(default)]
    pub depth_complexity: DepthComplexityConfig,

    /// 场景配置
    #[serde(default)]
    pub scene: SceneConfig,

    /// 无窗口运行配置
    #[serde(default)]
    pub run: RunConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// 窗口宽度
    #[serde(default = "default_width")]
    pub width: u32,

    /// 窗口高度
    #[serde(default = "default_height")]
    pub height: u32,

    /// 窗口标题
    #[serde(default = "default_title")]
    pub title: String,
}

/// 图形配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 图形后端选择
    #[serde(default = "default_backend")]
    pub backend: GraphicsBackend,

    /// 垂直同步
    #[serde(default = "default_vsync")]
    pub vsync: bool,

    /// 帧资源环的大小 N
    #[serde(default = "default_frame_resources")]
    pub frame_resources: usize,

    /// 软件后端每次提交模拟的 GPU 耗时（毫秒）
    #[serde(default)]
    pub gpu_latency_ms: u64,

    /// 启用 D3D12 调试层
    #[serde(default = "default_debug_layer")]
    pub debug_layer: bool,
}

/// 图形后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphicsBackend {
    /// CPU 光栅化后端，GPU 时间线由工作线程模拟
    Software,
    /// DirectX 12 后端
    Dx12,
}

/// 计数模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    /// 关闭深度测试，统计每个像素被光栅化的次数
    DepthComplexity,
    /// 保留深度测试，只统计通过深度测试的次数
    Overdraw,
}

/// 深度复杂度可视化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthComplexityConfig {
    /// 关闭时按普通光照绘制场景
    #[serde(default = "default_visualize")]
    pub enabled: bool,

    /// 计数模式
    #[serde(default = "default_count_mode")]
    pub mode: CountMode,
}

/// 场景配置（波浪模拟与轨道相机）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneConfig {
    /// 波浪网格行数
    #[serde(default = "default_wave_rows")]
    pub wave_rows: usize,

    /// 波浪网格列数
    #[serde(default = "default_wave_cols")]
    pub wave_cols: usize,

    /// 网格间距
    #[serde(default = "default_wave_spatial_step")]
    pub wave_spatial_step: f32,

    /// 模拟时间步长
    #[serde(default = "default_wave_time_step")]
    pub wave_time_step: f32,

    /// 波速
    #[serde(default = "default_wave_speed")]
    pub wave_speed: f32,

    /// 阻尼
    #[serde(default = "default_wave_damping")]
    pub wave_damping: f32,

    /// 两次随机扰动之间的间隔（秒）
    #[serde(default = "default_disturb_interval")]
    pub disturb_interval: f32,

    /// 随机数种子
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// 轨道相机半径
    #[serde(default = "default_camera_radius")]
    pub camera_radius: f32,

    /// 轨道相机方位角
    #[serde(default = "default_camera_theta")]
    pub camera_theta: f32,

    /// 轨道相机极角
    #[serde(default = "default_camera_phi")]
    pub camera_phi: f32,

    /// 轨道相机自动旋转角速度（弧度/秒）
    #[serde(default)]
    pub orbit_speed: f32,
}

/// 无窗口运行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// 渲染帧数
    #[serde(default = "default_frames")]
    pub frames: u64,

    /// 输出 PNG 路径
    #[serde(default = "default_output")]
    pub output: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_title() -> String { "Depth Complexity".to_string() }
fn default_backend() -> GraphicsBackend { GraphicsBackend::Software }
fn default_vsync() -> bool { true }
fn default_frame_resources() -> usize { 3 }
fn default_debug_layer() -> bool { cfg!(debug_assertions) }
fn default_visualize() -> bool { true }
fn default_count_mode() -> CountMode { CountMode::DepthComplexity }
fn default_wave_rows() -> usize { 128 }
fn default_wave_cols() -> usize { 128 }
fn default_wave_spatial_step() -> f32 { 1.0 }
fn default_wave_time_step() -> f32 { 0.03 }
fn default_wave_speed() -> f32 { 4.0 }
fn default_wave_damping() -> f32 { 0.2 }
fn default_disturb_interval() -> f32 { 0.25 }
fn default_seed() -> u64 { 0x5eed }
fn default_camera_radius() -> f32 { 50.0 }
fn default_camera_theta() -> f32 { 1.5 * std::f32::consts::PI }
fn default_camera_phi() -> f32 { 0.2 * std::f32::consts::PI }
fn default_frames() -> u64 { 120 }
fn default_output() -> String { "depth_complexity.png".to_string() }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "depth_complexity.log".to_string() }

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            title: default_title(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            vsync: default_vsync(),
            frame_resources: default_frame_resources(),
            gpu_latency_ms: 0,
            debug_layer: default_debug_layer(),
        }
    }
}

impl Default for DepthComplexityConfig {
    fn default() -> Self {
        Self {
            enabled: default_visualize(),
            mode: default_count_mode(),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            wave_rows: default_wave_rows(),
            wave_cols: default_wave_cols(),
            wave_spatial_step: default_wave_spatial_step(),
            wave_time_step: default_wave_time_step(),
            wave_speed: default_wave_speed(),
            wave_damping: default_wave_damping(),
            disturb_interval: default_disturb_interval(),
            seed: default_seed(),
            camera_radius: default_camera_radius(),
            camera_theta: default_camera_theta(),
            camera_phi: default_camera_phi(),
            orbit_speed: 0.0,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            output: default_output(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 参数
    ///
    /// * `path` - 配置文件路径
    ///
    /// # 返回值
    ///
    /// 成功返回 `Config` 实例，失败返回错误
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 文本解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    ///
    /// 文件存在但无法解析时同样回退到默认配置。
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// # 说明
    ///
    /// 支持的参数：
    /// - `--dx12` / `--software`: 选择图形后端
    /// - `--width <value>` / `--height <value>`: 设置窗口尺寸
    /// - `--frames <value>`: 无窗口运行的帧数
    /// - `--output <path>`: 输出 PNG 路径
    /// - `--overdraw`: 计数时保留深度测试
    /// - `--no-visualize`: 按普通光照绘制
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        if args.iter().any(|a| a == "--dx12") {
            self.graphics.backend = GraphicsBackend::Dx12;
        }
        if args.iter().any(|a| a == "--software") {
            self.graphics.backend = GraphicsBackend::Software;
        }
        if args.iter().any(|a| a == "--overdraw") {
            self.depth_complexity.mode = CountMode::Overdraw;
        }
        if args.iter().any(|a| a == "--no-visualize") {
            self.depth_complexity.enabled = false;
        }

        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|idx| args.get(idx + 1))
                .cloned()
        };

        if let Some(width) = value_of("--width").and_then(|s| s.parse().ok()) {
            self.window.width = width;
        }
        if let Some(height) = value_of("--height").and_then(|s| s.parse().ok()) {
            self.window.height = height;
        }
        if let Some(frames) = value_of("--frames").and_then(|s| s.parse().ok()) {
            self.run.frames = frames;
        }
        if let Some(output) = value_of("--output") {
            self.run.output = output;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "window.width/height".to_string(),
                reason: "Window dimensions must be greater than 0".to_string(),
            }
            .into());
        }

        if self.graphics.frame_resources == 0 || self.graphics.frame_resources > MAX_FRAME_RESOURCES {
            return Err(ConfigError::InvalidValue {
                field: "graphics.frame_resources".to_string(),
                reason: format!("Ring size must be in 1..={}", MAX_FRAME_RESOURCES),
            }
            .into());
        }

        // disturb 在 [4, n-5] 中取点，网格至少要 10x10
        if self.scene.wave_rows < 10 || self.scene.wave_cols < 10 {
            return Err(ConfigError::InvalidValue {
                field: "scene.wave_rows/wave_cols".to_string(),
                reason: "Wave grid must be at least 10x10".to_string(),
            }
            .into());
        }

        // 16 位索引
        if self.scene.wave_rows * self.scene.wave_cols > u16::MAX as usize {
            return Err(ConfigError::InvalidValue {
                field: "scene.wave_rows/wave_cols".to_string(),
                reason: "Wave grid exceeds 16-bit index range".to_string(),
            }
            .into());
        }

        if self.scene.wave_time_step <= 0.0 || self.scene.wave_spatial_step <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "scene.wave_time_step/wave_spatial_step".to_string(),
                reason: "Steps must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

impl GraphicsBackend {
    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            GraphicsBackend::Software => "Software",
            GraphicsBackend::Dx12 => "DirectX 12",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.graphics.backend, GraphicsBackend::Software);
        assert_eq!(config.graphics.frame_resources, 3);
        assert!(config.depth_complexity.enabled);
        assert_eq!(config.scene.wave_rows, 128);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.window.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.graphics.frame_resources = 0;
        assert!(config.validate().is_err());
        config.graphics.frame_resources = MAX_FRAME_RESOURCES + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scene.wave_rows = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            frame_resources = 2

            [depth_complexity]
            mode = "overdraw"
            "#,
        )
        .unwrap();
        assert_eq!(config.graphics.frame_resources, 2);
        assert_eq!(config.graphics.backend, GraphicsBackend::Software);
        assert_eq!(config.depth_complexity.mode, CountMode::Overdraw);
        assert_eq!(config.window.height, 600);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = Config::from_toml_str("[graphics]\nbackend = \"vulkan\"");
        assert!(matches!(
            result,
            Err(crate::core::error::RenderError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args([
            "app", "--dx12", "--width", "1024", "--frames", "10", "--output", "out.png",
            "--overdraw", "--no-visualize",
        ]);
        assert_eq!(config.graphics.backend, GraphicsBackend::Dx12);
        assert_eq!(config.window.width, 1024);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.run.frames, 10);
        assert_eq!(config.run.output, "out.png");
        assert_eq!(config.depth_complexity.mode, CountMode::Overdraw);
        assert!(!config.depth_complexity.enabled);
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir().join("depth_complexity_config_test.toml");
        let mut config = Config::default();
        config.run.frames = 42;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.run.frames, 42);
        std::fs::remove_file(&path).ok();
    }
}
