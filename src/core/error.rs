//! 错误处理模块
//!
//! 定义了渲染核心使用的统一错误类型。
//!
//! # 设计原则
//!
//! - 手写 `Display` / `Error` 实现，不依赖派生宏
//! - 初始化阶段的失败（设备、交换链、Fence、根签名、PSO）全部是致命错误，直接向上传播
//! - 稳态下的 Fence 等待不是错误，只有操作系统级别的等待失败才会产生 `Synchronization`

use std::fmt;

/// 统一的 Result 类型
///
/// 所有可能返回错误的函数都应该使用这个类型。
pub type Result<T> = std::result::Result<T, RenderError>;

/// 渲染核心的错误类型
#[derive(Debug)]
pub enum RenderError {
    /// 配置错误
    Config(ConfigError),

    /// 图形 API 错误
    Graphics(GraphicsError),

    /// 场景表错误
    Scene(SceneError),

    /// IO 错误
    Io(std::io::Error),

    /// 图像编码错误
    Image(String),

    /// 日志系统错误
    Log(String),

    /// 初始化错误
    Initialization(String),

    /// 运行时错误
    Runtime(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

/// 图形 API 相关的错误
#[derive(Debug)]
pub enum GraphicsError {
    /// 设备创建失败
    DeviceCreation(String),

    /// 交换链错误
    SwapchainError(String),

    /// Fence 创建失败
    FenceCreation(String),

    /// 根签名创建失败
    RootSignature(String),

    /// 着色器编译失败
    ShaderCompilation(String),

    /// 管线状态对象创建失败
    PipelineCreation(String),

    /// 资源创建失败
    ResourceCreation(String),

    /// 渲染命令执行失败
    CommandExecution(String),

    /// CPU/GPU 同步失败（操作系统等待原语出错）
    Synchronization(String),

    /// 命令分配器仍被 GPU 使用时试图重置
    AllocatorInFlight { pending: u64, completed: u64 },
}

/// 场景表相关的错误
#[derive(Debug)]
pub enum SceneError {
    /// 名称重复
    DuplicateName(String),

    /// 表已冻结，不再接受插入
    Frozen(String),

    /// 按名称查找失败
    UnknownName(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Config(e) => write!(f, "Configuration error: {}", e),
            RenderError::Graphics(e) => write!(f, "Graphics error: {}", e),
            RenderError::Scene(e) => write!(f, "Scene error: {}", e),
            RenderError::Io(e) => write!(f, "IO error: {}", e),
            RenderError::Image(msg) => write!(f, "Image error: {}", msg),
            RenderError::Log(msg) => write!(f, "Log error: {}", msg),
            RenderError::Initialization(msg) => write!(f, "Initialization error: {}", msg),
            RenderError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphicsError::DeviceCreation(msg) => write!(f, "Device creation failed: {}", msg),
            GraphicsError::SwapchainError(msg) => write!(f, "Swapchain error: {}", msg),
            GraphicsError::FenceCreation(msg) => write!(f, "Fence creation failed: {}", msg),
            GraphicsError::RootSignature(msg) => {
                write!(f, "Root signature creation failed: {}", msg)
            }
            GraphicsError::ShaderCompilation(msg) => write!(f, "Shader compilation failed: {}", msg),
            GraphicsError::PipelineCreation(msg) => write!(f, "Pipeline creation failed: {}", msg),
            GraphicsError::ResourceCreation(msg) => write!(f, "Resource creation failed: {}", msg),
            GraphicsError::CommandExecution(msg) => write!(f, "Command execution failed: {}", msg),
            GraphicsError::Synchronization(msg) => write!(f, "Synchronization failed: {}", msg),
            GraphicsError::AllocatorInFlight { pending, completed } => write!(
                f,
                "Command allocator reset while fence {} is pending (completed: {})",
                pending, completed
            ),
        }
    }
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneError::DuplicateName(name) => write!(f, "Duplicate table entry: {}", name),
            SceneError::Frozen(name) => write!(f, "Table is frozen, cannot insert: {}", name),
            SceneError::UnknownName(name) => write!(f, "No table entry named: {}", name),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Io(e) => Some(e),
            RenderError::Config(e) => Some(e),
            RenderError::Graphics(e) => Some(e),
            RenderError::Scene(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for GraphicsError {}
impl std::error::Error for SceneError {}

// 实现 From trait 以便于错误转换
impl From<std::io::Error> for RenderError {
    fn from(err: std::io::Error) -> Self {
        RenderError::Io(err)
    }
}

impl From<ConfigError> for RenderError {
    fn from(err: ConfigError) -> Self {
        RenderError::Config(err)
    }
}

impl From<GraphicsError> for RenderError {
    fn from(err: GraphicsError) -> Self {
        RenderError::Graphics(err)
    }
}

impl From<SceneError> for RenderError {
    fn from(err: SceneError) -> Self {
        RenderError::Scene(err)
    }
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        RenderError::Image(err.to_string())
    }
}
