//! DirectX 12 图形 API 实现模块
//!
//! - context: 设备、命令队列、交换链和深度模板缓冲
//! - descriptor: 描述符堆
//! - fence / upload: Fence 与持久映射上传堆
//! - pipeline: 根签名、HLSL 编译与 PSO
//! - backend: 命令列表翻译与提交

pub mod backend;
pub mod context;
pub mod descriptor;
pub mod fence;
pub mod pipeline;
pub mod upload;

pub use backend::Dx12Backend;
pub use context::Dx12Context;
