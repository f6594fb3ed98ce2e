//! 图形后端模块
//!
//! - software：所有平台可用的软件光栅化后端，工作线程充当 GPU 时间线
//! - dx12：Windows 平台的 DirectX 12 后端
//!
//! 两者都实现 [`RenderBackend`]，渲染逻辑不区分具体后端。

pub mod backend;
#[cfg(target_os = "windows")]
pub mod dx12;
pub mod software;

pub use backend::RenderBackend;
#[cfg(target_os = "windows")]
pub use dx12::Dx12Backend;
pub use software::SoftwareBackend;
