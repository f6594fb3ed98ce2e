//! 软件光栅化后端
//!
//! - `raster`：裁剪、三角形遍历与渲染目标平面
//! - `shader`：与 HLSL 入口对应的 CPU 着色器
//! - `device`：命令解释器与输出合并
//! - `queue`：模拟异步 GPU 的工作线程
//! - `backend`：[`RenderBackend`](crate::gfx::RenderBackend) 实现

pub mod backend;
pub mod device;
pub mod queue;
pub mod raster;
pub mod shader;

pub use backend::SoftwareBackend;
pub use device::SoftwareGpu;
pub use queue::FrontBuffer;
