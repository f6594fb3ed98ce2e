//! 渲染器模块
//!
//! 与后端无关的 CPU 侧渲染逻辑：帧资源环、常量布局、命令列表、管线描述、
//! 渲染项分发和深度复杂度的两阶段绘制。
//!
//! # 架构设计
//!
//! - `Renderer`：枚举，封装运行时选择的图形后端
//! - 渲染逻辑只依赖 [`RenderBackend`]，底层实现在 `gfx` 模块中

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::core::error::Result;
use crate::core::Config;
use crate::gfx::backend::RenderBackend;
use crate::gfx::software::SoftwareBackend;
#[cfg(target_os = "windows")]
use crate::gfx::dx12::Dx12Backend;
use crate::scene::Id;

pub mod command;
pub mod constants;
pub mod depth_complexity;
pub mod dispatch;
pub mod frame;
pub mod pipeline;
pub mod resource;
pub mod sync;

pub use command::{Command, CommandAllocator, CommandList};
pub use frame::{FrameResource, FrameResourceRing};
pub use pipeline::PipelineDesc;
pub use resource::{UploadAllocator, UploadHeap};
pub use sync::{CommandQueue, Fence, FenceValue};

/// 图形后端枚举
///
/// 支持运行时选择使用哪个后端，通过枚举分发避免 trait 对象。
pub enum Renderer {
    Software(SoftwareBackend),
    #[cfg(target_os = "windows")]
    Dx12(Dx12Backend),
}

impl Renderer {
    /// 离屏软件后端
    pub fn software(config: &Config) -> Result<Self> {
        info!("Initializing Software Backend");
        Ok(Renderer::Software(SoftwareBackend::new(config)?))
    }

    /// 绑定到窗口的 DirectX 12 后端
    #[cfg(target_os = "windows")]
    pub fn dx12(window: Arc<winit::window::Window>, config: &Config) -> Result<Self> {
        info!("Initializing DX12 Backend");
        Ok(Renderer::Dx12(Dx12Backend::new(window, config)?))
    }

    /// 保存最近一次呈现的画面，只有软件后端支持回读
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        match self {
            Renderer::Software(r) => r.save_png(path),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(_) => Err(crate::core::error::RenderError::Runtime(
                "frame read-back is only available on the software backend".to_string(),
            )),
        }
    }
}

impl UploadAllocator for Renderer {
    fn create_upload_heap(&self, byte_size: u64) -> Result<Arc<dyn UploadHeap>> {
        match self {
            Renderer::Software(r) => r.create_upload_heap(byte_size),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.create_upload_heap(byte_size),
        }
    }
}

impl CommandQueue for Renderer {
    fn fence(&self) -> &dyn Fence {
        match self {
            Renderer::Software(r) => r.fence(),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.fence(),
        }
    }

    fn signal(&mut self, value: FenceValue) -> Result<()> {
        match self {
            Renderer::Software(r) => r.signal(value),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.signal(value),
        }
    }
}

impl RenderBackend for Renderer {
    fn backend_name(&self) -> &str {
        match self {
            Renderer::Software(r) => r.backend_name(),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.backend_name(),
        }
    }

    fn client_size(&self) -> (u32, u32) {
        match self {
            Renderer::Software(r) => r.client_size(),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.client_size(),
        }
    }

    fn create_pipeline(&mut self, id: Id<PipelineDesc>, name: &str, desc: &PipelineDesc) -> Result<()> {
        match self {
            Renderer::Software(r) => r.create_pipeline(id, name, desc),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.create_pipeline(id, name, desc),
        }
    }

    fn execute(&mut self, list: &CommandList, frame_index: usize) -> Result<()> {
        match self {
            Renderer::Software(r) => r.execute(list, frame_index),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.execute(list, frame_index),
        }
    }

    fn present(&mut self) -> Result<()> {
        match self {
            Renderer::Software(r) => r.present(),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.present(),
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        match self {
            Renderer::Software(r) => r.resize(width, height),
            #[cfg(target_os = "windows")]
            Renderer::Dx12(r) => r.resize(width, height),
        }
    }
}
