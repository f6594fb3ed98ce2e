//! 软件光栅化后端
//!
//! 不需要窗口和显卡，用于无头运行、测试和在非 Windows 平台上演示。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{RenderError, Result};
use crate::core::Config;
use crate::gfx::backend::RenderBackend;
use crate::renderer::command::CommandList;
use crate::renderer::pipeline::PipelineDesc;
use crate::renderer::resource::{HostAllocator, UploadAllocator, UploadHeap};
use crate::renderer::sync::{CommandQueue, Fence, FenceValue};
use crate::scene::Id;
use crate::{engine_debug, engine_info};

use super::queue::{FrontBuffer, GpuTimeline};

/// 软件后端
pub struct SoftwareBackend {
    timeline: GpuTimeline,
    allocator: HostAllocator,
    width: u32,
    height: u32,
}

impl SoftwareBackend {
    /// 按配置中的窗口尺寸创建离屏渲染目标
    pub fn new(config: &Config) -> Result<Self> {
        let width = config.window.width.max(1);
        let height = config.window.height.max(1);
        let latency = Duration::from_millis(config.graphics.gpu_latency_ms);

        let timeline = GpuTimeline::spawn(width, height, latency)?;
        engine_info!(width, height, latency_ms = config.graphics.gpu_latency_ms, "software backend ready");

        Ok(Self {
            timeline,
            allocator: HostAllocator::new(),
            width,
            height,
        })
    }

    /// 最近一次呈现的画面
    pub fn front_buffer(&self) -> Result<FrontBuffer> {
        self.timeline.front_buffer()
    }

    /// 把最近一次呈现的画面保存为 PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let front = self.front_buffer()?;
        let image = image::RgbaImage::from_raw(front.width, front.height, front.pixels)
            .ok_or_else(|| RenderError::Image("nothing has been presented yet".to_string()))?;
        image.save(path.as_ref())?;
        engine_info!(path = %path.as_ref().display(), "frame saved");
        Ok(())
    }
}

impl UploadAllocator for SoftwareBackend {
    fn create_upload_heap(&self, byte_size: u64) -> Result<Arc<dyn UploadHeap>> {
        self.allocator.create_upload_heap(byte_size)
    }
}

impl CommandQueue for SoftwareBackend {
    fn fence(&self) -> &dyn Fence {
        self.timeline.fence()
    }

    fn signal(&mut self, value: FenceValue) -> Result<()> {
        self.timeline.signal(value)
    }
}

impl RenderBackend for SoftwareBackend {
    fn backend_name(&self) -> &str {
        "Software"
    }

    fn client_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn create_pipeline(&mut self, id: Id<PipelineDesc>, name: &str, desc: &PipelineDesc) -> Result<()> {
        engine_debug!(pipeline = name, program = ?desc.program, "creating software pipeline");
        self.timeline.create_pipeline(id, *desc)
    }

    fn execute(&mut self, list: &CommandList, _frame_index: usize) -> Result<()> {
        list.ensure_executable()?;
        self.timeline.execute(list.commands().to_vec())
    }

    fn present(&mut self) -> Result<()> {
        self.timeline.present()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width.max(1);
        self.height = height.max(1);
        self.timeline.resize(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CountMode;
    use crate::renderer::command::CommandAllocator;
    use crate::renderer::pipeline::build_pipeline_table;
    use crate::renderer::sync::FenceManager;

    fn backend(width: u32, height: u32) -> SoftwareBackend {
        let mut config = Config::default();
        config.window.width = width;
        config.window.height = height;
        SoftwareBackend::new(&config).unwrap()
    }

    #[test]
    fn test_execute_rejects_open_list() {
        let mut backend = backend(4, 4);
        let mut list = CommandList::new();
        list.reset(&CommandAllocator::new()).unwrap();
        assert!(backend.execute(&list, 0).is_err());
    }

    #[test]
    fn test_present_and_save() {
        let mut backend = backend(6, 3);
        let pipelines = build_pipeline_table(CountMode::DepthComplexity).unwrap();
        backend.create_pipelines(&pipelines).unwrap();

        let mut list = CommandList::new();
        list.reset(&CommandAllocator::new()).unwrap();
        list.clear_render_target([0.0, 0.0, 1.0, 1.0]);
        list.close().unwrap();
        backend.execute(&list, 0).unwrap();
        backend.present().unwrap();

        let mut fences = FenceManager::new();
        let value = fences.next_value();
        backend.signal(value).unwrap();
        backend.fence().wait_for(value).unwrap();

        let front = backend.front_buffer().unwrap();
        assert_eq!(front.pixels.len(), 6 * 3 * 4);
        assert_eq!(&front.pixels[..4], &[0, 0, 255, 255]);

        let path = std::env::temp_dir().join(format!("depth_complexity_{}.png", std::process::id()));
        backend.save_png(&path).unwrap();
        let saved = image::open(&path).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (6, 3));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_resize_after_flush() {
        let mut backend = backend(4, 4);
        backend.resize(10, 2).unwrap();
        assert_eq!(backend.client_size(), (10, 2));

        backend.present().unwrap();
        backend.signal(FenceValue::new(1)).unwrap();
        backend.fence().wait_for(FenceValue::new(1)).unwrap();
        assert_eq!(backend.front_buffer().unwrap().width, 10);
    }
}
