//! 软件后端的 GPU 时间线
//!
//! 一个工作线程按提交顺序处理队列中的任务，模拟异步执行的 GPU：
//! `execute` 与 `signal` 只是把任务放进通道，Fence 由工作线程在前面的任务完成后推进。

use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, trace};

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::renderer::command::Command;
use crate::renderer::pipeline::PipelineDesc;
use crate::renderer::sync::{CpuFence, FenceValue};
use crate::scene::Id;

use super::device::SoftwareGpu;

/// 呈现出来的一帧，8 位 RGBA
#[derive(Debug, Clone, Default)]
pub struct FrontBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// 已呈现的帧数
    pub presented: u64,
}

/// 队列中的任务
enum Job {
    CreatePipeline(Id<PipelineDesc>, PipelineDesc),
    Execute(Vec<Command>),
    Present,
    Resize { width: u32, height: u32 },
    Signal(FenceValue),
}

fn lock_poisoned() -> RenderError {
    RenderError::Graphics(GraphicsError::Synchronization("software queue mutex poisoned".to_string()))
}

/// GPU 时间线：任务通道 + 工作线程 + Fence
pub struct GpuTimeline {
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    fence: Arc<CpuFence>,
    front: Arc<Mutex<FrontBuffer>>,
    /// 工作线程遇到的第一个错误，下一次提交时报告
    fault: Arc<Mutex<Option<String>>>,
}

impl GpuTimeline {
    /// 启动工作线程
    ///
    /// # 参数
    ///
    /// * `width`, `height` - 初始渲染目标尺寸
    /// * `latency` - 每个命令列表额外模拟的执行耗时
    pub fn spawn(width: u32, height: u32, latency: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let fence = Arc::new(CpuFence::new());
        let front = Arc::new(Mutex::new(FrontBuffer::default()));
        let fault = Arc::new(Mutex::new(None));

        let gpu_fence = Arc::clone(&fence);
        let gpu_front = Arc::clone(&front);
        let gpu_fault = Arc::clone(&fault);

        let worker = thread::Builder::new()
            .name("software-gpu".to_string())
            .spawn(move || {
                let mut gpu = SoftwareGpu::new(width, height);
                let mut presented = 0u64;

                // 发送端全部释放后退出
                for job in rx {
                    let result = match job {
                        Job::CreatePipeline(id, desc) => {
                            gpu.create_pipeline(id, desc);
                            Ok(())
                        }
                        Job::Execute(commands) => {
                            if !latency.is_zero() {
                                thread::sleep(latency);
                            }
                            gpu.execute(&commands)
                        }
                        Job::Present => {
                            presented += 1;
                            let target = gpu.target();
                            let frame = FrontBuffer {
                                width: target.width(),
                                height: target.height(),
                                pixels: target.to_rgba8(),
                                presented,
                            };
                            gpu_front
                                .lock()
                                .map(|mut front| *front = frame)
                                .map_err(|_| lock_poisoned())
                        }
                        Job::Resize { width, height } => {
                            gpu.resize(width, height);
                            Ok(())
                        }
                        Job::Signal(value) => {
                            trace!(fence = value.value(), triangles = gpu.triangles_drawn(), "software gpu signal");
                            gpu_fence.signal(value)
                        }
                    };

                    if let Err(e) = result {
                        error!("software gpu: {}", e);
                        if let Ok(mut fault) = gpu_fault.lock() {
                            fault.get_or_insert_with(|| e.to_string());
                        }
                    }
                }
            })
            .map_err(|e| RenderError::Graphics(GraphicsError::DeviceCreation(e.to_string())))?;

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            fence,
            front,
            fault,
        })
    }

    pub fn fence(&self) -> &CpuFence {
        &self.fence
    }

    fn submit(&self, job: Job) -> Result<()> {
        if let Some(message) = self.fault.lock().map_err(|_| lock_poisoned())?.take() {
            return Err(RenderError::Graphics(GraphicsError::CommandExecution(message)));
        }

        self.tx
            .as_ref()
            .ok_or_else(|| RenderError::Graphics(GraphicsError::CommandExecution("queue shut down".to_string())))?
            .send(job)
            .map_err(|_| RenderError::Graphics(GraphicsError::CommandExecution("software gpu thread exited".to_string())))
    }

    pub fn create_pipeline(&self, id: Id<PipelineDesc>, desc: PipelineDesc) -> Result<()> {
        self.submit(Job::CreatePipeline(id, desc))
    }

    pub fn execute(&self, commands: Vec<Command>) -> Result<()> {
        self.submit(Job::Execute(commands))
    }

    pub fn present(&self) -> Result<()> {
        self.submit(Job::Present)
    }

    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        self.submit(Job::Resize { width, height })
    }

    pub fn signal(&self, value: FenceValue) -> Result<()> {
        self.submit(Job::Signal(value))
    }

    /// 最近一次呈现的画面
    pub fn front_buffer(&self) -> Result<FrontBuffer> {
        self.front.lock().map(|front| front.clone()).map_err(|_| lock_poisoned())
    }
}

impl Drop for GpuTimeline {
    fn drop(&mut self) {
        // 关闭通道，工作线程处理完剩余任务后退出
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("software gpu thread panicked");
            }
        }
    }
}
