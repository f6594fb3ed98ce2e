//! 帧资源环
//!
//! N 个帧资源循环使用，每个都带一个 Fence 标记：
//!
//! ```text
//! 可用 --advance_frame--> 记录中 --submit_frame--> 已提交(F) --GPU 完成 F--> 可用
//! ```
//!
//! - 帧 i: CPU 正在写入
//! - 帧 i-1 .. i-N+1: GPU 可能仍在读取
//!
//! [`FrameResourceRing::advance_frame`] 是每帧唯一的阻塞点，CPU 最多领先 GPU N-1 帧。

use tracing::debug;

use crate::core::config::MAX_FRAME_RESOURCES;
use crate::core::error::{ConfigError, Result};
use crate::geometry::Vertex;

use super::command::CommandAllocator;
use super::constants::{MaterialData, ObjectConstants, PassConstants};
use super::resource::{BufferUsageType, UploadAllocator, UploadBuffer};
use super::sync::{CommandQueue, Fence, FenceManager, FenceValue};

/// 单帧资源
///
/// 记录状态下由 CPU 独占，提交后只由 GPU 读取，二者不会同时访问。
#[derive(Debug)]
pub struct FrameResource {
    /// 每帧一个分配器，GPU 未完成之前不能重置
    pub cmd_list_alloc: CommandAllocator,

    pub pass_cb: UploadBuffer<PassConstants>,
    pub object_cb: UploadBuffer<ObjectConstants>,
    /// 所有材质放在一个结构化缓冲中，按物体常量里的下标访问
    pub material_buffer: UploadBuffer<MaterialData>,

    /// 波浪网格每帧在 CPU 上重新计算，因此顶点缓冲也按帧复制
    pub waves_vb: UploadBuffer<Vertex>,

    /// 0 表示从未提交
    fence: FenceValue,
}

impl FrameResource {
    pub fn new<A>(
        allocator: &A,
        pass_count: usize,
        object_count: usize,
        material_count: usize,
        wave_vert_count: usize,
    ) -> Result<Self>
    where
        A: UploadAllocator + ?Sized,
    {
        Ok(Self {
            cmd_list_alloc: CommandAllocator::new(),
            pass_cb: UploadBuffer::new(allocator, pass_count, BufferUsageType::Constant)?,
            object_cb: UploadBuffer::new(allocator, object_count, BufferUsageType::Constant)?,
            material_buffer: UploadBuffer::new(allocator, material_count, BufferUsageType::Structured)?,
            waves_vb: UploadBuffer::new(allocator, wave_vert_count, BufferUsageType::Vertex)?,
            fence: FenceValue::NONE,
        })
    }

    pub fn fence(&self) -> FenceValue {
        self.fence
    }

    fn stamp(&mut self, fence: FenceValue) {
        self.fence = fence;
        self.cmd_list_alloc.mark_submitted(fence);
    }
}

/// 帧资源环
#[derive(Debug)]
pub struct FrameResourceRing {
    frames: Vec<FrameResource>,
    current: usize,
    fences: FenceManager,
}

impl FrameResourceRing {
    /// 环的大小取 `frames.len()`，必须在 1..=MAX_FRAME_RESOURCES 之内
    pub fn new(frames: Vec<FrameResource>) -> Result<Self> {
        if frames.is_empty() || frames.len() > MAX_FRAME_RESOURCES {
            return Err(ConfigError::InvalidValue {
                field: "graphics.frame_resources".to_string(),
                reason: format!("ring size {} not in 1..={}", frames.len(), MAX_FRAME_RESOURCES),
            }
            .into());
        }

        // 第一次 advance_frame 落在 0 号
        let current = frames.len() - 1;
        Ok(Self {
            frames,
            current,
            fences: FenceManager::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &FrameResource {
        &self.frames[self.current]
    }

    pub fn current_mut(&mut self) -> &mut FrameResource {
        &mut self.frames[self.current]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameResource> {
        self.frames.iter()
    }

    /// 最近一次分配出去的 Fence 值
    pub fn current_fence(&self) -> FenceValue {
        self.fences.current_value()
    }

    /// 切换到下一个帧资源
    ///
    /// 若该资源的 Fence 尚未完成则阻塞等待。返回后它的所有缓冲区都可以安全覆盖。
    pub fn advance_frame(&mut self, fence: &dyn Fence) -> Result<usize> {
        self.current = (self.current + 1) % self.frames.len();

        let pending = self.frames[self.current].fence;
        if pending.is_submitted() && fence.completed_value() < pending {
            debug!(
                frame = self.current,
                pending = pending.value(),
                completed = fence.completed_value().value(),
                "waiting for GPU to release frame resource"
            );
            fence.wait_for(pending)?;
        }

        Ok(self.current)
    }

    /// 命令提交后为当前帧资源打上新的 Fence 值，并在队列中排入 signal
    pub fn submit_frame(&mut self, queue: &mut dyn CommandQueue) -> Result<FenceValue> {
        let value = self.fences.next_value();
        self.frames[self.current].stamp(value);
        queue.signal(value)?;
        Ok(value)
    }

    /// 等待 GPU 完全空闲（窗口缩放与销毁之前）
    pub fn flush(&mut self, queue: &mut dyn CommandQueue) -> Result<()> {
        let value = self.fences.next_value();
        queue.signal(value)?;
        queue.fence().wait_for(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::resource::HostAllocator;
    use crate::renderer::sync::CpuFence;
    use crate::scene::DirtyFrames;
    use std::sync::mpsc::{self, Sender};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    /// 按提交顺序处理 signal 的慢速 GPU
    struct SlowQueue {
        fence: Arc<CpuFence>,
        tx: Option<Sender<FenceValue>>,
        worker: Option<JoinHandle<()>>,
    }

    impl SlowQueue {
        fn new(latency: Duration) -> Self {
            let fence = Arc::new(CpuFence::new());
            let (tx, rx) = mpsc::channel::<FenceValue>();
            let gpu_fence = Arc::clone(&fence);
            let worker = thread::spawn(move || {
                for value in rx {
                    thread::sleep(latency);
                    gpu_fence.signal(value).unwrap();
                }
            });
            Self { fence, tx: Some(tx), worker: Some(worker) }
        }
    }

    impl CommandQueue for SlowQueue {
        fn fence(&self) -> &dyn Fence {
            self.fence.as_ref()
        }

        fn signal(&mut self, value: FenceValue) -> Result<()> {
            if let Some(tx) = &self.tx {
                tx.send(value).unwrap();
            }
            Ok(())
        }
    }

    impl Drop for SlowQueue {
        fn drop(&mut self) {
            self.tx.take();
            if let Some(worker) = self.worker.take() {
                worker.join().unwrap();
            }
        }
    }

    fn ring(n: usize) -> FrameResourceRing {
        let allocator = HostAllocator::new();
        let frames = (0..n)
            .map(|_| FrameResource::new(&allocator, 1, 3, 3, 16).unwrap())
            .collect();
        FrameResourceRing::new(frames).unwrap()
    }

    #[test]
    fn test_ring_size_bounds() {
        let allocator = HostAllocator::new();
        assert!(FrameResourceRing::new(Vec::new()).is_err());

        let too_many = (0..MAX_FRAME_RESOURCES + 1)
            .map(|_| FrameResource::new(&allocator, 1, 1, 1, 1).unwrap())
            .collect();
        assert!(FrameResourceRing::new(too_many).is_err());
    }

    #[test]
    fn test_first_frame_uses_slot_zero_without_waiting() {
        let mut ring = ring(3);
        let queue = SlowQueue::new(Duration::from_millis(0));

        assert_eq!(ring.advance_frame(queue.fence()).unwrap(), 0);
        assert_eq!(ring.current().fence(), FenceValue::NONE);
    }

    #[test]
    fn test_advance_never_returns_pending_slot() {
        let mut ring = ring(3);
        let mut queue = SlowQueue::new(Duration::from_millis(5));

        for frame in 0..12 {
            let index = ring.advance_frame(queue.fence()).unwrap();
            assert_eq!(index, frame % 3);

            let tagged = ring.current().fence();
            assert!(queue.fence().completed_value() >= tagged);
            ring.current_mut()
                .cmd_list_alloc
                .reset(queue.fence().completed_value())
                .unwrap();

            let submitted = ring.submit_frame(&mut queue).unwrap();
            assert_eq!(submitted.value(), frame as u64 + 1);
            assert_eq!(ring.current().fence(), submitted);
        }

        ring.flush(&mut queue).unwrap();
        assert_eq!(queue.fence().completed_value(), ring.current_fence());
    }

    #[test]
    fn test_look_ahead_bounded_by_ring_size() {
        let n = 3;
        let mut ring = ring(n);
        let mut queue = SlowQueue::new(Duration::from_millis(10));

        for _ in 0..8 {
            ring.advance_frame(queue.fence()).unwrap();
            let ahead = ring.current_fence().value() - queue.fence().completed_value().value();
            // 当前帧尚未提交，已提交但未完成的最多 N-1 帧
            assert!(ahead <= (n - 1) as u64, "CPU ran {} frames ahead", ahead);
            ring.submit_frame(&mut queue).unwrap();
        }
        ring.flush(&mut queue).unwrap();
    }

    #[test]
    fn test_dirty_item_refreshes_each_slot_once() {
        let n = 3;
        let mut ring = ring(n);
        let mut queue = SlowQueue::new(Duration::from_millis(0));
        let mut dirty = DirtyFrames::new(n);
        let mut refreshed = vec![0usize; n];

        let data = ObjectConstants::default();
        for _ in 0..(2 * n + 1) {
            let index = ring.advance_frame(queue.fence()).unwrap();
            if dirty.consume() {
                ring.current().object_cb.copy_data(0, &data).unwrap();
                refreshed[index] += 1;
            }
            ring.submit_frame(&mut queue).unwrap();
        }

        assert_eq!(refreshed, vec![1; n]);
        assert!(!dirty.is_dirty());
        ring.flush(&mut queue).unwrap();
    }

    #[test]
    fn test_flush_waits_for_total_idle() {
        let mut ring = ring(2);
        let mut queue = SlowQueue::new(Duration::from_millis(5));

        for _ in 0..2 {
            ring.advance_frame(queue.fence()).unwrap();
            ring.submit_frame(&mut queue).unwrap();
        }
        ring.flush(&mut queue).unwrap();
        assert_eq!(queue.fence().completed_value().value(), 3);
        assert!(ring.iter().all(|f| queue.fence().is_completed(f.fence())));
    }
}
