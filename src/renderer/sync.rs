//! GPU 同步机制模块
//!
//! CPU 与 GPU 之间唯一的协调原语是单调递增的 Fence 值：
//!
//! - CPU 侧用 [`FenceManager`] 分配下一个值
//! - 队列在 GPU 时间线上执行完之前提交的工作后把 Fence 置为该值（[`CommandQueue::signal`]）
//! - CPU 通过 [`Fence::completed_value`] 查询进度，必要时 [`Fence::wait_for`] 阻塞
//!
//! [`CpuFence`] 是基于 `Mutex` + `Condvar` 的实现，软件后端的工作线程用它模拟 GPU 时间线。

use std::sync::{Condvar, Mutex};

use crate::core::error::{GraphicsError, RenderError, Result};

/// Fence 值
///
/// 0 表示“从未提交”。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FenceValue(u64);

impl FenceValue {
    /// 从未提交
    pub const NONE: FenceValue = FenceValue(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// 是否对应过一次真实提交
    pub fn is_submitted(&self) -> bool {
        self.0 != 0
    }

    /// 下一个Fence值
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

/// Fence 管理器
///
/// CPU 侧的单调计数器，每次提交取一个新值。只由持有帧资源环的渲染线程修改。
#[derive(Debug, Default)]
pub struct FenceManager {
    current_value: u64,
}

impl FenceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最近一次分配出去的值
    pub fn current_value(&self) -> FenceValue {
        FenceValue::new(self.current_value)
    }

    /// 获取下一个Fence值并递增计数器
    pub fn next_value(&mut self) -> FenceValue {
        self.current_value += 1;
        FenceValue::new(self.current_value)
    }
}

/// GPU 时间线上的 Fence
pub trait Fence: Send + Sync {
    /// GPU 已完成的最大值
    fn completed_value(&self) -> FenceValue;

    /// 阻塞直到 GPU 完成 `value`
    ///
    /// 等待本身不是错误；只有操作系统等待原语失败时才返回 `Err`。
    fn wait_for(&self, value: FenceValue) -> Result<()>;

    fn is_completed(&self, value: FenceValue) -> bool {
        self.completed_value() >= value
    }
}

/// 命令队列
pub trait CommandQueue {
    fn fence(&self) -> &dyn Fence;

    /// 在 GPU 时间线上排入一次 signal：之前提交的工作全部完成后 Fence 变为 `value`
    fn signal(&mut self, value: FenceValue) -> Result<()>;
}

/// 基于互斥锁和条件变量的 Fence
#[derive(Debug, Default)]
pub struct CpuFence {
    completed: Mutex<u64>,
    cond: Condvar,
}

impl CpuFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由 GPU 时间线调用，已完成值只增不减
    pub fn signal(&self, value: FenceValue) -> Result<()> {
        let mut completed = self.completed.lock().map_err(poisoned)?;
        if value.value() > *completed {
            *completed = value.value();
            tracing::trace!(fence = value.value(), "fence signaled");
        }
        self.cond.notify_all();
        Ok(())
    }
}

impl Fence for CpuFence {
    fn completed_value(&self) -> FenceValue {
        // 锁中毒时仍读出内部值
        let completed = match self.completed.lock() {
            Ok(guard) => *guard,
            Err(poison) => *poison.into_inner(),
        };
        FenceValue::new(completed)
    }

    fn wait_for(&self, value: FenceValue) -> Result<()> {
        let guard = self.completed.lock().map_err(poisoned)?;
        let _guard = self
            .cond
            .wait_while(guard, |completed| *completed < value.value())
            .map_err(poisoned)?;
        Ok(())
    }
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> RenderError {
    RenderError::Graphics(GraphicsError::Synchronization(format!("fence lock poisoned: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fence_value() {
        let fence = FenceValue::default();
        assert_eq!(fence, FenceValue::NONE);
        assert!(!fence.is_submitted());

        let next = fence.next();
        assert_eq!(next.value(), 1);
        assert!(next.is_submitted());
        assert!(next > fence);
    }

    #[test]
    fn test_fence_manager() {
        let mut manager = FenceManager::new();
        assert_eq!(manager.current_value(), FenceValue::NONE);

        let v1 = manager.next_value();
        let v2 = manager.next_value();
        assert_eq!(v1.value(), 1);
        assert_eq!(v2.value(), 2);
        assert_eq!(manager.current_value(), v2);
    }

    #[test]
    fn test_cpu_fence_never_goes_backwards() {
        let fence = CpuFence::new();
        fence.signal(FenceValue::new(5)).unwrap();
        fence.signal(FenceValue::new(3)).unwrap();
        assert_eq!(fence.completed_value().value(), 5);
        assert!(fence.is_completed(FenceValue::new(4)));
        assert!(!fence.is_completed(FenceValue::new(6)));
    }

    #[test]
    fn test_wait_returns_immediately_when_completed() {
        let fence = CpuFence::new();
        fence.wait_for(FenceValue::NONE).unwrap();
        fence.signal(FenceValue::new(2)).unwrap();
        fence.wait_for(FenceValue::new(1)).unwrap();
    }

    #[test]
    fn test_wait_blocks_until_signaled() {
        let fence = Arc::new(CpuFence::new());
        let signaller = Arc::clone(&fence);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signaller.signal(FenceValue::new(1)).unwrap();
        });

        fence.wait_for(FenceValue::new(1)).unwrap();
        assert_eq!(fence.completed_value().value(), 1);
        handle.join().unwrap();
    }
}
