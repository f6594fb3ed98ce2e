//! ID3D12Fence 的 [`Fence`] 实现

use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::System::Threading::{CreateEventA, WaitForSingleObject, INFINITE};

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::renderer::sync::{Fence, FenceValue};

/// GPU Fence 加上用于阻塞等待的事件
pub struct Dx12Fence {
    fence: ID3D12Fence,
    event: HANDLE,
}

// ID3D12Fence 自由线程；事件句柄只在 wait_for 中使用
unsafe impl Send for Dx12Fence {}
unsafe impl Sync for Dx12Fence {}

impl Dx12Fence {
    pub fn new(device: &ID3D12Device) -> Result<Self> {
        unsafe {
            let fence: ID3D12Fence = device
                .CreateFence(0, D3D12_FENCE_FLAG_NONE)
                .map_err(|e| RenderError::Graphics(GraphicsError::FenceCreation(format!("{:?}", e))))?;
            let event = CreateEventA(None, false, false, None)
                .map_err(|e| RenderError::Graphics(GraphicsError::FenceCreation(format!("fence event: {:?}", e))))?;
            Ok(Self { fence, event })
        }
    }

    pub fn raw(&self) -> &ID3D12Fence {
        &self.fence
    }
}

impl Fence for Dx12Fence {
    fn completed_value(&self) -> FenceValue {
        FenceValue::new(unsafe { self.fence.GetCompletedValue() })
    }

    fn wait_for(&self, value: FenceValue) -> Result<()> {
        if self.completed_value() >= value {
            return Ok(());
        }

        unsafe {
            self.fence
                .SetEventOnCompletion(value.value(), self.event)
                .map_err(|e| RenderError::Graphics(GraphicsError::Synchronization(format!("{:?}", e))))?;
            if WaitForSingleObject(self.event, INFINITE) != WAIT_OBJECT_0 {
                return Err(RenderError::Graphics(GraphicsError::Synchronization(format!(
                    "wait for fence {} failed",
                    value.value()
                ))));
            }
        }
        Ok(())
    }
}

impl Drop for Dx12Fence {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.event);
        }
    }
}
