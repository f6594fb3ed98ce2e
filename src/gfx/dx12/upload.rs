//! 持久映射的上传堆
//!
//! 资源在创建时 Map 一次，直到释放都不 Unmap。

use std::fmt;
use std::sync::Arc;

use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::renderer::resource::{UploadAllocator, UploadHeap};

use super::context::graphics_error;

pub struct Dx12UploadHeap {
    resource: ID3D12Resource,
    mapped: *mut u8,
    byte_size: u64,
}

// 映射指针在资源生命周期内有效；帧资源环保证 CPU 与 GPU 不同时访问同一区间
unsafe impl Send for Dx12UploadHeap {}
unsafe impl Sync for Dx12UploadHeap {}

impl Dx12UploadHeap {
    pub fn new(device: &ID3D12Device, byte_size: u64) -> Result<Self> {
        let heap_props = D3D12_HEAP_PROPERTIES {
            Type: D3D12_HEAP_TYPE_UPLOAD,
            ..Default::default()
        };
        let desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Width: byte_size.max(1),
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            ..Default::default()
        };

        unsafe {
            let mut resource: Option<ID3D12Resource> = None;
            device
                .CreateCommittedResource(
                    &heap_props,
                    D3D12_HEAP_FLAG_NONE,
                    &desc,
                    D3D12_RESOURCE_STATE_GENERIC_READ,
                    None,
                    &mut resource,
                )
                .map_err(|e| graphics_error("upload heap", e))?;
            let resource = resource
                .ok_or_else(|| RenderError::Graphics(GraphicsError::ResourceCreation("upload heap".to_string())))?;

            let mut mapped = std::ptr::null_mut();
            resource
                .Map(0, None, Some(&mut mapped))
                .map_err(|e| graphics_error("map upload heap", e))?;

            Ok(Self {
                resource,
                mapped: mapped as *mut u8,
                byte_size,
            })
        }
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        if offset + len as u64 > self.byte_size {
            return Err(RenderError::Graphics(GraphicsError::ResourceCreation(format!(
                "upload heap access {}..{} exceeds {} bytes",
                offset,
                offset + len as u64,
                self.byte_size
            ))));
        }
        Ok(())
    }
}

impl UploadHeap for Dx12UploadHeap {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped.add(offset as usize), data.len());
        }
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.check_range(offset, out.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(self.mapped.add(offset as usize), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    fn gpu_virtual_address(&self) -> u64 {
        unsafe { self.resource.GetGPUVirtualAddress() }
    }
}

impl fmt::Debug for Dx12UploadHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dx12UploadHeap")
            .field("byte_size", &self.byte_size)
            .field("gpu_virtual_address", &self.gpu_virtual_address())
            .finish()
    }
}

impl Drop for Dx12UploadHeap {
    fn drop(&mut self) {
        unsafe { self.resource.Unmap(0, None) };
    }
}

/// 用设备创建上传堆
pub struct Dx12Allocator {
    device: ID3D12Device,
}

unsafe impl Send for Dx12Allocator {}
unsafe impl Sync for Dx12Allocator {}

impl Dx12Allocator {
    pub fn new(device: ID3D12Device) -> Self {
        Self { device }
    }
}

impl UploadAllocator for Dx12Allocator {
    fn create_upload_heap(&self, byte_size: u64) -> Result<Arc<dyn UploadHeap>> {
        Ok(Arc::new(Dx12UploadHeap::new(&self.device, byte_size)?))
    }
}
