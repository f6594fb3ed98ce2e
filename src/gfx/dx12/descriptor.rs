//! DX12 描述符堆

use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::core::error::{GraphicsError, RenderError, Result};

/// 固定大小的描述符堆
///
/// 句柄按 `start + index * increment` 计算。
pub struct Dx12DescriptorHeap {
    heap: ID3D12DescriptorHeap,
    increment_size: u32,
    cpu_start: usize,
    gpu_start: Option<u64>,
    num_descriptors: u32,
}

unsafe impl Send for Dx12DescriptorHeap {}
unsafe impl Sync for Dx12DescriptorHeap {}

impl Dx12DescriptorHeap {
    pub fn new(
        device: &ID3D12Device,
        heap_type: D3D12_DESCRIPTOR_HEAP_TYPE,
        num_descriptors: u32,
        shader_visible: bool,
    ) -> Result<Self> {
        let flags = if shader_visible {
            D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
        } else {
            D3D12_DESCRIPTOR_HEAP_FLAG_NONE
        };
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: heap_type,
            NumDescriptors: num_descriptors,
            Flags: flags,
            NodeMask: 0,
        };

        unsafe {
            let heap: ID3D12DescriptorHeap = device.CreateDescriptorHeap(&desc).map_err(|e| {
                RenderError::Graphics(GraphicsError::ResourceCreation(format!(
                    "Failed to create descriptor heap {:?}: {:?}",
                    heap_type, e
                )))
            })?;

            let increment_size = device.GetDescriptorHandleIncrementSize(heap_type);
            let cpu_start = heap.GetCPUDescriptorHandleForHeapStart().ptr;
            let gpu_start = shader_visible.then(|| heap.GetGPUDescriptorHandleForHeapStart().ptr);

            Ok(Self {
                heap,
                increment_size,
                cpu_start,
                gpu_start,
                num_descriptors,
            })
        }
    }

    pub fn heap(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }

    pub fn num_descriptors(&self) -> u32 {
        self.num_descriptors
    }

    pub fn cpu_handle(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: self.cpu_start + (index * self.increment_size) as usize,
        }
    }

    /// 只有着色器可见的堆才有 GPU 句柄
    pub fn gpu_handle(&self, index: u32) -> Option<D3D12_GPU_DESCRIPTOR_HANDLE> {
        if index >= self.num_descriptors {
            return None;
        }
        self.gpu_start.map(|start| D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: start + (index * self.increment_size) as u64,
        })
    }

    /// 在每个位置写入空的 2D 纹理 SRV，采样结果为 0
    pub fn fill_null_srvs(&self, device: &ID3D12Device) {
        let srv_desc = D3D12_SHADER_RESOURCE_VIEW_DESC {
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            ViewDimension: D3D12_SRV_DIMENSION_TEXTURE2D,
            Shader4ComponentMapping: D3D12_DEFAULT_SHADER_4_COMPONENT_MAPPING,
            Anonymous: D3D12_SHADER_RESOURCE_VIEW_DESC_0 {
                Texture2D: D3D12_TEX2D_SRV {
                    MostDetailedMip: 0,
                    MipLevels: 1,
                    PlaneSlice: 0,
                    ResourceMinLODClamp: 0.0,
                },
            },
        };

        for i in 0..self.num_descriptors {
            unsafe {
                device.CreateShaderResourceView(None, Some(&srv_desc), self.cpu_handle(i));
            }
        }
    }
}
