//! DirectX 12 后端
//!
//! 把记录好的 [`Command`] 逐条翻译为 `ID3D12GraphicsCommandList` 调用。
//! 每个帧资源对应一个 `ID3D12CommandAllocator`，与帧资源环使用同一个下标；
//! 环在 `advance_frame` 中已经等到该帧的 Fence，所以这里可以直接重置。

use std::mem::ManuallyDrop;
use std::sync::Arc;

use windows::core::Interface;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::*;
use winit::window::Window;

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::core::Config;
use crate::geometry::{IndexFormat, PrimitiveTopology};
use crate::gfx::backend::RenderBackend;
use crate::renderer::command::{Command, CommandList};
use crate::renderer::pipeline::{PipelineDesc, RootSlot};
use crate::renderer::resource::{UploadAllocator, UploadHeap};
use crate::renderer::sync::{CommandQueue, Fence, FenceValue};
use crate::scene::Id;
use crate::{engine_debug, engine_info};

use super::context::{dxgi_format, Dx12Context};
use super::descriptor::Dx12DescriptorHeap;
use super::fence::Dx12Fence;
use super::pipeline::{self, ShaderCache};
use super::upload::Dx12Allocator;

/// 着色器可见 SRV 堆的大小，全部填充空 SRV
const SRV_HEAP_SIZE: u32 = 16;

fn execution_error(what: &str, e: windows::core::Error) -> RenderError {
    RenderError::Graphics(GraphicsError::CommandExecution(format!("{}: {:?}", what, e)))
}

fn transition_barrier(
    resource: &ID3D12Resource,
    before: D3D12_RESOURCE_STATES,
    after: D3D12_RESOURCE_STATES,
) -> D3D12_RESOURCE_BARRIER {
    D3D12_RESOURCE_BARRIER {
        Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
        Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
        Anonymous: D3D12_RESOURCE_BARRIER_0 {
            Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                pResource: ManuallyDrop::new(Some(resource.clone())),
                Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                StateBefore: before,
                StateAfter: after,
            }),
        },
    }
}

/// 提交屏障后释放其中持有的资源引用
unsafe fn release_barrier(barrier: D3D12_RESOURCE_BARRIER) {
    let transition = ManuallyDrop::into_inner(barrier.Anonymous.Transition);
    drop(ManuallyDrop::into_inner(transition.pResource));
}

/// DirectX 12 后端
pub struct Dx12Backend {
    context: Dx12Context,
    fence: Dx12Fence,
    allocator: Dx12Allocator,
    root_signature: ID3D12RootSignature,
    shaders: ShaderCache,
    pipelines: Vec<Option<ID3D12PipelineState>>,
    srv_heap: Dx12DescriptorHeap,
    command_allocators: Vec<ID3D12CommandAllocator>,
    command_list: ID3D12GraphicsCommandList,
    vsync: bool,
}

impl Dx12Backend {
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let context = Dx12Context::new(window, config)?;
        let device = context.device.clone();

        let fence = Dx12Fence::new(&device)?;
        let root_signature = pipeline::create_root_signature(&device)?;

        let srv_heap = Dx12DescriptorHeap::new(
            &device,
            D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
            SRV_HEAP_SIZE,
            true,
        )?;
        srv_heap.fill_null_srvs(&device);

        let command_allocators = (0..config.graphics.frame_resources)
            .map(|_| unsafe {
                device
                    .CreateCommandAllocator::<ID3D12CommandAllocator>(D3D12_COMMAND_LIST_TYPE_DIRECT)
                    .map_err(|e| execution_error("command allocator", e))
            })
            .collect::<Result<Vec<_>>>()?;
        let first = command_allocators
            .first()
            .ok_or_else(|| RenderError::Graphics(GraphicsError::CommandExecution("no frame resources".to_string())))?;

        // 创建后立即关闭，第一次 execute 时再 Reset
        let command_list: ID3D12GraphicsCommandList = unsafe {
            device
                .CreateCommandList(0, D3D12_COMMAND_LIST_TYPE_DIRECT, first, None)
                .map_err(|e| execution_error("command list", e))?
        };
        unsafe {
            command_list.Close().map_err(|e| execution_error("close command list", e))?;
        }

        engine_info!(
            frame_resources = command_allocators.len(),
            width = context.width,
            height = context.height,
            "DirectX 12 backend ready"
        );

        Ok(Self {
            allocator: Dx12Allocator::new(device),
            context,
            fence,
            root_signature,
            shaders: ShaderCache::new(),
            pipelines: Vec::new(),
            srv_heap,
            command_allocators,
            command_list,
            vsync: config.graphics.vsync,
        })
    }

    fn pipeline_state(&self, id: Id<PipelineDesc>) -> Result<&ID3D12PipelineState> {
        self.pipelines
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                RenderError::Graphics(GraphicsError::CommandExecution(format!(
                    "pipeline {} was never created",
                    id.index()
                )))
            })
    }

    /// 翻译一条命令
    unsafe fn record(&self, command: &Command) -> Result<()> {
        let list = &self.command_list;
        match command {
            Command::ClearRenderTarget { color } => {
                list.ClearRenderTargetView(self.context.current_back_buffer_view(), color.as_ptr(), None);
            }
            Command::ClearDepthStencil { depth, stencil } => {
                list.ClearDepthStencilView(
                    self.context.depth_stencil_view(),
                    D3D12_CLEAR_FLAG_DEPTH | D3D12_CLEAR_FLAG_STENCIL,
                    *depth,
                    *stencil,
                    None,
                );
            }
            Command::SetPipelineState(id) => {
                list.SetPipelineState(self.pipeline_state(*id)?);
            }
            Command::SetStencilRef(stencil_ref) => {
                list.OMSetStencilRef(*stencil_ref);
            }
            Command::SetRoot32BitConstant { slot, value } => {
                list.SetGraphicsRoot32BitConstant(slot.index(), *value, 0);
            }
            Command::SetRootConstantBufferView { slot, location } => {
                list.SetGraphicsRootConstantBufferView(slot.index(), location.gpu_virtual_address());
            }
            Command::SetRootShaderResourceView { slot, location } => {
                list.SetGraphicsRootShaderResourceView(slot.index(), location.gpu_virtual_address());
            }
            Command::SetRootDescriptorTable { slot, heap_index } => {
                let handle = self.srv_heap.gpu_handle(*heap_index).ok_or_else(|| {
                    RenderError::Graphics(GraphicsError::CommandExecution(format!(
                        "SRV heap index {} out of range (heap holds {})",
                        heap_index,
                        self.srv_heap.num_descriptors()
                    )))
                })?;
                debug_assert_eq!(*slot, RootSlot::DiffuseTexture);
                list.SetGraphicsRootDescriptorTable(slot.index(), handle);
            }
            Command::SetVertexBuffer(view) => match view {
                Some(view) => {
                    let vbv = D3D12_VERTEX_BUFFER_VIEW {
                        BufferLocation: view.location.gpu_virtual_address(),
                        SizeInBytes: view.size_in_bytes,
                        StrideInBytes: view.stride_in_bytes,
                    };
                    list.IASetVertexBuffers(0, Some(&[vbv]));
                }
                None => list.IASetVertexBuffers(0, None),
            },
            Command::SetIndexBuffer(view) => match view {
                Some(view) => {
                    let ibv = D3D12_INDEX_BUFFER_VIEW {
                        BufferLocation: view.location.gpu_virtual_address(),
                        SizeInBytes: view.size_in_bytes,
                        Format: match view.format {
                            IndexFormat::U16 => windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_R16_UINT,
                        },
                    };
                    list.IASetIndexBuffer(Some(&ibv as *const D3D12_INDEX_BUFFER_VIEW));
                }
                None => list.IASetIndexBuffer(None),
            },
            Command::SetPrimitiveTopology(topology) => {
                let topology = match topology {
                    PrimitiveTopology::TriangleList => D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST,
                };
                list.IASetPrimitiveTopology(topology);
            }
            Command::DrawIndexedInstanced {
                index_count,
                instance_count,
                start_index_location,
                base_vertex_location,
                start_instance_location,
            } => {
                list.DrawIndexedInstanced(
                    *index_count,
                    *instance_count,
                    *start_index_location,
                    *base_vertex_location,
                    *start_instance_location,
                );
            }
            Command::DrawInstanced {
                vertex_count,
                instance_count,
                start_vertex_location,
                start_instance_location,
            } => {
                list.DrawInstanced(*vertex_count, *instance_count, *start_vertex_location, *start_instance_location);
            }
        }
        Ok(())
    }
}

impl UploadAllocator for Dx12Backend {
    fn create_upload_heap(&self, byte_size: u64) -> Result<Arc<dyn UploadHeap>> {
        self.allocator.create_upload_heap(byte_size)
    }
}

impl CommandQueue for Dx12Backend {
    fn fence(&self) -> &dyn Fence {
        &self.fence
    }

    fn signal(&mut self, value: FenceValue) -> Result<()> {
        unsafe {
            self.context
                .command_queue
                .Signal(self.fence.raw(), value.value())
                .map_err(|e| RenderError::Graphics(GraphicsError::Synchronization(format!("{:?}", e))))
        }
    }
}

impl RenderBackend for Dx12Backend {
    fn backend_name(&self) -> &str {
        "DirectX 12"
    }

    fn client_size(&self) -> (u32, u32) {
        (self.context.width, self.context.height)
    }

    fn create_pipeline(&mut self, id: Id<PipelineDesc>, name: &str, desc: &PipelineDesc) -> Result<()> {
        let pso = pipeline::create_pipeline_state(&self.context.device, &self.root_signature, &mut self.shaders, desc)?;

        if self.pipelines.len() <= id.index() {
            self.pipelines.resize(id.index() + 1, None);
        }
        self.pipelines[id.index()] = Some(pso);

        engine_debug!(
            pipeline = name,
            program = ?desc.program,
            rtv = ?dxgi_format(desc.render_target_format),
            "PSO created"
        );
        Ok(())
    }

    fn execute(&mut self, list: &CommandList, frame_index: usize) -> Result<()> {
        list.ensure_executable()?;

        let allocator = self.command_allocators.get(frame_index).ok_or_else(|| {
            RenderError::Graphics(GraphicsError::CommandExecution(format!(
                "frame index {} out of range ({} allocators)",
                frame_index,
                self.command_allocators.len()
            )))
        })?;

        let back_buffer = self.context.current_back_buffer()?;
        let rtv = self.context.current_back_buffer_view();
        let dsv = self.context.depth_stencil_view();

        unsafe {
            allocator.Reset().map_err(|e| execution_error("reset command allocator", e))?;
            self.command_list
                .Reset(allocator, None)
                .map_err(|e| execution_error("reset command list", e))?;

            let to_target =
                transition_barrier(&back_buffer, D3D12_RESOURCE_STATE_PRESENT, D3D12_RESOURCE_STATE_RENDER_TARGET);
            self.command_list.ResourceBarrier(std::slice::from_ref(&to_target));
            release_barrier(to_target);

            self.command_list.RSSetViewports(&[self.context.viewport()]);
            self.command_list.RSSetScissorRects(&[self.context.scissor_rect()]);
            self.command_list.OMSetRenderTargets(
                1,
                Some(&rtv as *const D3D12_CPU_DESCRIPTOR_HANDLE),
                false,
                Some(&dsv as *const D3D12_CPU_DESCRIPTOR_HANDLE),
            );
            self.command_list.SetDescriptorHeaps(&[Some(self.srv_heap.heap().clone())]);
            self.command_list.SetGraphicsRootSignature(&self.root_signature);

            for command in list.commands() {
                self.record(command)?;
            }

            let to_present =
                transition_barrier(&back_buffer, D3D12_RESOURCE_STATE_RENDER_TARGET, D3D12_RESOURCE_STATE_PRESENT);
            self.command_list.ResourceBarrier(std::slice::from_ref(&to_present));
            release_barrier(to_present);

            self.command_list
                .Close()
                .map_err(|e| execution_error("close command list", e))?;

            let lists = [Some(
                self.command_list
                    .cast::<ID3D12CommandList>()
                    .map_err(|e| execution_error("cast command list", e))?,
            )];
            self.context.command_queue.ExecuteCommandLists(&lists);
        }

        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        let interval = if self.vsync { 1 } else { 0 };
        unsafe {
            self.context
                .swap_chain
                .Present(interval, DXGI_PRESENT(0))
                .ok()
                .map_err(|e| RenderError::Graphics(GraphicsError::SwapchainError(format!("present: {:?}", e))))
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.context.resize(width, height)
    }
}
