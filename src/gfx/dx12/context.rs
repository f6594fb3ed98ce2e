//! DirectX 12 设备上下文
//!
//! 封装设备、命令队列、交换链以及交换链相关的 RTV/DSV。
//!
//! # 初始化流程
//!
//! 1. 启用调试层（按配置）
//! 2. 创建 DXGI 工厂和 D3D12 设备
//! 3. 创建命令队列
//! 4. 创建交换链（双缓冲）
//! 5. 创建 RTV/DSV 描述符堆、渲染目标视图和深度模板缓冲

use std::sync::Arc;

use tracing::{debug, info, warn};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;
use windows::Win32::Graphics::Dxgi::*;
use raw_window_handle::{HasWindowHandle, RawWindowHandle};
use winit::window::Window;

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::core::Config;
use crate::renderer::pipeline::{TextureFormat, BACK_BUFFER_FORMAT, DEPTH_STENCIL_FORMAT};

use super::descriptor::Dx12DescriptorHeap;

/// 交换链缓冲数
pub const SWAP_CHAIN_BUFFER_COUNT: u32 = 2;

pub(crate) fn dxgi_format(format: TextureFormat) -> DXGI_FORMAT {
    match format {
        TextureFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
        TextureFormat::D24UnormS8Uint => DXGI_FORMAT_D24_UNORM_S8_UINT,
    }
}

pub(crate) fn graphics_error(what: &str, e: windows::core::Error) -> RenderError {
    RenderError::Graphics(GraphicsError::ResourceCreation(format!("{}: {:?}", what, e)))
}

/// DirectX 12 设备上下文
///
/// # 字段说明
///
/// - `device`：D3D12 设备，用于创建和管理 GPU 资源
/// - `command_queue`：直接命令队列
/// - `swap_chain`：交换链，管理前后缓冲区
/// - `rtv_heap` / `dsv_heap`：渲染目标和深度模板视图
/// - `depth_stencil_buffer`：D24S8 深度模板缓冲，模板平面用于计数
pub struct Dx12Context {
    pub device: ID3D12Device,
    pub command_queue: ID3D12CommandQueue,
    pub swap_chain: IDXGISwapChain3,
    pub rtv_heap: Dx12DescriptorHeap,
    pub dsv_heap: Dx12DescriptorHeap,
    pub depth_stencil_buffer: ID3D12Resource,
    pub window: Arc<Window>,
    pub width: u32,
    pub height: u32,
}

// D3D12 的设备与队列对象是自由线程的
unsafe impl Send for Dx12Context {}
unsafe impl Sync for Dx12Context {}

impl Dx12Context {
    /// 在已有窗口上创建设备与交换链
    ///
    /// # 参数
    ///
    /// * `window` - 宿主窗口，必须是 Win32 窗口
    /// * `config` - 读取调试层开关
    pub fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        unsafe {
            // 1. 调试层
            let mut factory_flags = DXGI_CREATE_FACTORY_FLAGS(0);
            if config.graphics.debug_layer {
                let mut debug: Option<ID3D12Debug> = None;
                match D3D12GetDebugInterface(&mut debug) {
                    Ok(()) => {
                        if let Some(debug) = debug {
                            debug.EnableDebugLayer();
                            factory_flags = DXGI_CREATE_FACTORY_DEBUG;
                            debug!("DX12 debug layer enabled");
                        }
                    }
                    Err(e) => warn!("Failed to enable DX12 debug layer: {:?}", e),
                }
            }

            // 2. 工厂和设备
            let factory: IDXGIFactory4 = CreateDXGIFactory2(factory_flags)
                .map_err(|e| RenderError::Graphics(GraphicsError::DeviceCreation(format!("DXGI factory: {:?}", e))))?;

            let mut device: Option<ID3D12Device> = None;
            D3D12CreateDevice(None, D3D_FEATURE_LEVEL_11_0, &mut device)
                .map_err(|e| RenderError::Graphics(GraphicsError::DeviceCreation(format!("{:?}", e))))?;
            let device = device.ok_or_else(|| {
                RenderError::Graphics(GraphicsError::DeviceCreation("D3D12CreateDevice returned no device".to_string()))
            })?;

            // 3. 命令队列
            let queue_desc = D3D12_COMMAND_QUEUE_DESC {
                Type: D3D12_COMMAND_LIST_TYPE_DIRECT,
                Flags: D3D12_COMMAND_QUEUE_FLAG_NONE,
                ..Default::default()
            };
            let command_queue: ID3D12CommandQueue = device
                .CreateCommandQueue(&queue_desc)
                .map_err(|e| RenderError::Graphics(GraphicsError::DeviceCreation(format!("command queue: {:?}", e))))?;

            // 4. 交换链
            let window_handle = window
                .window_handle()
                .map_err(|e| RenderError::Graphics(GraphicsError::SwapchainError(e.to_string())))?;
            let hwnd = match window_handle.as_raw() {
                RawWindowHandle::Win32(handle) => HWND(handle.hwnd.get() as *mut core::ffi::c_void),
                _ => {
                    return Err(RenderError::Graphics(GraphicsError::SwapchainError(
                        "expected a Win32 window handle".to_string(),
                    )))
                }
            };

            let swap_chain_desc = DXGI_SWAP_CHAIN_DESC1 {
                Width: width,
                Height: height,
                Format: dxgi_format(BACK_BUFFER_FORMAT),
                SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
                BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
                BufferCount: SWAP_CHAIN_BUFFER_COUNT,
                SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
                ..Default::default()
            };
            let swap_chain: IDXGISwapChain1 = factory
                .CreateSwapChainForHwnd(&command_queue, hwnd, &swap_chain_desc, None, None)
                .map_err(|e| RenderError::Graphics(GraphicsError::SwapchainError(format!("{:?}", e))))?;
            let swap_chain: IDXGISwapChain3 = swap_chain
                .cast()
                .map_err(|e| RenderError::Graphics(GraphicsError::SwapchainError(format!("{:?}", e))))?;

            // 5. 描述符堆
            let rtv_heap = Dx12DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_RTV, SWAP_CHAIN_BUFFER_COUNT, false)?;
            let dsv_heap = Dx12DescriptorHeap::new(&device, D3D12_DESCRIPTOR_HEAP_TYPE_DSV, 1, false)?;

            let depth_stencil_buffer = create_depth_stencil(&device, width, height)?;

            let context = Self {
                device,
                command_queue,
                swap_chain,
                rtv_heap,
                dsv_heap,
                depth_stencil_buffer,
                window,
                width,
                height,
            };
            context.create_views()?;

            info!(width, height, buffers = SWAP_CHAIN_BUFFER_COUNT, "DX12 device and swap chain created");
            Ok(context)
        }
    }

    /// 为交换链缓冲和深度缓冲创建视图
    fn create_views(&self) -> Result<()> {
        unsafe {
            for i in 0..SWAP_CHAIN_BUFFER_COUNT {
                let surface: ID3D12Resource = self
                    .swap_chain
                    .GetBuffer(i)
                    .map_err(|e| graphics_error("swap chain buffer", e))?;
                self.device.CreateRenderTargetView(&surface, None, self.rtv_heap.cpu_handle(i));
            }

            let dsv_desc = D3D12_DEPTH_STENCIL_VIEW_DESC {
                Format: dxgi_format(DEPTH_STENCIL_FORMAT),
                ViewDimension: D3D12_DSV_DIMENSION_TEXTURE2D,
                Flags: D3D12_DSV_FLAG_NONE,
                ..Default::default()
            };
            self.device.CreateDepthStencilView(
                &self.depth_stencil_buffer,
                Some(&dsv_desc),
                self.dsv_heap.cpu_handle(0),
            );
        }
        Ok(())
    }

    /// 重建交换链缓冲和深度缓冲，调用前 GPU 必须空闲
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let width = width.max(1);
        let height = height.max(1);

        unsafe {
            self.swap_chain
                .ResizeBuffers(
                    SWAP_CHAIN_BUFFER_COUNT,
                    width,
                    height,
                    dxgi_format(BACK_BUFFER_FORMAT),
                    DXGI_SWAP_CHAIN_FLAG(0),
                )
                .map_err(|e| RenderError::Graphics(GraphicsError::SwapchainError(format!("{:?}", e))))?;
        }

        self.depth_stencil_buffer = create_depth_stencil(&self.device, width, height)?;
        self.width = width;
        self.height = height;
        self.create_views()?;

        debug!(width, height, "DX12 swap chain resized");
        Ok(())
    }

    pub fn current_back_buffer_index(&self) -> u32 {
        unsafe { self.swap_chain.GetCurrentBackBufferIndex() }
    }

    pub fn current_back_buffer(&self) -> Result<ID3D12Resource> {
        unsafe {
            self.swap_chain
                .GetBuffer(self.current_back_buffer_index())
                .map_err(|e| graphics_error("swap chain buffer", e))
        }
    }

    pub fn current_back_buffer_view(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        self.rtv_heap.cpu_handle(self.current_back_buffer_index())
    }

    pub fn depth_stencil_view(&self) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        self.dsv_heap.cpu_handle(0)
    }

    pub fn viewport(&self) -> D3D12_VIEWPORT {
        D3D12_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: self.width as f32,
            Height: self.height as f32,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        }
    }

    pub fn scissor_rect(&self) -> windows::Win32::Foundation::RECT {
        windows::Win32::Foundation::RECT {
            left: 0,
            top: 0,
            right: self.width as i32,
            bottom: self.height as i32,
        }
    }
}

/// 创建 D24S8 深度模板缓冲，清除值为深度 1、模板 0
fn create_depth_stencil(device: &ID3D12Device, width: u32, height: u32) -> Result<ID3D12Resource> {
    let heap_props = D3D12_HEAP_PROPERTIES {
        Type: D3D12_HEAP_TYPE_DEFAULT,
        ..Default::default()
    };
    let desc = D3D12_RESOURCE_DESC {
        Dimension: D3D12_RESOURCE_DIMENSION_TEXTURE2D,
        Width: width as u64,
        Height: height,
        DepthOrArraySize: 1,
        MipLevels: 1,
        Format: dxgi_format(DEPTH_STENCIL_FORMAT),
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Layout: D3D12_TEXTURE_LAYOUT_UNKNOWN,
        Flags: D3D12_RESOURCE_FLAG_ALLOW_DEPTH_STENCIL,
        ..Default::default()
    };
    let clear_value = D3D12_CLEAR_VALUE {
        Format: dxgi_format(DEPTH_STENCIL_FORMAT),
        Anonymous: D3D12_CLEAR_VALUE_0 {
            DepthStencil: D3D12_DEPTH_STENCIL_VALUE { Depth: 1.0, Stencil: 0 },
        },
    };

    let mut buffer: Option<ID3D12Resource> = None;
    unsafe {
        device
            .CreateCommittedResource(
                &heap_props,
                D3D12_HEAP_FLAG_NONE,
                &desc,
                D3D12_RESOURCE_STATE_DEPTH_WRITE,
                Some(&clear_value),
                &mut buffer,
            )
            .map_err(|e| graphics_error("depth stencil buffer", e))?;
    }
    buffer.ok_or_else(|| RenderError::Graphics(GraphicsError::ResourceCreation("depth stencil buffer".to_string())))
}
