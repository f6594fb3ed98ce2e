//! 资源管理模块
//!
//! 所有 CPU 写、GPU 读的缓冲区都放在上传堆里：常量缓冲、动态顶点缓冲，
//! 以及演示用的静态几何。上传堆在创建时持久映射，整个生命周期内不再 Unmap。
//!
//! - [`UploadHeap`]：后端提供的一段映射内存
//! - [`UploadBuffer`]：按元素类型解释上传堆，自动处理常量缓冲区的 256 字节对齐
//! - [`HostUploadHeap`]：纯内存实现，软件后端和测试使用

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

use bytemuck::Pod;

use crate::core::error::{GraphicsError, RenderError, Result};

/// 常量缓冲区对齐要求（字节）
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// 常量缓冲区大小向上取整到 256 的倍数
pub fn constant_buffer_byte_size(byte_size: u64) -> u64 {
    (byte_size + CONSTANT_BUFFER_ALIGNMENT - 1) & !(CONSTANT_BUFFER_ALIGNMENT - 1)
}

/// 缓冲区使用类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsageType {
    /// 顶点或索引数据，元素紧密排列
    Vertex,
    /// 常量缓冲区，每个元素对齐到 256 字节
    Constant,
    /// 结构化缓冲区，元素紧密排列，整体绑定为根 SRV
    Structured,
}

/// 持久映射的上传堆
pub trait UploadHeap: Send + Sync + fmt::Debug {
    fn byte_size(&self) -> u64;

    /// 写入 CPU 侧映射
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// 读回映射内容
    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()>;

    /// GPU 虚拟地址的基址
    fn gpu_virtual_address(&self) -> u64;
}

/// 上传堆的创建者（由后端实现）
pub trait UploadAllocator {
    fn create_upload_heap(&self, byte_size: u64) -> Result<Arc<dyn UploadHeap>>;
}

/// 上传堆中的一个位置
#[derive(Clone)]
pub struct BufferLocation {
    pub heap: Arc<dyn UploadHeap>,
    pub offset: u64,
}

impl BufferLocation {
    pub fn new(heap: Arc<dyn UploadHeap>, offset: u64) -> Self {
        Self { heap, offset }
    }

    pub fn gpu_virtual_address(&self) -> u64 {
        self.heap.gpu_virtual_address() + self.offset
    }
}

impl fmt::Debug for BufferLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferLocation")
            .field("gpu_virtual_address", &format_args!("{:#x}", self.gpu_virtual_address()))
            .finish()
    }
}

fn check_range(heap_size: u64, offset: u64, len: usize) -> Result<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= heap_size => Ok(()),
        _ => Err(RenderError::Graphics(GraphicsError::ResourceCreation(format!(
            "access [{}, +{}) outside upload heap of {} bytes",
            offset, len, heap_size
        )))),
    }
}

/// 内存中的上传堆
#[derive(Debug)]
pub struct HostUploadHeap {
    bytes: RwLock<Vec<u8>>,
    base_address: u64,
}

impl HostUploadHeap {
    /// `base_address` 只用于调试输出与地址计算，软件后端按堆对象本身访问数据
    pub fn new(byte_size: u64, base_address: u64) -> Self {
        Self {
            bytes: RwLock::new(vec![0; byte_size as usize]),
            base_address,
        }
    }

    pub fn with_bytes(bytes: &[u8], base_address: u64) -> Self {
        Self {
            bytes: RwLock::new(bytes.to_vec()),
            base_address,
        }
    }

    /// 在读锁下直接访问全部字节
    pub fn with_contents<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let bytes = self.bytes.read().map_err(|e| lock_error(e.to_string()))?;
        Ok(f(&bytes))
    }
}

fn lock_error(msg: String) -> RenderError {
    RenderError::Graphics(GraphicsError::Synchronization(format!("upload heap lock poisoned: {}", msg)))
}

impl UploadHeap for HostUploadHeap {
    fn byte_size(&self) -> u64 {
        // 创建后长度不变
        self.bytes.read().map(|b| b.len() as u64).unwrap_or(0)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.write().map_err(|e| lock_error(e.to_string()))?;
        check_range(bytes.len() as u64, offset, data.len())?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.read().map_err(|e| lock_error(e.to_string()))?;
        check_range(bytes.len() as u64, offset, out.len())?;
        let start = offset as usize;
        out.copy_from_slice(&bytes[start..start + out.len()]);
        Ok(())
    }

    fn gpu_virtual_address(&self) -> u64 {
        self.base_address
    }
}

/// 上传缓冲区（CPU -> GPU）
///
/// 按元素类型 `T` 解释一段上传堆。常量缓冲区的元素步长对齐到 256 字节，
/// 这样每个元素都能单独绑定为 CBV。
pub struct UploadBuffer<T> {
    heap: Arc<dyn UploadHeap>,
    element_count: usize,
    element_byte_size: u64,
    usage: BufferUsageType,
    _phantom: PhantomData<T>,
}

impl<T: Pod> UploadBuffer<T> {
    /// 创建新的上传缓冲区
    ///
    /// # 参数
    ///
    /// * `allocator` - 提供上传堆的后端
    /// * `element_count` - 元素数量
    /// * `usage` - 缓冲区使用类型
    pub fn new<A>(allocator: &A, element_count: usize, usage: BufferUsageType) -> Result<Self>
    where
        A: UploadAllocator + ?Sized,
    {
        let size = std::mem::size_of::<T>() as u64;
        let element_byte_size = match usage {
            BufferUsageType::Constant => constant_buffer_byte_size(size),
            BufferUsageType::Vertex | BufferUsageType::Structured => size,
        };

        // 空缓冲区也分配一个元素，后端不接受 0 字节的资源
        let byte_size = element_byte_size * element_count.max(1) as u64;
        let heap = allocator.create_upload_heap(byte_size)?;

        Ok(Self {
            heap,
            element_count,
            element_byte_size,
            usage,
            _phantom: PhantomData,
        })
    }

    /// 写入第 `index` 个元素
    pub fn copy_data(&self, index: usize, data: &T) -> Result<()> {
        self.check_index(index)?;
        self.heap.write(self.element_offset(index), bytemuck::bytes_of(data))
    }

    /// 从第 `first` 个元素开始连续写入（仅限紧密排列的缓冲区）
    pub fn copy_slice(&self, first: usize, data: &[T]) -> Result<()> {
        debug_assert_ne!(self.usage, BufferUsageType::Constant);
        if data.is_empty() {
            return Ok(());
        }
        self.check_index(first + data.len() - 1)?;
        self.heap.write(self.element_offset(first), bytemuck::cast_slice(data))
    }

    /// 读回第 `index` 个元素
    pub fn read(&self, index: usize) -> Result<T> {
        self.check_index(index)?;
        let mut value = T::zeroed();
        self.heap.read(self.element_offset(index), bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.element_count {
            return Err(RenderError::Graphics(GraphicsError::ResourceCreation(format!(
                "upload buffer index {} out of bounds ({} elements)",
                index, self.element_count
            ))));
        }
        Ok(())
    }
}

impl<T> UploadBuffer<T> {
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// 每个元素的步长（对齐后）
    pub fn element_byte_size(&self) -> u64 {
        self.element_byte_size
    }

    pub fn byte_size(&self) -> u64 {
        self.element_byte_size * self.element_count as u64
    }

    pub fn element_offset(&self, index: usize) -> u64 {
        self.element_byte_size * index as u64
    }

    /// 第 `index` 个元素在 GPU 上的位置
    pub fn location(&self, index: usize) -> BufferLocation {
        BufferLocation::new(Arc::clone(&self.heap), self.element_offset(index))
    }

    pub fn heap(&self) -> &Arc<dyn UploadHeap> {
        &self.heap
    }
}

impl<T> fmt::Debug for UploadBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadBuffer")
            .field("element_count", &self.element_count)
            .field("element_byte_size", &self.element_byte_size)
            .field("usage", &self.usage)
            .finish()
    }
}

/// 在内存中分配上传堆，每个堆分到一段不重叠的伪 GPU 地址
#[derive(Debug, Default)]
pub struct HostAllocator {
    next_address: std::sync::atomic::AtomicU64,
}

impl HostAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UploadAllocator for HostAllocator {
    fn create_upload_heap(&self, byte_size: u64) -> Result<Arc<dyn UploadHeap>> {
        use std::sync::atomic::Ordering;

        // 保留 64KB 对齐的地址区间，与 D3D12 资源放置对齐一致
        let reserved = (byte_size.max(1) + 0xffff) & !0xffff;
        let base = 0x1_0000 + self.next_address.fetch_add(reserved, Ordering::Relaxed);
        Ok(Arc::new(HostUploadHeap::new(byte_size, base)))
    }
}
