//! 图形后端的统一抽象接口
//!
//! 本模块定义了所有图形后端（软件光栅化、DirectX 12）必须实现的统一接口。
//! 渲染逻辑只记录与后端无关的命令列表，提交、呈现和同步都经由此接口完成。

use crate::core::error::Result;
use crate::renderer::command::CommandList;
use crate::renderer::pipeline::PipelineDesc;
use crate::renderer::resource::UploadAllocator;
use crate::renderer::sync::CommandQueue;
use crate::scene::{Id, Table};

/// 图形后端的统一接口
///
/// 后端同时是命令队列（提供 Fence 与 signal）和上传堆分配器。
///
/// # 约定
///
/// - 队列按提交顺序执行，`signal` 在之前提交的命令完成后才生效
/// - `execute` 只排队，不等待 GPU
/// - 上传堆的生命周期由引用它的 `Arc` 决定，调用方负责在 GPU 使用期间不覆盖
pub trait RenderBackend: CommandQueue + UploadAllocator {
    /// 获取后端的名称
    ///
    /// # 返回值
    ///
    /// 后端名称的字符串切片（如 "Software"、"DirectX 12"）
    fn backend_name(&self) -> &str;

    /// 当前渲染目标的尺寸（宽, 高）
    fn client_size(&self) -> (u32, u32);

    /// 创建管线状态对象
    ///
    /// # 参数
    ///
    /// * `id` - 命令列表中引用该管线使用的 id
    /// * `name` - 管线名称，用于日志
    /// * `desc` - 管线描述
    fn create_pipeline(&mut self, id: Id<PipelineDesc>, name: &str, desc: &PipelineDesc) -> Result<()>;

    /// 按表中的顺序创建全部管线
    fn create_pipelines(&mut self, pipelines: &Table<PipelineDesc>) -> Result<()> {
        for (id, desc) in pipelines.iter() {
            self.create_pipeline(id, pipelines.name(id), desc)?;
        }
        Ok(())
    }

    /// 提交一个已关闭的命令列表
    ///
    /// # 参数
    ///
    /// * `list` - 处于 Executable 状态的命令列表
    /// * `frame_index` - 记录它的帧资源下标，D3D12 后端据此选择命令分配器
    fn execute(&mut self, list: &CommandList, frame_index: usize) -> Result<()>;

    /// 交换前后缓冲
    fn present(&mut self) -> Result<()>;

    /// 重建交换链与深度缓冲
    ///
    /// 调用前必须 flush，保证 GPU 不再引用旧的缓冲。
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;
}
