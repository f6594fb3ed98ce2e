//! 命令列表模块
//!
//! 渲染逻辑把一帧的工作记录为与后端无关的 [`Command`] 序列，
//! 后端在 `execute` 时翻译（D3D12）或直接解释执行（软件光栅化）。
//!
//! 状态机与 D3D12 一致：
//!
//! ```text
//! Initial --reset--> Recording --close--> Executable --reset--> Recording
//! ```
//!
//! [`CommandAllocator`] 只能在它最后一次提交的 Fence 完成后重置。

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::geometry::{IndexFormat, PrimitiveTopology};
use crate::scene::Id;

use super::pipeline::{PipelineDesc, RootSlot};
use super::resource::BufferLocation;
use super::sync::FenceValue;

/// 顶点缓冲视图
#[derive(Debug, Clone)]
pub struct VertexBufferView {
    pub location: BufferLocation,
    pub size_in_bytes: u32,
    pub stride_in_bytes: u32,
}

/// 索引缓冲视图
#[derive(Debug, Clone)]
pub struct IndexBufferView {
    pub location: BufferLocation,
    pub size_in_bytes: u32,
    pub format: IndexFormat,
}

/// 一条记录下来的命令
#[derive(Debug, Clone)]
pub enum Command {
    ClearRenderTarget { color: [f32; 4] },
    ClearDepthStencil { depth: f32, stencil: u8 },
    SetPipelineState(Id<PipelineDesc>),
    SetStencilRef(u32),
    SetRoot32BitConstant { slot: RootSlot, value: u32 },
    SetRootConstantBufferView { slot: RootSlot, location: BufferLocation },
    /// 结构化缓冲的起始位置
    SetRootShaderResourceView { slot: RootSlot, location: BufferLocation },
    /// 着色器可见 SRV 堆中的描述符下标
    SetRootDescriptorTable { slot: RootSlot, heap_index: u32 },
    /// `None` 解绑
    SetVertexBuffer(Option<VertexBufferView>),
    SetIndexBuffer(Option<IndexBufferView>),
    SetPrimitiveTopology(PrimitiveTopology),
    DrawIndexedInstanced {
        index_count: u32,
        instance_count: u32,
        start_index_location: u32,
        base_vertex_location: i32,
        start_instance_location: u32,
    },
    DrawInstanced {
        vertex_count: u32,
        instance_count: u32,
        start_vertex_location: u32,
        start_instance_location: u32,
    },
}

/// 命令列表状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// 初始状态
    Initial,
    /// 正在记录
    Recording,
    /// 已完成记录
    Executable,
}

/// 命令分配器
///
/// 记录它最后一次提交的 Fence 值；GPU 未完成之前不能重置。
#[derive(Debug, Default)]
pub struct CommandAllocator {
    submitted: FenceValue,
    reset_count: u64,
}

impl CommandAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 复用分配器的内存
    ///
    /// # 参数
    ///
    /// * `completed` - 队列 Fence 当前的完成值
    pub fn reset(&mut self, completed: FenceValue) -> Result<()> {
        if self.submitted > completed {
            return Err(RenderError::Graphics(GraphicsError::AllocatorInFlight {
                pending: self.submitted.value(),
                completed: completed.value(),
            }));
        }
        self.reset_count += 1;
        Ok(())
    }

    /// 提交后由帧资源环打上 Fence
    pub fn mark_submitted(&mut self, fence: FenceValue) {
        self.submitted = fence;
    }

    pub fn submitted(&self) -> FenceValue {
        self.submitted
    }

    pub fn reset_count(&self) -> u64 {
        self.reset_count
    }
}

/// 命令列表
#[derive(Debug)]
pub struct CommandList {
    state: CommandListState,
    commands: Vec<Command>,
}

impl Default for CommandList {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandList {
    pub fn new() -> Self {
        Self {
            state: CommandListState::Initial,
            commands: Vec::new(),
        }
    }

    /// 开始记录；保留上次的容量
    pub fn reset(&mut self, _allocator: &CommandAllocator) -> Result<()> {
        if self.state == CommandListState::Recording {
            return Err(RenderError::Graphics(GraphicsError::CommandExecution(
                "command list reset while still recording".to_string(),
            )));
        }
        self.commands.clear();
        self.state = CommandListState::Recording;
        Ok(())
    }

    /// 结束记录命令
    pub fn close(&mut self) -> Result<()> {
        if self.state != CommandListState::Recording {
            return Err(RenderError::Graphics(GraphicsError::CommandExecution(
                "close called on a command list that is not recording".to_string(),
            )));
        }
        self.state = CommandListState::Executable;
        Ok(())
    }

    pub fn state(&self) -> CommandListState {
        self.state
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// 供后端提交前检查
    pub fn ensure_executable(&self) -> Result<()> {
        if self.state != CommandListState::Executable {
            return Err(RenderError::Graphics(GraphicsError::CommandExecution(format!(
                "command list submitted in state {:?}",
                self.state
            ))));
        }
        Ok(())
    }

    fn record(&mut self, command: Command) {
        debug_assert_eq!(self.state, CommandListState::Recording, "recording into a closed list");
        self.commands.push(command);
    }

    // ========== 记录接口 ==========

    pub fn clear_render_target(&mut self, color: [f32; 4]) {
        self.record(Command::ClearRenderTarget { color });
    }

    pub fn clear_depth_stencil(&mut self, depth: f32, stencil: u8) {
        self.record(Command::ClearDepthStencil { depth, stencil });
    }

    pub fn set_pipeline_state(&mut self, pipeline: Id<PipelineDesc>) {
        self.record(Command::SetPipelineState(pipeline));
    }

    pub fn set_stencil_ref(&mut self, stencil_ref: u32) {
        self.record(Command::SetStencilRef(stencil_ref));
    }

    pub fn set_root_32bit_constant(&mut self, slot: RootSlot, value: u32) {
        self.record(Command::SetRoot32BitConstant { slot, value });
    }

    pub fn set_root_constant_buffer_view(&mut self, slot: RootSlot, location: BufferLocation) {
        self.record(Command::SetRootConstantBufferView { slot, location });
    }

    pub fn set_root_shader_resource_view(&mut self, slot: RootSlot, location: BufferLocation) {
        self.record(Command::SetRootShaderResourceView { slot, location });
    }

    pub fn set_root_descriptor_table(&mut self, slot: RootSlot, heap_index: u32) {
        self.record(Command::SetRootDescriptorTable { slot, heap_index });
    }

    pub fn set_vertex_buffer(&mut self, view: Option<VertexBufferView>) {
        self.record(Command::SetVertexBuffer(view));
    }

    pub fn set_index_buffer(&mut self, view: Option<IndexBufferView>) {
        self.record(Command::SetIndexBuffer(view));
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.record(Command::SetPrimitiveTopology(topology));
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index_location: u32,
        base_vertex_location: i32,
        start_instance_location: u32,
    ) {
        self.record(Command::DrawIndexedInstanced {
            index_count,
            instance_count,
            start_index_location,
            base_vertex_location,
            start_instance_location,
        });
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex_location: u32,
        start_instance_location: u32,
    ) {
        self.record(Command::DrawInstanced {
            vertex_count,
            instance_count,
            start_vertex_location,
            start_instance_location,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_list_state_machine() {
        let allocator = CommandAllocator::new();
        let mut list = CommandList::new();

        assert_eq!(list.state(), CommandListState::Initial);
        assert!(list.close().is_err());
        assert!(list.ensure_executable().is_err());

        list.reset(&allocator).unwrap();
        assert_eq!(list.state(), CommandListState::Recording);
        // 记录中不能再次重置
        assert!(list.reset(&allocator).is_err());

        list.set_stencil_ref(2);
        list.draw_instanced(6, 1, 0, 0);
        list.close().unwrap();
        assert_eq!(list.state(), CommandListState::Executable);
        assert!(list.ensure_executable().is_ok());
        assert_eq!(list.commands().len(), 2);

        // 重置后清空上一帧的命令
        list.reset(&allocator).unwrap();
        assert!(list.commands().is_empty());
    }

    #[test]
    fn test_allocator_reset_waits_for_fence() {
        let mut allocator = CommandAllocator::new();
        allocator.reset(FenceValue::NONE).unwrap();

        allocator.mark_submitted(FenceValue::new(4));
        let err = allocator.reset(FenceValue::new(3)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Graphics(GraphicsError::AllocatorInFlight { pending: 4, completed: 3 })
        ));

        allocator.reset(FenceValue::new(4)).unwrap();
        assert_eq!(allocator.reset_count(), 2);
    }
}
