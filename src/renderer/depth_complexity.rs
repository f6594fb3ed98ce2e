//! 深度复杂度可视化
//!
//! 两个阶段都在同一帧的命令记录内完成：
//!
//! 1. 计数：按 不透明 → alpha 测试 → 透明 的层顺序绘制整个场景，
//!    模板总是通过且每次加一回绕，得到每个像素被覆盖的次数（不受遮挡影响）
//! 2. 可视化：对每个层级 i 设置模板参考值 i（比较函数 EQUAL，不修改模板），
//!    用根常量选择颜色，绘制一次全屏四边形。只有计数恰好为 i 的像素会被着色
//!
//! 超出模板位宽的计数会回绕，这是该方法的固有限制。

use crate::core::error::Result;
use crate::core::math::Color;
use crate::geometry::PrimitiveTopology;
use crate::scene::Table;

use super::command::CommandList;
use super::dispatch::{self, DrawContext};
use super::pipeline::{names, PipelineDesc, RootSlot};

/// 可视化的层级数，CPU 循环与着色器中的颜色表共用
pub const DEPTH_COMPLEXITY_LEVELS: u32 = 5;

/// 每个层级的颜色
pub const LEVEL_COLORS: [Color; DEPTH_COMPLEXITY_LEVELS as usize] = [
    Color::BLACK,
    Color::BLUE,
    Color::GREEN,
    Color::YELLOW,
    Color::RED,
];

/// 全屏四边形的顶点数（两个三角形，无顶点缓冲，由 SV_VertexID 生成）
pub const QUAD_VERTEX_COUNT: u32 = 6;

/// 全屏四边形的 NDC 坐标，屏幕空间顺时针
pub const QUAD_NDC: [[f32; 2]; QUAD_VERTEX_COUNT as usize] = [
    [-1.0, 1.0],
    [1.0, 1.0],
    [-1.0, -1.0],
    [-1.0, -1.0],
    [1.0, 1.0],
    [1.0, -1.0],
];

/// 层级 `level` 的颜色；超出范围时取最后一个
pub fn level_color(level: u32) -> Color {
    let last = LEVEL_COLORS.len() - 1;
    LEVEL_COLORS[(level as usize).min(last)]
}

/// 阶段一：用计数管线按层顺序绘制场景
pub fn record_count_pass(cmd_list: &mut CommandList, ctx: &DrawContext<'_>) -> Result<()> {
    dispatch::draw_layers(cmd_list, ctx, true)
}

/// 阶段二：每个层级一次全屏四边形
pub fn record_visualize_pass(cmd_list: &mut CommandList, pipelines: &Table<PipelineDesc>) -> Result<()> {
    cmd_list.set_pipeline_state(pipelines.id_of(names::DRAWING)?);

    for level in 0..DEPTH_COMPLEXITY_LEVELS {
        cmd_list.set_stencil_ref(level);
        cmd_list.set_root_32bit_constant(RootSlot::LevelConstant, level);
        cmd_list.set_vertex_buffer(None);
        cmd_list.set_index_buffer(None);
        cmd_list.set_primitive_topology(PrimitiveTopology::TriangleList);
        cmd_list.draw_instanced(QUAD_VERTEX_COUNT, 1, 0, 0);
    }

    Ok(())
}

/// 传给 HLSL 编译器的宏，着色器的颜色表和全屏四边形都从这里生成
pub fn shader_defines() -> Vec<(String, String)> {
    let colors = LEVEL_COLORS
        .iter()
        .map(|c| format!("float4({:.6}, {:.6}, {:.6}, {:.6})", c.r, c.g, c.b, c.a))
        .collect::<Vec<_>>()
        .join(", ");
    let quad = QUAD_NDC
        .iter()
        .map(|[x, y]| format!("float2({:.6}, {:.6})", x, y))
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        ("LEVEL_COUNT".to_string(), DEPTH_COMPLEXITY_LEVELS.to_string()),
        ("LEVEL_COLORS".to_string(), colors),
        ("QUAD_VERTEX_COUNT".to_string(), QUAD_VERTEX_COUNT.to_string()),
        ("QUAD_NDC".to_string(), quad),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CountMode;
    use crate::renderer::command::{Command, CommandAllocator};
    use crate::renderer::pipeline::build_pipeline_table;

    #[test]
    fn test_visualize_pass_commands() {
        let pipelines = build_pipeline_table(CountMode::DepthComplexity).unwrap();
        let mut list = CommandList::new();
        list.reset(&CommandAllocator::new()).unwrap();
        record_visualize_pass(&mut list, &pipelines).unwrap();
        list.close().unwrap();

        let commands = list.commands();
        assert!(matches!(commands[0], Command::SetPipelineState(id) if pipelines.name(id) == "drawing"));

        let refs: Vec<u32> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetStencilRef(r) => Some(*r),
                _ => None,
            })
            .collect();
        assert_eq!(refs, (0..DEPTH_COMPLEXITY_LEVELS).collect::<Vec<_>>());

        // 每个层级：模板参考值与根常量一致，且紧接着一次 6 顶点的非索引绘制
        for chunk in commands[1..].chunks(6) {
            let level = match chunk[0] {
                Command::SetStencilRef(r) => r,
                _ => panic!("expected stencil ref"),
            };
            assert!(matches!(
                chunk[1],
                Command::SetRoot32BitConstant { slot: RootSlot::LevelConstant, value } if value == level
            ));
            assert!(matches!(chunk[2], Command::SetVertexBuffer(None)));
            assert!(matches!(chunk[3], Command::SetIndexBuffer(None)));
            assert!(matches!(
                chunk[5],
                Command::DrawInstanced { vertex_count: 6, instance_count: 1, .. }
            ));
        }
    }

    #[test]
    fn test_shader_defines_follow_level_table() {
        let defines = shader_defines();
        assert_eq!(defines[0], ("LEVEL_COUNT".to_string(), "5".to_string()));
        assert_eq!(defines[1].1.matches("float4(").count(), LEVEL_COLORS.len());
        assert!(defines[1].1.starts_with("float4(0.000000, 0.000000, 0.000000, 1.000000)"));
    }

    #[test]
    fn test_shader_defines_carry_quad() {
        let defines = shader_defines();
        let get = |name: &str| defines.iter().find(|(n, _)| n == name).map(|(_, v)| v.clone()).unwrap();

        assert_eq!(get("QUAD_VERTEX_COUNT"), "6");
        let quad = get("QUAD_NDC");
        assert_eq!(quad.matches("float2(").count(), QUAD_NDC.len());
        assert!(quad.starts_with("float2(-1.000000, 1.000000), float2(1.000000, 1.000000)"));
        assert!(quad.ends_with("float2(1.000000, -1.000000)"));
    }

    #[test]
    fn test_level_color_clamps() {
        assert_eq!(level_color(1), Color::BLUE);
        assert_eq!(level_color(99), Color::RED);
    }
}
