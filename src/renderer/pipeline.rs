//! 管线状态描述
//!
//! 与后端无关的 PSO 描述：深度/模板、光栅化、混合以及着色器程序。
//! D3D12 后端逐字段翻译为 `D3D12_GRAPHICS_PIPELINE_STATE_DESC`，
//! 软件后端直接按描述执行深度/模板测试。

use crate::core::config::CountMode;
use crate::core::error::Result;
use crate::scene::{RenderLayer, Table};

/// 模板读写掩码：完整的 8 位
pub const STENCIL_FULL_MASK: u8 = 0xff;

/// 根签名参数槽位
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootSlot {
    /// t0，1 个 SRV 的描述符表
    DiffuseTexture = 0,
    /// b0
    ObjectCb = 1,
    /// b1
    PassCb = 2,
    /// t0 space1，材质结构化缓冲的根 SRV
    MaterialBuffer = 3,
    /// b3，1 个 32 位根常量
    LevelConstant = 4,
}

impl RootSlot {
    pub const COUNT: usize = 5;

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// 纹理格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    /// RGBA 8位无符号归一化
    Rgba8Unorm,
    /// 深度 24位 + 模板 8位
    D24UnormS8Uint,
}

pub const BACK_BUFFER_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;
pub const DEPTH_STENCIL_FORMAT: TextureFormat = TextureFormat::D24UnormS8Uint;

/// 比较函数，`src` 为新值（深度）或参考值（模板），`dst` 为缓冲中的值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl ComparisonFunc {
    pub fn test<T: PartialOrd>(self, src: T, dst: T) -> bool {
        match self {
            ComparisonFunc::Never => false,
            ComparisonFunc::Less => src < dst,
            ComparisonFunc::Equal => src == dst,
            ComparisonFunc::LessEqual => src <= dst,
            ComparisonFunc::Greater => src > dst,
            ComparisonFunc::NotEqual => src != dst,
            ComparisonFunc::GreaterEqual => src >= dst,
            ComparisonFunc::Always => true,
        }
    }
}

/// 模板操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    /// 加一并截断到 255
    IncrSat,
    /// 减一并截断到 0
    DecrSat,
    Invert,
    /// 加一，255 回绕到 0
    IncrWrap,
    /// 减一，0 回绕到 255
    DecrWrap,
}

impl StencilOp {
    pub fn apply(self, value: u8, reference: u8) -> u8 {
        match self {
            StencilOp::Keep => value,
            StencilOp::Zero => 0,
            StencilOp::Replace => reference,
            StencilOp::IncrSat => value.saturating_add(1),
            StencilOp::DecrSat => value.saturating_sub(1),
            StencilOp::Invert => !value,
            StencilOp::IncrWrap => value.wrapping_add(1),
            StencilOp::DecrWrap => value.wrapping_sub(1),
        }
    }
}

/// 单个朝向的模板操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilOpDesc {
    pub stencil_fail_op: StencilOp,
    pub stencil_depth_fail_op: StencilOp,
    pub stencil_pass_op: StencilOp,
    pub stencil_func: ComparisonFunc,
}

impl Default for DepthStencilOpDesc {
    fn default() -> Self {
        Self {
            stencil_fail_op: StencilOp::Keep,
            stencil_depth_fail_op: StencilOp::Keep,
            stencil_pass_op: StencilOp::Keep,
            stencil_func: ComparisonFunc::Always,
        }
    }
}

impl DepthStencilOpDesc {
    /// 模板与深度测试的结果选出要执行的操作
    pub fn select(&self, stencil_passed: bool, depth_passed: bool) -> StencilOp {
        if !stencil_passed {
            self.stencil_fail_op
        } else if !depth_passed {
            self.stencil_depth_fail_op
        } else {
            self.stencil_pass_op
        }
    }
}

/// 深度/模板状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDesc {
    pub depth_enable: bool,
    /// `true` 对应 `D3D12_DEPTH_WRITE_MASK_ALL`
    pub depth_write: bool,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: DepthStencilOpDesc,
    pub back_face: DepthStencilOpDesc,
}

impl Default for DepthStencilDesc {
    /// 与 `CD3DX12_DEPTH_STENCIL_DESC(D3D12_DEFAULT)` 相同
    fn default() -> Self {
        Self {
            depth_enable: true,
            depth_write: true,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
            stencil_read_mask: STENCIL_FULL_MASK,
            stencil_write_mask: STENCIL_FULL_MASK,
            front_face: DepthStencilOpDesc::default(),
            back_face: DepthStencilOpDesc::default(),
        }
    }
}

impl DepthStencilDesc {
    /// 计数阶段：模板总是通过，通过时加一回绕
    ///
    /// 深度复杂度模式关闭深度测试，统计所有光栅化到该像素的图元；
    /// 过度绘制模式保留深度测试，只统计通过深度测试的片元。
    pub fn counter(mode: CountMode) -> Self {
        let face = DepthStencilOpDesc {
            stencil_fail_op: StencilOp::Keep,
            stencil_depth_fail_op: StencilOp::Keep,
            stencil_pass_op: StencilOp::IncrWrap,
            stencil_func: ComparisonFunc::Always,
        };

        Self {
            depth_enable: mode == CountMode::Overdraw,
            depth_write: true,
            depth_func: ComparisonFunc::Less,
            stencil_enable: true,
            stencil_read_mask: STENCIL_FULL_MASK,
            stencil_write_mask: STENCIL_FULL_MASK,
            front_face: face,
            back_face: face,
        }
    }

    /// 可视化阶段：只绘制模板值等于参考值的像素，不修改模板
    pub fn visualize() -> Self {
        let face = DepthStencilOpDesc {
            stencil_func: ComparisonFunc::Equal,
            ..DepthStencilOpDesc::default()
        };

        Self {
            depth_enable: false,
            depth_write: true,
            depth_func: ComparisonFunc::Less,
            stencil_enable: true,
            stencil_read_mask: STENCIL_FULL_MASK,
            stencil_write_mask: STENCIL_FULL_MASK,
            front_face: face,
            back_face: face,
        }
    }

    pub fn face(&self, front_facing: bool) -> &DepthStencilOpDesc {
        if front_facing {
            &self.front_face
        } else {
            &self.back_face
        }
    }
}

/// 剔除模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// 光栅化状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterizerDesc {
    pub cull_mode: CullMode,
    /// `false` 时屏幕空间顺时针为正面
    pub front_counter_clockwise: bool,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
        }
    }
}

impl RasterizerDesc {
    /// 按朝向决定是否剔除
    pub fn culls(&self, front_facing: bool) -> bool {
        match self.cull_mode {
            CullMode::None => false,
            CullMode::Front => front_facing,
            CullMode::Back => !front_facing,
        }
    }
}

/// 混合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// 关闭混合
    Opaque,
    /// 颜色 SRC_ALPHA / INV_SRC_ALPHA，alpha ONE / ZERO
    AlphaBlend,
}

impl BlendMode {
    pub fn blend(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        match self {
            BlendMode::Opaque => src,
            BlendMode::AlphaBlend => {
                let a = src[3];
                [
                    src[0] * a + dst[0] * (1.0 - a),
                    src[1] * a + dst[1] * (1.0 - a),
                    src[2] * a + dst[2] * (1.0 - a),
                    src[3],
                ]
            }
        }
    }
}

/// 着色器程序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderProgram {
    /// standardVS + opaquePS
    Standard,
    /// standardVS + alphaTestedPS（alpha < 0.1 时 clip）
    AlphaTested,
    /// colorQuadVS + colorQuadPS，按根常量选择层级颜色
    ColorQuad,
}

impl ShaderProgram {
    /// (顶点着色器入口, 像素着色器入口)
    pub fn entry_points(self) -> (&'static str, &'static str) {
        match self {
            ShaderProgram::Standard => ("VS", "PS"),
            ShaderProgram::AlphaTested => ("VS", "AlphaTestedPS"),
            ShaderProgram::ColorQuad => ("ColorQuadVS", "ColorQuadPS"),
        }
    }

    /// 是否使用顶点输入布局
    pub fn uses_vertex_input(self) -> bool {
        self != ShaderProgram::ColorQuad
    }
}

/// 图形管线描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineDesc {
    pub program: ShaderProgram,
    pub rasterizer: RasterizerDesc,
    pub blend: BlendMode,
    pub depth_stencil: DepthStencilDesc,
    pub render_target_format: TextureFormat,
    pub depth_stencil_format: TextureFormat,
}

impl PipelineDesc {
    pub fn opaque() -> Self {
        Self {
            program: ShaderProgram::Standard,
            rasterizer: RasterizerDesc::default(),
            blend: BlendMode::Opaque,
            depth_stencil: DepthStencilDesc::default(),
            render_target_format: BACK_BUFFER_FORMAT,
            depth_stencil_format: DEPTH_STENCIL_FORMAT,
        }
    }

    pub fn transparent() -> Self {
        Self {
            blend: BlendMode::AlphaBlend,
            ..Self::opaque()
        }
    }

    /// 透过铁丝网能看到背面，关闭剔除
    pub fn alpha_tested() -> Self {
        Self {
            program: ShaderProgram::AlphaTested,
            rasterizer: RasterizerDesc {
                cull_mode: CullMode::None,
                ..RasterizerDesc::default()
            },
            ..Self::opaque()
        }
    }

    /// 全屏层级颜色四边形
    pub fn drawing() -> Self {
        Self {
            program: ShaderProgram::ColorQuad,
            depth_stencil: DepthStencilDesc::visualize(),
            ..Self::opaque()
        }
    }

    pub fn with_depth_stencil(mut self, depth_stencil: DepthStencilDesc) -> Self {
        self.depth_stencil = depth_stencil;
        self
    }
}

/// 管线名称
pub mod names {
    pub const OPAQUE: &str = "opaque";
    pub const TRANSPARENT: &str = "transparent";
    pub const ALPHA_TESTED: &str = "alphaTested";
    pub const OPAQUE_COUNTER: &str = "opaqueCounter";
    pub const TRANSPARENT_COUNTER: &str = "transparentCounter";
    pub const ALPHA_TESTED_COUNTER: &str = "alphaTestedCounter";
    pub const DRAWING: &str = "drawing";
}

/// 某一层在普通绘制或计数阶段使用的管线
pub fn pipeline_name(layer: RenderLayer, counting: bool) -> &'static str {
    match (layer, counting) {
        (RenderLayer::Opaque, false) => names::OPAQUE,
        (RenderLayer::AlphaTested, false) => names::ALPHA_TESTED,
        (RenderLayer::Transparent, false) => names::TRANSPARENT,
        (RenderLayer::Opaque, true) => names::OPAQUE_COUNTER,
        (RenderLayer::AlphaTested, true) => names::ALPHA_TESTED_COUNTER,
        (RenderLayer::Transparent, true) => names::TRANSPARENT_COUNTER,
    }
}

/// 构建全部 7 个管线描述，计数管线在对应普通管线的基础上替换深度/模板状态
pub fn build_pipeline_table(mode: CountMode) -> Result<Table<PipelineDesc>> {
    let counter = DepthStencilDesc::counter(mode);
    let opaque = PipelineDesc::opaque();
    let transparent = PipelineDesc::transparent();
    let alpha_tested = PipelineDesc::alpha_tested();

    let mut table = Table::new();
    table.insert(names::OPAQUE, opaque)?;
    table.insert(names::TRANSPARENT, transparent)?;
    table.insert(names::ALPHA_TESTED, alpha_tested)?;
    table.insert(names::OPAQUE_COUNTER, opaque.with_depth_stencil(counter))?;
    table.insert(names::TRANSPARENT_COUNTER, transparent.with_depth_stencil(counter))?;
    table.insert(names::ALPHA_TESTED_COUNTER, alpha_tested.with_depth_stencil(counter))?;
    table.insert(names::DRAWING, PipelineDesc::drawing())?;
    table.freeze();
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stencil_ops() {
        assert_eq!(StencilOp::IncrWrap.apply(255, 0), 0);
        assert_eq!(StencilOp::IncrSat.apply(255, 0), 255);
        assert_eq!(StencilOp::DecrWrap.apply(0, 0), 255);
        assert_eq!(StencilOp::Replace.apply(9, 3), 3);
        assert_eq!(StencilOp::Invert.apply(0x0f, 0), 0xf0);
        assert_eq!(StencilOp::Keep.apply(7, 1), 7);
    }

    #[test]
    fn test_comparison_funcs() {
        assert!(ComparisonFunc::Less.test(0.5, 1.0));
        assert!(!ComparisonFunc::Less.test(1.0, 1.0));
        assert!(ComparisonFunc::Equal.test(3u8, 3u8));
        assert!(!ComparisonFunc::Never.test(0, 0));
        assert!(ComparisonFunc::Always.test(1, 0));
    }

    #[test]
    fn test_counter_state() {
        let counter = DepthStencilDesc::counter(CountMode::DepthComplexity);
        assert!(!counter.depth_enable);
        assert!(counter.stencil_enable);
        assert_eq!(counter.stencil_read_mask, STENCIL_FULL_MASK);
        assert_eq!(counter.stencil_write_mask, STENCIL_FULL_MASK);
        for face in [counter.front_face, counter.back_face] {
            assert_eq!(face.stencil_func, ComparisonFunc::Always);
            assert_eq!(face.select(true, true), StencilOp::IncrWrap);
            assert_eq!(face.select(true, false), StencilOp::Keep);
            assert_eq!(face.select(false, true), StencilOp::Keep);
        }

        assert!(DepthStencilDesc::counter(CountMode::Overdraw).depth_enable);
    }

    #[test]
    fn test_visualize_state_never_mutates_stencil() {
        let desc = DepthStencilDesc::visualize();
        assert!(!desc.depth_enable);
        for face in [desc.front_face, desc.back_face] {
            assert_eq!(face.stencil_func, ComparisonFunc::Equal);
            for (s, d) in [(true, true), (true, false), (false, true), (false, false)] {
                assert_eq!(face.select(s, d), StencilOp::Keep);
            }
        }
    }

    #[test]
    fn test_pipeline_table() {
        let table = build_pipeline_table(CountMode::DepthComplexity).unwrap();
        assert_eq!(table.len(), 7);
        assert!(table.is_frozen());

        let alpha_counter = table.get(table.id_of(names::ALPHA_TESTED_COUNTER).unwrap());
        assert_eq!(alpha_counter.program, ShaderProgram::AlphaTested);
        assert_eq!(alpha_counter.rasterizer.cull_mode, CullMode::None);
        assert!(alpha_counter.depth_stencil.stencil_enable);

        let transparent_counter = table.get(table.id_of(names::TRANSPARENT_COUNTER).unwrap());
        assert_eq!(transparent_counter.blend, BlendMode::AlphaBlend);

        let drawing = table.get(table.id_of(names::DRAWING).unwrap());
        assert_eq!(drawing.program, ShaderProgram::ColorQuad);
        assert_eq!(drawing.rasterizer.cull_mode, CullMode::Back);

        for layer in RenderLayer::ALL {
            assert!(table.id_of(pipeline_name(layer, true)).is_ok());
            assert!(table.id_of(pipeline_name(layer, false)).is_ok());
        }
    }

    #[test]
    fn test_alpha_blend() {
        let out = BlendMode::AlphaBlend.blend([1.0, 0.0, 0.0, 0.5], [0.0, 0.0, 1.0, 1.0]);
        assert_eq!(out, [0.5, 0.0, 0.5, 0.5]);
        assert_eq!(BlendMode::Opaque.blend([0.1, 0.2, 0.3, 0.4], [1.0; 4]), [0.1, 0.2, 0.3, 0.4]);
    }
}
