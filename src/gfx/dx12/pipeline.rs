//! 根签名、着色器编译与管线状态对象
//!
//! 根签名布局与 [`RootSlot`] 一致：
//!
//! | 槽位 | 类型 | 寄存器 |
//! |------|------|--------|
//! | 0 | 描述符表（1 个 SRV） | t0 |
//! | 1 | 根 CBV | b0 物体 |
//! | 2 | 根 CBV | b1 Pass |
//! | 3 | 根 CBV | b2 材质 |
//! | 4 | 1 个 32 位根常量 | b3 层级 |

use std::collections::HashMap;
use std::ffi::CString;
use std::mem::ManuallyDrop;

use tracing::debug;
use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D::Fxc::*;
use windows::Win32::Graphics::Direct3D::*;
use windows::Win32::Graphics::Direct3D12::*;
use windows::Win32::Graphics::Dxgi::Common::*;

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::geometry::vertex::ElementFormat;
use crate::geometry::Vertex;
use crate::renderer::depth_complexity;
use crate::renderer::pipeline::{
    BlendMode, ComparisonFunc, CullMode, DepthStencilOpDesc, PipelineDesc, RootSlot, StencilOp,
};

use super::context::dxgi_format;

const SHADER_SOURCE: &str = include_str!("shaders/default.hlsl");

fn root_signature_error(message: String) -> RenderError {
    RenderError::Graphics(GraphicsError::RootSignature(message))
}

/// 创建与 [`RootSlot`] 对应的根签名
pub fn create_root_signature(device: &ID3D12Device) -> Result<ID3D12RootSignature> {
    let srv_range = D3D12_DESCRIPTOR_RANGE {
        RangeType: D3D12_DESCRIPTOR_RANGE_TYPE_SRV,
        NumDescriptors: 1,
        BaseShaderRegister: 0,
        RegisterSpace: 0,
        OffsetInDescriptorsFromTableStart: D3D12_DESCRIPTOR_RANGE_OFFSET_APPEND,
    };

    let cbv = |register: u32| D3D12_ROOT_PARAMETER {
        ParameterType: D3D12_ROOT_PARAMETER_TYPE_CBV,
        Anonymous: D3D12_ROOT_PARAMETER_0 {
            Descriptor: D3D12_ROOT_DESCRIPTOR {
                ShaderRegister: register,
                RegisterSpace: 0,
            },
        },
        ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
    };

    let root_parameters: [D3D12_ROOT_PARAMETER; RootSlot::COUNT] = [
        D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_DESCRIPTOR_TABLE,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                DescriptorTable: D3D12_ROOT_DESCRIPTOR_TABLE {
                    NumDescriptorRanges: 1,
                    pDescriptorRanges: &srv_range,
                },
            },
            ShaderVisibility: D3D12_SHADER_VISIBILITY_PIXEL,
        },
        cbv(0),
        cbv(1),
        D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_SRV,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                Descriptor: D3D12_ROOT_DESCRIPTOR {
                    ShaderRegister: 0,
                    RegisterSpace: 1,
                },
            },
            ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
        },
        D3D12_ROOT_PARAMETER {
            ParameterType: D3D12_ROOT_PARAMETER_TYPE_32BIT_CONSTANTS,
            Anonymous: D3D12_ROOT_PARAMETER_0 {
                Constants: D3D12_ROOT_CONSTANTS {
                    ShaderRegister: 3,
                    RegisterSpace: 0,
                    Num32BitValues: 1,
                },
            },
            ShaderVisibility: D3D12_SHADER_VISIBILITY_ALL,
        },
    ];

    let root_desc = D3D12_ROOT_SIGNATURE_DESC {
        NumParameters: root_parameters.len() as u32,
        pParameters: root_parameters.as_ptr(),
        NumStaticSamplers: 0,
        pStaticSamplers: std::ptr::null(),
        Flags: D3D12_ROOT_SIGNATURE_FLAG_ALLOW_INPUT_ASSEMBLER_INPUT_LAYOUT,
    };

    unsafe {
        let mut signature: Option<ID3DBlob> = None;
        let mut error: Option<ID3DBlob> = None;
        if let Err(e) = D3D12SerializeRootSignature(&root_desc, D3D_ROOT_SIGNATURE_VERSION_1, &mut signature, Some(&mut error)) {
            let message = error.map(|blob| blob_to_string(&blob)).unwrap_or_else(|| format!("{:?}", e));
            return Err(root_signature_error(message));
        }
        let signature = signature.ok_or_else(|| root_signature_error("empty root signature blob".to_string()))?;

        device
            .CreateRootSignature(0, blob_bytes(&signature))
            .map_err(|e| root_signature_error(format!("{:?}", e)))
    }
}

unsafe fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize())
}

unsafe fn blob_to_string(blob: &ID3DBlob) -> String {
    String::from_utf8_lossy(blob_bytes(blob)).into_owned()
}

/// 按入口点缓存的着色器字节码
#[derive(Default)]
pub struct ShaderCache {
    blobs: HashMap<&'static str, ID3DBlob>,
}

impl ShaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 编译（或取出已编译的）入口点
    pub fn get(&mut self, entry_point: &'static str, target: &'static str) -> Result<&ID3DBlob> {
        if !self.blobs.contains_key(entry_point) {
            let blob = compile(entry_point, target)?;
            self.blobs.insert(entry_point, blob);
        }
        self.blobs
            .get(entry_point)
            .ok_or_else(|| RenderError::Graphics(GraphicsError::ShaderCompilation(entry_point.to_string())))
    }
}

fn cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|e| RenderError::Graphics(GraphicsError::ShaderCompilation(e.to_string())))
}

fn compile(entry_point: &str, target: &str) -> Result<ID3DBlob> {
    // 宏的字符串在整个编译期间保持存活
    let defines = depth_complexity::shader_defines()
        .into_iter()
        .map(|(name, value)| Ok((cstring(&name)?, cstring(&value)?)))
        .collect::<Result<Vec<_>>>()?;
    let mut macros: Vec<D3D_SHADER_MACRO> = defines
        .iter()
        .map(|(name, value)| D3D_SHADER_MACRO {
            Name: PCSTR(name.as_ptr() as *const u8),
            Definition: PCSTR(value.as_ptr() as *const u8),
        })
        .collect();
    macros.push(D3D_SHADER_MACRO::default());

    let entry = cstring(entry_point)?;
    let profile = cstring(target)?;

    let flags = if cfg!(debug_assertions) {
        D3DCOMPILE_DEBUG | D3DCOMPILE_SKIP_OPTIMIZATION
    } else {
        0
    };

    unsafe {
        let mut code: Option<ID3DBlob> = None;
        let mut errors: Option<ID3DBlob> = None;
        let result = D3DCompile(
            SHADER_SOURCE.as_ptr() as _,
            SHADER_SOURCE.len(),
            None,
            Some(macros.as_ptr()),
            None,
            PCSTR(entry.as_ptr() as *const u8),
            PCSTR(profile.as_ptr() as *const u8),
            flags,
            0,
            &mut code,
            Some(&mut errors),
        );

        if let Err(e) = result {
            let message = errors.map(|blob| blob_to_string(&blob)).unwrap_or_else(|| format!("{:?}", e));
            return Err(RenderError::Graphics(GraphicsError::ShaderCompilation(format!(
                "{} ({}): {}",
                entry_point, target, message
            ))));
        }

        debug!(entry_point, target, "shader compiled");
        code.ok_or_else(|| RenderError::Graphics(GraphicsError::ShaderCompilation(entry_point.to_string())))
    }
}

fn comparison_func(func: ComparisonFunc) -> D3D12_COMPARISON_FUNC {
    match func {
        ComparisonFunc::Never => D3D12_COMPARISON_FUNC_NEVER,
        ComparisonFunc::Less => D3D12_COMPARISON_FUNC_LESS,
        ComparisonFunc::Equal => D3D12_COMPARISON_FUNC_EQUAL,
        ComparisonFunc::LessEqual => D3D12_COMPARISON_FUNC_LESS_EQUAL,
        ComparisonFunc::Greater => D3D12_COMPARISON_FUNC_GREATER,
        ComparisonFunc::NotEqual => D3D12_COMPARISON_FUNC_NOT_EQUAL,
        ComparisonFunc::GreaterEqual => D3D12_COMPARISON_FUNC_GREATER_EQUAL,
        ComparisonFunc::Always => D3D12_COMPARISON_FUNC_ALWAYS,
    }
}

/// D3D12 的 INCR/DECR 本身就是回绕的
fn stencil_op(op: StencilOp) -> D3D12_STENCIL_OP {
    match op {
        StencilOp::Keep => D3D12_STENCIL_OP_KEEP,
        StencilOp::Zero => D3D12_STENCIL_OP_ZERO,
        StencilOp::Replace => D3D12_STENCIL_OP_REPLACE,
        StencilOp::IncrSat => D3D12_STENCIL_OP_INCR_SAT,
        StencilOp::DecrSat => D3D12_STENCIL_OP_DECR_SAT,
        StencilOp::Invert => D3D12_STENCIL_OP_INVERT,
        StencilOp::IncrWrap => D3D12_STENCIL_OP_INCR,
        StencilOp::DecrWrap => D3D12_STENCIL_OP_DECR,
    }
}

fn stencil_face(face: &DepthStencilOpDesc) -> D3D12_DEPTH_STENCILOP_DESC {
    D3D12_DEPTH_STENCILOP_DESC {
        StencilFailOp: stencil_op(face.stencil_fail_op),
        StencilDepthFailOp: stencil_op(face.stencil_depth_fail_op),
        StencilPassOp: stencil_op(face.stencil_pass_op),
        StencilFunc: comparison_func(face.stencil_func),
    }
}

fn blend_desc(mode: BlendMode) -> D3D12_BLEND_DESC {
    let target = match mode {
        BlendMode::Opaque => D3D12_RENDER_TARGET_BLEND_DESC {
            BlendEnable: false.into(),
            LogicOpEnable: false.into(),
            SrcBlend: D3D12_BLEND_ONE,
            DestBlend: D3D12_BLEND_ZERO,
            BlendOp: D3D12_BLEND_OP_ADD,
            SrcBlendAlpha: D3D12_BLEND_ONE,
            DestBlendAlpha: D3D12_BLEND_ZERO,
            BlendOpAlpha: D3D12_BLEND_OP_ADD,
            LogicOp: D3D12_LOGIC_OP_NOOP,
            RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
        },
        BlendMode::AlphaBlend => D3D12_RENDER_TARGET_BLEND_DESC {
            BlendEnable: true.into(),
            LogicOpEnable: false.into(),
            SrcBlend: D3D12_BLEND_SRC_ALPHA,
            DestBlend: D3D12_BLEND_INV_SRC_ALPHA,
            BlendOp: D3D12_BLEND_OP_ADD,
            SrcBlendAlpha: D3D12_BLEND_ONE,
            DestBlendAlpha: D3D12_BLEND_ZERO,
            BlendOpAlpha: D3D12_BLEND_OP_ADD,
            LogicOp: D3D12_LOGIC_OP_NOOP,
            RenderTargetWriteMask: D3D12_COLOR_WRITE_ENABLE_ALL.0 as u8,
        },
    };

    D3D12_BLEND_DESC {
        AlphaToCoverageEnable: false.into(),
        IndependentBlendEnable: false.into(),
        RenderTarget: [target; 8],
    }
}

fn element_format(format: ElementFormat) -> DXGI_FORMAT {
    match format {
        ElementFormat::Float2 => DXGI_FORMAT_R32G32_FLOAT,
        ElementFormat::Float3 => DXGI_FORMAT_R32G32B32_FLOAT,
    }
}

/// 把后端无关的管线描述翻译为 PSO
pub fn create_pipeline_state(
    device: &ID3D12Device,
    root_signature: &ID3D12RootSignature,
    shaders: &mut ShaderCache,
    desc: &PipelineDesc,
) -> Result<ID3D12PipelineState> {
    let (vs_entry, ps_entry) = desc.program.entry_points();
    let vs = shaders.get(vs_entry, "vs_5_1")?.clone();
    let ps = shaders.get(ps_entry, "ps_5_1")?.clone();

    let semantics = Vertex::INPUT_LAYOUT
        .iter()
        .map(|e| cstring(e.semantic))
        .collect::<Result<Vec<_>>>()?;
    let input_elements: Vec<D3D12_INPUT_ELEMENT_DESC> = Vertex::INPUT_LAYOUT
        .iter()
        .zip(&semantics)
        .map(|(element, name)| D3D12_INPUT_ELEMENT_DESC {
            SemanticName: PCSTR(name.as_ptr() as *const u8),
            SemanticIndex: 0,
            Format: element_format(element.format),
            InputSlot: 0,
            AlignedByteOffset: element.offset,
            InputSlotClass: D3D12_INPUT_CLASSIFICATION_PER_VERTEX_DATA,
            InstanceDataStepRate: 0,
        })
        .collect();

    // 全屏四边形由 SV_VertexID 生成，不需要输入布局
    let input_layout = if desc.program.uses_vertex_input() {
        D3D12_INPUT_LAYOUT_DESC {
            pInputElementDescs: input_elements.as_ptr(),
            NumElements: input_elements.len() as u32,
        }
    } else {
        D3D12_INPUT_LAYOUT_DESC::default()
    };

    let cull_mode = match desc.rasterizer.cull_mode {
        CullMode::None => D3D12_CULL_MODE_NONE,
        CullMode::Front => D3D12_CULL_MODE_FRONT,
        CullMode::Back => D3D12_CULL_MODE_BACK,
    };

    let ds = &desc.depth_stencil;
    let mut pso_desc = D3D12_GRAPHICS_PIPELINE_STATE_DESC {
        pRootSignature: ManuallyDrop::new(Some(root_signature.clone())),
        VS: unsafe {
            D3D12_SHADER_BYTECODE {
                pShaderBytecode: vs.GetBufferPointer(),
                BytecodeLength: vs.GetBufferSize(),
            }
        },
        PS: unsafe {
            D3D12_SHADER_BYTECODE {
                pShaderBytecode: ps.GetBufferPointer(),
                BytecodeLength: ps.GetBufferSize(),
            }
        },
        BlendState: blend_desc(desc.blend),
        SampleMask: u32::MAX,
        RasterizerState: D3D12_RASTERIZER_DESC {
            FillMode: D3D12_FILL_MODE_SOLID,
            CullMode: cull_mode,
            FrontCounterClockwise: desc.rasterizer.front_counter_clockwise.into(),
            DepthBias: 0,
            DepthBiasClamp: 0.0,
            SlopeScaledDepthBias: 0.0,
            DepthClipEnable: true.into(),
            MultisampleEnable: false.into(),
            AntialiasedLineEnable: false.into(),
            ForcedSampleCount: 0,
            ConservativeRaster: D3D12_CONSERVATIVE_RASTERIZATION_MODE_OFF,
        },
        DepthStencilState: D3D12_DEPTH_STENCIL_DESC {
            DepthEnable: ds.depth_enable.into(),
            DepthWriteMask: if ds.depth_write {
                D3D12_DEPTH_WRITE_MASK_ALL
            } else {
                D3D12_DEPTH_WRITE_MASK_ZERO
            },
            DepthFunc: comparison_func(ds.depth_func),
            StencilEnable: ds.stencil_enable.into(),
            StencilReadMask: ds.stencil_read_mask,
            StencilWriteMask: ds.stencil_write_mask,
            FrontFace: stencil_face(&ds.front_face),
            BackFace: stencil_face(&ds.back_face),
        },
        InputLayout: input_layout,
        PrimitiveTopologyType: D3D12_PRIMITIVE_TOPOLOGY_TYPE_TRIANGLE,
        NumRenderTargets: 1,
        DSVFormat: dxgi_format(desc.depth_stencil_format),
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        ..Default::default()
    };
    pso_desc.RTVFormats[0] = dxgi_format(desc.render_target_format);

    let pso = unsafe { device.CreateGraphicsPipelineState(&pso_desc) };
    // 释放描述中持有的根签名引用
    unsafe { ManuallyDrop::drop(&mut pso_desc.pRootSignature) };

    pso.map_err(|e| RenderError::Graphics(GraphicsError::PipelineCreation(format!("{:?}", e))))
}
