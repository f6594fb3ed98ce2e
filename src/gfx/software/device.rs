//! 软件 GPU
//!
//! 逐条解释 [`Command`]，在 CPU 上完成顶点着色、光栅化、像素着色和输出合并。
//! 常量缓冲、材质结构化缓冲、顶点与索引数据都直接从命令引用的上传堆中读取，
//! 因此帧资源的同步错误会像真实 GPU 一样表现为画面错误。

use std::sync::Arc;

use bytemuck::Pod;

use crate::core::error::{GraphicsError, RenderError, Result};
use crate::geometry::{IndexFormat, PrimitiveTopology, Vertex};
use crate::renderer::command::{Command, IndexBufferView, VertexBufferView};
use crate::renderer::constants::{MaterialData, ObjectConstants, PassConstants};
use crate::renderer::pipeline::{PipelineDesc, RootSlot, ShaderProgram};
use crate::renderer::resource::BufferLocation;
use crate::scene::Id;

use super::raster::{rasterize_triangle, ClipVertex, Fragment, RenderTarget};
use super::shader::{self, DrawConstants};

fn execution_error(message: impl Into<String>) -> RenderError {
    RenderError::Graphics(GraphicsError::CommandExecution(message.into()))
}

/// 从上传堆读出一个 Pod 值
fn read_pod<T: Pod>(location: &BufferLocation) -> Result<T> {
    let mut value = T::zeroed();
    location.heap.read(location.offset, bytemuck::bytes_of_mut(&mut value))?;
    Ok(value)
}

fn read_bytes(location: &BufferLocation, len: u32) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; len as usize];
    location.heap.read(location.offset, &mut bytes)?;
    Ok(bytes)
}

/// 命令列表开始时所有绑定都被清空
#[derive(Debug, Default)]
struct BoundState {
    pipeline: Option<PipelineDesc>,
    stencil_ref: u8,
    level_constant: u32,
    constant_buffers: [Option<BufferLocation>; RootSlot::COUNT],
    shader_resources: [Option<BufferLocation>; RootSlot::COUNT],
    vertex_buffer: Option<VertexBufferView>,
    index_buffer: Option<IndexBufferView>,
    topology: PrimitiveTopology,
}

impl BoundState {
    /// 每个图元的顶点数
    fn primitive_vertex_count(&self) -> usize {
        match self.topology {
            PrimitiveTopology::TriangleList => 3,
        }
    }

    fn pipeline(&self) -> Result<&PipelineDesc> {
        self.pipeline
            .as_ref()
            .ok_or_else(|| execution_error("draw without a pipeline state"))
    }

    fn constant_buffer(&self, slot: RootSlot) -> Result<&BufferLocation> {
        self.constant_buffers[slot.index() as usize]
            .as_ref()
            .ok_or_else(|| execution_error(format!("no constant buffer bound at {:?}", slot)))
    }

    fn shader_resource(&self, slot: RootSlot) -> Result<&BufferLocation> {
        self.shader_resources[slot.index() as usize]
            .as_ref()
            .ok_or_else(|| execution_error(format!("no shader resource bound at {:?}", slot)))
    }

    fn draw_constants(&self) -> Result<DrawConstants> {
        let object: ObjectConstants = read_pod(self.constant_buffer(RootSlot::ObjectCb)?)?;
        // 按物体常量里的下标取材质
        let materials = self.shader_resource(RootSlot::MaterialBuffer)?;
        let offset = materials.offset + object.material_index as u64 * size_of::<MaterialData>() as u64;
        let material: MaterialData = read_pod(&BufferLocation::new(Arc::clone(&materials.heap), offset))?;
        let pass: PassConstants = read_pod(self.constant_buffer(RootSlot::PassCb)?)?;
        Ok(DrawConstants::new(&object, &material, &pass))
    }

    fn vertices(&self) -> Result<Vec<Vertex>> {
        let view = self
            .vertex_buffer
            .as_ref()
            .ok_or_else(|| execution_error("draw without a vertex buffer"))?;
        let stride = view.stride_in_bytes as usize;
        if stride < size_of::<Vertex>() {
            return Err(execution_error(format!("vertex stride {} too small", stride)));
        }
        let bytes = read_bytes(&view.location, view.size_in_bytes)?;
        Ok(bytes
            .chunks_exact(stride)
            .map(|chunk| bytemuck::pod_read_unaligned::<Vertex>(&chunk[..size_of::<Vertex>()]))
            .collect())
    }

    fn indices(&self) -> Result<Vec<u32>> {
        let view = self
            .index_buffer
            .as_ref()
            .ok_or_else(|| execution_error("indexed draw without an index buffer"))?;
        let bytes = read_bytes(&view.location, view.size_in_bytes)?;
        Ok(match view.format {
            IndexFormat::U16 => bytes
                .chunks_exact(2)
                .map(|chunk| bytemuck::pod_read_unaligned::<u16>(chunk) as u32)
                .collect(),
        })
    }
}

/// 软件 GPU：一个渲染目标加上已创建的管线
#[derive(Debug)]
pub struct SoftwareGpu {
    target: RenderTarget,
    pipelines: Vec<Option<PipelineDesc>>,
    triangles_drawn: u64,
}

impl SoftwareGpu {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            target: RenderTarget::new(width, height),
            pipelines: Vec::new(),
            triangles_drawn: 0,
        }
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    /// 累计提交的三角形数
    pub fn triangles_drawn(&self) -> u64 {
        self.triangles_drawn
    }

    pub fn create_pipeline(&mut self, id: Id<PipelineDesc>, desc: PipelineDesc) {
        let index = id.index();
        if self.pipelines.len() <= index {
            self.pipelines.resize(index + 1, None);
        }
        self.pipelines[index] = Some(desc);
    }

    /// 重建渲染目标，内容清零
    pub fn resize(&mut self, width: u32, height: u32) {
        self.target = RenderTarget::new(width, height);
    }

    /// 执行一个命令列表
    pub fn execute(&mut self, commands: &[Command]) -> Result<()> {
        let mut state = BoundState::default();

        for command in commands {
            match command {
                Command::ClearRenderTarget { color } => self.target.clear_color(*color),
                Command::ClearDepthStencil { depth, stencil } => self.target.clear_depth_stencil(*depth, *stencil),
                Command::SetPipelineState(id) => {
                    let desc = self
                        .pipelines
                        .get(id.index())
                        .copied()
                        .flatten()
                        .ok_or_else(|| execution_error(format!("unknown pipeline {:?}", id)))?;
                    state.pipeline = Some(desc);
                }
                // 模板平面只有 8 位
                Command::SetStencilRef(value) => state.stencil_ref = *value as u8,
                Command::SetRoot32BitConstant { slot, value } => {
                    if *slot != RootSlot::LevelConstant {
                        return Err(execution_error(format!("{:?} does not take root constants", slot)));
                    }
                    state.level_constant = *value;
                }
                Command::SetRootConstantBufferView { slot, location } => {
                    state.constant_buffers[slot.index() as usize] = Some(location.clone());
                }
                Command::SetRootShaderResourceView { slot, location } => {
                    state.shader_resources[slot.index() as usize] = Some(location.clone());
                }
                // 没有纹理，描述符表只做记录
                Command::SetRootDescriptorTable { .. } => {}
                Command::SetVertexBuffer(view) => state.vertex_buffer = view.clone(),
                Command::SetIndexBuffer(view) => state.index_buffer = view.clone(),
                Command::SetPrimitiveTopology(topology) => state.topology = *topology,
                Command::DrawIndexedInstanced {
                    index_count,
                    instance_count,
                    start_index_location,
                    base_vertex_location,
                    ..
                } => {
                    for _ in 0..*instance_count {
                        self.draw_indexed(&state, *index_count, *start_index_location, *base_vertex_location)?;
                    }
                }
                Command::DrawInstanced {
                    vertex_count,
                    instance_count,
                    start_vertex_location,
                    ..
                } => {
                    for _ in 0..*instance_count {
                        self.draw(&state, *vertex_count, *start_vertex_location)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn draw_indexed(&mut self, state: &BoundState, index_count: u32, start_index: u32, base_vertex: i32) -> Result<()> {
        let pipeline = *state.pipeline()?;
        let constants = state.draw_constants()?;
        let indices = state.indices()?;
        let vertices = state.vertices()?;

        let end = start_index as usize + index_count as usize;
        if end > indices.len() {
            return Err(execution_error(format!(
                "index range {}..{} exceeds buffer of {}",
                start_index,
                end,
                indices.len()
            )));
        }

        let shaded: Vec<ClipVertex> = vertices.iter().map(|v| shader::standard_vs(v, &constants)).collect();
        let primitive = state.primitive_vertex_count();
        let mut triangle = Vec::with_capacity(primitive);
        for &index in &indices[start_index as usize..end] {
            let vertex = index as i64 + base_vertex as i64;
            let clip = usize::try_from(vertex)
                .ok()
                .and_then(|i| shaded.get(i))
                .ok_or_else(|| execution_error(format!("vertex {} out of range", vertex)))?;
            triangle.push(*clip);

            if triangle.len() == primitive {
                self.raster([triangle[0], triangle[1], triangle[2]], &pipeline, state, Some(&constants));
                triangle.clear();
            }
        }
        Ok(())
    }

    fn draw(&mut self, state: &BoundState, vertex_count: u32, start_vertex: u32) -> Result<()> {
        let pipeline = *state.pipeline()?;
        let range = start_vertex as usize..start_vertex as usize + vertex_count as usize;

        let (shaded, constants) = if pipeline.program.uses_vertex_input() {
            let constants = state.draw_constants()?;
            let vertices = state.vertices()?;
            let shaded: Vec<ClipVertex> = vertices
                .get(range)
                .ok_or_else(|| execution_error("vertex range exceeds buffer"))?
                .iter()
                .map(|v| shader::standard_vs(v, &constants))
                .collect();
            (shaded, Some(constants))
        } else {
            let shaded = range.map(|id| shader::color_quad_vs(id as u32)).collect();
            (shaded, None)
        };

        for tri in shaded.chunks_exact(state.primitive_vertex_count()) {
            self.raster([tri[0], tri[1], tri[2]], &pipeline, state, constants.as_ref());
        }
        Ok(())
    }

    /// 光栅化并对每个片元做像素着色和输出合并
    fn raster(
        &mut self,
        triangle: [ClipVertex; 3],
        pipeline: &PipelineDesc,
        state: &BoundState,
        constants: Option<&DrawConstants>,
    ) {
        self.triangles_drawn += 1;

        let width = self.target.width();
        let height = self.target.height();
        let target = &mut self.target;

        rasterize_triangle(&triangle, width, height, &pipeline.rasterizer, |fragment| {
            let color = match (pipeline.program, constants) {
                (ShaderProgram::ColorQuad, _) => Some(shader::color_quad_ps(state.level_constant)),
                (ShaderProgram::AlphaTested, Some(c)) => shader::alpha_tested_ps(&fragment.varyings, c),
                (ShaderProgram::Standard, Some(c)) => Some(shader::standard_ps(&fragment.varyings, c)),
                (_, None) => None,
            };
            // clip 的片元不更新深度和模板
            if let Some(color) = color {
                output_merge(target, pipeline, state.stencil_ref, fragment, color);
            }
        });
    }
}

/// 深度/模板测试、模板更新、深度写入和颜色混合
fn output_merge(target: &mut RenderTarget, pipeline: &PipelineDesc, stencil_ref: u8, fragment: &Fragment, color: [f32; 4]) {
    let index = target.index(fragment.x, fragment.y);
    let (colors, depths, stencils) = target.planes_mut();
    let ds = &pipeline.depth_stencil;

    let depth_passed = !ds.depth_enable || ds.depth_func.test(fragment.depth, depths[index]);

    let mut stencil_passed = true;
    if ds.stencil_enable {
        let face = ds.face(fragment.front_facing);
        let stored = stencils[index];
        stencil_passed = face
            .stencil_func
            .test(stencil_ref & ds.stencil_read_mask, stored & ds.stencil_read_mask);

        let updated = face.select(stencil_passed, depth_passed).apply(stored, stencil_ref);
        stencils[index] = (stored & !ds.stencil_write_mask) | (updated & ds.stencil_write_mask);
    }

    if !(stencil_passed && depth_passed) {
        return;
    }

    if ds.depth_enable && ds.depth_write {
        depths[index] = fragment.depth;
    }
    colors[index] = pipeline.blend.blend(color, colors[index]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CountMode;
    use crate::core::math::Color;
    use crate::geometry::MeshGeometry;
    use crate::renderer::command::{CommandAllocator, CommandList};
    use crate::renderer::constants::{Light, MaterialData, ObjectConstants, PassConstants};
    use crate::renderer::depth_complexity::{self, DEPTH_COMPLEXITY_LEVELS, LEVEL_COLORS};
    use crate::renderer::dispatch::{self, DrawContext, GeometryBuffers};
    use crate::renderer::frame::FrameResource;
    use crate::renderer::pipeline::{build_pipeline_table, names};
    use crate::renderer::constants::MAX_LIGHTS;
    use crate::renderer::resource::HostAllocator;
    use crate::gfx::software::raster::VARYING_COUNT;
    use crate::scene::{Material, RenderItem, RenderLayer, Scene, Table};

    const SIZE: u32 = 32;
    const SENTINEL: [f32; 4] = [1.0, 0.0, 1.0, 1.0];

    /// 屏幕空间顺时针的三角形，顶点直接给出 NDC（视图投影为单位矩阵）
    fn triangle(x0: f32, y0: f32, size: f32) -> [Vertex; 3] {
        let v = |x: f32, y: f32| Vertex::new([x, y, 0.5], [0.0, 0.0, -1.0], [0.0, 0.0]);
        [v(x0, y0), v(x0 + size, y0), v(x0, y0 - size)]
    }

    struct Harness {
        scene: Scene,
        geometry: Vec<GeometryBuffers>,
        pipelines: Table<PipelineDesc>,
        frame: FrameResource,
        gpu: SoftwareGpu,
    }

    /// 每个三角形一个渲染项，依次放进 不透明、alpha 测试、透明 三层
    fn harness(triangles: &[[Vertex; 3]], repeat: usize) -> Harness {
        let allocator = HostAllocator::new();
        let mut scene = Scene::new();
        let mat = scene.add_material(Material::new("plain", 0, 1)).unwrap();

        let vertices: Vec<Vertex> = triangles.iter().flatten().copied().collect();
        let indices: Vec<u16> = (0..vertices.len() as u16).collect();
        let mut geo = MeshGeometry::new_static("tris", vertices, indices);
        for (i, _) in triangles.iter().enumerate() {
            geo = geo.with_submesh(&format!("tri{}", i), 3, (i * 3) as u32, 0);
        }
        let geo = scene.add_geometry(geo).unwrap();

        let layers = [RenderLayer::Opaque, RenderLayer::AlphaTested, RenderLayer::Transparent];
        let mut obj_cb = 0;
        for _ in 0..repeat {
            for i in 0..triangles.len() {
                let sub = scene.geometries.get(geo).submesh(&format!("tri{}", i)).unwrap();
                let item = RenderItem::new(obj_cb, mat, geo, sub, 1);
                scene
                    .add_render_item(&format!("item{}", obj_cb), layers[i % 3], item)
                    .unwrap();
                obj_cb += 1;
            }
        }
        scene.freeze();

        let geometry = dispatch::upload_scene_geometry(&allocator, &scene.geometries).unwrap();
        let pipelines = build_pipeline_table(CountMode::DepthComplexity).unwrap();
        let frame = FrameResource::new(&allocator, 1, obj_cb as usize, 1, 1).unwrap();
        for i in 0..obj_cb as usize {
            frame.object_cb.copy_data(i, &ObjectConstants::default()).unwrap();
        }
        frame.material_buffer.copy_data(0, &MaterialData::default()).unwrap();
        frame.pass_cb.copy_data(0, &PassConstants::default()).unwrap();

        let mut gpu = SoftwareGpu::new(SIZE, SIZE);
        for (id, desc) in pipelines.iter() {
            gpu.create_pipeline(id, *desc);
        }

        Harness { scene, geometry, pipelines, frame, gpu }
    }

    fn begin() -> CommandList {
        let mut list = CommandList::new();
        list.reset(&CommandAllocator::new()).unwrap();
        list
    }

    /// 清屏后执行计数阶段
    fn count(h: &mut Harness) {
        let mut list = begin();
        list.clear_render_target(Color::BLACK.to_array());
        list.clear_depth_stencil(1.0, 0);
        dispatch::bind_pass(&mut list, &h.frame);
        let ctx = DrawContext {
            scene: &h.scene,
            geometry: &h.geometry,
            pipelines: &h.pipelines,
            frame: &h.frame,
        };
        depth_complexity::record_count_pass(&mut list, &ctx).unwrap();
        list.close().unwrap();
        h.gpu.execute(list.commands()).unwrap();
    }

    /// 单独绘制层级 `level` 的四边形，返回被着色的像素
    fn painted_by_level(h: &mut Harness, level: u32) -> Vec<(u32, u32)> {
        let mut list = begin();
        list.clear_render_target(SENTINEL);
        list.set_pipeline_state(h.pipelines.id_of(names::DRAWING).unwrap());
        list.set_stencil_ref(level);
        list.set_root_32bit_constant(RootSlot::LevelConstant, level);
        list.draw_instanced(6, 1, 0, 0);
        list.close().unwrap();
        h.gpu.execute(list.commands()).unwrap();

        let target = h.gpu.target();
        let mut painted = Vec::new();
        for y in 0..SIZE {
            for x in 0..SIZE {
                let c = target.color(x, y);
                if c != SENTINEL {
                    assert_eq!(c, LEVEL_COLORS[level as usize].to_array());
                    painted.push((x, y));
                }
            }
        }
        painted
    }

    fn pixels_with_count(h: &Harness, count: u8) -> Vec<(u32, u32)> {
        let target = h.gpu.target();
        (0..SIZE)
            .flat_map(|y| (0..SIZE).map(move |x| (x, y)))
            .filter(|&(x, y)| target.stencil(x, y) == count)
            .collect()
    }

    #[test]
    fn test_disjoint_triangles_count_once() {
        let mut h = harness(
            &[triangle(-0.9, 0.9, 0.5), triangle(0.1, 0.9, 0.5), triangle(-0.9, -0.1, 0.5)],
            1,
        );
        count(&mut h);

        let ones = pixels_with_count(&h, 1);
        assert!(!ones.is_empty());
        assert!((0..SIZE).all(|y| (0..SIZE).all(|x| h.gpu.target().stencil(x, y) <= 1)));

        // 每个像素只被与其计数相同的层级着色
        for level in 0..DEPTH_COMPLEXITY_LEVELS {
            let painted = painted_by_level(&mut h, level);
            assert_eq!(painted, pixels_with_count(&h, level as u8), "level {}", level);
        }
    }

    #[test]
    fn test_overlapping_triangles_count_each_layer() {
        let tri = triangle(-0.8, 0.8, 1.2);
        let mut h = harness(&[tri, tri, tri], 1);
        count(&mut h);

        let threes = pixels_with_count(&h, 3);
        assert!(!threes.is_empty());
        assert!((0..SIZE).all(|y| (0..SIZE).all(|x| matches!(h.gpu.target().stencil(x, y), 0 | 3))));

        assert_eq!(painted_by_level(&mut h, 3), threes);
        assert!(painted_by_level(&mut h, 1).is_empty());
        assert!(painted_by_level(&mut h, 2).is_empty());
    }

    #[test]
    fn test_count_wraps_past_stencil_range() {
        let tri = triangle(-0.8, 0.8, 1.2);
        // 3 层 x 86 次 = 258 次覆盖，回绕到 2
        let mut h = harness(&[tri, tri, tri], 86);
        count(&mut h);

        let covered: Vec<_> = (0..SIZE)
            .flat_map(|y| (0..SIZE).map(move |x| (x, y)))
            .filter(|&(x, y)| h.gpu.target().stencil(x, y) != 0)
            .collect();
        assert!(!covered.is_empty());
        assert_eq!(pixels_with_count(&h, 2), covered);
    }

    #[test]
    fn test_visualize_pass_paints_every_counted_pixel() {
        let mut h = harness(&[triangle(-0.9, 0.9, 1.0), triangle(-0.5, 0.5, 1.0)], 1);
        count(&mut h);

        let mut list = begin();
        depth_complexity::record_visualize_pass(&mut list, &h.pipelines).unwrap();
        list.close().unwrap();
        h.gpu.execute(list.commands()).unwrap();

        let target = h.gpu.target();
        for y in 0..SIZE {
            for x in 0..SIZE {
                let level = target.stencil(x, y) as usize;
                assert_eq!(target.color(x, y), LEVEL_COLORS[level].to_array());
            }
        }
    }

    #[test]
    fn test_draw_without_pipeline_fails() {
        let mut gpu = SoftwareGpu::new(4, 4);
        let err = gpu
            .execute(&[Command::DrawInstanced {
                vertex_count: 3,
                instance_count: 1,
                start_vertex_location: 0,
                start_instance_location: 0,
            }])
            .unwrap_err();
        assert!(matches!(err, RenderError::Graphics(GraphicsError::CommandExecution(_))));
    }

    /// 只有环境光，像素颜色等于材质的漫反射
    fn state_with_materials(object: ObjectConstants, albedos: &[[f32; 4]]) -> (BoundState, FrameResource) {
        let frame = FrameResource::new(&HostAllocator::new(), 1, 1, albedos.len(), 1).unwrap();
        for (i, albedo) in albedos.iter().enumerate() {
            let data = MaterialData {
                diffuse_albedo: *albedo,
                ..MaterialData::default()
            };
            frame.material_buffer.copy_data(i, &data).unwrap();
        }
        frame.object_cb.copy_data(0, &object).unwrap();

        let mut pass = PassConstants::default();
        pass.ambient_light = [1.0, 1.0, 1.0, 1.0];
        pass.fog_start = 1000.0;
        pass.lights = [Light::directional([0.0, -1.0, 0.0], [0.0, 0.0, 0.0]); MAX_LIGHTS];
        frame.pass_cb.copy_data(0, &pass).unwrap();

        let mut state = BoundState::default();
        state.constant_buffers[RootSlot::ObjectCb.index() as usize] = Some(frame.object_cb.location(0));
        state.constant_buffers[RootSlot::PassCb.index() as usize] = Some(frame.pass_cb.location(0));
        state.shader_resources[RootSlot::MaterialBuffer.index() as usize] = Some(frame.material_buffer.location(0));
        (state, frame)
    }

    #[test]
    fn test_material_selected_by_object_index() {
        let object = ObjectConstants {
            material_index: 2,
            ..ObjectConstants::default()
        };
        let albedos = [[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, 0.5]];
        let (state, _frame) = state_with_materials(object, &albedos);

        let constants = state.draw_constants().unwrap();
        let color = shader::standard_ps(&[0.0; VARYING_COUNT], &constants);
        assert_eq!(color, [0.0, 0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_material_index_out_of_range_fails() {
        let object = ObjectConstants {
            material_index: 3,
            ..ObjectConstants::default()
        };
        let (state, _frame) = state_with_materials(object, &[[1.0; 4]; 3]);
        assert!(state.draw_constants().is_err());
    }

    #[test]
    fn test_draw_without_material_buffer_fails() {
        let (mut state, _frame) = state_with_materials(ObjectConstants::default(), &[[1.0; 4]]);
        state.shader_resources = Default::default();
        let err = state.draw_constants().unwrap_err();
        assert!(matches!(err, RenderError::Graphics(GraphicsError::CommandExecution(_))));
    }
}
