//! 渲染项分发
//!
//! 对某一层的每个渲染项：绑定顶点/索引缓冲和图元拓扑，
//! 按渲染项与材质保存的下标计算纹理描述符和物体常量的偏移，最后发出一次索引绘制。
//! 材质不逐个绑定：整个材质结构化缓冲在 `bind_pass` 中绑定一次，着色器按物体常量里的下标读取。
//! 不做剔除和排序，顺序为层顺序再按插入顺序。

use std::sync::Arc;

use crate::core::error::Result;
use crate::geometry::MeshGeometry;
use crate::scene::{Id, RenderItem, RenderLayer, Scene, Table};

use super::command::{CommandList, IndexBufferView, VertexBufferView};
use super::frame::FrameResource;
use super::pipeline::{self, PipelineDesc, RootSlot};
use super::resource::{BufferLocation, UploadAllocator};

/// 几何在 GPU 上的缓冲
///
/// 动态几何没有自己的顶点缓冲，绘制时使用当前帧资源中的那一份。
#[derive(Debug, Clone)]
pub struct GeometryBuffers {
    pub vertex: Option<VertexBufferView>,
    pub index: IndexBufferView,
}

impl GeometryBuffers {
    /// 把几何的 CPU 数据写入新的上传堆
    pub fn upload<A>(allocator: &A, geo: &MeshGeometry) -> Result<Self>
    where
        A: UploadAllocator + ?Sized,
    {
        let vertex = match geo.vertex_bytes() {
            Some(bytes) => {
                let heap = allocator.create_upload_heap(bytes.len() as u64)?;
                heap.write(0, bytes)?;
                Some(VertexBufferView {
                    location: BufferLocation::new(heap, 0),
                    size_in_bytes: geo.vertex_buffer_byte_size,
                    stride_in_bytes: geo.vertex_byte_stride,
                })
            }
            None => None,
        };

        let index_bytes = geo.index_bytes();
        let heap = allocator.create_upload_heap(index_bytes.len() as u64)?;
        heap.write(0, index_bytes)?;

        Ok(Self {
            vertex,
            index: IndexBufferView {
                location: BufferLocation::new(heap, 0),
                size_in_bytes: geo.index_buffer_byte_size,
                format: geo.index_format,
            },
        })
    }
}

/// 上传场景中的所有几何，结果按几何 id 的下标排列
pub fn upload_scene_geometry<A>(allocator: &A, geometries: &Table<MeshGeometry>) -> Result<Vec<GeometryBuffers>>
where
    A: UploadAllocator + ?Sized,
{
    geometries
        .iter()
        .map(|(_, geo)| GeometryBuffers::upload(allocator, geo))
        .collect()
}

/// 记录一帧绘制所需的只读状态
pub struct DrawContext<'a> {
    pub scene: &'a Scene,
    pub geometry: &'a [GeometryBuffers],
    pub pipelines: &'a Table<PipelineDesc>,
    pub frame: &'a FrameResource,
}

impl DrawContext<'_> {
    fn vertex_buffer(&self, geo_id: Id<MeshGeometry>) -> VertexBufferView {
        let geo = self.scene.geometries.get(geo_id);
        match &self.geometry[geo_id.index()].vertex {
            Some(view) => view.clone(),
            None => VertexBufferView {
                location: BufferLocation::new(Arc::clone(self.frame.waves_vb.heap()), 0),
                size_in_bytes: geo.vertex_buffer_byte_size,
                stride_in_bytes: geo.vertex_byte_stride,
            },
        }
    }
}

/// 绑定整个 pass 共享的根参数：pass 常量和材质结构化缓冲
pub fn bind_pass(cmd_list: &mut CommandList, frame: &FrameResource) {
    cmd_list.set_root_constant_buffer_view(RootSlot::PassCb, frame.pass_cb.location(0));
    cmd_list.set_root_shader_resource_view(RootSlot::MaterialBuffer, frame.material_buffer.location(0));
}

/// 按顺序绘制一组渲染项
pub fn draw_render_items(cmd_list: &mut CommandList, ctx: &DrawContext<'_>, items: &[Id<RenderItem>]) {
    let scene = ctx.scene;
    let frame = ctx.frame;

    for &id in items {
        let item = scene.render_items.get(id);
        let material = scene.materials.get(item.material);

        cmd_list.set_vertex_buffer(Some(ctx.vertex_buffer(item.geometry)));
        cmd_list.set_index_buffer(Some(ctx.geometry[item.geometry.index()].index.clone()));
        cmd_list.set_primitive_topology(item.topology);

        cmd_list.set_root_descriptor_table(RootSlot::DiffuseTexture, material.diffuse_srv_heap_index);
        cmd_list.set_root_constant_buffer_view(
            RootSlot::ObjectCb,
            frame.object_cb.location(item.obj_cb_index as usize),
        );

        cmd_list.draw_indexed_instanced(
            item.index_count,
            1,
            item.start_index_location,
            item.base_vertex_location,
            0,
        );
    }
}

/// 普通光照绘制：每层切换到对应管线后绘制该层
pub fn draw_layers(cmd_list: &mut CommandList, ctx: &DrawContext<'_>, counting: bool) -> Result<()> {
    for layer in RenderLayer::ALL {
        let pso = ctx.pipelines.id_of(pipeline::pipeline_name(layer, counting))?;
        cmd_list.set_pipeline_state(pso);
        draw_render_items(cmd_list, ctx, ctx.scene.layer(layer));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CountMode;
    use crate::geometry::shapes;
    use crate::renderer::command::{Command, CommandAllocator};
    use crate::renderer::resource::HostAllocator;
    use crate::scene::Material;

    struct Fixture {
        scene: Scene,
        geometry: Vec<GeometryBuffers>,
        pipelines: Table<PipelineDesc>,
        frame: FrameResource,
    }

    /// 一个静态立方体（不透明，第二个材质）和一个动态网格（透明）
    fn fixture() -> Fixture {
        let allocator = HostAllocator::new();
        let mut scene = Scene::new();
        let water = scene.add_material(Material::new("water", 0, 3)).unwrap();
        let crate_mat = scene.add_material(Material::new("crate", 1, 3)).unwrap();

        let (vertices, indices) = shapes::cube(1.0, 1.0, 1.0);
        let box_geo = scene
            .add_geometry(MeshGeometry::new_static("boxGeo", vertices, indices).with_whole_submesh("box"))
            .unwrap();
        let wave_geo = scene
            .add_geometry(MeshGeometry::new_dynamic("waterGeo", 9, shapes::grid_indices(3, 3)).with_whole_submesh("grid"))
            .unwrap();

        let box_sub = scene.geometries.get(box_geo).submesh("box").unwrap();
        let wave_sub = scene.geometries.get(wave_geo).submesh("grid").unwrap();
        scene
            .add_render_item("waves", RenderLayer::Transparent, RenderItem::new(0, water, wave_geo, wave_sub, 3))
            .unwrap();
        scene
            .add_render_item("box", RenderLayer::Opaque, RenderItem::new(1, crate_mat, box_geo, box_sub, 3))
            .unwrap();
        scene.freeze();

        let geometry = upload_scene_geometry(&allocator, &scene.geometries).unwrap();
        let pipelines = pipeline::build_pipeline_table(CountMode::DepthComplexity).unwrap();
        let frame = FrameResource::new(&allocator, 1, 2, 2, 9).unwrap();
        Fixture { scene, geometry, pipelines, frame }
    }

    fn record(fx: &Fixture, counting: bool) -> Vec<Command> {
        let ctx = DrawContext {
            scene: &fx.scene,
            geometry: &fx.geometry,
            pipelines: &fx.pipelines,
            frame: &fx.frame,
        };
        let mut list = CommandList::new();
        list.reset(&CommandAllocator::new()).unwrap();
        bind_pass(&mut list, &fx.frame);
        draw_layers(&mut list, &ctx, counting).unwrap();
        list.close().unwrap();
        list.commands().to_vec()
    }

    #[test]
    fn test_static_geometry_uploaded_verbatim() {
        let fx = fixture();
        let box_buffers = &fx.geometry[0];
        let vb = box_buffers.vertex.as_ref().unwrap();
        assert_eq!(vb.size_in_bytes, 24 * 32);
        assert_eq!(vb.stride_in_bytes, 32);

        let mut first_index = [0u8; 2];
        box_buffers.index.location.heap.read(0, &mut first_index).unwrap();
        assert_eq!(u16::from_ne_bytes(first_index), 0);

        assert!(fx.geometry[1].vertex.is_none());
    }

    #[test]
    fn test_draw_order_and_offsets() {
        let fx = fixture();
        let commands = record(&fx, false);

        let draws: Vec<u32> = commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexedInstanced { index_count, instance_count, .. } => {
                    assert_eq!(*instance_count, 1);
                    Some(*index_count)
                }
                _ => None,
            })
            .collect();
        // 不透明的立方体先于透明的水面
        assert_eq!(draws, vec![36, 24]);

        let object_cb_base = fx.frame.object_cb.location(0).gpu_virtual_address();
        let object_offsets: Vec<u64> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetRootConstantBufferView { slot: RootSlot::ObjectCb, location } => {
                    Some(location.gpu_virtual_address() - object_cb_base)
                }
                _ => None,
            })
            .collect();
        assert_eq!(object_offsets, vec![256, 0]);

        let tables: Vec<u32> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetRootDescriptorTable { slot: RootSlot::DiffuseTexture, heap_index } => Some(*heap_index),
                _ => None,
            })
            .collect();
        assert_eq!(tables, vec![1, 0]);
    }

    #[test]
    fn test_dynamic_geometry_binds_frame_vertex_buffer() {
        let fx = fixture();
        let commands = record(&fx, true);

        let waves_base = fx.frame.waves_vb.location(0).gpu_virtual_address();
        let last_vb = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetVertexBuffer(Some(view)) => Some(view),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(last_vb.location.gpu_virtual_address(), waves_base);
        assert_eq!(last_vb.size_in_bytes, 9 * 32);

        let psos: Vec<&str> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetPipelineState(id) => Some(fx.pipelines.name(*id)),
                _ => None,
            })
            .collect();
        assert_eq!(psos, vec!["opaqueCounter", "alphaTestedCounter", "transparentCounter"]);
    }

    #[test]
    fn test_materials_bound_once_per_pass() {
        let fx = fixture();
        let commands = record(&fx, false);

        let srvs: Vec<(RootSlot, u64)> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetRootShaderResourceView { slot, location } => Some((*slot, location.gpu_virtual_address())),
                _ => None,
            })
            .collect();
        let base = fx.frame.material_buffer.location(0).gpu_virtual_address();
        assert_eq!(srvs, vec![(RootSlot::MaterialBuffer, base)]);

        // 绘制之间只切换物体常量，不再有逐材质的常量缓冲
        let cbv_slots: Vec<RootSlot> = commands
            .iter()
            .filter_map(|c| match c {
                Command::SetRootConstantBufferView { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(cbv_slots, vec![RootSlot::PassCb, RootSlot::ObjectCb, RootSlot::ObjectCb]);
    }
}
