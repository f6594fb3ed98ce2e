//! 逐帧更新：动画、常量缓冲和水面顶点
//!
//! 所有写入都落在当前帧资源上，调用前 `advance_frame` 必须已经返回。

use tracing::trace;

use crate::core::error::Result;
use crate::core::math::Matrix4;
use crate::renderer::constants::{Light, MaterialData, ObjectConstants, PassConstants};
use crate::renderer::frame::FrameResource;
use crate::scene::{Camera, Id, Material, Scene, WaveDisturber, Waves};

/// 水面纹理滚动
pub fn animate_materials(scene: &mut Scene, water: Id<Material>, dt: f32) {
    let material = scene.materials.get_mut(water);
    let (mut tu, mut tv) = material.tex_offset();

    tu += 0.1 * dt;
    tv += 0.02 * dt;
    if tu >= 1.0 {
        tu -= 1.0;
    }
    if tv >= 1.0 {
        tv -= 1.0;
    }

    material.set_tex_offset(tu, tv);
    trace!(tu, tv, "water texture scrolled");
}

/// 只刷新仍带脏标记的物体常量
pub fn update_object_cbs(scene: &mut Scene, frame: &FrameResource) -> Result<()> {
    let materials = &scene.materials;
    for (_, item) in scene.render_items.iter_mut() {
        if item.dirty.consume() {
            let material = materials.get(item.material);
            frame
                .object_cb
                .copy_data(item.obj_cb_index as usize, &ObjectConstants::new(item, material))?;
        }
    }
    Ok(())
}

pub fn update_material_cbs(scene: &mut Scene, frame: &FrameResource) -> Result<()> {
    for (_, material) in scene.materials.iter_mut() {
        if material.dirty.consume() {
            frame
                .material_buffer
                .copy_data(material.mat_cb_index as usize, &MaterialData::from(&*material))?;
        }
    }
    Ok(())
}

/// 主 Pass 的光照参数
pub fn main_pass_lights(pass: &mut PassConstants) {
    pass.ambient_light = [0.25, 0.25, 0.35, 1.0];
    pass.lights[0] = Light::directional([0.577_35, -0.577_35, 0.577_35], [0.9, 0.9, 0.8]);
    pass.lights[1] = Light::directional([-0.577_35, -0.577_35, 0.577_35], [0.3, 0.3, 0.3]);
    pass.lights[2] = Light::directional([0.0, -0.707, -0.707], [0.15, 0.15, 0.15]);
}

/// 每帧重写整个 Pass 常量
pub fn update_main_pass_cb(
    camera: &mut Camera,
    frame: &FrameResource,
    size: (u32, u32),
    total_time: f32,
    delta_time: f32,
) -> Result<PassConstants> {
    let view: Matrix4 = camera.view_matrix();
    let proj = camera.proj_matrix();
    let eye = camera.position();

    let mut pass = PassConstants::default();
    pass.set_view_proj(&view, &proj);
    pass.eye_pos_w = [eye.x, eye.y, eye.z];
    pass.set_render_target_size(size.0, size.1);
    pass.near_z = camera.near_z();
    pass.far_z = camera.far_z();
    pass.total_time = total_time;
    pass.delta_time = delta_time;
    main_pass_lights(&mut pass);

    frame.pass_cb.copy_data(0, &pass)?;
    Ok(pass)
}

/// 扰动、模拟并把水面写入当前帧的动态顶点缓冲
pub fn update_waves(
    waves: &mut Waves,
    disturber: &mut WaveDisturber,
    frame: &FrameResource,
    total_time: f32,
    delta_time: f32,
) -> Result<()> {
    if let Some(d) = disturber.update(total_time, waves) {
        trace!(row = d.row, col = d.col, magnitude = d.magnitude, "waves disturbed");
    }
    waves.update(delta_time);

    let vertices: Vec<_> = (0..waves.vertex_count()).map(|i| waves.vertex(i)).collect();
    frame.waves_vb.copy_slice(0, &vertices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SceneConfig;
    use crate::core::math::matrix;
    use crate::demo::scene_setup;
    use crate::renderer::resource::HostAllocator;

    fn fixture() -> (scene_setup::SceneContent, FrameResource) {
        let config = SceneConfig {
            wave_rows: 16,
            wave_cols: 16,
            ..SceneConfig::default()
        };
        let content = scene_setup::build(&config, 2).unwrap();
        let frame = FrameResource::new(&HostAllocator::new(), 1, 3, 3, content.waves.vertex_count()).unwrap();
        (content, frame)
    }

    fn object_world(frame: &FrameResource, index: usize) -> Matrix4 {
        matrix::from_cb(&frame.object_cb.read(index).unwrap().world)
    }

    #[test]
    fn test_object_cbs_written_once_per_slot() {
        let (mut content, frame) = fixture();

        update_object_cbs(&mut content.scene, &frame).unwrap();
        let box_world = object_world(&frame, 2);
        assert_eq!(box_world, matrix::translation(3.0, 2.0, -9.0));

        // 第二个槽位消耗掉剩余的脏帧后不再写入
        update_object_cbs(&mut content.scene, &frame).unwrap();
        frame.object_cb.copy_data(2, &ObjectConstants::default()).unwrap();
        update_object_cbs(&mut content.scene, &frame).unwrap();
        assert_eq!(object_world(&frame, 2), Matrix4::identity());
    }

    #[test]
    fn test_water_scroll_wraps() {
        let (mut content, _) = fixture();
        let water = content.water_material;

        content.scene.materials.get_mut(water).set_tex_offset(0.95, 0.0);
        content.scene.materials.get_mut(water).dirty.consume();
        animate_materials(&mut content.scene, water, 1.0);

        let material = content.scene.materials.get(water);
        let (tu, tv) = material.tex_offset();
        assert!((tu - 0.05).abs() < 1e-5);
        assert!((tv - 0.02).abs() < 1e-6);
        assert_eq!(material.dirty.remaining(), 2);
    }

    #[test]
    fn test_pass_cb_contents() {
        let (_, frame) = fixture();
        let mut camera = Camera::new(4.0 / 3.0);

        let pass = update_main_pass_cb(&mut camera, &frame, (800, 600), 2.0, 0.5).unwrap();
        let stored = frame.pass_cb.read(0).unwrap();

        assert_eq!(stored.total_time, 2.0);
        assert_eq!(stored.render_target_size, [800.0, 600.0]);
        assert_eq!(stored.near_z, 1.0);
        assert_eq!(stored.far_z, 1000.0);
        assert_eq!(stored.lights[0].strength, [0.9, 0.9, 0.8]);
        assert_eq!(stored.view_proj, pass.view_proj);
    }

    #[test]
    fn test_waves_written_to_frame_buffer() {
        let (mut content, frame) = fixture();
        let mut disturber = WaveDisturber::new(0.25, 7);

        update_waves(&mut content.waves, &mut disturber, &frame, 0.3, 0.05).unwrap();

        let n = content.waves.vertex_count();
        for i in [0, n / 2, n - 1] {
            assert_eq!(frame.waves_vb.read(i).unwrap(), content.waves.vertex(i));
        }
    }

    #[test]
    fn test_object_cb_carries_material_index() {
        let (mut content, frame) = fixture();

        update_object_cbs(&mut content.scene, &frame).unwrap();
        update_material_cbs(&mut content.scene, &frame).unwrap();

        // 立方体使用铁丝网材质
        let box_object = frame.object_cb.read(2).unwrap();
        assert_eq!(box_object.material_index, 2);

        let water = frame.material_buffer.read(1).unwrap();
        assert_eq!(water.diffuse_albedo[3], 0.5);
        assert_eq!(water.diffuse_map_index, 1);
    }
}
