use ash::vk;
use prism_gfx::commands::barrier::SHADING_RATE_LAYOUT;
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::descriptors::resource_bundle::GfxResourceBundle;
use prism_gfx::pipeline::GfxPipeline;
use prism_gfx::resources::GfxImageRef;

use crate::drawer::DrawContext;
use crate::error::{RenderGraphError, RenderGraphResult};
use crate::render_object::{BundleSets, GfxRenderObject};

/// 在 render pass 内绘制若干 render object 的 drawer
///
/// 设置了 shading rate image 且设备支持时，每帧绑定对应的 shading rate image。
pub struct GraphicsDrawer {
    pipeline: GfxPipeline,
    global_sets: Vec<BundleSets>,
    /// 每帧一个，可以为空
    shading_rate_images: Vec<GfxImageRef>,
}

impl GraphicsDrawer {
    /// `global_bundles` 依次绑定在 set 0, 1, ...，必须已经分配
    pub fn new(pipeline: GfxPipeline, global_bundles: &[&GfxResourceBundle]) -> RenderGraphResult<Self> {
        Ok(Self::with_sets(pipeline, BundleSets::from_bundles(global_bundles)?))
    }

    pub fn with_sets(pipeline: GfxPipeline, global_sets: Vec<BundleSets>) -> Self {
        Self {
            pipeline,
            global_sets,
            shading_rate_images: Vec::new(),
        }
    }

    /// builder
    pub fn with_shading_rate_images(mut self, images: Vec<GfxImageRef>) -> Self {
        self.shading_rate_images = images;
        self
    }

    #[inline]
    pub fn pipeline(&self) -> &GfxPipeline {
        &self.pipeline
    }

    #[inline]
    pub fn global_set_count(&self) -> u32 {
        self.global_sets.len() as u32
    }

    pub(crate) fn draw(&self, ctx: &mut DrawContext<'_>, objects: &[GfxRenderObject]) -> RenderGraphResult<GfxCommandBuffer> {
        let Some(target) = ctx.target else {
            return Err(RenderGraphError::MissingFramebuffer {
                name: "graphics drawer".to_string(),
            });
        };

        // descriptor set 在开始录制之前解析，出错时不会留下录制到一半的 buffer
        let global_sets: Vec<vk::DescriptorSet> =
            self.global_sets.iter().map(|s| s.get(ctx.frame_index)).collect::<RenderGraphResult<_>>()?;
        let object_sets: Vec<Vec<vk::DescriptorSet>> =
            objects.iter().map(|o| o.descriptor_sets(ctx.frame_index)).collect::<RenderGraphResult<_>>()?;

        let inheritance = vk::CommandBufferInheritanceInfo::default()
            .render_pass(target.render_pass)
            .framebuffer(target.framebuffer)
            .subpass(0);
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE | vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
            .inheritance_info(&inheritance);
        let cmd = ctx.manager.get_command_buffer(vk::CommandBufferLevel::SECONDARY, &begin_info)?;

        cmd.cmd_bind_pipeline(&self.pipeline);

        if !self.shading_rate_images.is_empty() && cmd.device().shading_rate_image_supported() {
            let image = self.shading_rate_images.get(ctx.frame_index).ok_or(RenderGraphError::MissingShadingRateImage {
                drawer: "graphics",
                frame: ctx.frame_index,
            })?;
            cmd.cmd_bind_shading_rate_image(image.view, SHADING_RATE_LAYOUT);
        }

        if !global_sets.is_empty() {
            cmd.cmd_bind_descriptor_sets(&self.pipeline, 0, &global_sets);
        }

        for (object, object_sets) in objects.iter().zip(&object_sets) {
            let (buffers, offsets): (Vec<_>, Vec<_>) = object.vertex_buffers.iter().copied().unzip();
            cmd.cmd_bind_vertex_buffers(object.first_vertex_binding, &buffers, &offsets);
            cmd.cmd_bind_index_buffer(object.index_buffer, 0, vk::IndexType::UINT32);

            if !object_sets.is_empty() {
                cmd.cmd_bind_descriptor_sets(&self.pipeline, self.global_set_count(), object_sets);
            }
            if !object.push_constants.is_empty() {
                cmd.cmd_push_constants(&self.pipeline, vk::ShaderStageFlags::VERTEX, 0, &object.push_constants);
            }
            cmd.cmd_draw_indexed(object.index_count, 0, 0);
        }

        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use prism_gfx::commands::command_buffer_manager::GfxCommandBufferManager;
    use prism_gfx::mock::device::{MockCommand, MockGfxDevice};

    use super::*;
    use crate::drawer::DrawTarget;

    fn target() -> DrawTarget {
        DrawTarget {
            render_pass: vk::RenderPass::from_raw(0x100),
            framebuffer: vk::Framebuffer::from_raw(0x200),
            extent: vk::Extent2D { width: 64, height: 32 },
        }
    }

    fn pipeline() -> GfxPipeline {
        GfxPipeline::graphics(vk::Pipeline::from_raw(0x300), vk::PipelineLayout::from_raw(0x301))
    }

    fn shading_rate_image(raw: u64) -> GfxImageRef {
        GfxImageRef::new(
            vk::Image::from_raw(raw),
            vk::ImageView::from_raw(raw + 1),
            vk::Extent2D { width: 4, height: 2 },
            vk::Format::R8_UINT,
        )
    }

    #[test]
    fn test_records_objects_after_global_sets() {
        let device = MockGfxDevice::new_rc();
        let mut manager = GfxCommandBufferManager::new(device.clone(), 2).unwrap();

        let global = BundleSets::from_raw(true, vec![vk::DescriptorSet::from_raw(0x10), vk::DescriptorSet::from_raw(0x11)]).unwrap();
        let drawer = GraphicsDrawer::with_sets(pipeline(), vec![global]);

        let mut object = GfxRenderObject::new(vk::Buffer::from_raw(0x20), vk::Buffer::from_raw(0x21), 3)
            .with_push_constants(&[1.0f32, 2.0]);
        object.first_vertex_binding = 1;
        object.bundle_sets = vec![BundleSets::from_raw(false, vec![vk::DescriptorSet::from_raw(0x30)]).unwrap()];

        let mut ctx = DrawContext {
            manager: &mut manager,
            frame_index: 1,
            target: Some(target()),
            workgroup_size: 16,
        };
        let cmd = drawer.draw(&mut ctx, &[object]).unwrap();

        assert_eq!(
            device.begin_flags(cmd.vk_handle()),
            Some(vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE | vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
        );
        assert_eq!(
            device.inheritance(cmd.vk_handle()),
            Some((target().render_pass, target().framebuffer, 0))
        );

        let commands = device.commands(cmd.vk_handle());
        assert_eq!(commands.len(), 7);
        assert!(matches!(commands[0], MockCommand::BindPipeline { bind_point: vk::PipelineBindPoint::GRAPHICS, .. }));
        assert_eq!(
            commands[1],
            MockCommand::BindDescriptorSets {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                first_set: 0,
                sets: vec![vk::DescriptorSet::from_raw(0x11)],
            }
        );
        assert_eq!(
            commands[2],
            MockCommand::BindVertexBuffers {
                first_binding: 1,
                buffers: vec![vk::Buffer::from_raw(0x20)],
                offsets: vec![0],
            }
        );
        assert!(matches!(commands[3], MockCommand::BindIndexBuffer { index_type: vk::IndexType::UINT32, .. }));
        assert_eq!(
            commands[4],
            MockCommand::BindDescriptorSets {
                bind_point: vk::PipelineBindPoint::GRAPHICS,
                first_set: 1,
                sets: vec![vk::DescriptorSet::from_raw(0x30)],
            }
        );
        assert!(matches!(
            &commands[5],
            MockCommand::PushConstants { stages: vk::ShaderStageFlags::VERTEX, offset: 0, data } if data.len() == 8
        ));
        assert!(matches!(commands[6], MockCommand::DrawIndexed { index_count: 3, instance_count: 1, .. }));

        manager.get_recorded_command_buffers(vk::CommandBufferLevel::SECONDARY).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_binds_shading_rate_image_of_current_frame() {
        let device = MockGfxDevice::new_rc();
        let mut manager = GfxCommandBufferManager::new(device.clone(), 2).unwrap();
        let drawer = GraphicsDrawer::with_sets(pipeline(), Vec::new())
            .with_shading_rate_images(vec![shading_rate_image(0x40), shading_rate_image(0x50)]);

        let mut ctx = DrawContext {
            manager: &mut manager,
            frame_index: 1,
            target: Some(target()),
            workgroup_size: 16,
        };
        let cmd = drawer.draw(&mut ctx, &[]).unwrap();
        assert_eq!(
            device.commands(cmd.vk_handle())[1],
            MockCommand::BindShadingRateImage {
                image_view: vk::ImageView::from_raw(0x51),
                layout: SHADING_RATE_LAYOUT,
            }
        );

        // 设备不支持时跳过绑定
        device.set_shading_rate_image_supported(false);
        let cmd = drawer.draw(&mut ctx, &[]).unwrap();
        assert_eq!(device.commands(cmd.vk_handle()).len(), 1);

        manager.get_recorded_command_buffers(vk::CommandBufferLevel::SECONDARY).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_compute_context_is_rejected() {
        let device = MockGfxDevice::new_rc();
        let mut manager = GfxCommandBufferManager::new(device, 1).unwrap();
        let drawer = GraphicsDrawer::with_sets(pipeline(), Vec::new());

        let mut ctx = DrawContext {
            manager: &mut manager,
            frame_index: 0,
            target: None,
            workgroup_size: 16,
        };
        assert!(matches!(drawer.draw(&mut ctx, &[]), Err(RenderGraphError::MissingFramebuffer { .. })));
        manager.destroy();
    }
}
