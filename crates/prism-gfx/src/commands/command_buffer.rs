use std::rc::Rc;

use ash::vk;

use crate::commands::barrier::GfxImageBarrier;
use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;
use crate::pipeline::GfxPipeline;

/// 命令缓冲封装
///
/// 只是 `vk::CommandBuffer` 加上设备上下文，生命周期由
/// [`GfxCommandBufferManager`](crate::commands::command_buffer_manager::GfxCommandBufferManager) 管理，
/// 可以随意 clone。
#[derive(Clone)]
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    level: vk::CommandBufferLevel,
    device: Rc<dyn GfxDevice>,
}

// new & init
impl GfxCommandBuffer {
    #[inline]
    pub(crate) fn new(device: Rc<dyn GfxDevice>, vk_handle: vk::CommandBuffer, level: vk::CommandBufferLevel) -> Self {
        Self {
            vk_handle,
            level,
            device,
        }
    }
}

// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    #[inline]
    pub fn level(&self) -> vk::CommandBufferLevel {
        self.level
    }

    #[inline]
    pub fn device(&self) -> &Rc<dyn GfxDevice> {
        &self.device
    }
}

// Basic 命令
impl GfxCommandBuffer {
    #[inline]
    pub(crate) fn begin(&self, begin_info: &vk::CommandBufferBeginInfo<'_>) -> GfxResult<()> {
        self.device.begin_command_buffer(self.vk_handle, begin_info)
    }

    #[inline]
    pub(crate) fn end(&self) -> GfxResult<()> {
        self.device.end_command_buffer(self.vk_handle)
    }
}

// render pass
impl GfxCommandBuffer {
    /// - command type: action, state, sync
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_begin_render_pass(&self, begin_info: &vk::RenderPassBeginInfo<'_>, contents: vk::SubpassContents) {
        self.device.cmd_begin_render_pass(self.vk_handle, begin_info, contents);
    }

    /// - command type: action, state, sync
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_end_render_pass(&self) {
        self.device.cmd_end_render_pass(self.vk_handle);
    }

    /// 在 primary buffer 中执行 secondary buffers
    ///
    /// - command type: indirection
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn cmd_execute_commands(&self, secondary_command_buffers: &[vk::CommandBuffer]) {
        self.device.cmd_execute_commands(self.vk_handle, secondary_command_buffers);
    }
}

// 状态绑定
impl GfxCommandBuffer {
    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_bind_pipeline(&self, pipeline: &GfxPipeline) {
        self.device.cmd_bind_pipeline(self.vk_handle, pipeline.bind_point(), pipeline.handle());
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_bind_descriptor_sets(&self, pipeline: &GfxPipeline, first_set: u32, descriptor_sets: &[vk::DescriptorSet]) {
        self.device.cmd_bind_descriptor_sets(
            self.vk_handle,
            pipeline.bind_point(),
            pipeline.layout(),
            first_set,
            descriptor_sets,
        );
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_bind_vertex_buffers(&self, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        self.device.cmd_bind_vertex_buffers(self.vk_handle, first_binding, buffers, offsets);
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.device.cmd_bind_index_buffer(self.vk_handle, buffer, offset, index_type);
    }

    /// - command type: state
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_push_constants(&self, pipeline: &GfxPipeline, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        self.device.cmd_push_constants(self.vk_handle, pipeline.layout(), stages, offset, data);
    }

    /// - command type: state
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_bind_shading_rate_image(&self, image_view: vk::ImageView, layout: vk::ImageLayout) {
        self.device.cmd_bind_shading_rate_image(self.vk_handle, image_view, layout);
    }
}

// draw & dispatch
impl GfxCommandBuffer {
    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_draw_indexed(&self, index_count: u32, first_index: u32, vertex_offset: i32) {
        self.device.cmd_draw_indexed(self.vk_handle, index_count, 1, first_index, vertex_offset, 0);
    }

    /// - command type: action
    /// - supported queue types: compute
    #[inline]
    pub fn cmd_dispatch(&self, group_count: [u32; 3]) {
        self.device.cmd_dispatch(self.vk_handle, group_count);
    }
}

// 同步与传输
impl GfxCommandBuffer {
    /// - command type: sync
    /// - supported queue types: transfer, graphics, compute
    #[inline]
    pub fn image_memory_barrier(&self, barriers: &[GfxImageBarrier]) {
        let barriers: Vec<vk::ImageMemoryBarrier2<'static>> = barriers.iter().map(|b| *b.inner()).collect();
        self.device.cmd_image_barriers(self.vk_handle, &barriers);
    }

    /// - command type: action
    /// - supported queue types: graphics
    #[inline]
    pub fn cmd_blit_image(
        &self,
        src: (vk::Image, vk::ImageLayout),
        dst: (vk::Image, vk::ImageLayout),
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        self.device.cmd_blit_image(self.vk_handle, src, dst, regions, filter);
    }

    /// - command type: action
    /// - supported queue types: graphics, compute
    #[inline]
    pub fn cmd_clear_color_image(
        &self,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        self.device.cmd_clear_color_image(self.vk_handle, image, layout, color, ranges);
    }
}
