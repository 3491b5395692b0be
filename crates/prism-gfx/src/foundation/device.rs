use ash::vk;

use crate::commands::submit_info::GfxSubmitBatch;
use crate::descriptors::descriptor_write::GfxDescriptorWrite;
use crate::error::GfxResult;

/// 提交目标队列
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GfxQueueType {
    Graphics,
    /// 单次同步命令（上传、layout 转换）使用的队列
    Transfer,
}

/// 逻辑设备上下文
///
/// 以 `Rc<dyn GfxDevice>` 的形式注入到每个组件的构造函数中，取代全局单例。
/// 单线程使用：所有实现都不保证 `Sync`。
///
/// 方法一一对应 Vulkan 的设备/命令接口，参数使用 ash 的类型；
/// 所有 `cmd_*` 只负责录制，不做任何状态检查。
pub trait GfxDevice {
    /// 是否启用了 `VK_NV_shading_rate_image`
    fn shading_rate_image_supported(&self) -> bool;

    /// 给 vulkan 对象设置调试名称，没有 debug utils 时什么也不做
    fn set_debug_name(&self, object_type: vk::ObjectType, raw_handle: u64, name: &str);

    // command pool & command buffer
    fn create_command_pool(&self, queue: GfxQueueType, flags: vk::CommandPoolCreateFlags) -> GfxResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> GfxResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]);
    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, begin_info: &vk::CommandBufferBeginInfo<'_>) -> GfxResult<()>;
    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GfxResult<()>;

    // synchronization
    fn create_fence(&self, signaled: bool) -> GfxResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> GfxResult<()>;
    fn reset_fences(&self, fences: &[vk::Fence]) -> GfxResult<()>;
    fn create_semaphore(&self) -> GfxResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // queue
    /// `fence` 可以为 null
    fn queue_submit(&self, queue: GfxQueueType, batches: &[GfxSubmitBatch], fence: vk::Fence) -> GfxResult<()>;
    fn queue_wait_idle(&self, queue: GfxQueueType) -> GfxResult<()>;
    fn device_wait_idle(&self) -> GfxResult<()>;

    // descriptors
    fn create_descriptor_set_layout(&self, bindings: &[vk::DescriptorSetLayoutBinding<'_>]) -> GfxResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> GfxResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// 每个 layout 分配一个 set，返回顺序与 `layouts` 一致
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> GfxResult<Vec<vk::DescriptorSet>>;
    fn update_descriptor_sets(&self, writes: &[GfxDescriptorWrite]);

    // render pass
    fn create_render_pass(&self, create_info: &vk::RenderPassCreateInfo<'_>) -> GfxResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_framebuffer(&self, create_info: &vk::FramebufferCreateInfo<'_>) -> GfxResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // commands
    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    );
    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer);
    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary_command_buffers: &[vk::CommandBuffer]);
    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    );
    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    );
    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );
    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_dispatch(&self, command_buffer: vk::CommandBuffer, group_count: [u32; 3]);
    fn cmd_image_barriers(&self, command_buffer: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]);
    fn cmd_blit_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: (vk::Image, vk::ImageLayout),
        dst: (vk::Image, vk::ImageLayout),
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );
    fn cmd_clear_color_image(
        &self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    );
    /// `vkCmdBindShadingRateImageNV`
    fn cmd_bind_shading_rate_image(&self, command_buffer: vk::CommandBuffer, image_view: vk::ImageView, layout: vk::ImageLayout);
}
