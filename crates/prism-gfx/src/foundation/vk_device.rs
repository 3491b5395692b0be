use std::ffi::{CStr, CString};

use ash::vk;
use itertools::Itertools;

use crate::commands::submit_info::GfxSubmitBatch;
use crate::descriptors::descriptor_write::GfxDescriptorWrite;
use crate::error::{GfxResult, VkResultExt};
use crate::foundation::device::{GfxDevice, GfxQueueType};

/// 队列句柄及其 family
#[derive(Copy, Clone, Debug)]
pub struct GfxQueue {
    pub handle: vk::Queue,
    pub family_index: u32,
}

/// 基于 ash 的 [`GfxDevice`] 实现
///
/// instance / physical device / device 的创建不在这里：由外部创建好之后交给本结构体，
/// 本结构体只负责加载扩展函数并转发调用。
///
/// # Destroy
/// 不负责销毁 `ash::Device`，由创建方在所有组件 destroy 之后销毁
pub struct VkGfxDevice {
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    /// `VK_NV_shading_rate_image` 的函数表，未启用时为 None
    shading_rate_image: Option<ash::nv::shading_rate_image::DeviceFn>,

    graphics_queue: GfxQueue,
    transfer_queue: GfxQueue,
}

// init
impl VkGfxDevice {
    /// # param
    /// * `enable_shading_rate_image` - 创建 device 时是否启用了 `VK_NV_shading_rate_image`
    /// * `enable_debug_utils` - instance 是否启用了 `VK_EXT_debug_utils`
    pub fn new(
        instance: &ash::Instance,
        device: ash::Device,
        graphics_queue: GfxQueue,
        transfer_queue: GfxQueue,
        enable_shading_rate_image: bool,
        enable_debug_utils: bool,
    ) -> Self {
        let shading_rate_image = enable_shading_rate_image
            .then(|| load_shading_rate_image(|name| unsafe { instance.get_device_proc_addr(device.handle(), name.as_ptr()) }));
        let debug_utils = enable_debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        log::info!(
            "gfx device created. graphics queue family: {}, transfer queue family: {}, shading rate image: {}",
            graphics_queue.family_index,
            transfer_queue.family_index,
            enable_shading_rate_image
        );

        Self {
            device,
            debug_utils,
            shading_rate_image,
            graphics_queue,
            transfer_queue,
        }
    }
}

// getters
impl VkGfxDevice {
    #[inline]
    pub fn ash_device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn queue(&self, queue: GfxQueueType) -> GfxQueue {
        match queue {
            GfxQueueType::Graphics => self.graphics_queue,
            GfxQueueType::Transfer => self.transfer_queue,
        }
    }
}

impl GfxDevice for VkGfxDevice {
    #[inline]
    fn shading_rate_image_supported(&self) -> bool {
        self.shading_rate_image.is_some()
    }

    fn set_debug_name(&self, object_type: vk::ObjectType, raw_handle: u64, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            log::warn!("debug name contains nul byte: {name}");
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT {
            object_type,
            object_handle: raw_handle,
            p_object_name: name.as_ptr(),
            ..Default::default()
        };
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&info) } {
            log::warn!("failed to set debug name: {e:?}");
        }
    }

    fn create_command_pool(&self, queue: GfxQueueType, flags: vk::CommandPoolCreateFlags) -> GfxResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue(queue).family_index)
            .flags(flags);
        unsafe { self.device.create_command_pool(&info, None) }.vk_call("vkCreateCommandPool")
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> GfxResult<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(count);
        unsafe { self.device.allocate_command_buffers(&info) }.vk_call("vkAllocateCommandBuffers")
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, command_buffers) }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, begin_info: &vk::CommandBufferBeginInfo<'_>) -> GfxResult<()> {
        unsafe { self.device.begin_command_buffer(command_buffer, begin_info) }.vk_call("vkBeginCommandBuffer")
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GfxResult<()> {
        unsafe { self.device.end_command_buffer(command_buffer) }.vk_call("vkEndCommandBuffer")
    }

    fn create_fence(&self, signaled: bool) -> GfxResult<vk::Fence> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        unsafe { self.device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }.vk_call("vkCreateFence")
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> GfxResult<()> {
        unsafe { self.device.wait_for_fences(fences, true, timeout) }.vk_call("vkWaitForFences")
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> GfxResult<()> {
        unsafe { self.device.reset_fences(fences) }.vk_call("vkResetFences")
    }

    fn create_semaphore(&self) -> GfxResult<vk::Semaphore> {
        unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }.vk_call("vkCreateSemaphore")
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn queue_submit(&self, queue: GfxQueueType, batches: &[GfxSubmitBatch], fence: vk::Fence) -> GfxResult<()> {
        let semaphore_info = |(semaphore, stage): &(vk::Semaphore, vk::PipelineStageFlags2)| {
            vk::SemaphoreSubmitInfo::default().semaphore(*semaphore).stage_mask(*stage)
        };

        // SubmitInfo2 只持有指针，先把各个数组落到本地
        let command_infos = batches
            .iter()
            .map(|batch| {
                batch
                    .command_buffers()
                    .iter()
                    .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(*cmd))
                    .collect_vec()
            })
            .collect_vec();
        let wait_infos = batches.iter().map(|batch| batch.wait_infos().iter().map(semaphore_info).collect_vec()).collect_vec();
        let signal_infos =
            batches.iter().map(|batch| batch.signal_infos().iter().map(semaphore_info).collect_vec()).collect_vec();

        let submit_infos = (0..batches.len())
            .map(|i| {
                vk::SubmitInfo2::default()
                    .command_buffer_infos(&command_infos[i])
                    .wait_semaphore_infos(&wait_infos[i])
                    .signal_semaphore_infos(&signal_infos[i])
            })
            .collect_vec();

        unsafe { self.device.queue_submit2(self.queue(queue).handle, &submit_infos, fence) }.vk_call("vkQueueSubmit2")
    }

    fn queue_wait_idle(&self, queue: GfxQueueType) -> GfxResult<()> {
        unsafe { self.device.queue_wait_idle(self.queue(queue).handle) }.vk_call("vkQueueWaitIdle")
    }

    fn device_wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle() }.vk_call("vkDeviceWaitIdle")
    }

    fn create_descriptor_set_layout(&self, bindings: &[vk::DescriptorSetLayoutBinding<'_>]) -> GfxResult<vk::DescriptorSetLayout> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        unsafe { self.device.create_descriptor_set_layout(&info, None) }.vk_call("vkCreateDescriptorSetLayout")
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> GfxResult<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(pool_sizes);
        unsafe { self.device.create_descriptor_pool(&info, None) }.vk_call("vkCreateDescriptorPool")
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> GfxResult<Vec<vk::DescriptorSet>> {
        let info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(layouts);
        unsafe { self.device.allocate_descriptor_sets(&info) }.vk_call("vkAllocateDescriptorSets")
    }

    fn update_descriptor_sets(&self, writes: &[GfxDescriptorWrite]) {
        let vk_writes = writes.iter().map(GfxDescriptorWrite::vk_write).collect_vec();
        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) }
    }

    fn create_render_pass(&self, create_info: &vk::RenderPassCreateInfo<'_>) -> GfxResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(create_info, None) }.vk_call("vkCreateRenderPass")
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(&self, create_info: &vk::FramebufferCreateInfo<'_>) -> GfxResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(create_info, None) }.vk_call("vkCreateFramebuffer")
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    ) {
        unsafe { self.device.cmd_begin_render_pass(command_buffer, begin_info, contents) }
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(command_buffer) }
    }

    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary_command_buffers: &[vk::CommandBuffer]) {
        // 空数组是非法的
        if secondary_command_buffers.is_empty() {
            return;
        }
        unsafe { self.device.cmd_execute_commands(command_buffer, secondary_command_buffers) }
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe { self.device.cmd_bind_pipeline(command_buffer, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        if descriptor_sets.is_empty() {
            return;
        }
        unsafe { self.device.cmd_bind_descriptor_sets(command_buffer, bind_point, layout, first_set, descriptor_sets, &[]) }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe { self.device.cmd_bind_vertex_buffers(command_buffer, first_binding, buffers, offsets) }
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(command_buffer, buffer, offset, index_type) }
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(command_buffer, layout, stages, offset, data) }
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    fn cmd_dispatch(&self, command_buffer: vk::CommandBuffer, group_count: [u32; 3]) {
        unsafe { self.device.cmd_dispatch(command_buffer, group_count[0], group_count[1], group_count[2]) }
    }

    fn cmd_image_barriers(&self, command_buffer: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(barriers);
        unsafe { self.device.cmd_pipeline_barrier2(command_buffer, &dependency_info) }
    }

    fn cmd_blit_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: (vk::Image, vk::ImageLayout),
        dst: (vk::Image, vk::ImageLayout),
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe { self.device.cmd_blit_image(command_buffer, src.0, src.1, dst.0, dst.1, regions, filter) }
    }

    fn cmd_clear_color_image(
        &self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: vk::ClearColorValue,
        ranges: &[vk::ImageSubresourceRange],
    ) {
        unsafe { self.device.cmd_clear_color_image(command_buffer, image, layout, &color, ranges) }
    }

    fn cmd_bind_shading_rate_image(&self, command_buffer: vk::CommandBuffer, image_view: vk::ImageView, layout: vk::ImageLayout) {
        let Some(shading_rate_image) = &self.shading_rate_image else {
            log::error!("VK_NV_shading_rate_image is not enabled, skip binding shading rate image");
            return;
        };
        unsafe { (shading_rate_image.cmd_bind_shading_rate_image_nv)(command_buffer, image_view, layout) }
    }
}

/// 通过 `get_proc` 加载 `VK_NV_shading_rate_image` 的函数表，找不到的入口会被替换为 panic 的占位函数
fn load_shading_rate_image(
    mut get_proc: impl FnMut(&CStr) -> vk::PFN_vkVoidFunction,
) -> ash::nv::shading_rate_image::DeviceFn {
    ash::nv::shading_rate_image::DeviceFn::load(|name| unsafe { std::mem::transmute(get_proc(name)) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shading_rate_image_table_requests_bind_entry() {
        let mut requested = Vec::new();
        let _table = load_shading_rate_image(|name| {
            requested.push(name.to_owned());
            None
        });
        assert!(requested.iter().any(|name| name.as_c_str() == c"vkCmdBindShadingRateImageNV"));
    }
}
