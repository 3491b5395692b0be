use ash::vk;

use crate::error::GfxResult;

/// 负责获取与呈现 swapchain image 的一方
///
/// render graph 只通过这个 trait 与 swapchain 交互；窗口、surface 以及重建时机由应用决定。
///
/// 返回 `true` 表示 swapchain 已经 out of date 或 suboptimal，需要应用重建。
pub trait GfxPresenter {
    /// 获取下一张 image，完成后 signal `signal_semaphore`；`timeout` 单位为纳秒
    fn acquire_next_image(&mut self, signal_semaphore: vk::Semaphore, timeout: u64) -> GfxResult<bool>;

    /// 等待 `wait_semaphores` 之后呈现当前 image
    fn present_image(&mut self, wait_semaphores: &[vk::Semaphore]) -> GfxResult<bool>;

    /// 最近一次 acquire 得到的 image index
    fn current_image_index(&self) -> usize;

    fn image_count(&self) -> usize;

    fn extent(&self) -> vk::Extent2D;

    fn format(&self) -> vk::Format;

    fn images(&self) -> &[vk::Image];

    fn image_views(&self) -> &[vk::ImageView];
}
