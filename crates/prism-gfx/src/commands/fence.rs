use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;

use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;

/// # Destroy
/// 需要手动 destroy，drop 时会检查是否已经销毁
pub struct GfxFence {
    fence: vk::Fence,
    device: Rc<dyn GfxDevice>,
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(device: Rc<dyn GfxDevice>, signaled: bool, debug_name: &str) -> GfxResult<Self> {
        let fence = device.create_fence(signaled)?;
        device.set_debug_name(vk::ObjectType::FENCE, fence.as_raw(), debug_name);
        Ok(Self { fence, device })
    }

    #[inline]
    pub fn destroy(mut self) {
        self.device.destroy_fence(self.fence);
        self.fence = vk::Fence::null();
    }
}

impl Drop for GfxFence {
    fn drop(&mut self) {
        debug_assert!(self.fence.is_null(), "GfxFence dropped without destroy");
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

// tools
impl GfxFence {
    /// 阻塞等待 fence；`timeout` 单位为纳秒
    #[inline]
    pub fn wait(&self, timeout: u64) -> GfxResult<()> {
        self.device.wait_for_fences(std::slice::from_ref(&self.fence), timeout)
    }

    #[inline]
    pub fn reset(&self) -> GfxResult<()> {
        self.device.reset_fences(std::slice::from_ref(&self.fence))
    }
}
