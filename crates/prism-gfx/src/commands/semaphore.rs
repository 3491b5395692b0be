use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;

use crate::error::GfxResult;
use crate::foundation::device::GfxDevice;

/// binary semaphore
///
/// # Destroy
/// 需要手动 destroy
pub struct GfxSemaphore {
    semaphore: vk::Semaphore,
    device: Rc<dyn GfxDevice>,
}

impl GfxSemaphore {
    pub fn new(device: Rc<dyn GfxDevice>, debug_name: &str) -> GfxResult<Self> {
        let semaphore = device.create_semaphore()?;
        device.set_debug_name(vk::ObjectType::SEMAPHORE, semaphore.as_raw(), debug_name);
        Ok(Self { semaphore, device })
    }

    #[inline]
    pub fn destroy(mut self) {
        self.device.destroy_semaphore(self.semaphore);
        self.semaphore = vk::Semaphore::null();
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for GfxSemaphore {
    fn drop(&mut self) {
        debug_assert!(self.semaphore.is_null(), "GfxSemaphore dropped without destroy");
    }
}
