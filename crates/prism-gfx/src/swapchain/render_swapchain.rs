use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;

use crate::commands::barrier::color_subresource_range;
use crate::error::{GfxError, GfxResult, VkResultExt};
use crate::foundation::device::{GfxDevice, GfxQueueType};
use crate::foundation::vk_device::VkGfxDevice;
use crate::swapchain::presenter::GfxPresenter;

/// 基于 `VK_KHR_swapchain` 的 [`GfxPresenter`]
///
/// surface 由应用创建并持有，这里只负责 swapchain 及其 image view；
/// 呈现使用 graphics queue。
///
/// # Destroy
/// 需要手动 destroy；必须在 surface 之前销毁
pub struct GfxRenderSwapchain {
    device: Rc<VkGfxDevice>,
    swapchain_loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,

    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    present_mode: vk::PresentModeKHR,
    surface_format: vk::SurfaceFormatKHR,

    swapchain_handle: vk::SwapchainKHR,

    /// 这里的 image 并非手动创建的，不需要销毁
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    swapchain_image_index: usize,
    swapchain_extent: vk::Extent2D,
}

// 构建过程
impl GfxRenderSwapchain {
    /// # param
    /// * `window_extent` - surface 没有给出确定尺寸时使用的窗口尺寸
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance: &ash::Instance,
        surface_loader: ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        device: Rc<VkGfxDevice>,
        present_mode: vk::PresentModeKHR,
        surface_format: vk::SurfaceFormatKHR,
        window_extent: vk::Extent2D,
    ) -> GfxResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance, device.ash_device());

        let mut swapchain = Self {
            device,
            swapchain_loader,
            surface_loader,
            physical_device,
            surface,
            present_mode,
            surface_format,
            swapchain_handle: vk::SwapchainKHR::null(),
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            swapchain_image_index: 0,
            swapchain_extent: window_extent,
        };
        swapchain.create_swapchain(window_extent)?;
        Ok(swapchain)
    }

    /// surface 给出了确定的尺寸时使用它，否则把窗口尺寸限制在 surface 允许的范围内
    pub fn calculate_swapchain_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
        if capabilities.current_extent.width != u32::MAX {
            return capabilities.current_extent;
        }
        vk::Extent2D {
            width: window_extent
                .width
                .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
            height: window_extent
                .height
                .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
        }
    }

    /// 确定 image count
    ///
    /// max_image_count == 0，表示不限制 image 数量
    pub fn calculate_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        if capabilities.max_image_count == 0 {
            capabilities.min_image_count + 1
        } else {
            u32::min(capabilities.max_image_count, capabilities.min_image_count + 1)
        }
    }

    /// 旧的 swapchain 作为 `old_swapchain` 传入，创建完成后销毁
    fn create_swapchain(&mut self, window_extent: vk::Extent2D) -> GfxResult<()> {
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
        }
        .vk_call("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let extent = Self::calculate_swapchain_extent(&capabilities, window_extent);

        let old_swapchain = self.swapchain_handle;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(Self::calculate_image_count(&capabilities))
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 Nsight 分析
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain_handle =
            unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }.vk_call("vkCreateSwapchainKHR")?;
        self.device.set_debug_name(vk::ObjectType::SWAPCHAIN_KHR, swapchain_handle.as_raw(), "main");

        self.destroy_image_views();
        if !old_swapchain.is_null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain_handle = swapchain_handle;

        let images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain_handle) }
            .vk_call("vkGetSwapchainImagesKHR")?;
        for (img_idx, img) in images.iter().enumerate() {
            self.device
                .set_debug_name(vk::ObjectType::IMAGE, img.as_raw(), &format!("swapchain-image-{img_idx}"));
        }
        let image_views = images
            .iter()
            .map(|img| {
                let info = vk::ImageViewCreateInfo::default()
                    .image(*img)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .subresource_range(color_subresource_range());
                unsafe { self.device.ash_device().create_image_view(&info, None) }.vk_call("vkCreateImageView")
            })
            .collect::<GfxResult<Vec<_>>>()?;

        self.swapchain_images = images;
        self.swapchain_image_views = image_views;
        self.swapchain_image_index = 0;
        self.swapchain_extent = extent;

        log::info!(
            "swapchain created: {} images, {}x{}, {:?}",
            self.swapchain_images.len(),
            extent.width,
            extent.height,
            self.present_mode
        );
        Ok(())
    }

    /// 窗口尺寸变化或 acquire/present 报告 out of date 之后调用
    ///
    /// 会等待设备空闲；依赖 swapchain image 的 framebuffer 需要由应用重新构建。
    pub fn recreate(&mut self, window_extent: vk::Extent2D) -> GfxResult<()> {
        self.device.device_wait_idle()?;
        self.create_swapchain(window_extent)
    }

    fn destroy_image_views(&mut self) {
        for view in self.swapchain_image_views.drain(..) {
            unsafe { self.device.ash_device().destroy_image_view(view, None) };
        }
    }

    pub fn destroy(mut self) {
        self.destroy_image_views();
        unsafe { self.swapchain_loader.destroy_swapchain(self.swapchain_handle, None) };
        self.swapchain_handle = vk::SwapchainKHR::null();
    }
}

impl Drop for GfxRenderSwapchain {
    fn drop(&mut self) {
        debug_assert!(self.swapchain_handle.is_null(), "GfxRenderSwapchain dropped without destroy");
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain_handle
    }

    #[inline]
    pub fn current_image(&self) -> vk::Image {
        self.swapchain_images[self.swapchain_image_index]
    }

    #[inline]
    pub fn current_image_view(&self) -> vk::ImageView {
        self.swapchain_image_views[self.swapchain_image_index]
    }
}

/// out of date 与 suboptimal 都视为需要重建，其余错误向上传递
fn need_recreate<T>(result: ash::prelude::VkResult<T>, call: &'static str) -> GfxResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            log::warn!("{call}: swapchain out of date");
            Ok(None)
        }
        Err(result) => Err(GfxError::Vk { call, result }),
    }
}

impl GfxPresenter for GfxRenderSwapchain {
    fn acquire_next_image(&mut self, signal_semaphore: vk::Semaphore, timeout: u64) -> GfxResult<bool> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain_handle, timeout, signal_semaphore, vk::Fence::null())
        };
        let Some((image_index, is_suboptimal)) = need_recreate(result, "vkAcquireNextImageKHR")? else {
            return Ok(true);
        };

        // suboptimal 时 image 仍然可用，本帧照常渲染
        self.swapchain_image_index = image_index as usize;
        if is_suboptimal {
            log::warn!("swapchain acquire image index {} is not optimal", image_index);
        }
        Ok(is_suboptimal)
    }

    fn present_image(&mut self, wait_semaphores: &[vk::Semaphore]) -> GfxResult<bool> {
        let image_indices = [self.swapchain_image_index as u32];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let queue = self.device.queue(GfxQueueType::Graphics).handle;
        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        match need_recreate(result, "vkQueuePresentKHR")? {
            Some(true) => {
                log::warn!("swapchain present is not optimal");
                Ok(true)
            }
            Some(false) => Ok(false),
            None => Ok(true),
        }
    }

    #[inline]
    fn current_image_index(&self) -> usize {
        self.swapchain_image_index
    }

    #[inline]
    fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    #[inline]
    fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    #[inline]
    fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    fn images(&self) -> &[vk::Image] {
        &self.swapchain_images
    }

    #[inline]
    fn image_views(&self) -> &[vk::ImageView] {
        &self.swapchain_image_views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: current,
            min_image_extent: vk::Extent2D { width: 16, height: 16 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_prefers_surface_extent() {
        let caps = capabilities(vk::Extent2D {
            width: 800,
            height: 600,
        });
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(&caps, vk::Extent2D { width: 1, height: 1 });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamps_window_extent() {
        let caps = capabilities(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        });
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(
            &caps,
            vk::Extent2D {
                width: 8000,
                height: 8,
            },
        );
        assert_eq!((extent.width, extent.height), (4096, 16));
    }

    #[test]
    fn test_image_count() {
        let mut caps = capabilities(vk::Extent2D::default());
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(GfxRenderSwapchain::calculate_image_count(&caps), 2);
    }
}
