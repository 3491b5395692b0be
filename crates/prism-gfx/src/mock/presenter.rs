use std::collections::VecDeque;

use ash::vk;
use ash::vk::Handle;

use crate::error::GfxResult;
use crate::swapchain::presenter::GfxPresenter;

/// mock presenter 的 image 句柄从这里开始，避免与 [`MockGfxDevice`](super::device::MockGfxDevice) 的句柄重复
const IMAGE_HANDLE_BASE: u64 = 0xA000_0000;

/// 依次循环 image index 的 [`GfxPresenter`]
///
/// 可以预先安排某次 acquire 或 present 报告 out of date。
pub struct MockPresenter {
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    extent: vk::Extent2D,
    format: vk::Format,

    image_index: usize,
    acquire_count: usize,

    out_of_date_acquires: VecDeque<usize>,
    out_of_date_presents: VecDeque<usize>,

    acquire_semaphores: Vec<vk::Semaphore>,
    present_waits: Vec<Vec<vk::Semaphore>>,
    recreate_count: usize,
}

impl MockPresenter {
    pub fn new(image_count: usize, extent: vk::Extent2D, format: vk::Format) -> Self {
        let images = (0..image_count as u64).map(|i| vk::Image::from_raw(IMAGE_HANDLE_BASE + 2 * i)).collect();
        let image_views =
            (0..image_count as u64).map(|i| vk::ImageView::from_raw(IMAGE_HANDLE_BASE + 2 * i + 1)).collect();
        Self {
            images,
            image_views,
            extent,
            format,
            image_index: 0,
            acquire_count: 0,
            out_of_date_acquires: VecDeque::new(),
            out_of_date_presents: VecDeque::new(),
            acquire_semaphores: Vec::new(),
            present_waits: Vec::new(),
            recreate_count: 0,
        }
    }

    /// 第 `nth` 次（从 0 开始，包括失败的调用）acquire 报告 out of date
    pub fn out_of_date_on_acquire(&mut self, nth: usize) {
        self.out_of_date_acquires.push_back(nth);
    }

    /// 第 `nth` 次（从 0 开始）present 报告 out of date
    pub fn out_of_date_on_present(&mut self, nth: usize) {
        self.out_of_date_presents.push_back(nth);
    }

    /// 模拟应用重建 swapchain，image index 从 0 重新开始
    pub fn recreate(&mut self, extent: vk::Extent2D) {
        self.extent = extent;
        self.image_index = 0;
        self.acquire_count = 0;
        self.recreate_count += 1;
    }

    pub fn recreate_count(&self) -> usize {
        self.recreate_count
    }

    /// 每次 acquire 时传入的 semaphore
    pub fn acquire_semaphores(&self) -> &[vk::Semaphore] {
        &self.acquire_semaphores
    }

    /// 每次 present 时等待的 semaphore
    pub fn present_waits(&self) -> &[Vec<vk::Semaphore>] {
        &self.present_waits
    }
}

impl GfxPresenter for MockPresenter {
    fn acquire_next_image(&mut self, signal_semaphore: vk::Semaphore, _timeout: u64) -> GfxResult<bool> {
        let nth = self.acquire_semaphores.len();
        self.acquire_semaphores.push(signal_semaphore);
        if self.out_of_date_acquires.front() == Some(&nth) {
            self.out_of_date_acquires.pop_front();
            log::warn!("mock presenter: acquire #{nth} out of date");
            return Ok(true);
        }

        self.image_index = self.acquire_count % self.images.len();
        self.acquire_count += 1;
        Ok(false)
    }

    fn present_image(&mut self, wait_semaphores: &[vk::Semaphore]) -> GfxResult<bool> {
        let nth = self.present_waits.len();
        self.present_waits.push(wait_semaphores.to_vec());
        if self.out_of_date_presents.front() == Some(&nth) {
            self.out_of_date_presents.pop_front();
            log::warn!("mock presenter: present #{nth} out of date");
            return Ok(true);
        }
        Ok(false)
    }

    fn current_image_index(&self) -> usize {
        self.image_index
    }

    fn image_count(&self) -> usize {
        self.images.len()
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        self.format
    }

    fn images(&self) -> &[vk::Image] {
        &self.images
    }

    fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_index_cycles() {
        let mut presenter = MockPresenter::new(3, vk::Extent2D { width: 4, height: 4 }, vk::Format::B8G8R8A8_SRGB);
        presenter.out_of_date_on_acquire(1);

        let mut indices = Vec::new();
        for _ in 0..5 {
            if !presenter.acquire_next_image(vk::Semaphore::null(), u64::MAX).unwrap() {
                indices.push(presenter.current_image_index());
            }
        }
        assert_eq!(indices, vec![0, 1, 2, 0]);
        assert_eq!(presenter.acquire_semaphores().len(), 5);
    }
}
