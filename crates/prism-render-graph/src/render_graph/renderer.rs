use std::rc::Rc;

use ash::vk;
use prism_gfx::GfxResult;
use prism_gfx::commands::fence::GfxFence;
use prism_gfx::commands::semaphore::GfxSemaphore;
use prism_gfx::foundation::device::GfxDevice;

use crate::frame_counter::FrameLabel;
use crate::render_graph::{FramebufferHandle, RendererHandle};

/// render graph 中的一个节点
///
/// 每个 frame slot 持有一组同步对象：
/// - in-flight fence：创建时即 signaled，第一次 `start_frame` 不会阻塞
/// - image available：作为根节点时传给 presenter 的 acquire
/// - render finished：节点提交时 signal，其它节点或 present 可以等待
///
/// # Destroy
/// 由 [`RenderGraph::destroy`](super::RenderGraph::destroy) 在 device idle 之后统一销毁
pub struct Renderer {
    name: String,
    is_compute: bool,
    framebuffer: Option<FramebufferHandle>,

    /// 直接依赖，可能有重复，compile 时去重
    pub(crate) predecessors: Vec<RendererHandle>,
    /// compile 之后的所有祖先，按执行顺序
    pub(crate) ancestors: Vec<RendererHandle>,

    in_flight_fences: Vec<GfxFence>,
    image_available_semaphores: Vec<GfxSemaphore>,
    render_finished_semaphores: Vec<GfxSemaphore>,

    /// 本帧录制的 secondary buffer 是否已经嵌入 primary buffer
    pub(crate) submitted: bool,
    /// 下一次提交时额外等待的 semaphore，提交后清空
    pub(crate) wait_semaphores: Vec<vk::Semaphore>,
    /// 本帧录制、尚未嵌入的 secondary buffer
    pub(crate) recorded_secondaries: Vec<vk::CommandBuffer>,
}

// new & destroy
impl Renderer {
    pub(crate) fn new(device: &Rc<dyn GfxDevice>, name: &str, is_compute: bool, fif_count: usize) -> GfxResult<Self> {
        let mut in_flight_fences = Vec::with_capacity(fif_count);
        let mut image_available_semaphores = Vec::with_capacity(fif_count);
        let mut render_finished_semaphores = Vec::with_capacity(fif_count);
        for i in 0..fif_count {
            let label = FrameLabel::from_usize(i);
            in_flight_fences.push(GfxFence::new(device.clone(), true, &format!("{name}-in-flight-{label}"))?);
            image_available_semaphores
                .push(GfxSemaphore::new(device.clone(), &format!("{name}-image-available-{label}"))?);
            render_finished_semaphores
                .push(GfxSemaphore::new(device.clone(), &format!("{name}-render-finished-{label}"))?);
        }

        Ok(Self {
            name: name.to_string(),
            is_compute,
            framebuffer: None,
            predecessors: Vec::new(),
            ancestors: Vec::new(),
            in_flight_fences,
            image_available_semaphores,
            render_finished_semaphores,
            submitted: true,
            wait_semaphores: Vec::new(),
            recorded_secondaries: Vec::new(),
        })
    }

    pub(crate) fn destroy(self) {
        self.in_flight_fences.into_iter().for_each(|f| f.destroy());
        self.image_available_semaphores.into_iter().for_each(|s| s.destroy());
        self.render_finished_semaphores.into_iter().for_each(|s| s.destroy());
        log::debug!("renderer `{}` destroyed", self.name);
    }
}

// getters
impl Renderer {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_compute(&self) -> bool {
        self.is_compute
    }

    #[inline]
    pub fn framebuffer(&self) -> Option<FramebufferHandle> {
        self.framebuffer
    }

    #[inline]
    pub fn predecessors(&self) -> &[RendererHandle] {
        &self.predecessors
    }

    #[inline]
    pub fn ancestors(&self) -> &[RendererHandle] {
        &self.ancestors
    }

    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    #[inline]
    pub fn wait_semaphores(&self) -> &[vk::Semaphore] {
        &self.wait_semaphores
    }

    #[inline]
    pub fn in_flight_fence(&self, frame_index: usize) -> &GfxFence {
        &self.in_flight_fences[frame_index]
    }

    #[inline]
    pub fn image_available_semaphore(&self, frame_index: usize) -> vk::Semaphore {
        self.image_available_semaphores[frame_index].handle()
    }

    #[inline]
    pub fn render_finished_semaphore(&self, frame_index: usize) -> vk::Semaphore {
        self.render_finished_semaphores[frame_index].handle()
    }
}

// setters
impl Renderer {
    #[inline]
    pub(crate) fn set_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffer = Some(framebuffer);
    }
}
