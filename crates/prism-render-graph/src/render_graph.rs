//! render graph：renderer 节点、依赖关系与逐帧的录制、提交和呈现
//!
//! 每帧的流程：
//! 1. `start_frame(root)`：等待 slot fence，acquire swapchain image，开始 frame primary
//! 2. 按依赖顺序对各个节点调用 `render(node, objects, drawer)`
//! 3. `end_frame(root)`：嵌入剩余的节点，提交并 present
//!
//! 节点在 `render` 时先把所有祖先的 secondary buffer 嵌入 frame primary，
//! 因此同一帧内 predecessor 的命令总是排在自己之前。

pub mod dependency_graph;
pub mod renderer;

use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use prism_gfx::GfxResult;
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::commands::command_buffer_manager::GfxCommandBufferManager;
use prism_gfx::commands::submit_info::GfxSubmitBatch;
use prism_gfx::foundation::device::{GfxDevice, GfxQueueType};
use prism_gfx::framebuffer::{GfxAttachmentOps, GfxFramebuffer};
use prism_gfx::resources::GfxImageRef;
use prism_gfx::swapchain::presenter::GfxPresenter;
use slotmap::SlotMap;

use crate::drawer::{DrawContext, DrawTarget, Drawer};
use crate::error::{RenderGraphError, RenderGraphResult};
use crate::frame_counter::FrameCounter;
use crate::render_graph::dependency_graph::DependencyGraph;
use crate::render_graph::renderer::Renderer;
use crate::render_object::GfxRenderObject;
use crate::settings::RenderGraphSettings;

slotmap::new_key_type! {
    /// [`Renderer`] 在 render graph 中的句柄
    pub struct RendererHandle;
    /// [`GfxFramebuffer`] 在 render graph 中的句柄
    pub struct FramebufferHandle;
}

/// `start_frame` / `end_frame` 的结果
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ready,
    /// swapchain out of date 或 suboptimal，应用需要重建 swapchain、framebuffer 与 render graph
    NeedRecreate,
}

/// 正在进行中的一帧
struct FrameState {
    root: RendererHandle,
    image_index: usize,
    /// root 的 image available semaphore 还没有被任何提交等待
    image_available_pending: bool,
    /// 嵌入 secondary buffer 的 primary，手动提交之后会重新开始一个
    primary: Option<GfxCommandBuffer>,
    /// root 的 render finished semaphore 已经在手动提交中 signal
    root_signaled: bool,
    /// 上一次提交之后嵌入 primary 的节点，提交时等待它们的 wait semaphore
    embedded: Vec<RendererHandle>,
}

/// # Destroy
/// 需要手动 destroy，其中的 fence、semaphore、framebuffer 与 command buffer manager 都会检查是否已经销毁
pub struct RenderGraph {
    device: Rc<dyn GfxDevice>,
    settings: RenderGraphSettings,
    manager: GfxCommandBufferManager,

    renderers: SlotMap<RendererHandle, Renderer>,
    /// 添加顺序，销毁时使用
    renderer_order: Vec<RendererHandle>,
    framebuffers: SlotMap<FramebufferHandle, GfxFramebuffer>,

    /// compile 之后的执行顺序，修改依赖关系后失效
    execution_order: Option<Vec<RendererHandle>>,

    frame_counter: FrameCounter,
    frame: Option<FrameState>,
}

// new & destroy
impl RenderGraph {
    pub fn new(device: Rc<dyn GfxDevice>, settings: RenderGraphSettings) -> RenderGraphResult<Self> {
        settings.validate()?;
        let manager = GfxCommandBufferManager::new(device.clone(), settings.frames_in_flight)?;
        let frame_counter = FrameCounter::new(0, settings.frames_in_flight);

        log::info!("render graph created, frames in flight: {}", settings.frames_in_flight);

        Ok(Self {
            device,
            settings,
            manager,
            renderers: SlotMap::with_key(),
            renderer_order: Vec::new(),
            framebuffers: SlotMap::with_key(),
            execution_order: None,
            frame_counter,
            frame: None,
        })
    }

    /// 等待 device idle，然后依次销毁：renderer 的同步对象（按添加顺序）、framebuffer、command buffer manager
    pub fn destroy(mut self) {
        if let Err(e) = self.device.device_wait_idle() {
            log::error!("device wait idle failed before destroying render graph: {}", e);
        }

        for handle in self.renderer_order.drain(..) {
            if let Some(renderer) = self.renderers.remove(handle) {
                renderer.destroy();
            }
        }
        for (_, framebuffer) in self.framebuffers.drain() {
            framebuffer.destroy();
        }
        self.manager.destroy();

        log::info!("render graph destroyed");
    }
}

// graph 构建
impl RenderGraph {
    pub fn add_renderer(&mut self, name: &str, is_compute: bool) -> RenderGraphResult<RendererHandle> {
        let renderer = Renderer::new(&self.device, name, is_compute, self.settings.frames_in_flight)?;
        let handle = self.renderers.insert(renderer);
        self.renderer_order.push(handle);
        self.execution_order = None;

        log::info!("renderer `{}` added, compute: {}", name, is_compute);
        Ok(handle)
    }

    /// `node` 依赖 `predecessors`，需要重新 compile
    pub fn add_predecessors(&mut self, node: RendererHandle, predecessors: &[RendererHandle]) -> RenderGraphResult<()> {
        for predecessor in predecessors {
            if !self.renderers.contains_key(*predecessor) {
                return Err(RenderGraphError::UnknownRenderer(*predecessor));
            }
        }
        self.renderer_mut(node)?.predecessors.extend_from_slice(predecessors);
        self.execution_order = None;
        Ok(())
    }

    pub fn add_framebuffer(&mut self, framebuffer: GfxFramebuffer) -> FramebufferHandle {
        self.framebuffers.insert(framebuffer)
    }

    /// 渲染到 swapchain image 的 framebuffer，clear 值来自 settings
    ///
    /// 给出 `msaa_color` 时渲染到它并 resolve 到 swapchain image。
    pub fn add_swapchain_framebuffer(
        &mut self,
        presenter: &dyn GfxPresenter,
        depth: Option<&GfxImageRef>,
        msaa_color: Option<&GfxImageRef>,
        name: &str,
    ) -> RenderGraphResult<FramebufferHandle> {
        let samples = msaa_color.map_or(vk::SampleCountFlags::TYPE_1, |color| color.samples);
        let mut framebuffer =
            GfxFramebuffer::new(self.device.clone(), presenter.extent(), presenter.image_count(), samples, name);

        if let Err(e) = self.attach_swapchain_targets(&mut framebuffer, presenter, depth, msaa_color) {
            framebuffer.destroy();
            return Err(e.into());
        }

        Ok(self.add_framebuffer(framebuffer))
    }

    fn attach_swapchain_targets(
        &self,
        framebuffer: &mut GfxFramebuffer,
        presenter: &dyn GfxPresenter,
        depth: Option<&GfxImageRef>,
        msaa_color: Option<&GfxImageRef>,
    ) -> GfxResult<()> {
        let color_ops =
            GfxAttachmentOps::default().layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR);
        framebuffer.add_swapchain_color_attachment(
            presenter.image_views(),
            presenter.format(),
            msaa_color,
            color_ops,
            self.settings.clear_color,
        )?;
        if let Some(depth) = depth {
            let depth_ops = GfxAttachmentOps::default()
                .layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .ops(vk::AttachmentLoadOp::CLEAR, vk::AttachmentStoreOp::DONT_CARE);
            framebuffer.set_depth_attachment(depth, depth_ops, self.settings.clear_depth, self.settings.clear_stencil)?;
        }
        framebuffer.bake()
    }

    pub fn set_framebuffer(&mut self, node: RendererHandle, framebuffer: FramebufferHandle) -> RenderGraphResult<()> {
        if !self.framebuffers.contains_key(framebuffer) {
            return Err(RenderGraphError::UnknownFramebuffer(framebuffer));
        }
        self.renderer_mut(node)?.set_framebuffer(framebuffer);
        Ok(())
    }

    /// `node` 下一次提交时额外等待 `semaphore`
    pub fn add_wait_semaphore(&mut self, node: RendererHandle, semaphore: vk::Semaphore) -> RenderGraphResult<()> {
        self.renderer_mut(node)?.wait_semaphores.push(semaphore);
        Ok(())
    }

    /// 计算执行顺序以及每个节点的祖先
    ///
    /// 存在循环依赖时返回 [`RenderGraphError::Cycle`]，graphics 节点没有 framebuffer 时返回
    /// [`RenderGraphError::MissingFramebuffer`]。
    pub fn compile(&mut self) -> RenderGraphResult<()> {
        if self.frame.is_some() {
            return Err(RenderGraphError::FrameAlreadyStarted);
        }

        for handle in &self.renderer_order {
            let renderer = &self.renderers[*handle];
            if !renderer.is_compute() && renderer.framebuffer().is_none() {
                return Err(RenderGraphError::MissingFramebuffer {
                    name: renderer.name().to_string(),
                });
            }
        }

        let graph = DependencyGraph::build(
            self.renderer_order.iter().map(|handle| (*handle, self.renderers[*handle].predecessors.as_slice())),
        );
        let order = graph.topological_sort().map_err(|handle| RenderGraphError::Cycle {
            name: self.renderers[handle].name().to_string(),
        })?;

        for handle in &order {
            let ancestors = graph.ancestors(*handle, &order);
            self.renderers[*handle].ancestors = ancestors;
        }

        log::info!(
            "render graph compiled: {}",
            order.iter().map(|handle| self.renderers[*handle].name()).join(" -> ")
        );
        self.execution_order = Some(order);
        Ok(())
    }
}

// 逐帧操作
impl RenderGraph {
    /// 只在 root 节点上调用
    ///
    /// 等待 frame slot 的 fence，然后 acquire 下一张 swapchain image。
    /// acquire 报告需要重建时返回 [`FrameStatus::NeedRecreate`]，此时不会录制任何东西。
    pub fn start_frame(&mut self, root: RendererHandle, presenter: &mut dyn GfxPresenter) -> RenderGraphResult<FrameStatus> {
        if self.execution_order.is_none() {
            return Err(RenderGraphError::NotCompiled);
        }
        if self.frame.is_some() {
            return Err(RenderGraphError::FrameAlreadyStarted);
        }

        let frame_index = self.frame_counter.frame_index();
        let renderer = self.renderers.get(root).ok_or(RenderGraphError::UnknownRenderer(root))?;

        renderer.in_flight_fence(frame_index).wait(self.settings.fence_timeout_ns)?;

        let need_recreate = presenter
            .acquire_next_image(renderer.image_available_semaphore(frame_index), self.settings.acquire_timeout_ns)?;
        if need_recreate {
            log::warn!("{} swapchain need recreate on acquire", self.frame_counter.frame_name());
            return Ok(FrameStatus::NeedRecreate);
        }

        self.manager.set_current_slot(frame_index)?;
        self.manager.reset_command_buffers();
        let primary = self.manager.get_command_buffer(vk::CommandBufferLevel::PRIMARY, &primary_begin_info())?;

        for renderer in self.renderers.values_mut() {
            renderer.submitted = true;
            renderer.recorded_secondaries.clear();
        }

        let image_index = presenter.current_image_index();
        self.frame = Some(FrameState {
            root,
            image_index,
            image_available_pending: true,
            primary: Some(primary),
            root_signaled: false,
            embedded: Vec::new(),
        });

        log::debug!("{} frame started, image index: {}", self.frame_counter.frame_name(), image_index);
        Ok(FrameStatus::Ready)
    }

    /// 先嵌入所有祖先，再用 `drawer` 录制 `node` 的 secondary buffer
    pub fn render(&mut self, node: RendererHandle, objects: &[GfxRenderObject], drawer: &Drawer) -> RenderGraphResult<()> {
        if self.execution_order.is_none() {
            return Err(RenderGraphError::NotCompiled);
        }
        let image_index = self.frame.as_ref().ok_or(RenderGraphError::FrameNotStarted)?.image_index;

        let renderer = self.renderers.get(node).ok_or(RenderGraphError::UnknownRenderer(node))?;
        if drawer.is_compute() != renderer.is_compute() {
            return Err(RenderGraphError::DrawerMismatch {
                drawer: drawer.name(),
                kind: if renderer.is_compute() { "compute" } else { "graphics" },
                name: renderer.name().to_string(),
            });
        }

        let target = if renderer.is_compute() { None } else { Some(self.draw_target(renderer, image_index)?) };

        for ancestor in renderer.ancestors.clone() {
            self.record_primary_command_buffer(ancestor)?;
        }

        let mut ctx = DrawContext {
            manager: &mut self.manager,
            frame_index: self.frame_counter.frame_index(),
            target,
            workgroup_size: self.settings.shading_rate_workgroup_size,
        };
        let cmd = drawer.draw(&mut ctx, objects)?;

        let renderer = self.renderer_mut(node)?;
        renderer.recorded_secondaries.push(cmd.vk_handle());
        renderer.submitted = false;
        Ok(())
    }

    /// 把 `node` 本帧录制的 secondary buffer 嵌入 frame primary
    ///
    /// 同一帧内重复调用不会重复嵌入。
    pub fn record_primary_command_buffer(&mut self, node: RendererHandle) -> RenderGraphResult<()> {
        let frame = self.frame.as_mut().ok_or(RenderGraphError::FrameNotStarted)?;
        let renderer = self.renderers.get_mut(node).ok_or(RenderGraphError::UnknownRenderer(node))?;
        if renderer.submitted {
            return Ok(());
        }

        let secondaries = std::mem::take(&mut renderer.recorded_secondaries);
        self.manager.end_command_buffers(vk::CommandBufferLevel::SECONDARY, &secondaries)?;

        let primary = match &frame.primary {
            Some(primary) => primary.clone(),
            None => {
                let primary = self.manager.get_command_buffer(vk::CommandBufferLevel::PRIMARY, &primary_begin_info())?;
                frame.primary = Some(primary.clone());
                primary
            }
        };

        let render_pass = if renderer.is_compute() {
            None
        } else {
            let handle = renderer.framebuffer().ok_or_else(|| RenderGraphError::MissingFramebuffer {
                name: renderer.name().to_string(),
            })?;
            let framebuffer = self.framebuffers.get(handle).ok_or(RenderGraphError::UnknownFramebuffer(handle))?;
            Some((
                framebuffer.render_pass()?,
                framebuffer.framebuffer(frame.image_index)?,
                framebuffer.extent(),
                framebuffer.vk_clear_values(),
            ))
        };

        if let Some((render_pass, vk_framebuffer, extent, clear_values)) = &render_pass {
            let begin_info = vk::RenderPassBeginInfo::default()
                .render_pass(*render_pass)
                .framebuffer(*vk_framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent: *extent,
                })
                .clear_values(clear_values);
            primary.cmd_begin_render_pass(&begin_info, vk::SubpassContents::SECONDARY_COMMAND_BUFFERS);
        }
        if !secondaries.is_empty() {
            primary.cmd_execute_commands(&secondaries);
        }
        if render_pass.is_some() {
            primary.cmd_end_render_pass();
        }

        renderer.submitted = true;
        frame.embedded.push(node);
        log::trace!("renderer `{}` embedded {} secondary buffers", renderer.name(), secondaries.len());
        Ok(())
    }

    /// 立即提交 `node` 以及之前嵌入的所有命令，signal `node` 的 render finished semaphore
    ///
    /// 不携带 fence；本帧的 fence 由 `end_frame` 的最后一次提交携带，队列顺序保证它覆盖之前的提交。
    pub fn submit_render(&mut self, node: RendererHandle) -> RenderGraphResult<()> {
        self.record_primary_command_buffer(node)?;
        let signal = self.renderer(node)?.render_finished_semaphore(self.frame_counter.frame_index());
        self.submit(node, Some(signal), vk::Fence::null())?;

        if let Some(frame) = self.frame.as_mut() {
            if frame.root == node {
                frame.root_signaled = true;
            }
        }
        Ok(())
    }

    /// 只在 root 节点上调用
    ///
    /// 嵌入尚未嵌入的节点，携带 slot fence 提交，然后等待 root 的 render finished semaphore 进行 present。
    /// present 报告需要重建时仍然会前进到下一帧，并返回 [`FrameStatus::NeedRecreate`]。
    pub fn end_frame(&mut self, root: RendererHandle, presenter: &mut dyn GfxPresenter) -> RenderGraphResult<FrameStatus> {
        let frame = self.frame.as_ref().ok_or(RenderGraphError::FrameNotStarted)?;
        if frame.root != root {
            return Err(RenderGraphError::NotFrameRoot {
                name: self.renderer(root)?.name().to_string(),
            });
        }
        let root_signaled = frame.root_signaled;

        let order = self.execution_order.clone().ok_or(RenderGraphError::NotCompiled)?;
        for handle in order {
            self.record_primary_command_buffer(handle)?;
        }

        let frame_index = self.frame_counter.frame_index();
        let root_renderer = self.renderer(root)?;
        let render_finished = root_renderer.render_finished_semaphore(frame_index);
        let fence = root_renderer.in_flight_fence(frame_index);
        fence.reset()?;
        let fence = fence.handle();

        self.submit(root, (!root_signaled).then_some(render_finished), fence)?;

        let need_recreate = presenter.present_image(&[render_finished])?;

        log::debug!("{} frame end", self.frame_counter.frame_name());
        self.frame = None;
        self.frame_counter.next_frame();

        if need_recreate {
            log::warn!("swapchain need recreate on present");
            Ok(FrameStatus::NeedRecreate)
        } else {
            Ok(FrameStatus::Ready)
        }
    }

    /// 提交 frame primary 中已经录制的命令
    ///
    /// 等待 image available（如果还没有被等待过），以及 `node` 和上一次提交之后嵌入的所有节点的额外 semaphore，
    /// 之后清空这些节点的等待列表。
    fn submit(&mut self, node: RendererHandle, signal: Option<vk::Semaphore>, fence: vk::Fence) -> RenderGraphResult<()> {
        let frame_index = self.frame_counter.frame_index();
        let frame = self.frame.as_mut().ok_or(RenderGraphError::FrameNotStarted)?;
        let root = self.renderers.get(frame.root).ok_or(RenderGraphError::UnknownRenderer(frame.root))?;
        let image_available = root.image_available_semaphore(frame_index);
        if !self.renderers.contains_key(node) {
            return Err(RenderGraphError::UnknownRenderer(node));
        }

        let command_buffers = self.manager.get_recorded_command_buffers(vk::CommandBufferLevel::PRIMARY)?;
        frame.primary = None;

        let waiters = frame.embedded.iter().copied().chain(std::iter::once(node)).unique().collect_vec();
        let wait_semaphores = waiters
            .iter()
            .flat_map(|handle| self.renderers[*handle].wait_semaphores.iter().copied())
            .unique()
            .collect_vec();

        let stage = vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
        let mut batch = GfxSubmitBatch::new(&command_buffers);
        if frame.image_available_pending {
            batch = batch.wait(image_available, stage);
            frame.image_available_pending = false;
        }
        batch = batch.wait_all(&wait_semaphores, stage);
        if let Some(signal) = signal {
            batch = batch.signal(signal, stage);
        }

        self.device.queue_submit(GfxQueueType::Graphics, std::slice::from_ref(&batch), fence)?;

        frame.embedded.clear();
        for handle in &waiters {
            self.renderers[*handle].wait_semaphores.clear();
        }

        log::trace!(
            "renderer `{}` submitted {} primary buffers, {} wait semaphores",
            self.renderers[node].name(),
            command_buffers.len(),
            wait_semaphores.len()
        );
        Ok(())
    }

    fn draw_target(&self, renderer: &Renderer, image_index: usize) -> RenderGraphResult<DrawTarget> {
        let handle = renderer.framebuffer().ok_or_else(|| RenderGraphError::MissingFramebuffer {
            name: renderer.name().to_string(),
        })?;
        let framebuffer = self.framebuffers.get(handle).ok_or(RenderGraphError::UnknownFramebuffer(handle))?;
        Ok(DrawTarget {
            render_pass: framebuffer.render_pass()?,
            framebuffer: framebuffer.framebuffer(image_index)?,
            extent: framebuffer.extent(),
        })
    }
}

// getters
impl RenderGraph {
    pub fn renderer(&self, handle: RendererHandle) -> RenderGraphResult<&Renderer> {
        self.renderers.get(handle).ok_or(RenderGraphError::UnknownRenderer(handle))
    }

    fn renderer_mut(&mut self, handle: RendererHandle) -> RenderGraphResult<&mut Renderer> {
        self.renderers.get_mut(handle).ok_or(RenderGraphError::UnknownRenderer(handle))
    }

    #[inline]
    pub fn framebuffer(&self, handle: FramebufferHandle) -> Option<&GfxFramebuffer> {
        self.framebuffers.get(handle)
    }

    /// 当前帧 `node` 的 render finished semaphore，可以作为其它节点的 wait semaphore
    pub fn render_finished_semaphore(&self, node: RendererHandle) -> RenderGraphResult<vk::Semaphore> {
        Ok(self.renderer(node)?.render_finished_semaphore(self.frame_counter.frame_index()))
    }

    /// compile 之后的执行顺序
    #[inline]
    pub fn execution_order(&self) -> Option<&[RendererHandle]> {
        self.execution_order.as_deref()
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.execution_order.is_some()
    }

    #[inline]
    pub fn is_frame_started(&self) -> bool {
        self.frame.is_some()
    }

    #[inline]
    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    /// 当前帧使用的 frame slot
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_counter.frame_index()
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        self.frame_counter.frame_name()
    }

    #[inline]
    pub fn manager(&self) -> &GfxCommandBufferManager {
        &self.manager
    }

    /// 用于 eye tracked drawer 的预计算等单次命令
    #[inline]
    pub fn manager_mut(&mut self) -> &mut GfxCommandBufferManager {
        &mut self.manager
    }

    #[inline]
    pub fn settings(&self) -> &RenderGraphSettings {
        &self.settings
    }
}

fn primary_begin_info() -> vk::CommandBufferBeginInfo<'static> {
    vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use prism_gfx::mock::device::MockGfxDevice;

    use super::*;

    fn settings() -> RenderGraphSettings {
        RenderGraphSettings {
            frames_in_flight: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_sync_objects_named_per_frame() {
        let device = MockGfxDevice::new_rc();
        let mut graph = RenderGraph::new(device.clone(), settings()).unwrap();
        let node = graph.add_renderer("shadow", true).unwrap();

        let renderer = graph.renderer(node).unwrap();
        assert_eq!(
            device.debug_name(renderer.in_flight_fence(1).handle().as_raw()).as_deref(),
            Some("shadow-in-flight-B")
        );
        assert_eq!(
            device.debug_name(renderer.render_finished_semaphore(0).as_raw()).as_deref(),
            Some("shadow-render-finished-A")
        );
        assert!(renderer.is_submitted());

        graph.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn test_changing_predecessors_requires_compile() {
        let device = MockGfxDevice::new_rc();
        let mut graph = RenderGraph::new(device, settings()).unwrap();
        let a = graph.add_renderer("a", true).unwrap();
        let b = graph.add_renderer("b", true).unwrap();
        graph.compile().unwrap();
        assert!(graph.is_compiled());

        graph.add_predecessors(a, &[b]).unwrap();
        assert!(!graph.is_compiled());
        graph.compile().unwrap();
        assert_eq!(graph.execution_order().unwrap(), &[b, a]);
        assert_eq!(graph.renderer(a).unwrap().ancestors(), &[b]);

        graph.add_renderer("c", true).unwrap();
        assert!(!graph.is_compiled());

        graph.destroy();
    }

    #[test]
    fn test_unknown_handles_are_errors() {
        let device = MockGfxDevice::new_rc();
        let mut graph = RenderGraph::new(device.clone(), settings()).unwrap();
        let node = graph.add_renderer("a", false).unwrap();

        let mut other = RenderGraph::new(device, settings()).unwrap();
        other.add_renderer("x", false).unwrap();
        let foreign = other.add_renderer("y", false).unwrap();

        assert!(matches!(graph.add_predecessors(node, &[foreign]), Err(RenderGraphError::UnknownRenderer(_))));
        assert!(matches!(
            graph.set_framebuffer(node, FramebufferHandle::default()),
            Err(RenderGraphError::UnknownFramebuffer(_))
        ));
        assert!(matches!(graph.record_primary_command_buffer(node), Err(RenderGraphError::FrameNotStarted)));

        graph.destroy();
        other.destroy();
    }
}
