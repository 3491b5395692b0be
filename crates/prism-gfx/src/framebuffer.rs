use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;
use crate::resources::GfxImageRef;

/// attachment 的 load/store 操作与 layout
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxAttachmentOps {
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl Default for GfxAttachmentOps {
    fn default() -> Self {
        Self {
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }
}

impl GfxAttachmentOps {
    /// builder
    #[inline]
    pub fn layouts(mut self, initial_layout: vk::ImageLayout, final_layout: vk::ImageLayout) -> Self {
        self.initial_layout = initial_layout;
        self.final_layout = final_layout;
        self
    }

    /// builder
    #[inline]
    pub fn ops(mut self, load_op: vk::AttachmentLoadOp, store_op: vk::AttachmentStoreOp) -> Self {
        self.load_op = load_op;
        self.store_op = store_op;
        self
    }

    fn describe(&self, format: vk::Format, samples: vk::SampleCountFlags) -> vk::AttachmentDescription {
        vk::AttachmentDescription {
            format,
            samples,
            load_op: self.load_op,
            store_op: self.store_op,
            stencil_load_op: self.stencil_load_op,
            stencil_store_op: self.stencil_store_op,
            initial_layout: self.initial_layout,
            final_layout: self.final_layout,
            ..Default::default()
        }
    }
}

/// resolve 目标只会被整体覆盖
fn resolve_description(format: vk::Format, initial_layout: vk::ImageLayout, final_layout: vk::ImageLayout) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::DONT_CARE,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout,
        final_layout,
        ..Default::default()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GfxClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl GfxClearValue {
    pub fn to_vk(self) -> vk::ClearValue {
        match self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

struct ViewedAttachment {
    description: vk::AttachmentDescription,
    /// 每个 swapchain image 一个 view
    views: Vec<vk::ImageView>,
}

/// render pass + 每个 swapchain image 一个 framebuffer
///
/// attachment 顺序固定为：所有 color → depth → 所有 resolve；
/// clear value 顺序为：所有 color → depth，与 attachment 下标对应。
///
/// 只有一个 subpass。
///
/// # Destroy
/// 需要手动 destroy
pub struct GfxFramebuffer {
    device: Rc<dyn GfxDevice>,
    debug_name: String,

    extent: vk::Extent2D,
    image_count: usize,
    samples: vk::SampleCountFlags,

    colors: Vec<ViewedAttachment>,
    color_clear_values: Vec<GfxClearValue>,
    depth: Option<(ViewedAttachment, GfxClearValue)>,
    resolves: Vec<ViewedAttachment>,
    is_swapchain_framebuffer: bool,

    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
}

// init & destroy
impl GfxFramebuffer {
    /// # param
    /// * `image_count` - swapchain image 数量，决定 framebuffer 数量
    /// * `samples` - msaa 采样数，depth attachment 使用
    pub fn new(
        device: Rc<dyn GfxDevice>,
        extent: vk::Extent2D,
        image_count: usize,
        samples: vk::SampleCountFlags,
        debug_name: impl Into<String>,
    ) -> Self {
        Self {
            device,
            debug_name: debug_name.into(),
            extent,
            image_count,
            samples,
            colors: Vec::new(),
            color_clear_values: Vec::new(),
            depth: None,
            resolves: Vec::new(),
            is_swapchain_framebuffer: false,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
        }
    }

    pub fn destroy(mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.device.destroy_framebuffer(framebuffer);
        }
        if self.is_baked() {
            self.device.destroy_render_pass(self.render_pass);
            log::info!("framebuffer `{}` destroyed", self.debug_name);
        }
        self.render_pass = vk::RenderPass::null();
    }
}

impl Drop for GfxFramebuffer {
    fn drop(&mut self) {
        debug_assert!(!self.is_baked(), "GfxFramebuffer `{}` dropped without destroy", self.debug_name);
    }
}

// attachments
impl GfxFramebuffer {
    /// 所有 swapchain image 共用同一张 color image
    pub fn add_color_attachment(&mut self, image: &GfxImageRef, ops: GfxAttachmentOps, clear_color: [f32; 4]) -> GfxResult<()> {
        self.check_not_baked()?;
        self.colors.push(ViewedAttachment {
            description: ops.describe(image.format, image.samples),
            views: vec![image.view; self.image_count],
        });
        self.color_clear_values.push(GfxClearValue::Color(clear_color));
        Ok(())
    }

    /// 每个 swapchain image 一张 color image
    pub fn add_dynamic_color_attachment(
        &mut self,
        images: &[GfxImageRef],
        ops: GfxAttachmentOps,
        clear_color: [f32; 4],
    ) -> GfxResult<()> {
        self.check_not_baked()?;
        let first = self.check_image_count(images)?;
        self.colors.push(ViewedAttachment {
            description: ops.describe(first.format, first.samples),
            views: images.iter().map(|i| i.view).collect(),
        });
        self.color_clear_values.push(GfxClearValue::Color(clear_color));
        Ok(())
    }

    /// 多重采样的 color image，每个 swapchain image 一个 resolve 目标
    ///
    /// `ops` 的 layout 作用于 resolve 目标，多重采样 image 本身总是 UNDEFINED → COLOR_ATTACHMENT_OPTIMAL
    pub fn add_resolved_color_attachment(
        &mut self,
        color: &GfxImageRef,
        resolve_images: &[GfxImageRef],
        ops: GfxAttachmentOps,
        clear_color: [f32; 4],
    ) -> GfxResult<()> {
        self.check_not_baked()?;
        let first = self.check_image_count(resolve_images)?;
        let color_ops = ops.layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        self.colors.push(ViewedAttachment {
            description: color_ops.describe(color.format, color.samples),
            views: vec![color.view; self.image_count],
        });
        self.resolves.push(ViewedAttachment {
            description: resolve_description(first.format, ops.initial_layout, ops.final_layout),
            views: resolve_images.iter().map(|i| i.view).collect(),
        });
        self.color_clear_values.push(GfxClearValue::Color(clear_color));
        Ok(())
    }

    /// 直接渲染到 swapchain image；给出 `msaa_color` 时渲染到它并 resolve 到 swapchain image
    pub fn add_swapchain_color_attachment(
        &mut self,
        swapchain_views: &[vk::ImageView],
        swapchain_format: vk::Format,
        msaa_color: Option<&GfxImageRef>,
        ops: GfxAttachmentOps,
        clear_color: [f32; 4],
    ) -> GfxResult<()> {
        self.check_not_baked()?;
        if swapchain_views.len() != self.image_count {
            return Err(GfxError::AttachmentCount {
                expected: self.image_count,
                actual: swapchain_views.len(),
            });
        }

        match msaa_color {
            Some(color) => {
                let color_ops = ops.layouts(ops.initial_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
                self.colors.push(ViewedAttachment {
                    description: color_ops.describe(color.format, color.samples),
                    views: vec![color.view; self.image_count],
                });
                self.resolves.push(ViewedAttachment {
                    description: resolve_description(swapchain_format, vk::ImageLayout::UNDEFINED, ops.final_layout),
                    views: swapchain_views.to_vec(),
                });
            }
            None => {
                self.colors.push(ViewedAttachment {
                    description: ops.describe(swapchain_format, vk::SampleCountFlags::TYPE_1),
                    views: swapchain_views.to_vec(),
                });
            }
        }
        self.color_clear_values.push(GfxClearValue::Color(clear_color));
        self.is_swapchain_framebuffer = true;
        Ok(())
    }

    /// 再次调用会替换之前的 depth attachment
    pub fn set_depth_attachment(
        &mut self,
        depth: &GfxImageRef,
        ops: GfxAttachmentOps,
        clear_depth: f32,
        clear_stencil: u32,
    ) -> GfxResult<()> {
        self.check_not_baked()?;
        self.depth = Some((
            ViewedAttachment {
                description: ops.describe(depth.format, self.samples),
                views: vec![depth.view; self.image_count],
            },
            GfxClearValue::DepthStencil {
                depth: clear_depth,
                stencil: clear_stencil,
            },
        ));
        Ok(())
    }

    fn check_not_baked(&self) -> GfxResult<()> {
        if self.is_baked() { Err(GfxError::FramebufferAlreadyBaked) } else { Ok(()) }
    }

    fn check_image_count<'a>(&self, images: &'a [GfxImageRef]) -> GfxResult<&'a GfxImageRef> {
        match images.first() {
            Some(first) if images.len() == self.image_count => Ok(first),
            _ => Err(GfxError::AttachmentCount {
                expected: self.image_count,
                actual: images.len(),
            }),
        }
    }
}

// bake
impl GfxFramebuffer {
    /// 创建 render pass 以及每个 swapchain image 的 framebuffer
    pub fn bake(&mut self) -> GfxResult<()> {
        self.check_not_baked()?;

        let need_resolve = self.samples != vk::SampleCountFlags::TYPE_1 || !self.resolves.is_empty();
        if need_resolve && self.resolves.len() != self.colors.len() {
            return Err(GfxError::ResolveMismatch {
                colors: self.colors.len(),
                resolves: self.resolves.len(),
            });
        }

        let attachments = self.attachment_descriptions();
        let (color_refs, depth_ref, resolve_refs) = self.attachment_references();

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }
        if !resolve_refs.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_refs);
        }

        // 等待 swapchain 交出 image 之后才写 color attachment
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));
        self.render_pass = self.device.create_render_pass(&render_pass_info)?;

        for image_index in 0..self.image_count {
            let views = self.attachment_views(image_index);
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&views)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let framebuffer = self.device.create_framebuffer(&framebuffer_info)?;
            self.framebuffers.push(framebuffer);
        }

        log::info!(
            "framebuffer `{}` baked: {} color, depth: {}, {} resolve, {} framebuffers of {}x{}",
            self.debug_name,
            self.colors.len(),
            self.depth.is_some(),
            self.resolves.len(),
            self.framebuffers.len(),
            self.extent.width,
            self.extent.height
        );
        Ok(())
    }

    /// 按 color → depth → resolve 排列的 attachment 描述
    pub fn attachment_descriptions(&self) -> Vec<vk::AttachmentDescription> {
        self.ordered_attachments().map(|a| a.description).collect_vec()
    }

    /// 第 `image_index` 个 framebuffer 的 image views，顺序与 [`Self::attachment_descriptions`] 一致
    pub fn attachment_views(&self, image_index: usize) -> Vec<vk::ImageView> {
        self.ordered_attachments().map(|a| a.views[image_index]).collect_vec()
    }

    /// (color refs, depth ref, resolve refs)
    pub fn attachment_references(
        &self,
    ) -> (Vec<vk::AttachmentReference>, Option<vk::AttachmentReference>, Vec<vk::AttachmentReference>) {
        let color_count = self.colors.len() as u32;
        let color_refs = (0..color_count)
            .map(|i| vk::AttachmentReference {
                attachment: i,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect_vec();

        let depth_ref = self.depth.as_ref().map(|_| vk::AttachmentReference {
            attachment: color_count,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });

        let resolve_offset = color_count + depth_ref.map_or(0, |_| 1);
        let resolve_refs = (0..self.resolves.len() as u32)
            .map(|i| vk::AttachmentReference {
                attachment: resolve_offset + i,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect_vec();

        (color_refs, depth_ref, resolve_refs)
    }

    fn ordered_attachments(&self) -> impl Iterator<Item = &ViewedAttachment> {
        self.colors.iter().chain(self.depth.iter().map(|(a, _)| a)).chain(self.resolves.iter())
    }
}

// getters
impl GfxFramebuffer {
    #[inline]
    pub fn is_baked(&self) -> bool {
        self.render_pass != vk::RenderPass::null()
    }

    #[inline]
    pub fn render_pass(&self) -> GfxResult<vk::RenderPass> {
        if self.is_baked() { Ok(self.render_pass) } else { Err(GfxError::FramebufferNotBaked) }
    }

    pub fn framebuffer(&self, image_index: usize) -> GfxResult<vk::Framebuffer> {
        if !self.is_baked() {
            return Err(GfxError::FramebufferNotBaked);
        }
        self.framebuffers.get(image_index).copied().ok_or(GfxError::ImageIndexOutOfRange {
            index: image_index,
            count: self.framebuffers.len(),
        })
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    #[inline]
    pub fn is_swapchain_framebuffer(&self) -> bool {
        self.is_swapchain_framebuffer
    }

    /// 所有 color 在前，depth 在最后
    pub fn clear_values(&self) -> Vec<GfxClearValue> {
        self.color_clear_values.iter().copied().chain(self.depth.iter().map(|(_, clear)| *clear)).collect_vec()
    }

    pub fn vk_clear_values(&self) -> Vec<vk::ClearValue> {
        self.clear_values().into_iter().map(GfxClearValue::to_vk).collect_vec()
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}
