//! 录制单个 pass 的 secondary command buffer
//!
//! 每种 pass 都是 [`Drawer`] 的一个变体，由 renderer 在 `render` 时调用
//! [`Drawer::draw`]，返回录制好但尚未结束的 secondary buffer。

pub mod graphics;
pub mod shading_rate;

use ash::vk;
use prism_gfx::commands::command_buffer::GfxCommandBuffer;
use prism_gfx::commands::command_buffer_manager::GfxCommandBufferManager;

pub use self::graphics::GraphicsDrawer;
pub use self::shading_rate::{
    ContentAdaptiveShadingDrawer, EyeTrackedBlitDrawer, EyeTrackedPushConstants, MasPushConstants,
    MotionAdaptiveShadingDrawer, ShadingRateBlit,
};
use crate::error::RenderGraphResult;
use crate::render_object::GfxRenderObject;

/// graphics pass 录制时继承的 render pass 与 framebuffer
#[derive(Copy, Clone, Debug)]
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
}

/// 录制一次 draw 所需的上下文，由 render graph 在 `render` 时构建
pub struct DrawContext<'a> {
    pub manager: &'a mut GfxCommandBufferManager,
    /// 当前帧的 frame slot，用于选取 dynamic 资源
    pub frame_index: usize,
    /// compute 节点为 `None`
    pub target: Option<DrawTarget>,
    pub workgroup_size: u32,
}

pub enum Drawer {
    Graphics(GraphicsDrawer),
    /// content adaptive shading
    ContentAdaptiveShading(ContentAdaptiveShadingDrawer),
    /// motion adaptive shading
    MotionAdaptiveShading(MotionAdaptiveShadingDrawer),
    EyeTrackedBlit(EyeTrackedBlitDrawer),
}

impl Drawer {
    /// 录制一个 secondary buffer 并返回，buffer 仍处于录制状态
    pub fn draw(&self, ctx: &mut DrawContext<'_>, objects: &[GfxRenderObject]) -> RenderGraphResult<GfxCommandBuffer> {
        match self {
            Drawer::Graphics(drawer) => drawer.draw(ctx, objects),
            Drawer::ContentAdaptiveShading(drawer) => drawer.draw(ctx),
            Drawer::MotionAdaptiveShading(drawer) => drawer.draw(ctx),
            Drawer::EyeTrackedBlit(drawer) => drawer.draw(ctx),
        }
    }

    /// 是否在 render pass 之外录制
    #[inline]
    pub fn is_compute(&self) -> bool {
        !matches!(self, Drawer::Graphics(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Drawer::Graphics(_) => "graphics",
            Drawer::ContentAdaptiveShading(_) => "content-adaptive-shading",
            Drawer::MotionAdaptiveShading(_) => "motion-adaptive-shading",
            Drawer::EyeTrackedBlit(_) => "eye-tracked-blit",
        }
    }
}

impl From<GraphicsDrawer> for Drawer {
    fn from(drawer: GraphicsDrawer) -> Self {
        Drawer::Graphics(drawer)
    }
}

impl From<ContentAdaptiveShadingDrawer> for Drawer {
    fn from(drawer: ContentAdaptiveShadingDrawer) -> Self {
        Drawer::ContentAdaptiveShading(drawer)
    }
}

impl From<MotionAdaptiveShadingDrawer> for Drawer {
    fn from(drawer: MotionAdaptiveShadingDrawer) -> Self {
        Drawer::MotionAdaptiveShading(drawer)
    }
}

impl From<EyeTrackedBlitDrawer> for Drawer {
    fn from(drawer: EyeTrackedBlitDrawer) -> Self {
        Drawer::EyeTrackedBlit(drawer)
    }
}
