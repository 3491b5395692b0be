//! render graph 执行核心
//!
//! 在 [`prism_gfx`] 之上组织每帧的录制与提交：
//! - [`render_graph::RenderGraph`]：renderer 节点、依赖关系、frame slot 的同步与 present
//! - [`drawer::Drawer`]：录制单个 pass 的 secondary command buffer，包括普通绘制以及几种 variable rate shading 的 pass
//! - [`settings::RenderGraphSettings`]：frames in flight、超时与 clear 值等配置，可以从 TOML 加载
//!
//! 所有对象都显式持有 `Rc<dyn GfxDevice>`，需要应用在 device idle 之后手动 destroy。

pub mod drawer;
pub mod error;
pub mod frame_counter;
pub mod render_graph;
pub mod render_object;
pub mod settings;

pub use drawer::Drawer;
pub use error::{RenderGraphError, RenderGraphResult};
pub use render_graph::{FrameStatus, FramebufferHandle, RenderGraph, RendererHandle};
pub use render_object::GfxRenderObject;
pub use settings::RenderGraphSettings;
