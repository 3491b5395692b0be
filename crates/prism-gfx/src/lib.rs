//! Vulkan GFX 层
//!
//! 提供 render graph 执行核心所依赖的 Vulkan 封装：设备上下文、命令缓冲管理、
//! 描述符资源包（resource bundle）以及 framebuffer 构建。
//!
//! 所有组件都通过构造函数显式接收 [`foundation::device::GfxDevice`] 上下文（`Rc<dyn GfxDevice>`），
//! 生命周期由上层应用负责，按照固定顺序手动 destroy。

pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod framebuffer;
pub mod pipeline;
pub mod resources;
pub mod swapchain;

#[cfg(any(test, feature = "mock-device"))]
pub mod mock;

pub use error::{GfxError, GfxResult};
