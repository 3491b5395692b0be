//! 不依赖 GPU 的 [`GfxDevice`](crate::foundation::device::GfxDevice) 与
//! [`GfxPresenter`](crate::swapchain::presenter::GfxPresenter) 实现
//!
//! 记录所有调用并模拟 command buffer、fence 的状态机，违反同步规则时直接 panic。

pub mod device;
pub mod presenter;
