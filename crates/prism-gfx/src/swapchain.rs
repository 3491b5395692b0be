pub mod presenter;
pub mod render_swapchain;
