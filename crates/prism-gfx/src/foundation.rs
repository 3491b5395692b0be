pub mod device;
pub mod vk_device;
