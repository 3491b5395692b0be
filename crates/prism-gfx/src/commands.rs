pub mod barrier;
pub mod command_buffer;
pub mod command_buffer_manager;
pub mod fence;
pub mod semaphore;
pub mod submit_info;
