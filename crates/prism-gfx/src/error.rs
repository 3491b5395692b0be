use ash::vk;

/// GFX 层的错误类型
///
/// Vulkan 调用失败统一包装为 [`GfxError::Vk`]；其余变体是使用方式上的错误，
/// 在 setup 阶段尽早暴露。
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("vulkan call `{call}` failed: {result:?}")]
    Vk { call: &'static str, result: vk::Result },

    #[error("resource bundle layout is already baked, binding {binding} can not be added")]
    LayoutAlreadyBaked { binding: u32 },

    #[error("resource bundle layout is not baked yet")]
    LayoutNotBaked,

    #[error("array element {array_element} of binding {binding} is out of range, descriptor count: {count}")]
    ArrayElementOutOfRange { binding: u32, array_element: u32, count: u32 },

    #[error("binding {binding} is not declared in the resource bundle layout")]
    UnknownBinding { binding: u32 },

    #[error("resource bundle group `{group}` is already baked, no more bundles can be registered")]
    GroupAlreadyBaked { group: String },

    #[error("dynamic resource requires {expected} instances (one per frame in flight), got {actual}")]
    DynamicResourceCount { expected: usize, actual: usize },

    #[error("dynamic resource can not be added to a static resource bundle")]
    StaticBundle,

    #[error("resource bundle was created by group `{owner}`, not by `{group}`")]
    ForeignBundle { owner: String, group: String },

    #[error("resource bundle is already allocated")]
    BundleAlreadyAllocated,

    #[error("resource bundle is not allocated yet")]
    BundleNotAllocated,

    #[error("frame index {index} is out of range, frames in flight: {count}")]
    FrameIndexOutOfRange { index: usize, count: usize },

    #[error("command buffer {0:?} is not in the recorded list of the current frame slot")]
    CommandBufferNotRecorded(vk::CommandBuffer),

    #[error("attachment expects {expected} image views, got {actual}")]
    AttachmentCount { expected: usize, actual: usize },

    #[error("render pass has {colors} color attachments but {resolves} resolve attachments")]
    ResolveMismatch { colors: usize, resolves: usize },

    #[error("framebuffer is not baked yet")]
    FramebufferNotBaked,

    #[error("framebuffer is already baked")]
    FramebufferAlreadyBaked,

    #[error("image index {index} is out of range, framebuffer count: {count}")]
    ImageIndexOutOfRange { index: usize, count: usize },
}

pub type GfxResult<T> = Result<T, GfxError>;

/// 为 ash 返回的 `VkResult` 附加调用名
pub trait VkResultExt<T> {
    fn vk_call(self, call: &'static str) -> GfxResult<T>;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    #[inline]
    fn vk_call(self, call: &'static str) -> GfxResult<T> {
        self.map_err(|result| GfxError::Vk { call, result })
    }
}
