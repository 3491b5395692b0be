use prism_gfx::GfxError;
use prism_gfx::foundation::device::GfxQueueType;

use crate::render_graph::{FramebufferHandle, RendererHandle};

/// render graph 层的错误类型
///
/// GFX 层的错误通过 `#[from]` 原样向上传递。
#[derive(Debug, thiserror::Error)]
pub enum RenderGraphError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error("renderer {0:?} does not exist in the render graph")]
    UnknownRenderer(RendererHandle),

    #[error("framebuffer {0:?} does not exist in the render graph")]
    UnknownFramebuffer(FramebufferHandle),

    #[error("render graph contains a cycle involving renderer `{name}`")]
    Cycle { name: String },

    #[error("render graph is not compiled, call compile() after changing predecessors")]
    NotCompiled,

    #[error("no frame in progress, call start_frame() first")]
    FrameNotStarted,

    #[error("frame is already in progress, call end_frame() first")]
    FrameAlreadyStarted,

    #[error("renderer `{name}` did not start the current frame")]
    NotFrameRoot { name: String },

    #[error("graphics renderer `{name}` has no framebuffer")]
    MissingFramebuffer { name: String },

    #[error("drawer `{drawer}` has no shading rate image for frame {frame}")]
    MissingShadingRateImage { drawer: &'static str, frame: usize },

    #[error("drawer `{drawer}` has no blit image for frame {frame}")]
    MissingBlitImage { drawer: &'static str, frame: usize },

    #[error("{drawer} drawer can not run on {kind} renderer `{name}`")]
    DrawerMismatch {
        drawer: &'static str,
        kind: &'static str,
        name: String,
    },

    #[error("resource bundle `{name}` must be allocated before it is handed to a drawer")]
    BundleNotAllocated { name: String },

    #[error("bundle sets must contain at least one descriptor set")]
    EmptyBundleSets,

    #[error("eye tracked drawer has not been precomputed")]
    NotPrecomputed,

    #[error("eye tracked precompute dispatches compute work, single time commands must use the graphics queue, not {queue:?}")]
    PrecomputeQueue { queue: GfxQueueType },

    #[error("precomputed shading rate image must be {expected:?}, got {actual:?}")]
    PrecomputedExtent { expected: [u32; 2], actual: [u32; 2] },

    #[error("invalid render graph settings: {0}")]
    InvalidSettings(String),
}

pub type RenderGraphResult<T> = Result<T, RenderGraphError>;
