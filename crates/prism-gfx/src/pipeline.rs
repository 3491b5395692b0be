use ash::vk;

/// 由应用创建好的 pipeline 引用
///
/// shader 编译与 pipeline 创建不在本层，这里只记录录制命令时需要的句柄。
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxPipeline {
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
}

impl GfxPipeline {
    pub fn graphics(handle: vk::Pipeline, layout: vk::PipelineLayout) -> Self {
        Self {
            handle,
            layout,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        }
    }

    pub fn compute(handle: vk::Pipeline, layout: vk::PipelineLayout) -> Self {
        Self {
            handle,
            layout,
            bind_point: vk::PipelineBindPoint::COMPUTE,
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}
