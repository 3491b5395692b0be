use ash::vk;

/// 外部创建的 image 的引用
///
/// 图片的创建、内存分配与销毁由应用负责；render graph 只在录制命令时使用这些句柄。
#[derive(Copy, Clone, Debug)]
pub struct GfxImageRef {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
}

impl GfxImageRef {
    pub fn new(image: vk::Image, view: vk::ImageView, extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            image,
            view,
            extent,
            format,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }

    /// builder
    #[inline]
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// 整张图的 blit 区域：`[0, 0, 0]` 到 `[w, h, 1]`
    #[inline]
    pub fn full_offsets(&self) -> [vk::Offset3D; 2] {
        [
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: self.extent.width as i32,
                y: self.extent.height as i32,
                z: 1,
            },
        ]
    }
}
