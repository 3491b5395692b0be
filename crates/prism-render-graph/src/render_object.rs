use ash::vk;
use prism_gfx::GfxError;
use prism_gfx::descriptors::resource_bundle::GfxResourceBundle;

use crate::error::{RenderGraphError, RenderGraphResult};

/// 一个可绘制物体在录制时需要的全部句柄
///
/// 顶点/索引 buffer 与 descriptor set 由应用创建和持有。
#[derive(Clone, Debug)]
pub struct GfxRenderObject {
    pub first_vertex_binding: u32,
    /// (buffer, offset)
    pub vertex_buffers: Vec<(vk::Buffer, vk::DeviceSize)>,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,

    /// 每个 bundle 对应一个或每帧一个 descriptor set，绑定在 drawer 的全局 set 之后
    pub bundle_sets: Vec<BundleSets>,

    /// 以 VERTEX stage 推送
    pub push_constants: Vec<u8>,
}

impl GfxRenderObject {
    pub fn new(vertex_buffer: vk::Buffer, index_buffer: vk::Buffer, index_count: u32) -> Self {
        Self {
            first_vertex_binding: 0,
            vertex_buffers: vec![(vertex_buffer, 0)],
            index_buffer,
            index_count,
            bundle_sets: Vec::new(),
            push_constants: Vec::new(),
        }
    }

    /// builder
    pub fn with_bundles(mut self, bundles: &[&GfxResourceBundle]) -> RenderGraphResult<Self> {
        self.bundle_sets = BundleSets::from_bundles(bundles)?;
        Ok(self)
    }

    /// builder
    pub fn with_push_constants<T: bytemuck::Pod>(mut self, data: &T) -> Self {
        self.push_constants = bytemuck::bytes_of(data).to_vec();
        self
    }

    /// `frame_index` 对应的 descriptor set，按 bundle 顺序
    pub fn descriptor_sets(&self, frame_index: usize) -> RenderGraphResult<Vec<vk::DescriptorSet>> {
        self.bundle_sets.iter().map(|sets| sets.get(frame_index)).collect()
    }
}

/// 某个 [`GfxResourceBundle`] 已分配的 descriptor set 快照
///
/// drawer 和 render object 只保存句柄，不持有 bundle 本身。
#[derive(Clone, Debug)]
pub struct BundleSets {
    dynamic: bool,
    sets: Vec<vk::DescriptorSet>,
}

impl BundleSets {
    pub fn from_bundle(bundle: &GfxResourceBundle) -> RenderGraphResult<Self> {
        if !bundle.is_allocated() {
            return Err(RenderGraphError::BundleNotAllocated {
                name: bundle.debug_name().to_string(),
            });
        }
        Ok(Self {
            dynamic: bundle.is_dynamic(),
            sets: bundle.descriptor_sets().to_vec(),
        })
    }

    pub fn from_bundles(bundles: &[&GfxResourceBundle]) -> RenderGraphResult<Vec<Self>> {
        bundles.iter().map(|bundle| Self::from_bundle(bundle)).collect()
    }

    /// 包装在 bundle 之外分配的 descriptor set，`sets` 不能为空
    pub fn from_raw(dynamic: bool, sets: Vec<vk::DescriptorSet>) -> RenderGraphResult<Self> {
        if sets.is_empty() {
            return Err(RenderGraphError::EmptyBundleSets);
        }
        Ok(Self { dynamic, sets })
    }

    /// dynamic 返回 `frame_index` 对应的 set，static 总是返回唯一的 set
    pub fn get(&self, frame_index: usize) -> RenderGraphResult<vk::DescriptorSet> {
        if !self.dynamic {
            return Ok(self.sets[0]);
        }
        let set = self.sets.get(frame_index).copied().ok_or(GfxError::FrameIndexOutOfRange {
            index: frame_index,
            count: self.sets.len(),
        })?;
        Ok(set)
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }
}
