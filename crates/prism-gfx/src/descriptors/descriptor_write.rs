use ash::vk;

/// 写入 descriptor 的资源
#[derive(Clone, Debug)]
pub enum GfxDescriptorResource {
    Images(Vec<vk::DescriptorImageInfo>),
    Buffers(Vec<vk::DescriptorBufferInfo>),
}

impl GfxDescriptorResource {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Self::Images(infos) => infos.len(),
            Self::Buffers(infos) => infos.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 自持有数据的 `vk::WriteDescriptorSet`，不包含任何裸指针
#[derive(Clone, Debug)]
pub struct GfxDescriptorWrite {
    pub dst_set: vk::DescriptorSet,
    pub dst_binding: u32,
    pub dst_array_element: u32,
    pub descriptor_type: vk::DescriptorType,
    pub resource: GfxDescriptorResource,
}

impl GfxDescriptorWrite {
    /// 生成引用 `self` 内部数据的 vulkan write
    pub fn vk_write(&self) -> vk::WriteDescriptorSet<'_> {
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.dst_set)
            .dst_binding(self.dst_binding)
            .dst_array_element(self.dst_array_element)
            .descriptor_type(self.descriptor_type);
        match &self.resource {
            GfxDescriptorResource::Images(infos) => write.image_info(infos),
            GfxDescriptorResource::Buffers(infos) => write.buffer_info(infos),
        }
    }
}
