use std::collections::BTreeMap;

use ash::vk;

use crate::descriptors::descriptor_write::{GfxDescriptorResource, GfxDescriptorWrite};
use crate::descriptors::resource_bundle_layout::GfxBindingDesc;
use crate::error::{GfxError, GfxResult};

/// 一组 shader 可见的资源绑定，对应一个（static）或每帧一个（dynamic）descriptor set
///
/// 只能通过 [`GfxResourceBundleGroup::create_resource_bundle`] 创建；
/// 创建后可以暂存若干写入，在 group 分配 descriptor set 时统一写入。
///
/// [`GfxResourceBundleGroup::create_resource_bundle`]: crate::descriptors::resource_bundle_group::GfxResourceBundleGroup::create_resource_bundle
#[derive(Debug)]
pub struct GfxResourceBundle {
    group_id: u64,
    debug_name: String,

    layout: vk::DescriptorSetLayout,
    bindings: Vec<GfxBindingDesc>,

    dynamic: bool,
    /// static 为 1，dynamic 为 frames in flight
    instance_count: usize,

    /// 分配之前为空
    descriptor_sets: Vec<vk::DescriptorSet>,

    /// 每个实例暂存的写入，key 为 (binding, array element)
    staged_writes: Vec<BTreeMap<(u32, u32), GfxDescriptorResource>>,
}

// init
impl GfxResourceBundle {
    pub(crate) fn new(
        group_id: u64,
        debug_name: String,
        layout: vk::DescriptorSetLayout,
        bindings: Vec<GfxBindingDesc>,
        dynamic: bool,
        instance_count: usize,
    ) -> Self {
        Self {
            group_id,
            debug_name,
            layout,
            bindings,
            dynamic,
            instance_count,
            descriptor_sets: Vec::new(),
            staged_writes: (0..instance_count).map(|_| BTreeMap::new()).collect(),
        }
    }
}

// getters
impl GfxResourceBundle {
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        !self.descriptor_sets.is_empty()
    }

    #[inline]
    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    #[inline]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn bindings(&self) -> &[GfxBindingDesc] {
        &self.bindings
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    #[inline]
    pub(crate) fn group_id(&self) -> u64 {
        self.group_id
    }

    /// 所有 descriptor set，未分配时为空
    #[inline]
    pub fn descriptor_sets(&self) -> &[vk::DescriptorSet] {
        &self.descriptor_sets
    }

    /// dynamic bundle 返回 `frame_index` 对应的 set，static bundle 总是返回唯一的 set
    pub fn descriptor_set(&self, frame_index: usize) -> GfxResult<vk::DescriptorSet> {
        if !self.is_allocated() {
            return Err(GfxError::BundleNotAllocated);
        }
        if !self.dynamic {
            return Ok(self.descriptor_sets[0]);
        }
        self.descriptor_sets.get(frame_index).copied().ok_or(GfxError::FrameIndexOutOfRange {
            index: frame_index,
            count: self.descriptor_sets.len(),
        })
    }
}

// 暂存写入
impl GfxResourceBundle {
    /// 所有实例共享同一个 image
    pub fn add_image_resource(&mut self, binding: u32, array_element: u32, image_info: vk::DescriptorImageInfo) -> GfxResult<()> {
        self.check_element(binding, array_element)?;
        for writes in &mut self.staged_writes {
            writes.insert((binding, array_element), GfxDescriptorResource::Images(vec![image_info]));
        }
        Ok(())
    }

    /// 每帧一个 image，`image_infos` 的数量必须等于 frames in flight
    pub fn add_dynamic_image_resource(
        &mut self,
        binding: u32,
        array_element: u32,
        image_infos: &[vk::DescriptorImageInfo],
    ) -> GfxResult<()> {
        self.check_dynamic(binding, array_element, image_infos.len())?;
        for (writes, info) in self.staged_writes.iter_mut().zip(image_infos) {
            writes.insert((binding, array_element), GfxDescriptorResource::Images(vec![*info]));
        }
        Ok(())
    }

    /// 所有实例共享同一个 buffer
    pub fn add_buffer_resource(&mut self, binding: u32, array_element: u32, buffer_info: vk::DescriptorBufferInfo) -> GfxResult<()> {
        self.check_element(binding, array_element)?;
        for writes in &mut self.staged_writes {
            writes.insert((binding, array_element), GfxDescriptorResource::Buffers(vec![buffer_info]));
        }
        Ok(())
    }

    /// 每帧一个 buffer，`buffer_infos` 的数量必须等于 frames in flight
    pub fn add_dynamic_buffer_resource(
        &mut self,
        binding: u32,
        array_element: u32,
        buffer_infos: &[vk::DescriptorBufferInfo],
    ) -> GfxResult<()> {
        self.check_dynamic(binding, array_element, buffer_infos.len())?;
        for (writes, info) in self.staged_writes.iter_mut().zip(buffer_infos) {
            writes.insert((binding, array_element), GfxDescriptorResource::Buffers(vec![*info]));
        }
        Ok(())
    }

    fn descriptor_type(&self, binding: u32) -> GfxResult<vk::DescriptorType> {
        self.bindings
            .iter()
            .find(|b| b.binding == binding)
            .map(|b| b.descriptor_type)
            .ok_or(GfxError::UnknownBinding { binding })
    }

    /// `array_element` 必须小于 binding 的 descriptor count
    fn check_element(&self, binding: u32, array_element: u32) -> GfxResult<()> {
        let desc = self.bindings.iter().find(|b| b.binding == binding).ok_or(GfxError::UnknownBinding { binding })?;
        if array_element >= desc.descriptor_count {
            return Err(GfxError::ArrayElementOutOfRange {
                binding,
                array_element,
                count: desc.descriptor_count,
            });
        }
        Ok(())
    }

    fn check_dynamic(&self, binding: u32, array_element: u32, count: usize) -> GfxResult<()> {
        if !self.dynamic {
            return Err(GfxError::StaticBundle);
        }
        if count != self.instance_count {
            return Err(GfxError::DynamicResourceCount {
                expected: self.instance_count,
                actual: count,
            });
        }
        self.check_element(binding, array_element)
    }
}

// 分配与写入，由 group 调用
impl GfxResourceBundle {
    pub(crate) fn set_descriptor_sets(&mut self, descriptor_sets: Vec<vk::DescriptorSet>) {
        debug_assert_eq!(descriptor_sets.len(), self.instance_count);
        self.descriptor_sets = descriptor_sets;
    }

    /// 把所有暂存的写入展开为针对各个 set 的 write
    pub(crate) fn pending_writes(&self) -> GfxResult<Vec<GfxDescriptorWrite>> {
        let mut writes = Vec::new();
        for (set, staged) in self.descriptor_sets.iter().zip(&self.staged_writes) {
            for ((binding, array_element), resource) in staged {
                writes.push(GfxDescriptorWrite {
                    dst_set: *set,
                    dst_binding: *binding,
                    dst_array_element: *array_element,
                    descriptor_type: self.descriptor_type(*binding)?,
                    resource: resource.clone(),
                });
            }
        }
        Ok(writes)
    }
}
