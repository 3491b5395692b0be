use std::collections::BTreeMap;
use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;

/// layout 中单个 binding 的描述
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBindingDesc {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stages: vk::ShaderStageFlags,
}

/// descriptor set layout 的构建器
///
/// 先 [`add_binding`](Self::add_binding)，再 [`bake`](Self::bake) 创建 `vk::DescriptorSetLayout`；
/// bake 之后 binding 不可再修改。
///
/// # Destroy
/// 需要手动 destroy；通过 [`from_raw`](Self::from_raw) 包装的外部 layout 不会被销毁
pub struct GfxResourceBundleLayout {
    device: Rc<dyn GfxDevice>,
    bindings: BTreeMap<u32, GfxBindingDesc>,
    handle: vk::DescriptorSetLayout,
    /// 是否由自己创建
    owned: bool,
    debug_name: String,
}

// init & destroy
impl GfxResourceBundleLayout {
    pub fn new(device: Rc<dyn GfxDevice>, debug_name: impl Into<String>) -> Self {
        Self {
            device,
            bindings: BTreeMap::new(),
            handle: vk::DescriptorSetLayout::null(),
            owned: true,
            debug_name: debug_name.into(),
        }
    }

    /// 包装一个已经创建好的 layout，视为已 bake
    pub fn from_raw(
        device: Rc<dyn GfxDevice>,
        handle: vk::DescriptorSetLayout,
        bindings: &[GfxBindingDesc],
        debug_name: impl Into<String>,
    ) -> Self {
        Self {
            device,
            bindings: bindings.iter().map(|b| (b.binding, *b)).collect(),
            handle,
            owned: false,
            debug_name: debug_name.into(),
        }
    }

    pub fn destroy(mut self) {
        if self.owned && self.is_baked() {
            self.device.destroy_descriptor_set_layout(self.handle);
        }
        self.handle = vk::DescriptorSetLayout::null();
        self.owned = false;
    }
}

impl Drop for GfxResourceBundleLayout {
    fn drop(&mut self) {
        debug_assert!(!(self.owned && self.is_baked()), "GfxResourceBundleLayout `{}` dropped without destroy", self.debug_name);
    }
}

// builder
impl GfxResourceBundleLayout {
    /// 同一个 binding 重复添加时，后者覆盖前者
    pub fn add_binding(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
        descriptor_count: u32,
    ) -> GfxResult<()> {
        if self.is_baked() {
            return Err(GfxError::LayoutAlreadyBaked { binding });
        }

        let desc = GfxBindingDesc {
            binding,
            descriptor_type,
            descriptor_count,
            stages,
        };
        if let Some(old) = self.bindings.insert(binding, desc) {
            log::warn!("layout `{}`: binding {} redefined, {:?} -> {:?}", self.debug_name, binding, old, desc);
        }
        Ok(())
    }

    /// 创建 `vk::DescriptorSetLayout`，重复 bake 不做任何事
    pub fn bake(&mut self) -> GfxResult<()> {
        if self.is_baked() {
            return Ok(());
        }

        let vk_bindings = self
            .bindings
            .values()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.descriptor_count)
                    .stage_flags(b.stages)
            })
            .collect_vec();
        self.handle = self.device.create_descriptor_set_layout(&vk_bindings)?;

        use ash::vk::Handle;
        self.device.set_debug_name(vk::ObjectType::DESCRIPTOR_SET_LAYOUT, self.handle.as_raw(), &self.debug_name);
        log::info!("layout `{}` baked with {} bindings", self.debug_name, self.bindings.len());
        Ok(())
    }
}

// getters
impl GfxResourceBundleLayout {
    #[inline]
    pub fn is_baked(&self) -> bool {
        self.handle != vk::DescriptorSetLayout::null()
    }

    #[inline]
    pub fn handle(&self) -> GfxResult<vk::DescriptorSetLayout> {
        if self.is_baked() { Ok(self.handle) } else { Err(GfxError::LayoutNotBaked) }
    }

    #[inline]
    pub fn binding(&self, binding: u32) -> Option<&GfxBindingDesc> {
        self.bindings.get(&binding)
    }

    /// 按 binding 升序
    #[inline]
    pub fn bindings(&self) -> impl Iterator<Item = &GfxBindingDesc> {
        self.bindings.values()
    }

    #[inline]
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::device::MockGfxDevice;

    #[test]
    fn test_add_binding_after_bake_fails() {
        let device = MockGfxDevice::new_rc();
        let mut layout = GfxResourceBundleLayout::new(device.clone(), "camera");
        layout
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 1)
            .unwrap();
        assert!(matches!(layout.handle(), Err(GfxError::LayoutNotBaked)));

        layout.bake().unwrap();
        let handle = layout.handle().unwrap();
        assert_eq!(device.layout_bindings(handle).len(), 1);

        let err = layout
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT, 1)
            .unwrap_err();
        assert!(matches!(err, GfxError::LayoutAlreadyBaked { binding: 1 }));

        // 重复 bake 不会创建新的 layout
        layout.bake().unwrap();
        assert_eq!(layout.handle().unwrap(), handle);
        layout.destroy();
    }

    #[test]
    fn test_bindings_sorted_and_redefined() {
        let device = MockGfxDevice::new_rc();
        let mut layout = GfxResourceBundleLayout::new(device, "material");
        layout
            .add_binding(2, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::COMPUTE, 1)
            .unwrap();
        layout
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::COMPUTE, 1)
            .unwrap();
        layout
            .add_binding(2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::COMPUTE, 4)
            .unwrap();

        let bindings = layout.bindings().map(|b| (b.binding, b.descriptor_count)).collect_vec();
        assert_eq!(bindings, vec![(0, 1), (2, 4)]);
        assert_eq!(
            layout.binding(2).map(|b| b.descriptor_type),
            Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        );
        layout.destroy();
    }
}
