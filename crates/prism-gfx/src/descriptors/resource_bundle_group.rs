use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use itertools::Itertools;

use crate::descriptors::resource_bundle::GfxResourceBundle;
use crate::descriptors::resource_bundle_layout::GfxResourceBundleLayout;
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::GfxDevice;

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// 共享一个 descriptor pool 的一组 resource bundle
///
/// 1. [`create_resource_bundle`](Self::create_resource_bundle) 累加每种 descriptor 的需求
/// 2. 第一次 [`allocate_resource_bundle`](Self::allocate_resource_bundle) 时按累计值创建 pool（bake），之后 pool 不再改变
/// 3. bake 之后不能再注册新的 bundle
///
/// # Destroy
/// 需要手动 destroy，会销毁 pool 及其中所有 descriptor set
pub struct GfxResourceBundleGroup {
    device: Rc<dyn GfxDevice>,
    id: u64,
    name: String,
    frames_in_flight: usize,

    /// descriptor type(raw) -> 累计 descriptor 数量
    descriptor_tally: BTreeMap<i32, u32>,
    set_tally: u32,

    /// bake 之前为 null
    pool: vk::DescriptorPool,

    allocated_descriptors: BTreeMap<i32, u32>,
    allocated_sets: u32,
}

// init & destroy
impl GfxResourceBundleGroup {
    pub fn new(device: Rc<dyn GfxDevice>, name: impl Into<String>, frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "frames in flight must be positive");
        Self {
            device,
            id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            frames_in_flight,
            descriptor_tally: BTreeMap::new(),
            set_tally: 0,
            pool: vk::DescriptorPool::null(),
            allocated_descriptors: BTreeMap::new(),
            allocated_sets: 0,
        }
    }

    pub fn destroy(mut self) {
        if self.is_baked() {
            self.device.destroy_descriptor_pool(self.pool);
            log::info!("resource bundle group `{}` destroyed, {} sets released", self.name, self.allocated_sets);
        }
        self.pool = vk::DescriptorPool::null();
    }
}

impl Drop for GfxResourceBundleGroup {
    fn drop(&mut self) {
        debug_assert!(!self.is_baked(), "GfxResourceBundleGroup `{}` dropped without destroy", self.name);
    }
}

// getters
impl GfxResourceBundleGroup {
    #[inline]
    pub fn is_baked(&self) -> bool {
        self.pool != vk::DescriptorPool::null()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// 累计的某种 descriptor 需求
    #[inline]
    pub fn descriptor_tally(&self, descriptor_type: vk::DescriptorType) -> u32 {
        self.descriptor_tally.get(&descriptor_type.as_raw()).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set_tally(&self) -> u32 {
        self.set_tally
    }

    #[inline]
    pub fn allocated_descriptor_count(&self, descriptor_type: vk::DescriptorType) -> u32 {
        self.allocated_descriptors.get(&descriptor_type.as_raw()).copied().unwrap_or(0)
    }

    #[inline]
    pub fn allocated_set_count(&self) -> u32 {
        self.allocated_sets
    }
}

// bundle 的创建与分配
impl GfxResourceBundleGroup {
    /// 注册一个 bundle，把 layout 中每个 binding 的需求乘以实例数累加到 group 中
    ///
    /// 返回的 bundle 还没有 descriptor set。pool bake 之后调用会返回错误。
    pub fn create_resource_bundle(&mut self, layout: &GfxResourceBundleLayout, dynamic: bool) -> GfxResult<GfxResourceBundle> {
        if self.is_baked() {
            return Err(GfxError::GroupAlreadyBaked { group: self.name.clone() });
        }
        let layout_handle = layout.handle()?;

        let instance_count = if dynamic { self.frames_in_flight } else { 1 };
        for binding in layout.bindings() {
            *self.descriptor_tally.entry(binding.descriptor_type.as_raw()).or_default() +=
                binding.descriptor_count * instance_count as u32;
        }
        self.set_tally += instance_count as u32;

        Ok(GfxResourceBundle::new(
            self.id,
            layout.debug_name().to_string(),
            layout_handle,
            layout.bindings().copied().collect_vec(),
            dynamic,
            instance_count,
        ))
    }

    /// 为 bundle 分配 descriptor set 并写入暂存的资源
    ///
    /// 第一次调用时 bake pool。
    pub fn allocate_resource_bundle(&mut self, bundle: &mut GfxResourceBundle) -> GfxResult<()> {
        if bundle.group_id() != self.id {
            return Err(GfxError::ForeignBundle {
                owner: bundle.debug_name().to_string(),
                group: self.name.clone(),
            });
        }
        if bundle.is_allocated() {
            return Err(GfxError::BundleAlreadyAllocated);
        }
        if !self.is_baked() {
            self.bake()?;
        }

        let layouts = vec![bundle.layout(); bundle.instance_count()];
        let descriptor_sets = self.device.allocate_descriptor_sets(self.pool, &layouts)?;
        bundle.set_descriptor_sets(descriptor_sets);

        self.allocated_sets += bundle.instance_count() as u32;
        for binding in bundle.bindings() {
            *self.allocated_descriptors.entry(binding.descriptor_type.as_raw()).or_default() +=
                binding.descriptor_count * bundle.instance_count() as u32;
        }
        debug_assert!(self.allocated_sets <= self.set_tally);
        debug_assert!(
            self.allocated_descriptors
                .iter()
                .all(|(ty, count)| *count <= self.descriptor_tally.get(ty).copied().unwrap_or(0))
        );

        self.update_resource_bundle(bundle)
    }

    /// 把 bundle 暂存的写入重新应用到它的 descriptor set 上
    ///
    /// 用于分配之后通过 `add_*` 替换资源；pool 本身不会变化。
    pub fn update_resource_bundle(&self, bundle: &GfxResourceBundle) -> GfxResult<()> {
        if !bundle.is_allocated() {
            return Err(GfxError::BundleNotAllocated);
        }
        let writes = bundle.pending_writes()?;
        if !writes.is_empty() {
            self.device.update_descriptor_sets(&writes);
        }
        Ok(())
    }

    fn bake(&mut self) -> GfxResult<()> {
        let pool_sizes = self
            .descriptor_tally
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: vk::DescriptorType::from_raw(*ty),
                descriptor_count: *count,
            })
            .collect_vec();

        self.pool = self.device.create_descriptor_pool(self.set_tally, &pool_sizes)?;

        use ash::vk::Handle;
        self.device.set_debug_name(vk::ObjectType::DESCRIPTOR_POOL, self.pool.as_raw(), &self.name);
        log::info!(
            "resource bundle group `{}` baked: {} sets, pool sizes: {:?}",
            self.name,
            self.set_tally,
            pool_sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect_vec()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::descriptor_write::GfxDescriptorResource;
    use crate::mock::device::MockGfxDevice;
    use ash::vk::Handle;

    fn camera_layout(device: &Rc<MockGfxDevice>) -> GfxResourceBundleLayout {
        let mut layout = GfxResourceBundleLayout::new(device.clone(), "camera");
        layout
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX, 1)
            .unwrap();
        layout
            .add_binding(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, vk::ShaderStageFlags::FRAGMENT, 2)
            .unwrap();
        layout.bake().unwrap();
        layout
    }

    fn buffer_info(raw: u64) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: vk::Buffer::from_raw(raw),
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }

    #[test]
    fn test_tally_counts_instances() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group = GfxResourceBundleGroup::new(device.clone(), "scene", 3);

        let _static_bundle = group.create_resource_bundle(&layout, false).unwrap();
        let _dynamic_bundle = group.create_resource_bundle(&layout, true).unwrap();

        assert_eq!(group.set_tally(), 1 + 3);
        assert_eq!(group.descriptor_tally(vk::DescriptorType::UNIFORM_BUFFER), 1 + 3);
        assert_eq!(group.descriptor_tally(vk::DescriptorType::COMBINED_IMAGE_SAMPLER), 2 + 6);
        assert!(!group.is_baked());

        group.destroy();
        layout.destroy();
    }

    #[test]
    fn test_register_after_bake_fails() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group = GfxResourceBundleGroup::new(device.clone(), "scene", 2);

        let mut a = group.create_resource_bundle(&layout, false).unwrap();
        let mut b = group.create_resource_bundle(&layout, true).unwrap();
        group.allocate_resource_bundle(&mut a).unwrap();
        assert!(group.is_baked());
        assert_eq!(device.pool_count(), 1);

        let err = group.create_resource_bundle(&layout, false).unwrap_err();
        assert!(matches!(err, GfxError::GroupAlreadyBaked { .. }));

        // 已注册的 bundle 仍然可以分配，且不会重新创建 pool
        group.allocate_resource_bundle(&mut b).unwrap();
        assert_eq!(device.pool_count(), 1);

        assert!(group.allocated_set_count() <= group.set_tally());
        for ty in [vk::DescriptorType::UNIFORM_BUFFER, vk::DescriptorType::COMBINED_IMAGE_SAMPLER] {
            assert!(group.allocated_descriptor_count(ty) <= group.descriptor_tally(ty));
        }
        assert_eq!(group.allocated_set_count(), group.set_tally());

        let err = group.allocate_resource_bundle(&mut a).unwrap_err();
        assert!(matches!(err, GfxError::BundleAlreadyAllocated));

        group.destroy();
        layout.destroy();
    }

    #[test]
    fn test_pool_sized_exactly_from_tally() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group = GfxResourceBundleGroup::new(device.clone(), "scene", 3);

        let mut bundle = group.create_resource_bundle(&layout, true).unwrap();
        group.allocate_resource_bundle(&mut bundle).unwrap();

        let (max_sets, sizes) = device.last_pool_sizes().unwrap();
        assert_eq!(max_sets, 3);
        // 按 descriptor type 的取值排序
        assert_eq!(
            sizes,
            vec![(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 6), (vk::DescriptorType::UNIFORM_BUFFER, 3)]
        );
        // pool 已经被占满
        assert_eq!(device.pool_remaining_sets(), Some(0));

        group.destroy();
        layout.destroy();
    }

    #[test]
    fn test_dynamic_bundle_exposes_one_set_per_frame() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group = GfxResourceBundleGroup::new(device.clone(), "scene", 3);

        let mut bundle = group.create_resource_bundle(&layout, true).unwrap();
        assert!(matches!(bundle.descriptor_set(0), Err(GfxError::BundleNotAllocated)));

        bundle
            .add_dynamic_buffer_resource(0, 0, &[buffer_info(10), buffer_info(11), buffer_info(12)])
            .unwrap();
        group.allocate_resource_bundle(&mut bundle).unwrap();

        assert_eq!(bundle.descriptor_sets().len(), 3);
        for frame in 0..3 {
            let set = bundle.descriptor_set(frame).unwrap();
            assert_eq!(set, bundle.descriptor_set(frame).unwrap());
            assert_eq!(set, bundle.descriptor_sets()[frame]);

            let writes = device.descriptor_writes(set);
            assert_eq!(writes.len(), 1);
            match &writes[0].resource {
                GfxDescriptorResource::Buffers(infos) => assert_eq!(infos[0].buffer.as_raw(), 10 + frame as u64),
                other => panic!("unexpected resource {other:?}"),
            }
        }
        assert!(matches!(bundle.descriptor_set(3), Err(GfxError::FrameIndexOutOfRange { index: 3, count: 3 })));

        group.destroy();
        layout.destroy();
    }

    #[test]
    fn test_static_bundle_shares_one_set() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group = GfxResourceBundleGroup::new(device.clone(), "scene", 2);

        let mut bundle = group.create_resource_bundle(&layout, false).unwrap();
        bundle.add_buffer_resource(0, 0, buffer_info(7)).unwrap();
        group.allocate_resource_bundle(&mut bundle).unwrap();

        assert_eq!(bundle.descriptor_sets().len(), 1);
        assert_eq!(bundle.descriptor_set(0).unwrap(), bundle.descriptor_set(1).unwrap());

        group.destroy();
        layout.destroy();
    }

    #[test]
    fn test_dynamic_resource_validation() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group = GfxResourceBundleGroup::new(device.clone(), "scene", 3);

        let mut dynamic = group.create_resource_bundle(&layout, true).unwrap();
        let err = dynamic.add_dynamic_buffer_resource(0, 0, &[buffer_info(1), buffer_info(2)]).unwrap_err();
        assert!(matches!(err, GfxError::DynamicResourceCount { expected: 3, actual: 2 }));

        let err = dynamic.add_buffer_resource(5, 0, buffer_info(1)).unwrap_err();
        assert!(matches!(err, GfxError::UnknownBinding { binding: 5 }));

        let mut fixed = group.create_resource_bundle(&layout, false).unwrap();
        let err = fixed.add_dynamic_buffer_resource(0, 0, &[buffer_info(1)]).unwrap_err();
        assert!(matches!(err, GfxError::StaticBundle));

        group.destroy();
        layout.destroy();
    }

    #[test]
    fn test_array_element_must_be_within_descriptor_count() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group = GfxResourceBundleGroup::new(device.clone(), "scene", 2);
        let mut bundle = group.create_resource_bundle(&layout, true).unwrap();

        let image_info = vk::DescriptorImageInfo::default()
            .image_view(vk::ImageView::from_raw(0x40))
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        bundle.add_image_resource(1, 1, image_info).unwrap();
        let err = bundle.add_image_resource(1, 2, image_info).unwrap_err();
        assert!(matches!(
            err,
            GfxError::ArrayElementOutOfRange {
                binding: 1,
                array_element: 2,
                count: 2
            }
        ));

        let err = bundle.add_dynamic_buffer_resource(0, 1, &[buffer_info(1), buffer_info(2)]).unwrap_err();
        assert!(matches!(err, GfxError::ArrayElementOutOfRange { binding: 0, array_element: 1, count: 1 }));
        let err = bundle.add_buffer_resource(0, 1, buffer_info(1)).unwrap_err();
        assert!(matches!(err, GfxError::ArrayElementOutOfRange { binding: 0, .. }));

        group.destroy();
        layout.destroy();
    }

    #[test]
    fn test_foreign_bundle_rejected() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group_a = GfxResourceBundleGroup::new(device.clone(), "a", 2);
        let mut group_b = GfxResourceBundleGroup::new(device.clone(), "b", 2);

        let mut bundle = group_a.create_resource_bundle(&layout, false).unwrap();
        let err = group_b.allocate_resource_bundle(&mut bundle).unwrap_err();
        assert!(matches!(err, GfxError::ForeignBundle { .. }));

        group_a.destroy();
        group_b.destroy();
        layout.destroy();
    }

    #[test]
    fn test_update_after_allocation_reapplies_writes() {
        let device = MockGfxDevice::new_rc();
        let layout = camera_layout(&device);
        let mut group = GfxResourceBundleGroup::new(device.clone(), "scene", 2);

        let mut bundle = group.create_resource_bundle(&layout, false).unwrap();
        bundle.add_buffer_resource(0, 0, buffer_info(1)).unwrap();
        group.allocate_resource_bundle(&mut bundle).unwrap();

        bundle.add_buffer_resource(0, 0, buffer_info(2)).unwrap();
        group.update_resource_bundle(&bundle).unwrap();

        let set = bundle.descriptor_set(0).unwrap();
        let writes = device.descriptor_writes(set);
        match &writes.last().unwrap().resource {
            GfxDescriptorResource::Buffers(infos) => assert_eq!(infos[0].buffer.as_raw(), 2),
            other => panic!("unexpected resource {other:?}"),
        }
        assert_eq!(device.pool_count(), 1);

        group.destroy();
        layout.destroy();
    }
}
