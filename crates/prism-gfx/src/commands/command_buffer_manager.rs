use std::rc::Rc;

use ash::vk;

use crate::commands::command_buffer::GfxCommandBuffer;
use crate::commands::submit_info::GfxSubmitBatch;
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::{GfxDevice, GfxQueueType};

/// 某个 frame slot 中某个 level 的三个列表
///
/// 同一个 command buffer 任意时刻只会出现在其中一个列表里。
#[derive(Default, Debug)]
pub struct GfxCommandBufferLists {
    free: Vec<vk::CommandBuffer>,
    recorded: Vec<vk::CommandBuffer>,
    submitted: Vec<vk::CommandBuffer>,
}

impl GfxCommandBufferLists {
    #[inline]
    pub fn free(&self) -> &[vk::CommandBuffer] {
        &self.free
    }

    #[inline]
    pub fn recorded(&self) -> &[vk::CommandBuffer] {
        &self.recorded
    }

    #[inline]
    pub fn submitted(&self) -> &[vk::CommandBuffer] {
        &self.submitted
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.free.len() + self.recorded.len() + self.submitted.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter_all(&self) -> impl Iterator<Item = &vk::CommandBuffer> {
        self.free.iter().chain(self.recorded.iter()).chain(self.submitted.iter())
    }
}

#[derive(Default, Debug)]
struct GfxCommandBufferSlot {
    primary: GfxCommandBufferLists,
    secondary: GfxCommandBufferLists,
}

impl GfxCommandBufferSlot {
    #[inline]
    fn lists(&self, level: vk::CommandBufferLevel) -> &GfxCommandBufferLists {
        if level == vk::CommandBufferLevel::SECONDARY { &self.secondary } else { &self.primary }
    }

    #[inline]
    fn lists_mut(&mut self, level: vk::CommandBufferLevel) -> &mut GfxCommandBufferLists {
        if level == vk::CommandBufferLevel::SECONDARY { &mut self.secondary } else { &mut self.primary }
    }
}

/// 按 frame slot 与 level 管理 primary / secondary command buffer
///
/// 每个 frame slot 有 free → recorded → submitted 三个列表：
/// - [`get_command_buffer`](Self::get_command_buffer)：free → recorded，并开始录制
/// - [`get_recorded_command_buffers`](Self::get_recorded_command_buffers)：结束录制，recorded → submitted
/// - [`reset_command_buffers`](Self::reset_command_buffers)：submitted → free
///
/// 回收之前调用方必须已经等待过当前 slot 的 fence，manager 自身不做任何等待。
///
/// 只有一个不加锁的 command pool，多线程录制需要每个线程一个 manager。
///
/// # Destroy
/// 需要手动 destroy，会释放所有 command buffer 以及 pool
pub struct GfxCommandBufferManager {
    device: Rc<dyn GfxDevice>,

    /// 按帧录制的 command buffer 来自这个 pool（graphics queue）
    pool: vk::CommandPool,
    /// 单次同步命令使用的 pool，属于 `single_time_queue`
    single_time_pool: vk::CommandPool,
    single_time_queue: GfxQueueType,

    slots: Vec<GfxCommandBufferSlot>,
    current_slot: usize,

    /// 从 pool 中分配过的 command buffer 总数（不含单次命令）
    allocated_count: usize,
}

// init & destroy
impl GfxCommandBufferManager {
    /// 单次同步命令提交到 transfer queue
    ///
    /// # param
    /// * `frame_slot_count` - frames in flight 的数量，每次批量分配的大小
    pub fn new(device: Rc<dyn GfxDevice>, frame_slot_count: usize) -> GfxResult<Self> {
        Self::with_single_time_queue(device, frame_slot_count, GfxQueueType::Transfer)
    }

    /// 单次同步命令提交到 `single_time_queue`；需要在单次命令中 dispatch 或 clear 时使用 graphics queue
    pub fn with_single_time_queue(
        device: Rc<dyn GfxDevice>,
        frame_slot_count: usize,
        single_time_queue: GfxQueueType,
    ) -> GfxResult<Self> {
        if frame_slot_count == 0 {
            return Err(GfxError::FrameIndexOutOfRange { index: 0, count: 0 });
        }

        let pool = device.create_command_pool(GfxQueueType::Graphics, vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)?;
        let single_time_pool = device.create_command_pool(single_time_queue, vk::CommandPoolCreateFlags::TRANSIENT)?;

        log::info!(
            "command buffer manager created with {} frame slots, single time queue: {:?}",
            frame_slot_count,
            single_time_queue
        );

        Ok(Self {
            device,
            pool,
            single_time_pool,
            single_time_queue,
            slots: (0..frame_slot_count).map(|_| GfxCommandBufferSlot::default()).collect(),
            current_slot: 0,
            allocated_count: 0,
        })
    }

    pub fn destroy(mut self) {
        let all_buffers: Vec<vk::CommandBuffer> = self
            .slots
            .iter()
            .flat_map(|slot| slot.primary.iter_all().chain(slot.secondary.iter_all()))
            .copied()
            .collect();
        if !all_buffers.is_empty() {
            self.device.free_command_buffers(self.pool, &all_buffers);
        }
        self.slots.clear();

        self.device.destroy_command_pool(self.pool);
        self.device.destroy_command_pool(self.single_time_pool);
        self.pool = vk::CommandPool::null();
        self.single_time_pool = vk::CommandPool::null();

        log::info!("command buffer manager destroyed, {} command buffers freed", all_buffers.len());
    }
}

impl Drop for GfxCommandBufferManager {
    fn drop(&mut self) {
        use ash::vk::Handle;
        debug_assert!(self.pool.is_null(), "GfxCommandBufferManager dropped without destroy");
    }
}

// getters
impl GfxCommandBufferManager {
    #[inline]
    pub fn frame_slot_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    #[inline]
    pub fn single_time_queue(&self) -> GfxQueueType {
        self.single_time_queue
    }

    #[inline]
    pub fn allocated_count(&self) -> usize {
        self.allocated_count
    }

    /// 查看某个 slot 的列表，`slot` 越界时 panic
    #[inline]
    pub fn lists(&self, slot: usize, level: vk::CommandBufferLevel) -> &GfxCommandBufferLists {
        self.slots[slot].lists(level)
    }
}

// frame slot 操作
impl GfxCommandBufferManager {
    /// 切换到 frame-in-flight `slot`，之后的所有操作都针对这个 slot
    pub fn set_current_slot(&mut self, slot: usize) -> GfxResult<()> {
        if slot >= self.slots.len() {
            return Err(GfxError::FrameIndexOutOfRange {
                index: slot,
                count: self.slots.len(),
            });
        }
        self.current_slot = slot;
        Ok(())
    }

    /// 取出一个可录制的 command buffer 并以 `begin_info` 开始录制
    ///
    /// 当前 slot 没有空闲的 buffer 时，一次性为每个 slot 各分配一个，保持各个 slot 的数量一致。
    pub fn get_command_buffer(
        &mut self,
        level: vk::CommandBufferLevel,
        begin_info: &vk::CommandBufferBeginInfo<'_>,
    ) -> GfxResult<GfxCommandBuffer> {
        if self.slots[self.current_slot].lists(level).free.is_empty() {
            self.allocate_batch(level)?;
        }

        let lists = self.slots[self.current_slot].lists_mut(level);
        // allocate_batch 保证了非空
        let Some(vk_handle) = lists.free.pop() else {
            unreachable!("free list is empty after batch allocation");
        };

        let command_buffer = GfxCommandBuffer::new(self.device.clone(), vk_handle, level);
        if let Err(e) = command_buffer.begin(begin_info) {
            lists.free.push(vk_handle);
            return Err(e);
        }
        lists.recorded.push(vk_handle);
        Ok(command_buffer)
    }

    /// 结束当前 slot 中所有已录制的 buffer，移动到 submitted 并返回，用于一次提交
    ///
    /// 某个 buffer 结束失败时，之前已经结束的 buffer 仍然进入 submitted，其余留在 recorded。
    pub fn get_recorded_command_buffers(&mut self, level: vk::CommandBufferLevel) -> GfxResult<Vec<vk::CommandBuffer>> {
        let lists = self.slots[self.current_slot].lists_mut(level);
        let mut ended = 0;
        let mut result = Ok(());
        for command_buffer in &lists.recorded {
            result = self.device.end_command_buffer(*command_buffer);
            if result.is_err() {
                break;
            }
            ended += 1;
        }

        let recorded: Vec<vk::CommandBuffer> = lists.recorded.drain(..ended).collect();
        lists.submitted.extend_from_slice(&recorded);
        result.map(|_| recorded)
    }

    /// 只结束指定的几个 buffer，recorded → submitted
    ///
    /// render graph 的每个节点只嵌入自己录制的 secondary buffer。
    pub fn end_command_buffers(&mut self, level: vk::CommandBufferLevel, command_buffers: &[vk::CommandBuffer]) -> GfxResult<()> {
        let lists = self.slots[self.current_slot].lists_mut(level);
        for command_buffer in command_buffers {
            let Some(pos) = lists.recorded.iter().position(|c| c == command_buffer) else {
                return Err(GfxError::CommandBufferNotRecorded(*command_buffer));
            };
            self.device.end_command_buffer(*command_buffer)?;
            lists.recorded.remove(pos);
            lists.submitted.push(*command_buffer);
        }
        Ok(())
    }

    /// 当前 slot 的 submitted → free，两个 level 都会回收
    ///
    /// 调用前必须已经等待过当前 slot 的 in-flight fence。
    pub fn reset_command_buffers(&mut self) {
        let slot = &mut self.slots[self.current_slot];
        for lists in [&mut slot.primary, &mut slot.secondary] {
            let submitted = std::mem::take(&mut lists.submitted);
            lists.free.extend(submitted);
        }
    }

    fn allocate_batch(&mut self, level: vk::CommandBufferLevel) -> GfxResult<()> {
        let count = self.slots.len();
        let command_buffers = self.device.allocate_command_buffers(self.pool, level, count as u32)?;
        for (slot, command_buffer) in self.slots.iter_mut().zip(command_buffers) {
            slot.lists_mut(level).free.push(command_buffer);
        }
        self.allocated_count += count;

        log::debug!("allocated {} {:?} command buffers, total: {}", count, level, self.allocated_count);
        Ok(())
    }
}

// 单次同步命令
impl GfxCommandBufferManager {
    /// 分配一个 primary buffer 并以 `ONE_TIME_SUBMIT` 开始录制，不占用任何 frame slot
    pub fn begin_single_time_commands(&self) -> GfxResult<GfxCommandBuffer> {
        let command_buffers =
            self.device.allocate_command_buffers(self.single_time_pool, vk::CommandBufferLevel::PRIMARY, 1)?;
        let command_buffer =
            GfxCommandBuffer::new(self.device.clone(), command_buffers[0], vk::CommandBufferLevel::PRIMARY);

        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if let Err(e) = command_buffer.begin(&begin_info) {
            self.device.free_command_buffers(self.single_time_pool, &command_buffers);
            return Err(e);
        }
        Ok(command_buffer)
    }

    /// 结束录制，提交到单次命令的队列，阻塞直到队列空闲，然后释放 buffer
    ///
    /// 任何一步失败都会释放 buffer。
    pub fn end_single_time_commands(&self, command_buffer: GfxCommandBuffer) -> GfxResult<()> {
        let vk_handle = command_buffer.vk_handle();
        let result = command_buffer.end().and_then(|_| {
            let batch = GfxSubmitBatch::new(&[vk_handle]);
            self.device.queue_submit(self.single_time_queue, std::slice::from_ref(&batch), vk::Fence::null())?;
            self.device.queue_wait_idle(self.single_time_queue)
        });

        self.device.free_command_buffers(self.single_time_pool, &[vk_handle]);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::mock::device::{MockCommand, MockEvent, MockGfxDevice};

    fn manager(device: &Rc<MockGfxDevice>, frame_slot_count: usize) -> GfxCommandBufferManager {
        prism_crate_tools::init_log::init_log();
        GfxCommandBufferManager::new(device.clone(), frame_slot_count).unwrap()
    }

    fn secondary_begin_info() -> vk::CommandBufferBeginInfo<'static> {
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
    }

    fn assert_disjoint(manager: &GfxCommandBufferManager) {
        for slot in 0..manager.frame_slot_count() {
            for level in [vk::CommandBufferLevel::PRIMARY, vk::CommandBufferLevel::SECONDARY] {
                let lists = manager.lists(slot, level);
                let unique: HashSet<_> = lists.iter_all().collect();
                assert_eq!(unique.len(), lists.len(), "slot {slot} {level:?} lists overlap");
            }
        }
    }

    #[test]
    fn test_batch_allocation_per_slot() {
        let device = MockGfxDevice::new_rc();
        let mut manager = manager(&device, 3);

        let cmd = manager.get_command_buffer(vk::CommandBufferLevel::PRIMARY, &secondary_begin_info()).unwrap();
        assert_eq!(manager.allocated_count(), 3);
        assert_eq!(manager.lists(0, vk::CommandBufferLevel::PRIMARY).recorded(), &[cmd.vk_handle()]);
        // 其余 slot 各得到一个空闲 buffer
        assert_eq!(manager.lists(1, vk::CommandBufferLevel::PRIMARY).free().len(), 1);
        assert_eq!(manager.lists(2, vk::CommandBufferLevel::PRIMARY).free().len(), 1);
        assert!(manager.lists(0, vk::CommandBufferLevel::SECONDARY).is_empty());

        manager.set_current_slot(1).unwrap();
        manager.get_command_buffer(vk::CommandBufferLevel::PRIMARY, &secondary_begin_info()).unwrap();
        assert_eq!(manager.allocated_count(), 3);

        assert_disjoint(&manager);
        manager.destroy();
    }

    #[test]
    fn test_lists_cycle_and_stay_disjoint() {
        let device = MockGfxDevice::new_rc();
        let mut manager = manager(&device, 2);
        let level = vk::CommandBufferLevel::SECONDARY;

        let a = manager.get_command_buffer(level, &secondary_begin_info()).unwrap().vk_handle();
        let b = manager.get_command_buffer(level, &secondary_begin_info()).unwrap().vk_handle();
        assert_disjoint(&manager);
        assert_eq!(manager.lists(0, level).recorded(), &[a, b]);

        let recorded = manager.get_recorded_command_buffers(level).unwrap();
        assert_eq!(recorded, vec![a, b]);
        assert!(manager.lists(0, level).recorded().is_empty());
        assert_eq!(manager.lists(0, level).submitted(), &[a, b]);
        assert!(device.is_executable(a));
        assert_disjoint(&manager);

        manager.reset_command_buffers();
        assert!(manager.lists(0, level).submitted().is_empty());
        assert_eq!(manager.lists(0, level).free().len(), 2);
        assert_disjoint(&manager);

        // 回收之后不再分配新的 buffer
        manager.get_command_buffer(level, &secondary_begin_info()).unwrap();
        manager.get_command_buffer(level, &secondary_begin_info()).unwrap();
        assert_eq!(manager.allocated_count(), 4);
        assert_disjoint(&manager);

        manager.get_recorded_command_buffers(level).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_end_subset_of_recorded() {
        let device = MockGfxDevice::new_rc();
        let mut manager = manager(&device, 1);
        let level = vk::CommandBufferLevel::SECONDARY;

        let a = manager.get_command_buffer(level, &secondary_begin_info()).unwrap().vk_handle();
        let b = manager.get_command_buffer(level, &secondary_begin_info()).unwrap().vk_handle();

        manager.end_command_buffers(level, &[b]).unwrap();
        assert_eq!(manager.lists(0, level).recorded(), &[a]);
        assert_eq!(manager.lists(0, level).submitted(), &[b]);

        let err = manager.end_command_buffers(level, &[b]).unwrap_err();
        assert!(matches!(err, GfxError::CommandBufferNotRecorded(cmd) if cmd == b));

        manager.get_recorded_command_buffers(level).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_slot_out_of_range() {
        let device = MockGfxDevice::new_rc();
        let mut manager = manager(&device, 2);
        assert!(matches!(
            manager.set_current_slot(2),
            Err(GfxError::FrameIndexOutOfRange { index: 2, count: 2 })
        ));
        manager.destroy();
    }

    #[test]
    fn test_single_time_commands() {
        let device = MockGfxDevice::new_rc();
        let manager = manager(&device, 2);

        let cmd = manager.begin_single_time_commands().unwrap();
        cmd.cmd_dispatch([1, 1, 1]);
        let handle = cmd.vk_handle();
        manager.end_single_time_commands(cmd).unwrap();

        assert_eq!(device.commands(handle), vec![MockCommand::Dispatch([1, 1, 1])]);
        assert!(device.is_freed(handle));
        assert_eq!(device.submissions(GfxQueueType::Transfer), 1);
        // 不占用 frame slot
        assert_eq!(manager.allocated_count(), 0);
        manager.destroy();
    }

    #[test]
    fn test_failed_end_keeps_lists_partitioned() {
        let device = MockGfxDevice::new_rc();
        let mut manager = manager(&device, 1);
        let level = vk::CommandBufferLevel::PRIMARY;

        let a = manager.get_command_buffer(level, &secondary_begin_info()).unwrap().vk_handle();
        let b = manager.get_command_buffer(level, &secondary_begin_info()).unwrap().vk_handle();
        manager.end_command_buffers(level, &[a]).unwrap();
        let c = manager.get_command_buffer(level, &secondary_begin_info()).unwrap().vk_handle();

        device.fail_next("vkEndCommandBuffer");
        let err = manager.end_command_buffers(level, &[b]).unwrap_err();
        assert!(matches!(err, GfxError::Vk { call: "vkEndCommandBuffer", .. }));
        assert_eq!(manager.lists(0, level).recorded(), &[b, c]);
        assert_eq!(manager.lists(0, level).len(), 3);

        device.fail_next("vkEndCommandBuffer");
        assert!(manager.get_recorded_command_buffers(level).is_err());
        assert_eq!(manager.lists(0, level).recorded(), &[b, c]);
        assert_eq!(manager.lists(0, level).submitted(), &[a]);
        assert_disjoint(&manager);

        // 失败之后仍然可以正常结束
        assert_eq!(manager.get_recorded_command_buffers(level).unwrap(), vec![b, c]);
        assert_eq!(manager.lists(0, level).submitted(), &[a, b, c]);
        assert_disjoint(&manager);

        manager.destroy();
        for cmd in [a, b, c] {
            assert!(device.is_freed(cmd));
        }
    }

    #[test]
    fn test_failed_begin_returns_buffer_to_free() {
        let device = MockGfxDevice::new_rc();
        let mut manager = manager(&device, 2);
        let level = vk::CommandBufferLevel::SECONDARY;

        device.fail_next("vkBeginCommandBuffer");
        assert!(manager.get_command_buffer(level, &secondary_begin_info()).is_err());
        assert!(manager.lists(0, level).recorded().is_empty());
        assert_eq!(manager.lists(0, level).free().len(), 1);

        let cmd = manager.get_command_buffer(level, &secondary_begin_info()).unwrap();
        assert_eq!(manager.lists(0, level).recorded(), &[cmd.vk_handle()]);
        assert_eq!(manager.allocated_count(), 2);

        manager.get_recorded_command_buffers(level).unwrap();
        manager.destroy();
    }

    #[test]
    fn test_single_time_commands_freed_on_failure() {
        let device = MockGfxDevice::new_rc();
        let manager = manager(&device, 1);

        device.fail_next("vkBeginCommandBuffer");
        assert!(manager.begin_single_time_commands().is_err());
        let allocated = device
            .events()
            .into_iter()
            .find_map(|e| match e {
                MockEvent::AllocateCommandBuffers { command_buffers, .. } => Some(command_buffers),
                _ => None,
            })
            .unwrap();
        assert!(device.is_freed(allocated[0]));

        let cmd = manager.begin_single_time_commands().unwrap();
        let handle = cmd.vk_handle();
        device.fail_next("vkQueueSubmit");
        let err = manager.end_single_time_commands(cmd).unwrap_err();
        assert!(matches!(err, GfxError::Vk { call: "vkQueueSubmit", .. }));
        assert!(device.is_freed(handle));
        assert_eq!(device.submissions(GfxQueueType::Transfer), 0);

        manager.destroy();
    }

    #[test]
    fn test_single_time_queue_is_configurable() {
        let device = MockGfxDevice::new_rc();
        let manager = GfxCommandBufferManager::with_single_time_queue(device.clone(), 1, GfxQueueType::Graphics).unwrap();
        assert_eq!(manager.single_time_queue(), GfxQueueType::Graphics);

        let cmd = manager.begin_single_time_commands().unwrap();
        manager.end_single_time_commands(cmd).unwrap();
        assert_eq!(device.submissions(GfxQueueType::Graphics), 1);
        assert_eq!(device.submissions(GfxQueueType::Transfer), 0);
        manager.destroy();
    }
}
