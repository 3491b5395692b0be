use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use ash::vk;
use ash::vk::Handle;

use crate::commands::submit_info::GfxSubmitBatch;
use crate::descriptors::descriptor_write::GfxDescriptorWrite;
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::{GfxDevice, GfxQueueType};

/// 录制到 command buffer 中的命令，只保留便于比较的字段
#[derive(Clone, Debug, PartialEq)]
pub enum MockCommand {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        /// [width, height]
        extent: [u32; 2],
        clear_value_count: u32,
        contents: vk::SubpassContents,
    },
    EndRenderPass,
    ExecuteCommands(Vec<vk::CommandBuffer>),
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    BindVertexBuffers {
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<vk::DeviceSize>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    PushConstants {
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch([u32; 3]),
    ImageBarrier {
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        src_stage: vk::PipelineStageFlags2,
        src_access: vk::AccessFlags2,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    },
    BlitImage {
        src: (vk::Image, vk::ImageLayout),
        dst: (vk::Image, vk::ImageLayout),
        /// 每个 region 的 (src_offsets, dst_offsets)
        regions: Vec<([[i32; 3]; 2], [[i32; 3]; 2])>,
        filter: vk::Filter,
    },
    ClearColorImage {
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    },
    BindShadingRateImage {
        image_view: vk::ImageView,
        layout: vk::ImageLayout,
    },
}

/// 设备层面的事件，按发生顺序记录
#[derive(Clone, Debug, PartialEq)]
pub enum MockEvent {
    AllocateCommandBuffers {
        level: vk::CommandBufferLevel,
        command_buffers: Vec<vk::CommandBuffer>,
    },
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    Submit(MockSubmit),
    QueueWaitIdle(GfxQueueType),
    DeviceWaitIdle,
}

/// 一次 `queue_submit` 中的一个 batch
#[derive(Clone, Debug, PartialEq)]
pub struct MockSubmit {
    pub queue: GfxQueueType,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub wait_semaphores: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
    pub signal_semaphores: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
    pub fence: vk::Fence,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockCommandBufferState {
    Initial,
    Recording,
    Executable,
    Freed,
}

struct MockCommandBuffer {
    state: MockCommandBufferState,
    level: vk::CommandBufferLevel,
    /// 仍在 GPU 上执行的提交次数
    pending: u32,
    begin_flags: vk::CommandBufferUsageFlags,
    inheritance: Option<(vk::RenderPass, vk::Framebuffer, u32)>,
    commands: Vec<MockCommand>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MockFenceState {
    Signaled,
    Unsignaled,
    Pending,
}

struct MockSubmission {
    queue: GfxQueueType,
    /// 包含 primary 以及其中执行的 secondary
    command_buffers: Vec<vk::CommandBuffer>,
    fence: vk::Fence,
    completed: bool,
}

struct MockDescriptorPool {
    max_sets: u32,
    sizes: Vec<(vk::DescriptorType, u32)>,
    remaining_sets: u32,
    remaining: HashMap<vk::DescriptorType, u32>,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    /// 尚未销毁的对象（command buffer 除外）
    live_objects: HashSet<u64>,
    debug_names: HashMap<u64, String>,

    command_buffers: HashMap<vk::CommandBuffer, MockCommandBuffer>,
    allocated_command_buffer_count: usize,

    fences: HashMap<vk::Fence, MockFenceState>,
    submissions: Vec<MockSubmission>,
    events: Vec<MockEvent>,

    descriptor_pools: HashMap<vk::DescriptorPool, MockDescriptorPool>,
    created_pool_count: usize,
    last_pool: Option<vk::DescriptorPool>,
    set_layouts: HashMap<vk::DescriptorSetLayout, Vec<(u32, vk::DescriptorType, u32)>>,
    descriptor_writes: HashMap<vk::DescriptorSet, Vec<GfxDescriptorWrite>>,

    framebuffer_attachment_counts: HashMap<vk::Framebuffer, u32>,

    /// 下一次对应调用返回 `ERROR_DEVICE_LOST`
    injected_failure: Option<&'static str>,
}

impl MockState {
    fn next_handle<H: Handle>(&mut self) -> H {
        self.next_handle += 1;
        H::from_raw(self.next_handle)
    }

    fn injected(&mut self, call: &'static str) -> GfxResult<()> {
        if self.injected_failure == Some(call) {
            self.injected_failure = None;
            return Err(GfxError::Vk {
                call,
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }
        Ok(())
    }

    fn create_object<H: Handle + Copy>(&mut self) -> H {
        let handle: H = self.next_handle();
        self.live_objects.insert(handle.as_raw());
        handle
    }

    fn destroy_object<H: Handle>(&mut self, handle: H, what: &str) {
        let raw = handle.as_raw();
        assert!(self.live_objects.remove(&raw), "destroying unknown or already destroyed {what} {raw:#x}");
    }

    fn command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> &mut MockCommandBuffer {
        match self.command_buffers.get_mut(&command_buffer) {
            Some(cmd) => cmd,
            None => panic!("unknown command buffer {command_buffer:?}"),
        }
    }

    fn record(&mut self, command_buffer: vk::CommandBuffer, command: MockCommand) {
        let cmd = self.command_buffer(command_buffer);
        assert_eq!(
            cmd.state,
            MockCommandBufferState::Recording,
            "recording {command:?} into {command_buffer:?} which is not recording"
        );
        cmd.commands.push(command);
    }

    /// 完成 `last` 之前（包括 `last`）所有满足 `filter` 的提交
    fn complete_submissions(&mut self, last: usize, filter: impl Fn(&MockSubmission) -> bool) {
        for index in 0..=last {
            let submission = &self.submissions[index];
            if submission.completed || !filter(submission) {
                continue;
            }
            let command_buffers = submission.command_buffers.clone();
            let fence = submission.fence;
            self.submissions[index].completed = true;

            for command_buffer in command_buffers {
                if let Some(cmd) = self.command_buffers.get_mut(&command_buffer) {
                    cmd.pending = cmd.pending.saturating_sub(1);
                }
            }
            if fence != vk::Fence::null() {
                self.fences.insert(fence, MockFenceState::Signaled);
            }
        }
    }

    fn complete_all(&mut self, filter: impl Fn(&MockSubmission) -> bool) {
        if let Some(last) = self.submissions.len().checked_sub(1) {
            self.complete_submissions(last, filter);
        }
    }
}

/// 录制所有调用的 [`GfxDevice`]
///
/// - command buffer：在 pending 状态下 begin 或 free 会 panic；提交非 executable 的 buffer 会 panic
/// - fence：只有被等待时，它之前的提交才视为完成；在从未提交的 unsignaled fence 上无限等待会 panic
/// - descriptor pool：按创建时的容量扣减，耗尽时返回 `ERROR_OUT_OF_POOL_MEMORY`
pub struct MockGfxDevice {
    state: RefCell<MockState>,
    shading_rate_image_supported: Cell<bool>,
}

// init
impl MockGfxDevice {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(MockState::default()),
            shading_rate_image_supported: Cell::new(true),
        }
    }

    pub fn new_rc() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// 默认支持 shading rate image
    pub fn set_shading_rate_image_supported(&self, supported: bool) {
        self.shading_rate_image_supported.set(supported);
    }

    /// 让下一次 `call`（例如 `"vkEndCommandBuffer"`）返回 `ERROR_DEVICE_LOST`，不产生任何副作用
    pub fn fail_next(&self, call: &'static str) {
        self.state.borrow_mut().injected_failure = Some(call);
    }
}

impl Default for MockGfxDevice {
    fn default() -> Self {
        Self::new()
    }
}


// 检查接口
impl MockGfxDevice {
    /// 最近一次 begin 之后录制的命令
    pub fn commands(&self, command_buffer: vk::CommandBuffer) -> Vec<MockCommand> {
        self.state.borrow().command_buffers.get(&command_buffer).map(|c| c.commands.clone()).unwrap_or_default()
    }

    pub fn command_buffer_state(&self, command_buffer: vk::CommandBuffer) -> Option<MockCommandBufferState> {
        self.state.borrow().command_buffers.get(&command_buffer).map(|c| c.state)
    }

    pub fn command_buffer_level(&self, command_buffer: vk::CommandBuffer) -> Option<vk::CommandBufferLevel> {
        self.state.borrow().command_buffers.get(&command_buffer).map(|c| c.level)
    }

    pub fn is_executable(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.command_buffer_state(command_buffer) == Some(MockCommandBufferState::Executable)
    }

    pub fn is_pending(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.state.borrow().command_buffers.get(&command_buffer).is_some_and(|c| c.pending > 0)
    }

    pub fn is_freed(&self, command_buffer: vk::CommandBuffer) -> bool {
        self.command_buffer_state(command_buffer) == Some(MockCommandBufferState::Freed)
    }

    pub fn begin_flags(&self, command_buffer: vk::CommandBuffer) -> Option<vk::CommandBufferUsageFlags> {
        self.state.borrow().command_buffers.get(&command_buffer).map(|c| c.begin_flags)
    }

    /// secondary buffer 继承的 (render pass, framebuffer, subpass)
    pub fn inheritance(&self, command_buffer: vk::CommandBuffer) -> Option<(vk::RenderPass, vk::Framebuffer, u32)> {
        self.state.borrow().command_buffers.get(&command_buffer).and_then(|c| c.inheritance)
    }

    /// 从 pool 中分配过的 command buffer 数量
    pub fn allocated_command_buffer_count(&self) -> usize {
        self.state.borrow().allocated_command_buffer_count
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state.borrow().fences.get(&fence) == Some(&MockFenceState::Signaled)
    }

    /// 提交到 `queue` 的 batch 数量
    pub fn submissions(&self, queue: GfxQueueType) -> usize {
        self.state.borrow().submissions.iter().filter(|s| s.queue == queue).count()
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.borrow().events.clone()
    }

    pub fn submits(&self) -> Vec<MockSubmit> {
        self.state
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::Submit(submit) => Some(submit.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear_events(&self) {
        self.state.borrow_mut().events.clear();
    }

    /// 创建过的 descriptor pool 数量
    pub fn pool_count(&self) -> usize {
        self.state.borrow().created_pool_count
    }

    /// 最近创建的 pool 的 (max sets, pool sizes)
    pub fn last_pool_sizes(&self) -> Option<(u32, Vec<(vk::DescriptorType, u32)>)> {
        let state = self.state.borrow();
        let pool = state.descriptor_pools.get(&state.last_pool?)?;
        Some((pool.max_sets, pool.sizes.clone()))
    }

    /// 最近创建的 pool 还能分配的 set 数量
    pub fn pool_remaining_sets(&self) -> Option<u32> {
        let state = self.state.borrow();
        state.descriptor_pools.get(&state.last_pool?).map(|p| p.remaining_sets)
    }

    /// 写入过 `set` 的所有 write，按写入顺序
    pub fn descriptor_writes(&self, set: vk::DescriptorSet) -> Vec<GfxDescriptorWrite> {
        self.state.borrow().descriptor_writes.get(&set).cloned().unwrap_or_default()
    }

    /// (binding, type, count)
    pub fn layout_bindings(&self, layout: vk::DescriptorSetLayout) -> Vec<(u32, vk::DescriptorType, u32)> {
        self.state.borrow().set_layouts.get(&layout).cloned().unwrap_or_default()
    }

    pub fn framebuffer_attachment_count(&self, framebuffer: vk::Framebuffer) -> Option<u32> {
        self.state.borrow().framebuffer_attachment_counts.get(&framebuffer).copied()
    }

    pub fn debug_name(&self, raw_handle: u64) -> Option<String> {
        self.state.borrow().debug_names.get(&raw_handle).cloned()
    }

    /// 尚未销毁的 pool、fence、semaphore、layout、render pass、framebuffer 数量
    pub fn live_object_count(&self) -> usize {
        self.state.borrow().live_objects.len()
    }
}

impl GfxDevice for MockGfxDevice {
    fn shading_rate_image_supported(&self) -> bool {
        self.shading_rate_image_supported.get()
    }

    fn set_debug_name(&self, _object_type: vk::ObjectType, raw_handle: u64, name: &str) {
        self.state.borrow_mut().debug_names.insert(raw_handle, name.to_string());
    }

    fn create_command_pool(&self, _queue: GfxQueueType, _flags: vk::CommandPoolCreateFlags) -> GfxResult<vk::CommandPool> {
        Ok(self.state.borrow_mut().create_object())
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state.borrow_mut().destroy_object(pool, "command pool");
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> GfxResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.borrow_mut();
        let mut command_buffers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let handle: vk::CommandBuffer = state.next_handle();
            state.command_buffers.insert(
                handle,
                MockCommandBuffer {
                    state: MockCommandBufferState::Initial,
                    level,
                    pending: 0,
                    begin_flags: vk::CommandBufferUsageFlags::empty(),
                    inheritance: None,
                    commands: Vec::new(),
                },
            );
            command_buffers.push(handle);
        }
        state.allocated_command_buffer_count += count as usize;
        state.events.push(MockEvent::AllocateCommandBuffers {
            level,
            command_buffers: command_buffers.clone(),
        });
        Ok(command_buffers)
    }

    fn free_command_buffers(&self, _pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.borrow_mut();
        for command_buffer in command_buffers {
            let cmd = state.command_buffer(*command_buffer);
            assert_eq!(cmd.pending, 0, "freeing {command_buffer:?} while it is still pending");
            assert_ne!(cmd.state, MockCommandBufferState::Freed, "double free of {command_buffer:?}");
            cmd.state = MockCommandBufferState::Freed;
        }
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, begin_info: &vk::CommandBufferBeginInfo<'_>) -> GfxResult<()> {
        // SAFETY: inheritance info 由调用方保证在调用期间有效
        let inheritance = unsafe { begin_info.p_inheritance_info.as_ref() }
            .filter(|info| info.render_pass != vk::RenderPass::null())
            .map(|info| (info.render_pass, info.framebuffer, info.subpass));

        let mut state = self.state.borrow_mut();
        state.injected("vkBeginCommandBuffer")?;
        let cmd = state.command_buffer(command_buffer);
        assert_eq!(cmd.pending, 0, "begin on {command_buffer:?} while it is still pending");
        assert_ne!(cmd.state, MockCommandBufferState::Freed, "begin on freed {command_buffer:?}");
        assert_ne!(cmd.state, MockCommandBufferState::Recording, "begin on {command_buffer:?} which is already recording");
        cmd.state = MockCommandBufferState::Recording;
        cmd.begin_flags = begin_info.flags;
        cmd.inheritance = inheritance;
        cmd.commands.clear();
        state.events.push(MockEvent::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        state.injected("vkEndCommandBuffer")?;
        let cmd = state.command_buffer(command_buffer);
        assert_eq!(cmd.state, MockCommandBufferState::Recording, "end on {command_buffer:?} which is not recording");
        cmd.state = MockCommandBufferState::Executable;
        state.events.push(MockEvent::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> GfxResult<vk::Fence> {
        let mut state = self.state.borrow_mut();
        let fence: vk::Fence = state.create_object();
        let fence_state = if signaled { MockFenceState::Signaled } else { MockFenceState::Unsignaled };
        state.fences.insert(fence, fence_state);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        assert_ne!(state.fences.get(&fence), Some(&MockFenceState::Pending), "destroying pending fence {fence:?}");
        state.fences.remove(&fence);
        state.destroy_object(fence, "fence");
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        for fence in fences {
            state.events.push(MockEvent::WaitForFence(*fence));
            match state.fences.get(fence).copied() {
                Some(MockFenceState::Signaled) => {}
                Some(MockFenceState::Pending) => {
                    let last = state
                        .submissions
                        .iter()
                        .rposition(|s| s.fence == *fence && !s.completed)
                        .unwrap_or_else(|| panic!("pending fence {fence:?} has no submission"));
                    state.complete_submissions(last, |_| true);
                }
                Some(MockFenceState::Unsignaled) if timeout == u64::MAX => {
                    panic!("waiting forever on fence {fence:?} which was never submitted")
                }
                Some(MockFenceState::Unsignaled) => {
                    return Err(GfxError::Vk {
                        call: "vkWaitForFences",
                        result: vk::Result::TIMEOUT,
                    });
                }
                None => panic!("waiting on unknown fence {fence:?}"),
            }
        }
        Ok(())
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        for fence in fences {
            let fence_state = state.fences.get_mut(fence).unwrap_or_else(|| panic!("resetting unknown fence {fence:?}"));
            assert_ne!(*fence_state, MockFenceState::Pending, "resetting pending fence {fence:?}");
            *fence_state = MockFenceState::Unsignaled;
            state.events.push(MockEvent::ResetFence(*fence));
        }
        Ok(())
    }

    fn create_semaphore(&self) -> GfxResult<vk::Semaphore> {
        Ok(self.state.borrow_mut().create_object())
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.borrow_mut().destroy_object(semaphore, "semaphore");
    }

    fn queue_submit(&self, queue: GfxQueueType, batches: &[GfxSubmitBatch], fence: vk::Fence) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        state.injected("vkQueueSubmit")?;

        if fence != vk::Fence::null() {
            assert_eq!(
                state.fences.get(&fence),
                Some(&MockFenceState::Unsignaled),
                "submitting with fence {fence:?} which is not unsignaled"
            );
            state.fences.insert(fence, MockFenceState::Pending);
        }

        let mut all_command_buffers = Vec::new();
        for batch in batches {
            for command_buffer in batch.command_buffers() {
                let cmd = state.command_buffer(*command_buffer);
                assert_eq!(
                    cmd.state,
                    MockCommandBufferState::Executable,
                    "submitting {command_buffer:?} which is not executable"
                );
                assert_eq!(cmd.level, vk::CommandBufferLevel::PRIMARY, "submitting secondary {command_buffer:?}");
                let secondaries: Vec<vk::CommandBuffer> = cmd
                    .commands
                    .iter()
                    .filter_map(|c| match c {
                        MockCommand::ExecuteCommands(secondaries) => Some(secondaries.clone()),
                        _ => None,
                    })
                    .flatten()
                    .collect();

                all_command_buffers.push(*command_buffer);
                all_command_buffers.extend(secondaries);
            }

            state.events.push(MockEvent::Submit(MockSubmit {
                queue,
                command_buffers: batch.command_buffers().to_vec(),
                wait_semaphores: batch.wait_infos().to_vec(),
                signal_semaphores: batch.signal_infos().to_vec(),
                fence,
            }));
        }

        for command_buffer in &all_command_buffers {
            state.command_buffer(*command_buffer).pending += 1;
        }
        state.submissions.push(MockSubmission {
            queue,
            command_buffers: all_command_buffers,
            fence,
            completed: false,
        });
        Ok(())
    }

    fn queue_wait_idle(&self, queue: GfxQueueType) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        state.complete_all(|s| s.queue == queue);
        state.events.push(MockEvent::QueueWaitIdle(queue));
        Ok(())
    }

    fn device_wait_idle(&self) -> GfxResult<()> {
        let mut state = self.state.borrow_mut();
        state.complete_all(|_| true);
        state.events.push(MockEvent::DeviceWaitIdle);
        Ok(())
    }

    fn create_descriptor_set_layout(&self, bindings: &[vk::DescriptorSetLayoutBinding<'_>]) -> GfxResult<vk::DescriptorSetLayout> {
        let mut state = self.state.borrow_mut();
        let layout: vk::DescriptorSetLayout = state.create_object();
        let bindings = bindings.iter().map(|b| (b.binding, b.descriptor_type, b.descriptor_count)).collect();
        state.set_layouts.insert(layout, bindings);
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state.borrow_mut().destroy_object(layout, "descriptor set layout");
    }

    fn create_descriptor_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> GfxResult<vk::DescriptorPool> {
        let mut state = self.state.borrow_mut();
        let pool: vk::DescriptorPool = state.create_object();
        let sizes: Vec<(vk::DescriptorType, u32)> = pool_sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect();
        let mut remaining = HashMap::new();
        for (ty, count) in &sizes {
            *remaining.entry(*ty).or_insert(0) += count;
        }
        state.descriptor_pools.insert(
            pool,
            MockDescriptorPool {
                max_sets,
                sizes,
                remaining_sets: max_sets,
                remaining,
            },
        );
        state.created_pool_count += 1;
        state.last_pool = Some(pool);
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.borrow_mut();
        state.destroy_object(pool, "descriptor pool");
        state.descriptor_pools.remove(&pool);
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> GfxResult<Vec<vk::DescriptorSet>> {
        let mut state = self.state.borrow_mut();
        let out_of_memory = || GfxError::Vk {
            call: "vkAllocateDescriptorSets",
            result: vk::Result::ERROR_OUT_OF_POOL_MEMORY,
        };

        let mut required: HashMap<vk::DescriptorType, u32> = HashMap::new();
        for layout in layouts {
            let bindings = state.set_layouts.get(layout).unwrap_or_else(|| panic!("unknown layout {layout:?}"));
            for (_, ty, count) in bindings {
                *required.entry(*ty).or_insert(0) += count;
            }
        }

        let Some(mock_pool) = state.descriptor_pools.get_mut(&pool) else {
            panic!("allocating from unknown descriptor pool {pool:?}");
        };
        if mock_pool.remaining_sets < layouts.len() as u32 {
            return Err(out_of_memory());
        }
        for (ty, count) in &required {
            if mock_pool.remaining.get(ty).copied().unwrap_or(0) < *count {
                return Err(out_of_memory());
            }
        }
        mock_pool.remaining_sets -= layouts.len() as u32;
        for (ty, count) in required {
            if let Some(remaining) = mock_pool.remaining.get_mut(&ty) {
                *remaining -= count;
            }
        }

        Ok((0..layouts.len()).map(|_| state.next_handle()).collect())
    }

    fn update_descriptor_sets(&self, writes: &[GfxDescriptorWrite]) {
        let mut state = self.state.borrow_mut();
        for write in writes {
            state.descriptor_writes.entry(write.dst_set).or_default().push(write.clone());
        }
    }

    fn create_render_pass(&self, _create_info: &vk::RenderPassCreateInfo<'_>) -> GfxResult<vk::RenderPass> {
        Ok(self.state.borrow_mut().create_object())
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.borrow_mut().destroy_object(render_pass, "render pass");
    }

    fn create_framebuffer(&self, create_info: &vk::FramebufferCreateInfo<'_>) -> GfxResult<vk::Framebuffer> {
        let mut state = self.state.borrow_mut();
        let framebuffer: vk::Framebuffer = state.create_object();
        state.framebuffer_attachment_counts.insert(framebuffer, create_info.attachment_count);
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state.borrow_mut().destroy_object(framebuffer, "framebuffer");
    }

    fn cmd_begin_render_pass(
        &self,
        command_buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            MockCommand::BeginRenderPass {
                render_pass: begin_info.render_pass,
                framebuffer: begin_info.framebuffer,
                extent: [begin_info.render_area.extent.width, begin_info.render_area.extent.height],
                clear_value_count: begin_info.clear_value_count,
                contents,
            },
        );
    }

    fn cmd_end_render_pass(&self, command_buffer: vk::CommandBuffer) {
        self.state.borrow_mut().record(command_buffer, MockCommand::EndRenderPass);
    }

    fn cmd_execute_commands(&self, command_buffer: vk::CommandBuffer, secondary_command_buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.borrow_mut();
        for secondary in secondary_command_buffers {
            let cmd = state.command_buffer(*secondary);
            assert_eq!(cmd.level, vk::CommandBufferLevel::SECONDARY, "executing primary {secondary:?}");
            assert_eq!(
                cmd.state,
                MockCommandBufferState::Executable,
                "executing secondary {secondary:?} which is not executable"
            );
        }
        state.record(command_buffer, MockCommand::ExecuteCommands(secondary_command_buffers.to_vec()));
    }

    fn cmd_bind_pipeline(&self, command_buffer: vk::CommandBuffer, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.state
            .borrow_mut()
            .record(command_buffer, MockCommand::BindPipeline { bind_point, pipeline });
    }

    fn cmd_bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            MockCommand::BindDescriptorSets {
                bind_point,
                first_set,
                sets: descriptor_sets.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffers(
        &self,
        command_buffer: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            MockCommand::BindVertexBuffers {
                first_binding,
                buffers: buffers.to_vec(),
                offsets: offsets.to_vec(),
            },
        );
    }

    fn cmd_bind_index_buffer(
        &self,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            MockCommand::BindIndexBuffer {
                buffer,
                offset,
                index_type,
            },
        );
    }

    fn cmd_push_constants(
        &self,
        command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            MockCommand::PushConstants {
                stages,
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_draw_indexed(
        &self,
        command_buffer: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.state.borrow_mut().record(
            command_buffer,
            MockCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            },
        );
    }

    fn cmd_dispatch(&self, command_buffer: vk::CommandBuffer, group_count: [u32; 3]) {
        self.state.borrow_mut().record(command_buffer, MockCommand::Dispatch(group_count));
    }

    fn cmd_image_barriers(&self, command_buffer: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2<'_>]) {
        let mut state = self.state.borrow_mut();
        for barrier in barriers {
            state.record(
                command_buffer,
                MockCommand::ImageBarrier {
                    image: barrier.image,
                    old_layout: barrier.old_layout,
                    new_layout: barrier.new_layout,
                    src_stage: barrier.src_stage_mask,
                    src_access: barrier.src_access_mask,
                    dst_stage: barrier.dst_stage_mask,
                    dst_access: barrier.dst_access_mask,
                },
            );
        }
    }

    fn cmd_blit_image(
        &self,
        command_buffer: vk::CommandBuffer,
        src: (vk::Image, vk::ImageLayout),
        dst: (vk::Image, vk::ImageLayout),
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        let to_array = |offsets: &[vk::Offset3D; 2]| offsets.map(|o| [o.x, o.y, o.z]);
        let regions = regions.iter().map(|r| (to_array(&r.src_offsets), to_array(&r.dst_offsets))).collect();
        self.state.borrow_mut().record(
            command_buffer,
            MockCommand::BlitImage {
                src,
                dst,
                regions,
                filter,
            },
        );
    }

    fn cmd_clear_color_image(
        &self,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: vk::ClearColorValue,
        _ranges: &[vk::ImageSubresourceRange],
    ) {
        // SAFETY: 只按 float32 解释，任何位模式都是合法的 f32
        let color = unsafe { color.float32 };
        self.state
            .borrow_mut()
            .record(command_buffer, MockCommand::ClearColorImage { image, layout, color });
    }

    fn cmd_bind_shading_rate_image(&self, command_buffer: vk::CommandBuffer, image_view: vk::ImageView, layout: vk::ImageLayout) {
        self.state
            .borrow_mut()
            .record(command_buffer, MockCommand::BindShadingRateImage { image_view, layout });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_wait_completes_submission() {
        let device = MockGfxDevice::new_rc();
        let pool = device.create_command_pool(GfxQueueType::Graphics, vk::CommandPoolCreateFlags::empty()).unwrap();
        let cmd = device.allocate_command_buffers(pool, vk::CommandBufferLevel::PRIMARY, 1).unwrap()[0];
        let fence = device.create_fence(false).unwrap();

        device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default()).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device.queue_submit(GfxQueueType::Graphics, &[GfxSubmitBatch::new(&[cmd])], fence).unwrap();
        assert!(device.is_pending(cmd));
        assert!(!device.is_fence_signaled(fence));

        device.wait_for_fences(&[fence], u64::MAX).unwrap();
        assert!(!device.is_pending(cmd));
        assert!(device.is_fence_signaled(fence));

        device.free_command_buffers(pool, &[cmd]);
        device.destroy_fence(fence);
        device.destroy_command_pool(pool);
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    #[should_panic(expected = "still pending")]
    fn test_begin_pending_command_buffer_panics() {
        let device = MockGfxDevice::new_rc();
        let pool = device.create_command_pool(GfxQueueType::Graphics, vk::CommandPoolCreateFlags::empty()).unwrap();
        let cmd = device.allocate_command_buffers(pool, vk::CommandBufferLevel::PRIMARY, 1).unwrap()[0];

        device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default()).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device.queue_submit(GfxQueueType::Graphics, &[GfxSubmitBatch::new(&[cmd])], vk::Fence::null()).unwrap();
        device.begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default()).unwrap();
    }

    #[test]
    fn test_finite_wait_on_unsubmitted_fence_times_out() {
        let device = MockGfxDevice::new_rc();
        let fence = device.create_fence(false).unwrap();
        let err = device.wait_for_fences(&[fence], 1_000).unwrap_err();
        assert!(matches!(err, GfxError::Vk { result: vk::Result::TIMEOUT, .. }));
        device.destroy_fence(fence);
    }
}
