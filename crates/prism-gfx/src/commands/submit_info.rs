use ash::vk;
use itertools::Itertools;

/// 一次队列提交的描述：command buffers + 等待/触发的 semaphore
///
/// 只保存句柄，真正的 `vk::SubmitInfo2` 在提交时由设备构建，因此可以自由 clone 和检查。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxSubmitBatch {
    command_buffers: Vec<vk::CommandBuffer>,
    wait_infos: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
    signal_infos: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
}

impl GfxSubmitBatch {
    pub fn new(command_buffers: &[vk::CommandBuffer]) -> Self {
        Self {
            command_buffers: command_buffers.to_vec(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn wait(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.wait_infos.push((semaphore, stage));
        self
    }

    /// 所有 semaphore 使用同一个等待阶段
    #[inline]
    pub fn wait_all(mut self, semaphores: &[vk::Semaphore], stage: vk::PipelineStageFlags2) -> Self {
        self.wait_infos.extend(semaphores.iter().map(|s| (*s, stage)));
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: vk::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signal_infos.push((semaphore, stage));
        self
    }
}

// getters
impl GfxSubmitBatch {
    #[inline]
    pub fn command_buffers(&self) -> &[vk::CommandBuffer] {
        &self.command_buffers
    }

    #[inline]
    pub fn wait_semaphores(&self) -> Vec<vk::Semaphore> {
        self.wait_infos.iter().map(|(s, _)| *s).collect_vec()
    }

    #[inline]
    pub fn wait_infos(&self) -> &[(vk::Semaphore, vk::PipelineStageFlags2)] {
        &self.wait_infos
    }

    #[inline]
    pub fn signal_infos(&self) -> &[(vk::Semaphore, vk::PipelineStageFlags2)] {
        &self.signal_infos
    }
}
