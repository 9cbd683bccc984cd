use ash::vk;

use crate::handles::{GfxCommandBufferHandle, GfxSemaphoreHandle};
use crate::foundation::queue::GfxQueueType;

/// 录制完成的 command buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxCommandBuffer {
    pub(crate) handle: GfxCommandBufferHandle,
    pub(crate) queue: GfxQueueType,
}
impl GfxCommandBuffer {
    #[inline]
    pub fn new(handle: GfxCommandBufferHandle, queue: GfxQueueType) -> Self {
        Self { handle, queue }
    }
    #[inline]
    pub fn handle(&self) -> GfxCommandBufferHandle {
        self.handle
    }
    #[inline]
    pub fn queue(&self) -> GfxQueueType {
        self.queue
    }
}

/// 提交时等待或者 signal 的 semaphore
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxSemaphoreSubmitInfo {
    pub semaphore: GfxSemaphoreHandle,
    /// wait 时表示阻塞的 stage，signal 时表示需要完成的 stage
    pub stage: vk::PipelineStageFlags2,
    /// Timeline semaphore 的值（binary semaphore 为 None）
    pub value: Option<u64>,
}
impl GfxSemaphoreSubmitInfo {
    /// 创建 binary semaphore
    #[inline]
    pub fn binary(semaphore: GfxSemaphoreHandle, stage: vk::PipelineStageFlags2) -> Self {
        Self {
            semaphore,
            stage,
            value: None,
        }
    }

    /// 创建 timeline semaphore
    #[inline]
    pub fn timeline(semaphore: GfxSemaphoreHandle, stage: vk::PipelineStageFlags2, value: u64) -> Self {
        Self {
            semaphore,
            stage,
            value: Some(value),
        }
    }
}

/// Gfx 关于 submitInfo 的封装，更易用
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<GfxCommandBuffer>,
    wait_infos: Vec<GfxSemaphoreSubmitInfo>,
    signal_infos: Vec<GfxSemaphoreSubmitInfo>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[GfxCommandBuffer]) -> Self {
        Self {
            command_buffers: commands.to_vec(),
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }

    #[inline]
    pub fn wait(mut self, semaphore: GfxSemaphoreHandle, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.wait_infos.push(GfxSemaphoreSubmitInfo { semaphore, stage, value });
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: GfxSemaphoreHandle, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.signal_infos.push(GfxSemaphoreSubmitInfo { semaphore, stage, value });
        self
    }

    #[inline]
    pub fn waits(mut self, infos: &[GfxSemaphoreSubmitInfo]) -> Self {
        self.wait_infos.extend_from_slice(infos);
        self
    }

    #[inline]
    pub fn signals(mut self, infos: &[GfxSemaphoreSubmitInfo]) -> Self {
        self.signal_infos.extend_from_slice(infos);
        self
    }
}
// getters
impl GfxSubmitInfo {
    #[inline]
    pub fn command_buffers(&self) -> &[GfxCommandBuffer] {
        &self.command_buffers
    }
    #[inline]
    pub fn wait_infos(&self) -> &[GfxSemaphoreSubmitInfo] {
        &self.wait_infos
    }
    #[inline]
    pub fn signal_infos(&self) -> &[GfxSemaphoreSubmitInfo] {
        &self.signal_infos
    }
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.command_buffers.is_empty() && self.wait_infos.is_empty() && self.signal_infos.is_empty()
    }
}
