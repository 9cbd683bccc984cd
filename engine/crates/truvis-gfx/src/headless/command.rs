use ash::vk;

use crate::commands::barrier::{GfxImageBarrier, GfxMemoryBarrier};
use crate::commands::rendering_info::GfxRenderingInfo;
use crate::commands::submit_info::GfxSemaphoreSubmitInfo;
use crate::foundation::queue::GfxQueueType;
use crate::handles::GfxImageHandle;
use crate::resources::buffer::GfxBufferView;

/// headless 录制下来的一条命令
#[derive(Clone, Debug, PartialEq)]
pub enum HeadlessCommand {
    PipelineBarrier {
        memory_barriers: Vec<GfxMemoryBarrier>,
        image_barriers: Vec<GfxImageBarrier>,
    },
    CopyBuffer {
        src: GfxBufferView,
        dst: GfxBufferView,
    },
    FillBuffer {
        dst: GfxBufferView,
        value: u32,
    },
    ClearImage {
        image: GfxImageHandle,
        layout: vk::ImageLayout,
        value: glam::Vec4,
    },
    Dispatch(glam::UVec3),
    BeginRendering(GfxRenderingInfo),
    SetViewport {
        width: f32,
        height: f32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    EndRendering,
    BeginLabel(String),
    EndLabel,
}
impl HeadlessCommand {
    #[inline]
    pub fn is_barrier(&self) -> bool {
        matches!(self, Self::PipelineBarrier { .. })
    }
}

/// 一个 command buffer 的录制结果
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessCommandBufferRecord {
    pub name: String,
    pub queue: GfxQueueType,
    pub commands: Vec<HeadlessCommand>,
}

/// 一次已经完成的提交
#[derive(Clone, Debug, PartialEq)]
pub struct HeadlessSubmission {
    pub queue: GfxQueueType,
    pub command_buffers: Vec<HeadlessCommandBufferRecord>,
    pub waits: Vec<GfxSemaphoreSubmitInfo>,
    pub signals: Vec<GfxSemaphoreSubmitInfo>,
}
impl HeadlessSubmission {
    /// 所有 command buffer 中的 label，按录制顺序
    pub fn labels(&self) -> Vec<&str> {
        self.command_buffers
            .iter()
            .flat_map(|cmd| cmd.commands.iter())
            .filter_map(|command| match command {
                HeadlessCommand::BeginLabel(label) => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }
}
