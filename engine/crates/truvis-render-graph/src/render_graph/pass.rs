//! Pass 定义
//!
//! pass 由 [`RgBuilder::create_pass`] 创建，通过 [`RgPassBuilder`] 声明读写的资源，
//! 最后挂上一个回调。回调在执行阶段被调用一次。

use ash::vk;

use truvis_gfx::commands::command_recorder::GfxCommandRecorder;
use truvis_gfx::commands::rendering_info::{GfxColorAttachmentOps, GfxDepthAttachmentOps, GfxLoadOp};
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::foundation::queue::GfxQueueType;
use truvis_gfx::handles::GfxSamplerHandle;

use super::builder::RgBuilder;
use super::handle::{RgBufferId, RgBufferToken, RgPassId, RgSemaphoreId, RgTextureId, RgTextureToken};
use super::resource_state::{RgBufferState, RgImageState};
use super::runtime::RgRuntime;

/// 只在 CPU 上执行的回调
pub type RgHostCallback<'a> = Box<dyn FnOnce(&dyn GfxDevice, &RgRuntime) + 'a>;
/// 录制 GPU 命令的回调
pub type RgCommandCallback<'a> = Box<dyn FnOnce(&dyn GfxDevice, &RgRuntime, &mut dyn GfxCommandRecorder) + 'a>;

pub(crate) enum RgPassCallback<'a> {
    Host(RgHostCallback<'a>),
    /// 执行器负责 begin_rendering / end_rendering
    Graphics(RgCommandCallback<'a>),
    Compute(RgCommandCallback<'a>),
    Generic(RgCommandCallback<'a>),
}
impl RgPassCallback<'_> {
    #[inline]
    pub fn kind(&self) -> RgPassKind {
        match self {
            Self::Host(_) => RgPassKind::Host,
            Self::Graphics(_) => RgPassKind::Graphics,
            Self::Compute(_) => RgPassKind::Compute,
            Self::Generic(_) => RgPassKind::Generic,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPassKind {
    Host,
    Graphics,
    Compute,
    Generic,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RgColorAttachmentUse {
    pub token: RgTextureToken,
    pub ops: GfxColorAttachmentOps,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RgDepthAttachmentUse {
    pub token: RgTextureToken,
    pub ops: GfxDepthAttachmentOps,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RgSemaphoreUse {
    pub semaphore: RgSemaphoreId,
    pub stage: vk::PipelineStageFlags2,
    /// binary semaphore 为 None
    pub value: Option<u64>,
}

pub(crate) struct RgPass<'a> {
    pub name: String,
    /// 声明时的队列，async compute 关闭时在调度阶段改为 main
    pub queue: GfxQueueType,

    /// builder 中 buffer_uses / texture_uses 的下标，按声明顺序
    pub buffer_uses: Vec<u32>,
    pub texture_uses: Vec<u32>,

    pub wait_semaphores: Vec<RgSemaphoreUse>,
    pub signal_semaphores: Vec<RgSemaphoreUse>,

    pub color_attachments: Vec<Option<RgColorAttachmentUse>>,
    pub depth_attachment: Option<RgDepthAttachmentUse>,

    pub callback: Option<RgPassCallback<'a>>,

    /// temporal init pass：对应 texture 的第一个物理下标
    pub temporal_init: Option<u32>,
}
impl RgPass<'_> {
    pub fn new(name: String, queue: GfxQueueType) -> Self {
        Self {
            name,
            queue,
            buffer_uses: Vec::new(),
            texture_uses: Vec::new(),
            wait_semaphores: Vec::new(),
            signal_semaphores: Vec::new(),
            color_attachments: Vec::new(),
            depth_attachment: None,
            callback: None,
            temporal_init: None,
        }
    }

    #[inline]
    pub fn has_attachments(&self) -> bool {
        self.depth_attachment.is_some() || self.color_attachments.iter().any(Option::is_some)
    }
}

/// 声明单个 pass 的读写
///
/// 持有 builder 的可变借用，声明完毕后 drop 即可继续创建下一个 pass
pub struct RgPassBuilder<'b, 'a> {
    pub(crate) builder: &'b mut RgBuilder<'a>,
    pub(crate) pass: RgPassId,
}
// getters
impl RgPassBuilder<'_, '_> {
    #[inline]
    pub fn id(&self) -> RgPassId {
        self.pass
    }
}
// buffer
impl<'a> RgPassBuilder<'_, 'a> {
    pub fn read_buffer<T>(&mut self, id: RgBufferId<T>, state: RgBufferState) -> RgBufferToken<T> {
        self.builder.read_buffer(self.pass, id, state, 0)
    }

    /// 从第 `offset` 个元素开始读取
    pub fn read_buffer_at<T>(&mut self, id: RgBufferId<T>, state: RgBufferState, offset: usize) -> RgBufferToken<T> {
        self.builder.read_buffer(self.pass, id, state, offset)
    }

    pub fn write_buffer<T>(
        &mut self,
        name: impl Into<String>,
        id: &mut RgBufferId<T>,
        state: RgBufferState,
    ) -> RgBufferToken<T> {
        self.builder.write_buffer(self.pass, name, id, state)
    }
}
// texture
impl<'a> RgPassBuilder<'_, 'a> {
    pub fn read_texture(&mut self, id: RgTextureId, state: RgImageState) -> RgTextureToken {
        self.builder.read_texture(self.pass, id, state, None, 0)
    }

    /// 读取并分配 combined image sampler 描述符
    pub fn read_sampled_texture(
        &mut self,
        id: RgTextureId,
        state: RgImageState,
        sampler: GfxSamplerHandle,
    ) -> RgTextureToken {
        self.builder.read_texture(self.pass, id, state, Some(sampler), 0)
    }

    /// 读取 temporal texture 第 `history` 帧之前的内容，`id` 必须是第一次声明的 id
    pub fn read_texture_history(
        &mut self,
        id: RgTextureId,
        state: RgImageState,
        sampler: Option<GfxSamplerHandle>,
        history: u32,
    ) -> RgTextureToken {
        self.builder.read_texture(self.pass, id, state, sampler, history)
    }

    pub fn write_texture(&mut self, name: impl Into<String>, id: &mut RgTextureId, state: RgImageState) -> RgTextureToken {
        self.builder.write_texture(self.pass, name, id, state)
    }

    /// 把 `src` 写成一个已经存在的版本 `dst`
    pub fn write_texture_into(&mut self, dst: RgTextureId, src: RgTextureId, state: RgImageState) -> RgTextureToken {
        self.builder.write_texture_into(self.pass, dst, src, state)
    }
}
// attachment
impl<'a> RgPassBuilder<'_, 'a> {
    pub fn write_color_attachment(
        &mut self,
        name: impl Into<String>,
        id: &mut RgTextureId,
        ops: GfxColorAttachmentOps,
        index: usize,
    ) -> RgTextureToken {
        let state = match ops.load {
            GfxLoadOp::Load => RgImageState::COLOR_ATTACHMENT_READ_WRITE,
            _ => RgImageState::COLOR_ATTACHMENT_WRITE,
        };
        let token = self.builder.write_texture(self.pass, name, id, state);

        let pass = &mut self.builder.passes[self.pass];
        if pass.color_attachments.len() <= index {
            pass.color_attachments.resize(index + 1, None);
        }
        assert!(
            pass.color_attachments[index].is_none(),
            "pass \"{}\" binds color attachment {} twice",
            pass.name,
            index
        );
        pass.color_attachments[index] = Some(RgColorAttachmentUse { token, ops });
        token
    }

    pub fn read_depth_attachment(&mut self, id: RgTextureId) -> RgTextureToken {
        let token = self.builder.read_texture(self.pass, id, RgImageState::DEPTH_ATTACHMENT_READ, None, 0);
        self.set_depth_attachment(token, GfxDepthAttachmentOps::read_only());
        token
    }

    pub fn write_depth_attachment(
        &mut self,
        name: impl Into<String>,
        id: &mut RgTextureId,
        ops: GfxDepthAttachmentOps,
    ) -> RgTextureToken {
        let token = self.builder.write_texture(self.pass, name, id, RgImageState::DEPTH_ATTACHMENT_READ_WRITE);
        self.set_depth_attachment(token, ops);
        token
    }

    fn set_depth_attachment(&mut self, token: RgTextureToken, ops: GfxDepthAttachmentOps) {
        let pass = &mut self.builder.passes[self.pass];
        assert!(pass.depth_attachment.is_none(), "pass \"{}\" binds depth attachment twice", pass.name);
        pass.depth_attachment = Some(RgDepthAttachmentUse { token, ops });
    }
}
// semaphore
impl<'a> RgPassBuilder<'_, 'a> {
    pub fn wait_semaphore(&mut self, semaphore: RgSemaphoreId, stage: vk::PipelineStageFlags2, value: Option<u64>) {
        self.builder.passes[self.pass].wait_semaphores.push(RgSemaphoreUse {
            semaphore,
            stage,
            value,
        });
    }

    pub fn signal_semaphore(&mut self, semaphore: RgSemaphoreId, stage: vk::PipelineStageFlags2, value: Option<u64>) {
        self.builder.passes[self.pass].signal_semaphores.push(RgSemaphoreUse {
            semaphore,
            stage,
            value,
        });
    }
}
// callback
impl<'a> RgPassBuilder<'_, 'a> {
    pub fn set_host_callback(self, callback: impl FnOnce(&dyn GfxDevice, &RgRuntime) + 'a) {
        self.set(RgPassCallback::Host(Box::new(callback)));
    }

    /// 图形 pass：执行器在回调前后负责 begin_rendering / end_rendering，并设置覆盖 attachment 的 viewport
    pub fn set_render_pass_callback(
        self,
        callback: impl FnOnce(&dyn GfxDevice, &RgRuntime, &mut dyn GfxCommandRecorder) + 'a,
    ) {
        self.set(RgPassCallback::Graphics(Box::new(callback)));
    }

    pub fn set_compute_callback(
        self,
        callback: impl FnOnce(&dyn GfxDevice, &RgRuntime, &mut dyn GfxCommandRecorder) + 'a,
    ) {
        self.set(RgPassCallback::Compute(Box::new(callback)));
    }

    pub fn set_callback(self, callback: impl FnOnce(&dyn GfxDevice, &RgRuntime, &mut dyn GfxCommandRecorder) + 'a) {
        self.set(RgPassCallback::Generic(Box::new(callback)));
    }

    fn set(self, callback: RgPassCallback<'a>) {
        let pass = &mut self.builder.passes[self.pass];
        assert!(pass.callback.is_none(), "pass \"{}\" already has a callback", pass.name);
        pass.callback = Some(callback);
    }
}
