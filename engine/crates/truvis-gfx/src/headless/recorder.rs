use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;

use crate::commands::barrier::{GfxImageBarrier, GfxMemoryBarrier};
use crate::commands::command_recorder::GfxCommandRecorder;
use crate::commands::rendering_info::GfxRenderingInfo;
use crate::commands::submit_info::GfxCommandBuffer;
use crate::foundation::queue::GfxQueueType;
use crate::handles::GfxImageHandle;
use crate::headless::command::{HeadlessCommand, HeadlessCommandBufferRecord};
use crate::headless::device::HeadlessState;
use crate::resources::buffer::GfxBufferView;

/// 把命令记录到内存中，`end` 时交给 device 保存，提交时才真正执行
pub struct HeadlessCommandRecorder {
    state: Arc<Mutex<HeadlessState>>,
    queue: GfxQueueType,
    name: String,
    commands: Vec<HeadlessCommand>,
    rendering: bool,
}
impl HeadlessCommandRecorder {
    pub(crate) fn new(state: Arc<Mutex<HeadlessState>>, queue: GfxQueueType, name: &str) -> Self {
        Self {
            state,
            queue,
            name: name.to_string(),
            commands: Vec::new(),
            rendering: false,
        }
    }

    fn validation_error(&self, msg: String) {
        self.state.lock().validation_errors.push(format!("[{}] {}", self.name, msg));
    }
}
impl GfxCommandRecorder for HeadlessCommandRecorder {
    #[inline]
    fn queue(&self) -> GfxQueueType {
        self.queue
    }

    fn pipeline_barrier(&mut self, memory_barriers: &[GfxMemoryBarrier], image_barriers: &[GfxImageBarrier]) {
        if memory_barriers.is_empty() && image_barriers.is_empty() {
            return;
        }
        self.commands.push(HeadlessCommand::PipelineBarrier {
            memory_barriers: memory_barriers.to_vec(),
            image_barriers: image_barriers.to_vec(),
        });
    }

    fn copy_buffer(&mut self, src: &GfxBufferView, dst: &GfxBufferView) {
        self.commands.push(HeadlessCommand::CopyBuffer { src: *src, dst: *dst });
    }

    fn fill_buffer(&mut self, dst: &GfxBufferView, value: u32) {
        self.commands.push(HeadlessCommand::FillBuffer { dst: *dst, value });
    }

    fn clear_image(&mut self, image: GfxImageHandle, layout: vk::ImageLayout, value: glam::Vec4) {
        self.commands.push(HeadlessCommand::ClearImage { image, layout, value });
    }

    fn dispatch(&mut self, group_count: glam::UVec3) {
        self.commands.push(HeadlessCommand::Dispatch(group_count));
    }

    fn begin_rendering(&mut self, info: &GfxRenderingInfo) {
        if self.queue != GfxQueueType::Main {
            self.validation_error(format!("begin_rendering on {} queue", self.queue));
        }
        if self.rendering {
            self.validation_error("nested begin_rendering".to_string());
        }
        self.rendering = true;
        self.commands.push(HeadlessCommand::BeginRendering(info.clone()));
    }

    fn set_viewport(&mut self, viewport: vk::Viewport) {
        self.commands.push(HeadlessCommand::SetViewport {
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn end_rendering(&mut self) {
        if !self.rendering {
            self.validation_error("end_rendering without begin_rendering".to_string());
        }
        self.rendering = false;
        self.commands.push(HeadlessCommand::EndRendering);
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        if !self.rendering {
            self.validation_error("draw outside of rendering".to_string());
        }
        self.commands.push(HeadlessCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn begin_label(&mut self, label: &str) {
        self.commands.push(HeadlessCommand::BeginLabel(label.to_string()));
    }

    fn end_label(&mut self) {
        self.commands.push(HeadlessCommand::EndLabel);
    }

    fn end(self: Box<Self>) -> GfxCommandBuffer {
        let this = *self;
        if this.rendering {
            this.validation_error("command buffer ended inside rendering".to_string());
        }
        let record = HeadlessCommandBufferRecord {
            name: this.name,
            queue: this.queue,
            commands: this.commands,
        };
        let handle = this.state.lock().command_buffers.insert(record);
        GfxCommandBuffer::new(handle, this.queue)
    }
}
