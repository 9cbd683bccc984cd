//! RenderGraph 的执行
//!
//! 每个 pass 录制到自己的 command buffer 中。同一队列上连续的 pass 合并为一次提交：
//! 遇到需要 wait 的 pass 时先提交之前的命令，需要 signal 的 pass 录制完之后立即提交。

use truvis_gfx::commands::submit_info::{GfxCommandBuffer, GfxSemaphoreSubmitInfo, GfxSubmitInfo};
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::foundation::queue::GfxQueueType;

use super::error::RgResult;
use super::graph::{RenderGraph, RgRtPass};
use super::pass::RgPassCallback;

/// 某个队列上还没有提交的命令
#[derive(Default)]
struct RgQueueBatch {
    command_buffers: Vec<GfxCommandBuffer>,
    waits: Vec<GfxSemaphoreSubmitInfo>,
}
impl RgQueueBatch {
    fn flush(&mut self, device: &dyn GfxDevice, queue: GfxQueueType, signals: &[GfxSemaphoreSubmitInfo]) -> RgResult<()> {
        if self.command_buffers.is_empty() {
            debug_assert!(self.waits.is_empty() && signals.is_empty());
            return Ok(());
        }

        let submit_info = GfxSubmitInfo::new(&self.command_buffers).waits(&self.waits).signals(signals);
        log::trace!(
            "rg: submit {} command buffers to {} ({} waits, {} signals)",
            self.command_buffers.len(),
            queue,
            self.waits.len(),
            signals.len()
        );
        self.command_buffers.clear();
        self.waits.clear();
        device.submit(queue, submit_info)?;
        Ok(())
    }
}

impl RenderGraph<'_> {
    /// 按顺序执行所有 pass 并提交到各自的队列
    ///
    /// 返回之后 GPU 上的工作仍在进行，通过 [`super::RgPersistent::wait_for_queue_time`] 等待
    pub fn execute(mut self, device: &dyn GfxDevice) -> RgResult<()> {
        let _span = truvis_crate_tools::profile_span!("RenderGraph::execute");

        let mut batches: [RgQueueBatch; GfxQueueType::COUNT] = Default::default();
        for mut pass in std::mem::take(&mut self.passes) {
            let Some(callback) = pass.callback.take() else {
                continue;
            };
            let Some(queue) = pass.queue else {
                if let RgPassCallback::Host(callback) = callback {
                    let _span = truvis_crate_tools::profile_span!("host pass");
                    callback(device, &self.runtime);
                }
                continue;
            };

            let batch = &mut batches[queue.index()];
            if !pass.wait_semaphores.is_empty() {
                batch.flush(device, queue, &[])?;
                batch.waits = std::mem::take(&mut pass.wait_semaphores);
            }
            batch.command_buffers.push(self.record_pass(device, queue, &pass, callback)?);
            if !pass.signal_semaphores.is_empty() {
                batch.flush(device, queue, &pass.signal_semaphores)?;
            }
        }

        for queue in GfxQueueType::ALL {
            batches[queue.index()].flush(device, queue, &[])?;
        }
        Ok(())
    }

    fn record_pass(
        &self,
        device: &dyn GfxDevice,
        queue: GfxQueueType,
        pass: &RgRtPass,
        callback: RgPassCallback,
    ) -> RgResult<GfxCommandBuffer> {
        let mut cmd = device.begin_command_buffer(queue, &pass.name)?;
        cmd.begin_label(&pass.name);

        if pass.has_barriers() {
            cmd.pipeline_barrier(&pass.memory_barriers, &pass.image_barriers);
        }

        match callback {
            RgPassCallback::Graphics(callback) => match pass.rendering.as_ref() {
                Some(rendering) => {
                    cmd.begin_rendering(rendering);
                    cmd.set_viewport(rendering.full_viewport());
                    callback(device, &self.runtime, cmd.as_mut());
                    cmd.end_rendering();
                }
                None => callback(device, &self.runtime, cmd.as_mut()),
            },
            RgPassCallback::Compute(callback) | RgPassCallback::Generic(callback) => {
                callback(device, &self.runtime, cmd.as_mut());
            }
            RgPassCallback::Host(_) => unreachable!("host pass \"{}\" scheduled on {}", pass.name, queue),
        }

        cmd.end_label();
        Ok(cmd.end())
    }
}
