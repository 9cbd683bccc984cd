//! 编译后的 RenderGraph
//!
//! `build` 的产物：按声明顺序排列的 pass，每个 pass 已经带有解析好的 barrier、
//! attachment 以及 semaphore 的 wait / signal。执行阶段不再做任何依赖分析。

use ash::vk;
use itertools::Itertools;

use truvis_gfx::commands::barrier::{GfxImageBarrier, GfxMemoryBarrier};
use truvis_gfx::commands::rendering_info::GfxRenderingInfo;
use truvis_gfx::commands::submit_info::GfxSemaphoreSubmitInfo;
use truvis_gfx::foundation::queue::GfxQueueType;

use super::pass::{RgPassCallback, RgPassKind};
use super::runtime::RgRuntime;

/// 编译后的 pass
pub struct RgRtPass<'a> {
    pub(crate) name: String,
    /// host pass 为 None
    pub(crate) queue: Option<GfxQueueType>,
    /// 队列上的 time，也是 signal 时的 semaphore 值；host pass 为 0
    pub(crate) time: u64,
    pub(crate) kind: RgPassKind,

    pub(crate) memory_barriers: Vec<GfxMemoryBarrier>,
    pub(crate) image_barriers: Vec<GfxImageBarrier>,
    pub(crate) wait_semaphores: Vec<GfxSemaphoreSubmitInfo>,
    pub(crate) signal_semaphores: Vec<GfxSemaphoreSubmitInfo>,

    pub(crate) rendering: Option<GfxRenderingInfo>,

    pub(crate) callback: Option<RgPassCallback<'a>>,
}
// getters
impl RgRtPass<'_> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
    #[inline]
    pub fn queue(&self) -> Option<GfxQueueType> {
        self.queue
    }
    #[inline]
    pub fn time(&self) -> u64 {
        self.time
    }
    #[inline]
    pub fn kind(&self) -> RgPassKind {
        self.kind
    }
    #[inline]
    pub fn memory_barriers(&self) -> &[GfxMemoryBarrier] {
        &self.memory_barriers
    }
    #[inline]
    pub fn image_barriers(&self) -> &[GfxImageBarrier] {
        &self.image_barriers
    }
    #[inline]
    pub fn wait_semaphores(&self) -> &[GfxSemaphoreSubmitInfo] {
        &self.wait_semaphores
    }
    #[inline]
    pub fn signal_semaphores(&self) -> &[GfxSemaphoreSubmitInfo] {
        &self.signal_semaphores
    }
    #[inline]
    pub fn rendering(&self) -> Option<&GfxRenderingInfo> {
        self.rendering.as_ref()
    }

    #[inline]
    pub fn has_barriers(&self) -> bool {
        !self.memory_barriers.is_empty() || !self.image_barriers.is_empty()
    }
}

pub struct RenderGraph<'a> {
    pub(crate) frame_index: u64,
    pub(crate) passes: Vec<RgRtPass<'a>>,
    pub(crate) runtime: RgRuntime<'a>,
}
// getters
impl<'a> RenderGraph<'a> {
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// 所有 pass，按执行顺序
    #[inline]
    pub fn passes(&self) -> &[RgRtPass<'a>] {
        &self.passes
    }

    pub fn pass(&self, name: &str) -> Option<&RgRtPass<'a>> {
        self.passes.iter().find(|pass| pass.name == name)
    }

    /// 某个队列上的 pass，按执行顺序
    pub fn queue_passes(&self, queue: GfxQueueType) -> impl Iterator<Item = &RgRtPass<'a>> {
        self.passes.iter().filter(move |pass| pass.queue == Some(queue))
    }

    #[inline]
    pub fn runtime(&self) -> &RgRuntime<'a> {
        &self.runtime
    }
}
// debug
impl RenderGraph<'_> {
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!("║ Frame: {}  |  Total Passes: {}", self.frame_index, self.passes.len());
        for queue in GfxQueueType::ALL {
            log::info!(
                "║ {:<5}: [{}]",
                queue,
                self.queue_passes(queue).map(|pass| pass.name.as_str()).join(" → ")
            );
        }
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (order, pass) in self.passes.iter().enumerate() {
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            match pass.queue {
                Some(queue) => log::info!(
                    "│ [{}/{}] Pass: \"{}\" ({:?} on {} @ {})",
                    order + 1,
                    self.passes.len(),
                    pass.name,
                    pass.kind,
                    queue,
                    pass.time
                ),
                None => log::info!("│ [{}/{}] Pass: \"{}\" (host)", order + 1, self.passes.len(), pass.name),
            }
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for wait in &pass.wait_semaphores {
                log::info!(
                    "│   ⏳ wait {:?} = {:?} (stage: {})",
                    wait.semaphore,
                    wait.value,
                    format_pipeline_stage(wait.stage)
                );
            }

            if pass.has_barriers() {
                log::info!(
                    "│ Barriers: {} memory, {} image",
                    pass.memory_barriers.len(),
                    pass.image_barriers.len()
                );
                for barrier in &pass.memory_barriers {
                    log::info!("│   🔒 Memory:");
                    log::info!(
                        "│       Stage:  {} → {}",
                        format_pipeline_stage(barrier.src_stage()),
                        format_pipeline_stage(barrier.dst_stage())
                    );
                    log::info!(
                        "│       Access: {} → {}",
                        format_access_flags(barrier.src_access()),
                        format_access_flags(barrier.dst_access())
                    );
                }
                for barrier in &pass.image_barriers {
                    log::info!("│   🔒 Image {:?}:", barrier.get_image());
                    log::info!("│       Layout: {:?} → {:?}", barrier.old_layout(), barrier.new_layout());
                    log::info!(
                        "│       Stage:  {} → {}",
                        format_pipeline_stage(barrier.src_stage()),
                        format_pipeline_stage(barrier.dst_stage())
                    );
                    log::info!(
                        "│       Access: {} → {}",
                        format_access_flags(barrier.src_access()),
                        format_access_flags(barrier.dst_access())
                    );
                    if let Some((src, dst)) = barrier.queues() {
                        log::info!("│       Queue:  {} → {}", src, dst);
                    }
                }
            } else {
                log::info!("│ No barriers required");
            }

            for signal in &pass.signal_semaphores {
                log::info!("│   📣 signal {:?} = {:?}", signal.semaphore, signal.value);
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }
}

pub(crate) fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    if stage == vk::PipelineStageFlags2::NONE {
        return "NONE".to_string();
    }

    const NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
    ];
    let names = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", stage) } else { names.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub(crate) fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }

    const NAMES: &[(vk::AccessFlags2, &str)] = &[
        (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
        (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
        (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
        (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
        (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
        (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
        (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
        (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
        (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
        (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
        (vk::AccessFlags2::HOST_WRITE, "HOST_WRITE"),
        (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
        (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
    ];
    let names = NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", access) } else { names.join(" | ") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_flags() {
        assert_eq!(format_pipeline_stage(vk::PipelineStageFlags2::NONE), "NONE");
        assert_eq!(
            format_pipeline_stage(vk::PipelineStageFlags2::COMPUTE_SHADER | vk::PipelineStageFlags2::TRANSFER),
            "COMPUTE_SHADER | TRANSFER"
        );
        assert_eq!(
            format_access_flags(vk::AccessFlags2::TRANSFER_WRITE | vk::AccessFlags2::SHADER_STORAGE_READ),
            "STORAGE_READ | TRANSFER_WRITE"
        );
    }
}
