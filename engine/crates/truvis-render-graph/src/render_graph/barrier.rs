//! Barrier 自动计算
//!
//! 每个物理资源持有一个 [`RgAccessTracker`]，按调度顺序依次喂入访问，
//! tracker 给出这次访问之前需要的同步：
//! - 同一队列上：memory barrier 的 src scope，以及 image 的 layout 转换
//! - 跨队列：需要等待的 (队列, time)，由 builder 转换为 timeline semaphore 的 wait/signal
//!
//! 规则：
//! - 写（或者 layout 转换）之前：src 为上次写入之后的所有读；没有读则为上一次写入
//! - 读之前：只有当上一次写入还没有对这个 stage 可见时才需要 barrier，相同状态的连续读不产生 barrier
//! - 跨队列的依赖由 semaphore 保证执行顺序和可见性，只保留 layout 转换

use ash::vk;

use truvis_gfx::foundation::queue::GfxQueueType;

use super::resource_state::WRITE_ACCESS;

/// 某个队列上的某个时间点，等于该队列 timeline semaphore 的值
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgQueuePoint {
    pub queue: GfxQueueType,
    pub time: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct RgLastWrite {
    stage: vk::PipelineStageFlags2,
    /// 只保留写操作的 access
    access: vk::AccessFlags2,
    point: RgQueuePoint,
}

/// 一次 GPU 访问
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RgAccess {
    pub point: RgQueuePoint,
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    /// buffer 为 None
    pub layout: Option<vk::ImageLayout>,
}

/// tracker 对一次访问的判定结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct RgAccessSync {
    /// 同一队列上的 src scope
    pub src: Option<(vk::PipelineStageFlags2, vk::AccessFlags2)>,
    /// (old, new)
    pub layout_transition: Option<(vk::ImageLayout, vk::ImageLayout)>,
    /// 需要等待的其他队列上的时间点
    pub waits: Vec<RgQueuePoint>,
}
impl RgAccessSync {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.src.is_none() && self.layout_transition.is_none() && self.waits.is_empty()
    }
}

/// 单个物理资源的访问历史
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RgAccessTracker {
    layout: vk::ImageLayout,
    last_write: Option<RgLastWrite>,
    /// 上一次写入之后，每个队列上读过的 stage
    read_stages: [vk::PipelineStageFlags2; GfxQueueType::COUNT],
    /// 上一次写入之后，每个队列上最后一次读的时间
    read_times: [Option<u64>; GfxQueueType::COUNT],
    /// 上一次写入已经对每个队列上的哪些 stage 可见
    visible_to: [vk::PipelineStageFlags2; GfxQueueType::COUNT],
}
impl Default for RgAccessTracker {
    fn default() -> Self {
        Self {
            layout: vk::ImageLayout::UNDEFINED,
            last_write: None,
            read_stages: [vk::PipelineStageFlags2::NONE; GfxQueueType::COUNT],
            read_times: [None; GfxQueueType::COUNT],
            visible_to: [vk::PipelineStageFlags2::NONE; GfxQueueType::COUNT],
        }
    }
}
// new & init
impl RgAccessTracker {
    /// 外部资源：调用者告知它在本帧之前的最后状态，视为 main 队列上 time 0 的访问
    pub fn with_initial_state(
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
    ) -> Self {
        let mut tracker = Self {
            layout,
            ..Default::default()
        };
        let point = RgQueuePoint {
            queue: GfxQueueType::Main,
            time: 0,
        };
        let main = GfxQueueType::Main.index();
        if access.intersects(WRITE_ACCESS) {
            tracker.last_write = Some(RgLastWrite {
                stage,
                access: access & WRITE_ACCESS,
                point,
            });
        } else if !stage.is_empty() {
            tracker.read_stages[main] = stage;
            tracker.read_times[main] = Some(point.time);
            tracker.visible_to[main] = stage;
        }
        tracker
    }

    /// 保留访问历史，丢弃图像内容：下一次访问从 UNDEFINED 转换 layout
    pub fn discard_contents(&self) -> Self {
        Self {
            layout: vk::ImageLayout::UNDEFINED,
            ..self.clone()
        }
    }
}
// getters
impl RgAccessTracker {
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// 最后一次访问所在的时间点（写或者读中最晚的）
    pub fn last_access(&self) -> Option<RgQueuePoint> {
        let write = self.last_write.map(|w| w.point);
        let reads = GfxQueueType::ALL
            .iter()
            .filter_map(|q| self.read_times[q.index()].map(|time| RgQueuePoint { queue: *q, time }));
        write.into_iter().chain(reads).max_by_key(|p| p.time)
    }

    /// 上一次写入之后所有队列上读过的 stage
    pub fn read_stages(&self) -> vk::PipelineStageFlags2 {
        self.read_stages.iter().fold(vk::PipelineStageFlags2::NONE, |acc, s| acc | *s)
    }
}
impl RgAccessTracker {
    /// 记录一次访问，返回在它之前需要的同步
    pub fn access(&mut self, access: &RgAccess) -> RgAccessSync {
        let q = access.point.queue.index();
        let layout_change = access.layout.is_some_and(|layout| layout != self.layout);
        let is_write = access.access.intersects(WRITE_ACCESS);

        let mut sync = RgAccessSync::default();

        // 跨队列：RAW / WAW 等待上一次写入
        let cross_write = self.last_write.filter(|w| w.point.queue != access.point.queue);
        if let Some(w) = cross_write {
            sync.waits.push(w.point);
        }
        // 跨队列：WAR 等待其他队列上最后一次读
        if is_write || layout_change {
            for other in GfxQueueType::ALL.iter().filter(|other| **other != access.point.queue) {
                if let Some(time) = self.read_times[other.index()] {
                    sync.waits.push(RgQueuePoint { queue: *other, time });
                }
            }
        }

        let same_queue_write = self.last_write.filter(|w| w.point.queue == access.point.queue);
        if is_write || layout_change {
            sync.src = if !self.read_stages[q].is_empty() {
                Some((self.read_stages[q], vk::AccessFlags2::NONE))
            } else {
                same_queue_write.map(|w| (w.stage, w.access))
            };
            if let Some(new_layout) = access.layout.filter(|_| layout_change) {
                sync.layout_transition = Some((self.layout, new_layout));
                self.layout = new_layout;
            }

            // layout 转换本身也是一次写入
            self.last_write = Some(RgLastWrite {
                stage: access.stage,
                access: access.access & WRITE_ACCESS,
                point: access.point,
            });
            self.read_stages = [vk::PipelineStageFlags2::NONE; GfxQueueType::COUNT];
            self.read_times = [None; GfxQueueType::COUNT];
            self.visible_to = [vk::PipelineStageFlags2::NONE; GfxQueueType::COUNT];
            if !is_write {
                self.read_stages[q] = access.stage;
                self.read_times[q] = Some(access.point.time);
                self.visible_to[q] = access.stage;
            }
        } else {
            if cross_write.is_some() {
                // semaphore 之后，之前的写入对整个队列可见
                self.visible_to[q] = vk::PipelineStageFlags2::ALL_COMMANDS;
            }
            if let Some(w) = same_queue_write {
                if !Self::covers(self.visible_to[q], access.stage) {
                    sync.src = Some((w.stage, w.access));
                    self.visible_to[q] |= access.stage;
                }
            }
            self.read_stages[q] |= access.stage;
            self.read_times[q] = self.read_times[q].max(Some(access.point.time));
        }

        sync
    }

    #[inline]
    fn covers(visible: vk::PipelineStageFlags2, stage: vk::PipelineStageFlags2) -> bool {
        visible.contains(vk::PipelineStageFlags2::ALL_COMMANDS) || visible.contains(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::resource_state::{RgBufferState, RgImageState};

    fn image_access(queue: GfxQueueType, time: u64, state: RgImageState) -> RgAccess {
        RgAccess {
            point: RgQueuePoint { queue, time },
            stage: state.stage,
            access: state.access,
            layout: Some(state.layout),
        }
    }

    fn buffer_access(queue: GfxQueueType, time: u64, state: RgBufferState) -> RgAccess {
        RgAccess {
            point: RgQueuePoint { queue, time },
            stage: state.stage,
            access: state.access,
            layout: None,
        }
    }

    #[test]
    fn test_first_access_only_transitions_layout() {
        let mut tracker = RgAccessTracker::default();
        let sync = tracker.access(&image_access(GfxQueueType::Main, 1, RgImageState::COLOR_ATTACHMENT_WRITE));
        assert_eq!(sync.src, None);
        assert_eq!(
            sync.layout_transition,
            Some((vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
        );
        assert!(sync.waits.is_empty());

        let mut tracker = RgAccessTracker::default();
        let sync = tracker.access(&buffer_access(GfxQueueType::Main, 1, RgBufferState::TRANSFER_DST));
        assert!(sync.is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let mut tracker = RgAccessTracker::default();
        tracker.access(&buffer_access(GfxQueueType::Main, 1, RgBufferState::STORAGE_WRITE_COMPUTE));
        let sync = tracker.access(&buffer_access(GfxQueueType::Main, 2, RgBufferState::INDIRECT_BUFFER));
        assert_eq!(
            sync.src,
            Some((vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_WRITE))
        );

        // 已经可见，不需要再次 barrier
        let sync = tracker.access(&buffer_access(GfxQueueType::Main, 3, RgBufferState::INDIRECT_BUFFER));
        assert!(sync.is_empty());

        // 新的 stage 需要可见性
        let sync = tracker.access(&buffer_access(GfxQueueType::Main, 4, RgBufferState::STORAGE_READ_COMPUTE));
        assert!(sync.src.is_some());
    }

    #[test]
    fn test_same_state_reads_need_no_barrier() {
        let mut tracker = RgAccessTracker::default();
        tracker.access(&image_access(GfxQueueType::Main, 1, RgImageState::TRANSFER_DST));
        let first = tracker.access(&image_access(GfxQueueType::Main, 2, RgImageState::SHADER_READ_FRAGMENT));
        assert!(first.layout_transition.is_some());
        let second = tracker.access(&image_access(GfxQueueType::Main, 3, RgImageState::SHADER_READ_FRAGMENT));
        assert!(second.is_empty());
    }

    #[test]
    fn test_write_after_reads() {
        let mut tracker = RgAccessTracker::default();
        tracker.access(&buffer_access(GfxQueueType::Main, 1, RgBufferState::TRANSFER_DST));
        tracker.access(&buffer_access(GfxQueueType::Main, 2, RgBufferState::UNIFORM_FRAGMENT));
        tracker.access(&buffer_access(GfxQueueType::Main, 3, RgBufferState::UNIFORM_COMPUTE));
        let sync = tracker.access(&buffer_access(GfxQueueType::Main, 4, RgBufferState::TRANSFER_DST));
        assert_eq!(
            sync.src,
            Some((
                vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::NONE
            ))
        );
    }

    #[test]
    fn test_cross_queue_read_after_write() {
        let mut tracker = RgAccessTracker::default();
        tracker.access(&buffer_access(GfxQueueType::Main, 1, RgBufferState::TRANSFER_DST));
        let sync = tracker.access(&buffer_access(GfxQueueType::AsyncCompute, 1, RgBufferState::STORAGE_READ_COMPUTE));
        assert_eq!(sync.src, None);
        assert_eq!(
            sync.waits,
            vec![RgQueuePoint {
                queue: GfxQueueType::Main,
                time: 1
            }]
        );

        // semaphore 之后对 async 队列的所有 stage 可见
        let sync = tracker.access(&buffer_access(GfxQueueType::AsyncCompute, 2, RgBufferState::UNIFORM_COMPUTE));
        assert_eq!(sync.src, None);
    }

    #[test]
    fn test_cross_queue_write_after_read() {
        let mut tracker = RgAccessTracker::default();
        tracker.access(&buffer_access(GfxQueueType::Main, 1, RgBufferState::TRANSFER_DST));
        tracker.access(&buffer_access(GfxQueueType::AsyncCompute, 3, RgBufferState::STORAGE_READ_COMPUTE));
        tracker.access(&buffer_access(GfxQueueType::Main, 2, RgBufferState::TRANSFER_SRC));

        let sync = tracker.access(&buffer_access(GfxQueueType::Main, 4, RgBufferState::TRANSFER_DST));
        assert_eq!(
            sync.waits,
            vec![RgQueuePoint {
                queue: GfxQueueType::AsyncCompute,
                time: 3
            }]
        );
        // 同一队列上的读依然需要执行依赖
        assert_eq!(sync.src, Some((vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::NONE)));
    }

    #[test]
    fn test_external_initial_state() {
        let mut tracker = RgAccessTracker::with_initial_state(
            vk::PipelineStageFlags2::NONE,
            vk::AccessFlags2::NONE,
            vk::ImageLayout::UNDEFINED,
        );
        assert_eq!(tracker.last_access(), None);
        let sync = tracker.access(&image_access(GfxQueueType::Main, 1, RgImageState::COLOR_ATTACHMENT_WRITE));
        assert_eq!(sync.src, None);

        let mut tracker = RgAccessTracker::with_initial_state(
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        let sync = tracker.access(&image_access(GfxQueueType::Main, 1, RgImageState::SHADER_READ_FRAGMENT));
        assert_eq!(sync.src, Some((vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)));
        assert_eq!(tracker.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_discarded_contents_still_wait_for_last_write() {
        let mut tracker = RgAccessTracker::default();
        tracker.access(&image_access(GfxQueueType::AsyncCompute, 1, RgImageState::STORAGE_WRITE_COMPUTE));

        let mut reused = tracker.discard_contents();
        assert_eq!(reused.layout(), vk::ImageLayout::UNDEFINED);
        let sync = reused.access(&image_access(GfxQueueType::Main, 1, RgImageState::STORAGE_WRITE_COMPUTE));
        assert_eq!(
            sync.waits,
            vec![RgQueuePoint {
                queue: GfxQueueType::AsyncCompute,
                time: 1
            }]
        );
        assert_eq!(sync.layout_transition, Some((vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL)));

        // 同一队列上复用：src 为上一次写入
        let mut reused = reused.discard_contents();
        let sync = reused.access(&image_access(GfxQueueType::Main, 2, RgImageState::COLOR_ATTACHMENT_WRITE));
        assert!(sync.waits.is_empty());
        assert_eq!(
            sync.src,
            Some((vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_WRITE))
        );
        assert_eq!(
            sync.layout_transition,
            Some((vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL))
        );
    }
}
