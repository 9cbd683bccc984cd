use std::time::Duration;

/// RenderGraph 的全局配置，在创建 [`RgPersistent`](super::RgPersistent) 时确定
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgSettings {
    /// 为 false 时，声明在 async compute 队列上的 pass 全部调度到 main 队列
    pub async_compute: bool,
    /// `wait_for_queue_time` 的超时时间
    pub queue_semaphore_wait_timeout: Duration,
    /// frames in flight，决定延迟销毁和 transient 池的回收周期
    pub fif_count: usize,
}
impl Default for RgSettings {
    fn default() -> Self {
        Self {
            async_compute: true,
            queue_semaphore_wait_timeout: Duration::from_secs(5),
            fif_count: 3,
        }
    }
}
