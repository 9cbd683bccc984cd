//! Buffer 资源定义

use ash::vk;

use truvis_gfx::foundation::queue::GfxQueueType;
use truvis_gfx::resources::buffer::{GfxBufferView, GfxMemoryHeap};

use super::barrier::RgAccessTracker;
use super::handle::{RgBufferKey, RgPassId};
use super::resource_state::RgBufferState;

/// 带类型的 buffer 创建参数
#[derive(Clone, Debug)]
pub struct RgBufferCreateInfo<T> {
    pub name: String,
    pub heap: GfxMemoryHeap,
    /// 元素个数
    pub count: usize,
    /// 每个元素的初始值，由一个隐藏的 fill pass 写入
    pub init: Option<T>,
    /// fill pass 所在的队列
    pub init_queue: GfxQueueType,
}
impl<T> RgBufferCreateInfo<T> {
    pub fn new(name: impl Into<String>, heap: GfxMemoryHeap, count: usize) -> Self {
        Self {
            name: name.into(),
            heap,
            count,
            init: None,
            init_queue: GfxQueueType::Main,
        }
    }

    #[inline]
    pub fn with_init(mut self, value: T) -> Self {
        self.init = Some(value);
        self
    }

    #[inline]
    pub fn with_init_queue(mut self, queue: GfxQueueType) -> Self {
        self.init_queue = queue;
        self
    }
}

/// 本帧的一块物理 buffer
pub(crate) struct RgPhysicalBuffer {
    pub name: String,
    pub heap: GfxMemoryHeap,
    pub size: vk::DeviceSize,
    /// 通过 `set_external_buffer` 绑定的外部 buffer，否则在 build 时由 bump allocator 分配
    pub external: Option<GfxBufferView>,
    pub tracker: RgAccessTracker,
}

/// 虚拟 buffer 的一个版本
pub(crate) struct RgBuffer {
    pub name: String,
    /// 物理 buffer 的下标
    pub parent: u32,
    /// 产生这个版本的 pass，None 表示直接创建
    pub def: Option<RgPassId>,
    /// 覆盖这个版本的 pass
    pub kill: Option<RgPassId>,
    /// 下一个版本
    pub child: Option<RgBufferKey>,
}

/// pass 对 buffer 的一次使用
#[derive(Clone, Copy, Debug)]
pub(crate) struct RgBufferUse {
    pub physical: u32,
    /// 字节偏移
    pub offset: vk::DeviceSize,
    pub state: RgBufferState,
}
