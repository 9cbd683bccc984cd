use std::ptr::NonNull;
use std::time::Duration;

use crate::commands::command_recorder::GfxCommandRecorder;
use crate::commands::submit_info::GfxSubmitInfo;
use crate::error::GfxResult;
use crate::foundation::queue::GfxQueueType;
use crate::handles::{
    GfxBufferHandle, GfxImageHandle, GfxImageViewHandle, GfxSamplerHandle, GfxSemaphoreHandle,
};
use crate::resources::buffer::{GfxBufferDesc, GfxDevicePtr};
use crate::resources::descriptor::GfxDescriptorWrite;
use crate::resources::image::GfxImageDesc;
use crate::resources::image_view::GfxImageViewDesc;
use crate::sampler::GfxSamplerDesc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxSemaphoreKind {
    Binary,
    Timeline { initial_value: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxSemaphoreDesc {
    pub name: String,
    pub kind: GfxSemaphoreKind,
}
impl GfxSemaphoreDesc {
    #[inline]
    pub fn timeline(name: impl Into<String>, initial_value: u64) -> Self {
        Self {
            name: name.into(),
            kind: GfxSemaphoreKind::Timeline { initial_value },
        }
    }

    #[inline]
    pub fn binary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: GfxSemaphoreKind::Binary,
        }
    }
}

/// 逻辑设备 + 队列
///
/// 所有方法都只需要 `&self`，实现者自行处理内部同步。
/// 句柄的误用（销毁两次、使用已销毁的句柄）属于编程错误，实现可以直接 panic。
pub trait GfxDevice {
    // buffer
    fn create_buffer(&self, desc: &GfxBufferDesc) -> GfxResult<GfxBufferHandle>;
    fn destroy_buffer(&self, buffer: GfxBufferHandle);
    fn get_buffer_device_ptr(&self, buffer: GfxBufferHandle) -> GfxDevicePtr;
    /// host 可见的 buffer 返回持久映射的指针，device local 的 buffer 返回 None
    fn map_buffer(&self, buffer: GfxBufferHandle) -> Option<NonNull<u8>>;

    // image
    fn create_image(&self, desc: &GfxImageDesc) -> GfxResult<GfxImageHandle>;
    fn destroy_image(&self, image: GfxImageHandle);
    fn create_image_view(&self, image: GfxImageHandle, desc: &GfxImageViewDesc) -> GfxResult<GfxImageViewHandle>;
    fn destroy_image_view(&self, view: GfxImageViewHandle);

    // sampler
    fn create_sampler(&self, desc: &GfxSamplerDesc) -> GfxResult<GfxSamplerHandle>;
    fn destroy_sampler(&self, sampler: GfxSamplerHandle);

    /// 写入全局 bindless descriptor 表的 `index` 槽位
    fn write_descriptor(&self, index: u32, write: GfxDescriptorWrite);

    // semaphore
    fn create_semaphore(&self, desc: &GfxSemaphoreDesc) -> GfxResult<GfxSemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: GfxSemaphoreHandle);
    /// timeline semaphore 当前的值
    fn semaphore_value(&self, semaphore: GfxSemaphoreHandle) -> u64;
    /// 阻塞直到 timeline semaphore 的值不小于 `value`
    fn wait_for_semaphore(&self, semaphore: GfxSemaphoreHandle, value: u64, timeout: Duration) -> GfxResult<()>;

    // commands
    fn begin_command_buffer(&self, queue: GfxQueueType, name: &str) -> GfxResult<Box<dyn GfxCommandRecorder>>;
    fn submit(&self, queue: GfxQueueType, submit_info: GfxSubmitInfo) -> GfxResult<()>;
    fn wait_idle(&self) -> GfxResult<()>;
}
