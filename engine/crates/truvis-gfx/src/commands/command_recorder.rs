use ash::vk;

use crate::commands::barrier::{GfxImageBarrier, GfxMemoryBarrier};
use crate::commands::rendering_info::GfxRenderingInfo;
use crate::commands::submit_info::GfxCommandBuffer;
use crate::foundation::queue::GfxQueueType;
use crate::handles::GfxImageHandle;
use crate::resources::buffer::GfxBufferView;

/// 命令录制接口
///
/// 由 [`GfxDevice::begin_command_buffer`](crate::foundation::device::GfxDevice::begin_command_buffer) 创建，
/// 录制完成后调用 [`end`](GfxCommandRecorder::end) 得到可以提交的 [`GfxCommandBuffer`]。
pub trait GfxCommandRecorder {
    fn queue(&self) -> GfxQueueType;

    fn pipeline_barrier(&mut self, memory_barriers: &[GfxMemoryBarrier], image_barriers: &[GfxImageBarrier]);

    /// 两个 view 的 size 必须相同
    fn copy_buffer(&mut self, src: &GfxBufferView, dst: &GfxBufferView);

    /// 以 u32 为单位填充，`dst.size` 必须是 4 的倍数
    fn fill_buffer(&mut self, dst: &GfxBufferView, value: u32);

    /// 清除整个图像，图像必须处于 `layout`
    fn clear_image(&mut self, image: GfxImageHandle, layout: vk::ImageLayout, value: glam::Vec4);

    fn dispatch(&mut self, group_count: glam::UVec3);

    fn begin_rendering(&mut self, info: &GfxRenderingInfo);

    fn set_viewport(&mut self, viewport: vk::Viewport);

    fn end_rendering(&mut self);

    fn draw(&mut self, vertex_count: u32, instance_count: u32);

    fn begin_label(&mut self, label: &str);

    fn end_label(&mut self);

    fn end(self: Box<Self>) -> GfxCommandBuffer;
}
