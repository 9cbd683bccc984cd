use std::collections::{HashMap, VecDeque};
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use parking_lot::Mutex;
use slotmap::SlotMap;

use truvis_crate_tools::profile_span;

use crate::commands::command_recorder::GfxCommandRecorder;
use crate::commands::rendering_info::GfxLoadOp;
use crate::commands::submit_info::{GfxSemaphoreSubmitInfo, GfxSubmitInfo};
use crate::error::{GfxError, GfxResult};
use crate::foundation::device::{GfxDevice, GfxSemaphoreDesc, GfxSemaphoreKind};
use crate::foundation::queue::GfxQueueType;
use crate::handles::{
    GfxBufferHandle, GfxCommandBufferHandle, GfxImageHandle, GfxImageViewHandle, GfxSamplerHandle,
    GfxSemaphoreHandle,
};
use crate::headless::command::{HeadlessCommand, HeadlessCommandBufferRecord, HeadlessSubmission};
use crate::headless::recorder::HeadlessCommandRecorder;
use crate::resources::buffer::{GfxBufferDesc, GfxBufferView, GfxDevicePtr};
use crate::resources::descriptor::{GfxDescriptorKind, GfxDescriptorWrite};
use crate::resources::image::GfxImageDesc;
use crate::resources::image_view::GfxImageViewDesc;
use crate::sampler::GfxSamplerDesc;

#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessSettings {
    /// device local 内存的上限，None 表示不限制
    pub device_memory_budget: Option<u64>,
}

struct HeadlessBuffer {
    desc: GfxBufferDesc,
    address: vk::DeviceAddress,
    memory: Box<[u8]>,
}

struct HeadlessImage {
    desc: GfxImageDesc,
    layout: vk::ImageLayout,
    clear_value: Option<glam::Vec4>,
}
impl HeadlessImage {
    /// 粗略估计，每个 texel 按 4 字节计算
    fn memory_size(&self) -> u64 {
        let extent = self.desc.extent;
        extent.width as u64 * extent.height as u64 * extent.depth as u64 * self.desc.array_layers as u64 * 4
    }
}

struct HeadlessSemaphore {
    desc: GfxSemaphoreDesc,
    value: u64,
}

pub(crate) struct HeadlessState {
    settings: HeadlessSettings,

    buffers: SlotMap<GfxBufferHandle, HeadlessBuffer>,
    images: SlotMap<GfxImageHandle, HeadlessImage>,
    views: SlotMap<GfxImageViewHandle, (GfxImageHandle, GfxImageViewDesc)>,
    samplers: SlotMap<GfxSamplerHandle, GfxSamplerDesc>,
    semaphores: SlotMap<GfxSemaphoreHandle, HeadlessSemaphore>,
    pub(crate) command_buffers: SlotMap<GfxCommandBufferHandle, HeadlessCommandBufferRecord>,

    descriptors: HashMap<(GfxDescriptorKind, u32), GfxDescriptorWrite>,

    /// 每个队列上尚未满足 wait 条件的提交，按提交顺序
    pending: [VecDeque<GfxSubmitInfo>; GfxQueueType::COUNT],
    completed: Vec<HeadlessSubmission>,

    pub(crate) validation_errors: Vec<String>,

    device_memory_used: u64,
    next_address: vk::DeviceAddress,
}

// new & init
impl HeadlessState {
    const BASE_ADDRESS: vk::DeviceAddress = 0x1_0000;
    const ADDRESS_ALIGNMENT: vk::DeviceAddress = 256;

    fn new(settings: HeadlessSettings) -> Self {
        Self {
            settings,
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
            views: SlotMap::with_key(),
            samplers: SlotMap::with_key(),
            semaphores: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            descriptors: HashMap::new(),
            pending: [VecDeque::new(), VecDeque::new()],
            completed: Vec::new(),
            validation_errors: Vec::new(),
            device_memory_used: 0,
            next_address: Self::BASE_ADDRESS,
        }
    }
}

// memory
impl HeadlessState {
    fn reserve_device_memory(&mut self, size: u64) -> GfxResult<()> {
        if let Some(budget) = self.settings.device_memory_budget {
            if self.device_memory_used + size > budget {
                return Err(GfxError::OutOfDeviceMemory { requested: size, budget });
            }
        }
        self.device_memory_used += size;
        Ok(())
    }

    fn buffer_bytes(&self, view: &GfxBufferView) -> Option<&[u8]> {
        let buffer = self.buffers.get(view.buffer)?;
        let begin = view.offset as usize;
        let end = begin + view.size as usize;
        buffer.memory.get(begin..end)
    }

    fn buffer_bytes_mut(&mut self, view: &GfxBufferView) -> Option<&mut [u8]> {
        let buffer = self.buffers.get_mut(view.buffer)?;
        let begin = view.offset as usize;
        let end = begin + view.size as usize;
        buffer.memory.get_mut(begin..end)
    }
}

// submit
impl HeadlessState {
    fn wait_satisfied(&self, wait: &GfxSemaphoreSubmitInfo) -> bool {
        let Some(semaphore) = self.semaphores.get(wait.semaphore) else {
            return false;
        };
        match (semaphore.desc.kind, wait.value) {
            (GfxSemaphoreKind::Timeline { .. }, Some(value)) => semaphore.value >= value,
            (GfxSemaphoreKind::Binary, _) => semaphore.value > 0,
            (GfxSemaphoreKind::Timeline { .. }, None) => false,
        }
    }

    /// 不断完成所有 wait 已经满足的提交，直到没有进展
    fn pump(&mut self) {
        let _span = profile_span!("HeadlessDevice::pump");
        loop {
            let mut progressed = false;
            for queue in GfxQueueType::ALL {
                while let Some(front) = self.pending[queue.index()].front() {
                    if !front.wait_infos().iter().all(|wait| self.wait_satisfied(wait)) {
                        break;
                    }
                    let Some(submit_info) = self.pending[queue.index()].pop_front() else {
                        break;
                    };
                    self.complete_submission(queue, submit_info);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
    }

    fn complete_submission(&mut self, queue: GfxQueueType, submit_info: GfxSubmitInfo) {
        for wait in submit_info.wait_infos() {
            if let Some(semaphore) = self.semaphores.get_mut(wait.semaphore) {
                if semaphore.desc.kind == GfxSemaphoreKind::Binary {
                    semaphore.value -= 1;
                }
            }
        }

        let mut records = Vec::with_capacity(submit_info.command_buffers().len());
        for cmd in submit_info.command_buffers() {
            let Some(record) = self.command_buffers.remove(cmd.handle()) else {
                self.validation_errors.push(format!("submitted an unknown or already submitted command buffer on {queue}"));
                continue;
            };
            if record.queue != queue {
                self.validation_errors.push(format!(
                    "command buffer \"{}\" recorded for {} submitted to {}",
                    record.name, record.queue, queue
                ));
            }
            for command in &record.commands {
                self.execute(&record.name, command);
            }
            records.push(record);
        }

        for signal in submit_info.signal_infos() {
            let Some(semaphore) = self.semaphores.get_mut(signal.semaphore) else {
                self.validation_errors.push("signal of a destroyed semaphore".to_string());
                continue;
            };
            match (semaphore.desc.kind, signal.value) {
                (GfxSemaphoreKind::Timeline { .. }, Some(value)) => {
                    if value <= semaphore.value {
                        self.validation_errors.push(format!(
                            "timeline semaphore \"{}\" signaled with non-increasing value {} (current {})",
                            semaphore.desc.name, value, semaphore.value
                        ));
                    } else {
                        semaphore.value = value;
                    }
                }
                (GfxSemaphoreKind::Binary, _) => semaphore.value += 1,
                (GfxSemaphoreKind::Timeline { .. }, None) => {
                    self.validation_errors
                        .push(format!("timeline semaphore \"{}\" signaled without a value", semaphore.desc.name));
                }
            }
        }

        self.completed.push(HeadlessSubmission {
            queue,
            command_buffers: records,
            waits: submit_info.wait_infos().to_vec(),
            signals: submit_info.signal_infos().to_vec(),
        });
    }

    fn execute(&mut self, cmd_name: &str, command: &HeadlessCommand) {
        match command {
            HeadlessCommand::PipelineBarrier { image_barriers, .. } => {
                for barrier in image_barriers {
                    let Some(image) = self.images.get_mut(barrier.get_image()) else {
                        self.validation_errors.push(format!("[{cmd_name}] barrier on a destroyed image"));
                        continue;
                    };
                    if barrier.old_layout() != vk::ImageLayout::UNDEFINED && barrier.old_layout() != image.layout {
                        self.validation_errors.push(format!(
                            "[{cmd_name}] image \"{}\" barrier expects {:?} but image is in {:?}",
                            image.desc.name,
                            barrier.old_layout(),
                            image.layout
                        ));
                    }
                    image.layout = barrier.new_layout();
                }
            }
            HeadlessCommand::CopyBuffer { src, dst } => {
                if src.size != dst.size {
                    self.validation_errors
                        .push(format!("[{cmd_name}] copy_buffer size mismatch: {} vs {}", src.size, dst.size));
                    return;
                }
                let Some(data) = self.buffer_bytes(src).map(|bytes| bytes.to_vec()) else {
                    self.validation_errors.push(format!("[{cmd_name}] copy_buffer source out of range"));
                    return;
                };
                match self.buffer_bytes_mut(dst) {
                    Some(bytes) => bytes.copy_from_slice(&data),
                    None => self.validation_errors.push(format!("[{cmd_name}] copy_buffer destination out of range")),
                }
            }
            HeadlessCommand::FillBuffer { dst, value } => {
                if dst.size % 4 != 0 {
                    self.validation_errors.push(format!("[{cmd_name}] fill_buffer size {} is not 4-aligned", dst.size));
                    return;
                }
                match self.buffer_bytes_mut(dst) {
                    Some(bytes) => {
                        for chunk in bytes.chunks_exact_mut(4) {
                            chunk.copy_from_slice(&value.to_le_bytes());
                        }
                    }
                    None => self.validation_errors.push(format!("[{cmd_name}] fill_buffer destination out of range")),
                }
            }
            HeadlessCommand::ClearImage { image, layout, value } => {
                let Some(image) = self.images.get_mut(*image) else {
                    self.validation_errors.push(format!("[{cmd_name}] clear of a destroyed image"));
                    return;
                };
                if *layout != image.layout {
                    self.validation_errors.push(format!(
                        "[{cmd_name}] clear of \"{}\" in {:?} but image is in {:?}",
                        image.desc.name, layout, image.layout
                    ));
                }
                if !matches!(*layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL | vk::ImageLayout::GENERAL) {
                    self.validation_errors
                        .push(format!("[{cmd_name}] clear of \"{}\" in invalid layout {:?}", image.desc.name, layout));
                }
                image.clear_value = Some(*value);
            }
            HeadlessCommand::BeginRendering(info) => {
                let color = info.color_attachments.iter().flatten().map(|att| (att.image, att.layout, att.ops.load));
                for (handle, layout, load) in color.collect::<Vec<_>>() {
                    self.check_attachment(cmd_name, handle, layout);
                    if let GfxLoadOp::Clear(value) = load {
                        if let Some(image) = self.images.get_mut(handle) {
                            image.clear_value = Some(value);
                        }
                    }
                }
                if let Some(depth) = info.depth_attachment {
                    self.check_attachment(cmd_name, depth.image, depth.layout);
                    if let GfxLoadOp::Clear(value) = depth.ops.load {
                        if let Some(image) = self.images.get_mut(depth.image) {
                            image.clear_value = Some(glam::Vec4::splat(value));
                        }
                    }
                }
            }
            HeadlessCommand::Dispatch(_)
            | HeadlessCommand::SetViewport { .. }
            | HeadlessCommand::Draw { .. }
            | HeadlessCommand::EndRendering
            | HeadlessCommand::BeginLabel(_)
            | HeadlessCommand::EndLabel => {}
        }
    }

    fn check_attachment(&mut self, cmd_name: &str, handle: GfxImageHandle, layout: vk::ImageLayout) {
        match self.images.get(handle) {
            Some(image) if image.layout != layout => {
                let msg = format!(
                    "[{cmd_name}] attachment \"{}\" used in {:?} but image is in {:?}",
                    image.desc.name, layout, image.layout
                );
                self.validation_errors.push(msg);
            }
            Some(_) => {}
            None => self.validation_errors.push(format!("[{cmd_name}] attachment is a destroyed image")),
        }
    }
}

/// 纯软件的设备实现
///
/// 可以 `clone`，所有 clone 共享同一份状态
#[derive(Clone)]
pub struct HeadlessDevice {
    state: Arc<Mutex<HeadlessState>>,
}
impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new(HeadlessSettings::default())
    }
}
// new & init
impl HeadlessDevice {
    pub fn new(settings: HeadlessSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(HeadlessState::new(settings))),
        }
    }

    pub fn set_device_memory_budget(&self, budget: Option<u64>) {
        self.state.lock().settings.device_memory_budget = budget;
    }
}
// inspection
impl HeadlessDevice {
    /// 读取整个 buffer 的内容，不区分内存堆
    pub fn read_buffer(&self, buffer: GfxBufferHandle) -> Vec<u8> {
        let state = self.state.lock();
        state.buffers.get(buffer).map(|buffer| buffer.memory.to_vec()).unwrap_or_default()
    }

    /// 按 `T` 读取 view 范围内的内容
    pub fn read_buffer_view<T: bytemuck::Pod>(&self, view: &GfxBufferView) -> Vec<T> {
        let state = self.state.lock();
        let Some(bytes) = state.buffer_bytes(view) else {
            return Vec::new();
        };
        bytes.chunks_exact(std::mem::size_of::<T>()).map(bytemuck::pod_read_unaligned).collect()
    }

    pub fn buffer_desc(&self, buffer: GfxBufferHandle) -> Option<GfxBufferDesc> {
        self.state.lock().buffers.get(buffer).map(|buffer| buffer.desc.clone())
    }

    pub fn image_desc(&self, image: GfxImageHandle) -> Option<GfxImageDesc> {
        self.state.lock().images.get(image).map(|image| image.desc.clone())
    }

    pub fn image_layout(&self, image: GfxImageHandle) -> Option<vk::ImageLayout> {
        self.state.lock().images.get(image).map(|image| image.layout)
    }

    /// 最后一次 clear（包括 attachment 的 load op clear）的值
    pub fn image_clear_value(&self, image: GfxImageHandle) -> Option<glam::Vec4> {
        self.state.lock().images.get(image).and_then(|image| image.clear_value)
    }

    pub fn image_of_view(&self, view: GfxImageViewHandle) -> Option<(GfxImageHandle, GfxImageViewDesc)> {
        self.state.lock().views.get(view).copied()
    }

    pub fn descriptor(&self, kind: GfxDescriptorKind, index: u32) -> Option<GfxDescriptorWrite> {
        self.state.lock().descriptors.get(&(kind, index)).copied()
    }

    pub fn submissions(&self) -> Vec<HeadlessSubmission> {
        self.state.lock().completed.clone()
    }

    pub fn take_submissions(&self) -> Vec<HeadlessSubmission> {
        std::mem::take(&mut self.state.lock().completed)
    }

    /// 尚未完成（wait 条件不满足）的提交数量
    pub fn pending_submission_count(&self) -> usize {
        self.state.lock().pending.iter().map(VecDeque::len).sum()
    }

    pub fn validation_errors(&self) -> Vec<String> {
        self.state.lock().validation_errors.clone()
    }

    pub fn live_buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    pub fn live_image_count(&self) -> usize {
        self.state.lock().images.len()
    }

    pub fn live_image_view_count(&self) -> usize {
        self.state.lock().views.len()
    }

    pub fn live_semaphore_count(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    pub fn device_memory_used(&self) -> u64 {
        self.state.lock().device_memory_used
    }
}

impl GfxDevice for HeadlessDevice {
    fn create_buffer(&self, desc: &GfxBufferDesc) -> GfxResult<GfxBufferHandle> {
        assert!(desc.size > 0, "buffer \"{}\" created with zero size", desc.name);
        let mut state = self.state.lock();
        if !desc.heap.is_host_visible() {
            state.reserve_device_memory(desc.size)?;
        }

        let address = state.next_address;
        state.next_address += desc.size.next_multiple_of(HeadlessState::ADDRESS_ALIGNMENT);

        log::trace!("headless: create buffer \"{}\" ({} bytes, {:?})", desc.name, desc.size, desc.heap);
        Ok(state.buffers.insert(HeadlessBuffer {
            desc: desc.clone(),
            address,
            memory: vec![0u8; desc.size as usize].into_boxed_slice(),
        }))
    }

    fn destroy_buffer(&self, buffer: GfxBufferHandle) {
        let mut state = self.state.lock();
        let buffer = state.buffers.remove(buffer).expect("destroy of an invalid buffer handle");
        if !buffer.desc.heap.is_host_visible() {
            state.device_memory_used -= buffer.desc.size;
        }
    }

    fn get_buffer_device_ptr(&self, buffer: GfxBufferHandle) -> GfxDevicePtr {
        let state = self.state.lock();
        GfxDevicePtr(state.buffers.get(buffer).expect("invalid buffer handle").address)
    }

    fn map_buffer(&self, buffer: GfxBufferHandle) -> Option<NonNull<u8>> {
        let mut state = self.state.lock();
        let buffer = state.buffers.get_mut(buffer)?;
        if !buffer.desc.heap.is_host_visible() {
            return None;
        }
        NonNull::new(buffer.memory.as_mut_ptr())
    }

    fn create_image(&self, desc: &GfxImageDesc) -> GfxResult<GfxImageHandle> {
        assert!(!desc.usage.is_empty(), "image \"{}\" created without usage flags", desc.name);
        let mut state = self.state.lock();
        let image = HeadlessImage {
            desc: desc.clone(),
            layout: vk::ImageLayout::UNDEFINED,
            clear_value: None,
        };
        state.reserve_device_memory(image.memory_size())?;
        log::trace!("headless: create image \"{}\" {:?}", desc.name, desc.extent);
        Ok(state.images.insert(image))
    }

    fn destroy_image(&self, image: GfxImageHandle) {
        let mut state = self.state.lock();
        let image = state.images.remove(image).expect("destroy of an invalid image handle");
        state.device_memory_used -= image.memory_size();
    }

    fn create_image_view(&self, image: GfxImageHandle, desc: &GfxImageViewDesc) -> GfxResult<GfxImageViewHandle> {
        let mut state = self.state.lock();
        if !state.images.contains_key(image) {
            return Err(GfxError::InvalidHandle("image"));
        }
        Ok(state.views.insert((image, *desc)))
    }

    fn destroy_image_view(&self, view: GfxImageViewHandle) {
        self.state.lock().views.remove(view).expect("destroy of an invalid image view handle");
    }

    fn create_sampler(&self, desc: &GfxSamplerDesc) -> GfxResult<GfxSamplerHandle> {
        Ok(self.state.lock().samplers.insert(*desc))
    }

    fn destroy_sampler(&self, sampler: GfxSamplerHandle) {
        self.state.lock().samplers.remove(sampler).expect("destroy of an invalid sampler handle");
    }

    fn write_descriptor(&self, index: u32, write: GfxDescriptorWrite) {
        self.state.lock().descriptors.insert((write.kind(), index), write);
    }

    fn create_semaphore(&self, desc: &GfxSemaphoreDesc) -> GfxResult<GfxSemaphoreHandle> {
        let value = match desc.kind {
            GfxSemaphoreKind::Binary => 0,
            GfxSemaphoreKind::Timeline { initial_value } => initial_value,
        };
        Ok(self.state.lock().semaphores.insert(HeadlessSemaphore {
            desc: desc.clone(),
            value,
        }))
    }

    fn destroy_semaphore(&self, semaphore: GfxSemaphoreHandle) {
        self.state.lock().semaphores.remove(semaphore).expect("destroy of an invalid semaphore handle");
    }

    fn semaphore_value(&self, semaphore: GfxSemaphoreHandle) -> u64 {
        self.state.lock().semaphores.get(semaphore).map(|s| s.value).unwrap_or_default()
    }

    fn wait_for_semaphore(&self, semaphore: GfxSemaphoreHandle, value: u64, _timeout: Duration) -> GfxResult<()> {
        let mut state = self.state.lock();
        state.pump();
        let semaphore = state.semaphores.get(semaphore).ok_or(GfxError::InvalidHandle("semaphore"))?;
        // 所有可以完成的提交都已经完成，仍然达不到就永远达不到
        if semaphore.value >= value { Ok(()) } else { Err(GfxError::Timeout) }
    }

    fn begin_command_buffer(&self, queue: GfxQueueType, name: &str) -> GfxResult<Box<dyn GfxCommandRecorder>> {
        Ok(Box::new(HeadlessCommandRecorder::new(self.state.clone(), queue, name)))
    }

    fn submit(&self, queue: GfxQueueType, submit_info: GfxSubmitInfo) -> GfxResult<()> {
        let _span = profile_span!("HeadlessDevice::submit");
        let mut state = self.state.lock();
        state.pending[queue.index()].push_back(submit_info);
        state.pump();
        Ok(())
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let mut state = self.state.lock();
        state.pump();
        if state.pending.iter().all(VecDeque::is_empty) { Ok(()) } else { Err(GfxError::Timeout) }
    }
}
