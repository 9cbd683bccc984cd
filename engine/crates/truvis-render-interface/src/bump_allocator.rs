use std::marker::PhantomData;
use std::ptr::NonNull;

use ash::vk;

use truvis_gfx::commands::barrier::GfxMemoryBarrier;
use truvis_gfx::commands::command_recorder::GfxCommandRecorder;
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::handles::GfxBufferHandle;
use truvis_gfx::resources::buffer::{GfxBufferDesc, GfxBufferView, GfxDevicePtr, GfxMemoryHeap};
use truvis_gfx::{GfxError, GfxResult};

/// 决定 bump allocator 的内存堆、对齐和 buffer usage
pub trait BumpAllocatorPolicy {
    const NAME: &'static str;
    const HEAP: GfxMemoryHeap;
    /// 所有分配的最小对齐，实际对齐为 `max(MIN_ALIGNMENT, align_of::<T>())`
    const MIN_ALIGNMENT: vk::DeviceSize;

    fn buffer_usage() -> vk::BufferUsageFlags;
}

/// device local 内存，只能由 GPU 访问
pub struct DevicePolicy;
impl BumpAllocatorPolicy for DevicePolicy {
    const NAME: &'static str = "device-bump";
    const HEAP: GfxMemoryHeap = GfxMemoryHeap::Default;
    const MIN_ALIGNMENT: vk::DeviceSize = 16;

    fn buffer_usage() -> vk::BufferUsageFlags {
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::INDIRECT_BUFFER
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
    }
}

/// host 可见的内存，CPU 写入，GPU 读取
pub struct UploadPolicy;
impl BumpAllocatorPolicy for UploadPolicy {
    const NAME: &'static str = "upload-bump";
    const HEAP: GfxMemoryHeap = GfxMemoryHeap::Upload;
    /// 同时满足 storage buffer 的 16 字节对齐和 uniform buffer 常见的 64 字节 offset 对齐
    const MIN_ALIGNMENT: vk::DeviceSize = 64;

    fn buffer_usage() -> vk::BufferUsageFlags {
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::UNIFORM_BUFFER
            | vk::BufferUsageFlags::TRANSFER_SRC
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
    }
}

pub type DeviceBumpAllocator = BumpAllocator<DevicePolicy>;
pub type UploadBumpAllocator = BumpAllocator<UploadPolicy>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BumpAllocatorSettings {
    /// 每个 block 的字节数，也是单次分配的上限
    pub block_size: vk::DeviceSize,
}
impl BumpAllocatorSettings {
    pub const DEFAULT_DEVICE_BLOCK_SIZE: vk::DeviceSize = 64 * 1024 * 1024;
    pub const DEFAULT_UPLOAD_BLOCK_SIZE: vk::DeviceSize = 16 * 1024 * 1024;

    #[inline]
    pub fn device_default() -> Self {
        Self {
            block_size: Self::DEFAULT_DEVICE_BLOCK_SIZE,
        }
    }

    #[inline]
    pub fn upload_default() -> Self {
        Self {
            block_size: Self::DEFAULT_UPLOAD_BLOCK_SIZE,
        }
    }
}

struct BumpBlock {
    buffer: GfxBufferHandle,
    device_ptr: GfxDevicePtr,
    /// 只有 upload 策略的 block 才有
    host_ptr: Option<NonNull<u8>>,
}

/// device 策略的分配结果
#[derive(Clone, Copy, Debug)]
pub struct DeviceAllocation<T> {
    pub ptr: GfxDevicePtr,
    pub view: GfxBufferView,
    pub count: usize,
    generation: u64,
    _marker: PhantomData<T>,
}
impl<T> DeviceAllocation<T> {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// upload 策略的分配结果
///
/// host 端的写入必须通过 [`UploadBumpAllocator::write`]，它会拒绝 `reset` 之前的分配
#[derive(Clone, Copy, Debug)]
pub struct UploadAllocation<T> {
    pub device_ptr: GfxDevicePtr,
    pub view: GfxBufferView,
    pub count: usize,
    block: usize,
    generation: u64,
    _marker: PhantomData<T>,
}
impl<T> UploadAllocation<T> {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// 线性分配器
///
/// 由若干固定大小的 block 组成，分配时在当前 block 上移动游标，放不下时切换到下一个 block。
/// block 在第一次用到某个序号时才向设备申请，之后一直保留，只有 `reset` 才会整体回收。
///
/// 每次 `reset` 都会增加 generation，旧 generation 的分配不能再使用。
pub struct BumpAllocator<P: BumpAllocatorPolicy> {
    settings: BumpAllocatorSettings,
    blocks: Vec<BumpBlock>,

    /// 当前 block 的序号，`usize::MAX` 表示还没有开始分配
    block: usize,
    /// 当前 block 内的游标
    offset: vk::DeviceSize,

    generation: u64,

    _policy: PhantomData<P>,
}
// new & init
impl<P: BumpAllocatorPolicy> BumpAllocator<P> {
    pub fn new(settings: BumpAllocatorSettings) -> Self {
        assert!(settings.block_size > 0, "{}: block size must be positive", P::NAME);
        Self {
            settings,
            blocks: Vec::new(),
            block: usize::MAX,
            offset: settings.block_size,
            generation: 0,
            _policy: PhantomData,
        }
    }
}
// destroy
impl<P: BumpAllocatorPolicy> BumpAllocator<P> {
    pub fn destroy(&mut self, device: &dyn GfxDevice) {
        for block in self.blocks.drain(..) {
            device.destroy_buffer(block.buffer);
        }
        self.block = usize::MAX;
        self.offset = self.settings.block_size;
    }
}
impl<P: BumpAllocatorPolicy> Drop for BumpAllocator<P> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(self.blocks.is_empty(), "{} dropped without destroy", P::NAME);
        }
    }
}
// getters
impl<P: BumpAllocatorPolicy> BumpAllocator<P> {
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
    #[inline]
    pub fn block_size(&self) -> vk::DeviceSize {
        self.settings.block_size
    }
}
// allocate
impl<P: BumpAllocatorPolicy> BumpAllocator<P> {
    /// 返回 (block 序号, block 内的 offset)
    fn allocate_raw(
        &mut self,
        device: &dyn GfxDevice,
        size: vk::DeviceSize,
        align: vk::DeviceSize,
    ) -> GfxResult<(usize, vk::DeviceSize)> {
        assert!(size > 0, "{}: zero sized allocation", P::NAME);
        assert!(
            size <= self.settings.block_size,
            "{}: allocation of {} bytes exceeds block size {}",
            P::NAME,
            size,
            self.settings.block_size
        );

        let align = align.max(P::MIN_ALIGNMENT);
        let mut offset = self.offset.next_multiple_of(align);
        if offset + size > self.settings.block_size {
            let next = self.block.wrapping_add(1);
            if next == self.blocks.len() {
                let block = self.create_block(device, next)?;
                self.blocks.push(block);
            }
            self.block = next;
            offset = 0;
        }
        self.offset = offset + size;

        Ok((self.block, offset))
    }

    fn create_block(&self, device: &dyn GfxDevice, index: usize) -> GfxResult<BumpBlock> {
        let _span = truvis_crate_tools::profile_span!("BumpAllocator::create_block");
        log::debug!("{}: allocating block #{} ({} bytes)", P::NAME, index, self.settings.block_size);

        let buffer = device.create_buffer(&GfxBufferDesc {
            name: format!("{}-block-{}", P::NAME, index),
            heap: P::HEAP,
            size: self.settings.block_size,
            usage: P::buffer_usage(),
        })?;
        let host_ptr = if P::HEAP.is_host_visible() {
            match device.map_buffer(buffer) {
                Some(ptr) => Some(ptr),
                None => {
                    device.destroy_buffer(buffer);
                    return Err(GfxError::OutOfHostMemory);
                }
            }
        } else {
            None
        };

        Ok(BumpBlock {
            buffer,
            device_ptr: device.get_buffer_device_ptr(buffer),
            host_ptr,
        })
    }
}

impl BumpAllocator<DevicePolicy> {
    /// 分配 `count` 个 `T`
    pub fn allocate<T>(&mut self, device: &dyn GfxDevice, count: usize) -> GfxResult<DeviceAllocation<T>> {
        let size = (count * size_of::<T>()) as vk::DeviceSize;
        let (block_idx, offset) = self.allocate_raw(device, size, align_of::<T>() as vk::DeviceSize)?;
        let block = &self.blocks[block_idx];
        Ok(DeviceAllocation {
            ptr: block.device_ptr.offset(offset),
            view: GfxBufferView::new(block.buffer, offset, size),
            count,
            generation: self.generation,
            _marker: PhantomData,
        })
    }

    /// 回到第一个 block，之前的分配全部失效
    ///
    /// 会在 `cmd` 中录制一个全局的 memory barrier：之前对 arena 的读写都完成并可见之后，新的写入才能开始
    pub fn reset(&mut self, cmd: &mut dyn GfxCommandRecorder) {
        cmd.pipeline_barrier(
            &[GfxMemoryBarrier::new()
                .src_mask(
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                )
                .dst_mask(
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                )],
            &[],
        );
        self.rewind();
    }
}

impl BumpAllocator<UploadPolicy> {
    /// 分配 `count` 个 `T`
    pub fn allocate<T>(&mut self, device: &dyn GfxDevice, count: usize) -> GfxResult<UploadAllocation<T>> {
        let size = (count * size_of::<T>()) as vk::DeviceSize;
        let (block_idx, offset) = self.allocate_raw(device, size, align_of::<T>() as vk::DeviceSize)?;
        let block = &self.blocks[block_idx];
        Ok(UploadAllocation {
            device_ptr: block.device_ptr.offset(offset),
            view: GfxBufferView::new(block.buffer, offset, size),
            count,
            block: block_idx,
            generation: self.generation,
            _marker: PhantomData,
        })
    }

    /// 分配并写入 `data`
    pub fn upload<T: bytemuck::Pod>(&mut self, device: &dyn GfxDevice, data: &[T]) -> GfxResult<UploadAllocation<T>> {
        let allocation = self.allocate::<T>(device, data.len())?;
        self.write(&allocation, data);
        Ok(allocation)
    }

    /// 把 `data` 写入 `allocation` 的开头
    pub fn write<T: bytemuck::Pod>(&self, allocation: &UploadAllocation<T>, data: &[T]) {
        assert!(data.len() <= allocation.count, "{}: write overflows allocation", UploadPolicy::NAME);
        self.write_bytes(allocation, 0, bytemuck::cast_slice(data));
    }

    /// 从 `allocation` 内 `byte_offset` 处开始写入原始字节
    pub fn write_bytes<T>(&self, allocation: &UploadAllocation<T>, byte_offset: vk::DeviceSize, bytes: &[u8]) {
        assert_eq!(
            allocation.generation, self.generation,
            "{}: write to an allocation from before the last reset",
            UploadPolicy::NAME
        );
        assert!(
            byte_offset + bytes.len() as vk::DeviceSize <= allocation.view.size,
            "{}: write overflows allocation",
            UploadPolicy::NAME
        );

        let Some(host_ptr) = self.blocks[allocation.block].host_ptr else {
            unreachable!("upload blocks are always mapped");
        };
        // SAFETY: block 在 destroy 之前一直有效且持久映射，范围由 allocate_raw 保证在 block 之内
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                host_ptr.as_ptr().add((allocation.view.offset + byte_offset) as usize),
                bytes.len(),
            );
        }
    }

    /// 回到第一个 block，之前的分配全部失效
    ///
    /// 调用者需要保证之前的分配不再被 GPU 读取（一般是等待 N - fif 帧完成）
    pub fn reset(&mut self) {
        self.rewind();
    }
}

impl<P: BumpAllocatorPolicy> BumpAllocator<P> {
    fn rewind(&mut self) {
        self.block = usize::MAX;
        self.offset = self.settings.block_size;
        self.generation += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truvis_gfx::foundation::queue::GfxQueueType;
    use truvis_gfx::headless::{HeadlessCommand, HeadlessDevice, HeadlessSettings};

    #[test]
    fn test_blocks_are_created_lazily() {
        let device = HeadlessDevice::default();
        let mut allocator = DeviceBumpAllocator::new(BumpAllocatorSettings { block_size: 256 });
        assert_eq!(allocator.block_count(), 0);

        let a = allocator.allocate::<u32>(&device, 4).unwrap();
        let b = allocator.allocate::<u8>(&device, 3).unwrap();
        assert_eq!(allocator.block_count(), 1);
        assert_eq!(a.view.offset, 0);
        // 16 字节对齐
        assert_eq!(b.view.offset, 16);
        assert_eq!(b.ptr, a.ptr.offset(16));

        // 放不下，切换到新的 block
        let c = allocator.allocate::<u8>(&device, 250).unwrap();
        assert_eq!(allocator.block_count(), 2);
        assert_eq!(c.view.offset, 0);
        assert_ne!(c.view.buffer, a.view.buffer);

        allocator.destroy(&device);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_upload_alignment_and_write() {
        let device = HeadlessDevice::default();
        let mut allocator = UploadBumpAllocator::new(BumpAllocatorSettings { block_size: 1024 });

        let _ = allocator.allocate::<u8>(&device, 1).unwrap();
        let data = allocator.upload(&device, &[1u32, 2, 3]).unwrap();
        assert_eq!(data.view.offset, 64);

        let values = device.read_buffer_view::<u32>(&data.view);
        assert_eq!(values, vec![1, 2, 3]);

        allocator.destroy(&device);
    }

    #[test]
    fn test_reset_reuses_blocks_behind_barrier() {
        let device = HeadlessDevice::default();
        let mut allocator = DeviceBumpAllocator::new(BumpAllocatorSettings { block_size: 64 });

        let before = allocator.allocate::<u32>(&device, 16).unwrap();
        let _ = allocator.allocate::<u32>(&device, 16).unwrap();
        assert_eq!(allocator.block_count(), 2);

        let mut cmd = device.begin_command_buffer(GfxQueueType::Main, "reset").unwrap();
        allocator.reset(cmd.as_mut());
        let cmd = cmd.end();
        device
            .submit(GfxQueueType::Main, truvis_gfx::commands::submit_info::GfxSubmitInfo::new(&[cmd]))
            .unwrap();

        let after = allocator.allocate::<u32>(&device, 16).unwrap();
        assert_eq!(after.view, before.view);
        assert_eq!(after.generation(), before.generation() + 1);
        // 没有新建 block
        assert_eq!(allocator.block_count(), 2);

        let submissions = device.submissions();
        let commands = &submissions[0].command_buffers[0].commands;
        assert!(matches!(
            &commands[0],
            HeadlessCommand::PipelineBarrier { memory_barriers, .. } if memory_barriers.len() == 1
        ));

        allocator.destroy(&device);
    }

    #[test]
    #[should_panic(expected = "before the last reset")]
    fn test_stale_upload_write_panics() {
        let device = HeadlessDevice::default();
        let mut allocator = UploadBumpAllocator::new(BumpAllocatorSettings { block_size: 256 });
        let stale = allocator.allocate::<u32>(&device, 1).unwrap();
        allocator.reset();
        allocator.write(&stale, &[1]);
    }

    #[test]
    fn test_block_allocation_failure_propagates() {
        let device = HeadlessDevice::new(HeadlessSettings {
            device_memory_budget: Some(100),
        });
        let mut allocator = DeviceBumpAllocator::new(BumpAllocatorSettings { block_size: 128 });
        let result = allocator.allocate::<u8>(&device, 8);
        assert!(matches!(result, Err(GfxError::OutOfDeviceMemory { .. })));
        assert_eq!(allocator.block_count(), 0);

        // 预算放开后可以继续分配
        device.set_device_memory_budget(None);
        assert!(allocator.allocate::<u8>(&device, 8).is_ok());
        allocator.destroy(&device);
    }

    #[test]
    #[should_panic(expected = "zero sized allocation")]
    fn test_zero_sized_allocation_panics() {
        let device = HeadlessDevice::default();
        let mut allocator = DeviceBumpAllocator::new(BumpAllocatorSettings { block_size: 64 });
        let _ = allocator.allocate::<u32>(&device, 0);
    }
}
