use std::sync::Arc;

use parking_lot::Mutex;

use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::handles::{GfxImageViewHandle, GfxSamplerHandle};
use truvis_gfx::resources::descriptor::{GfxDescriptorKind, GfxDescriptorWrite};
use truvis_gfx::{GfxError, GfxResult};

macro_rules! bindless_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(u32);
        impl $name {
            pub const INVALID_INDEX: u32 = u32::MAX;

            #[inline]
            pub fn new(index: u32) -> Self {
                Self(index)
            }
            #[inline]
            pub fn null() -> Self {
                Self(Self::INVALID_INDEX)
            }
            #[inline]
            pub fn is_null(&self) -> bool {
                self.0 == Self::INVALID_INDEX
            }
            #[inline]
            pub fn index(&self) -> u32 {
                self.0
            }
        }
        impl Default for $name {
            fn default() -> Self {
                Self::null()
            }
        }
    };
}

bindless_handle!(
    /// sampler 状态
    BindlessSamplerHandle
);
bindless_handle!(
    /// 只读图像（separate image）
    BindlessSrvHandle
);
bindless_handle!(
    /// combined image + sampler
    BindlessTextureHandle
);
bindless_handle!(
    /// 可读写的 storage image
    BindlessUavHandle
);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorAllocatorSettings {
    pub max_samplers: u32,
    pub max_srvs: u32,
    pub max_textures: u32,
    pub max_uavs: u32,
}
impl Default for DescriptorAllocatorSettings {
    fn default() -> Self {
        Self {
            max_samplers: 2048,
            max_srvs: 100_000,
            max_textures: 100_000,
            max_uavs: 100_000,
        }
    }
}
impl DescriptorAllocatorSettings {
    #[inline]
    pub fn capacity(&self, kind: GfxDescriptorKind) -> u32 {
        match kind {
            GfxDescriptorKind::Sampler => self.max_samplers,
            GfxDescriptorKind::Texture => self.max_srvs,
            GfxDescriptorKind::SampledTexture => self.max_textures,
            GfxDescriptorKind::StorageTexture => self.max_uavs,
        }
    }
}

/// 单个描述符表的 free list
///
/// `next` 之前的槽位至少被分配过一次，回收的槽位放在 `free` 中优先复用
struct DescriptorFreeList {
    capacity: u32,
    next: u32,
    free: Vec<u32>,
}
impl DescriptorFreeList {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            next: 0,
            free: Vec::new(),
        }
    }

    fn pop(&mut self) -> Option<u32> {
        if let Some(index) = self.free.pop() {
            return Some(index);
        }
        if self.next < self.capacity {
            self.next += 1;
            return Some(self.next - 1);
        }
        None
    }

    fn push(&mut self, index: u32) {
        assert!(index < self.next, "free of a descriptor index {index} that was never allocated");
        debug_assert!(!self.free.contains(&index), "descriptor index {index} freed twice");
        self.free.push(index);
    }

    #[inline]
    fn allocated_count(&self) -> u32 {
        self.next - self.free.len() as u32
    }
}

struct DescriptorAllocatorInner {
    lists: [DescriptorFreeList; 4],
}
impl DescriptorAllocatorInner {
    #[inline]
    fn list_mut(&mut self, kind: GfxDescriptorKind) -> &mut DescriptorFreeList {
        &mut self.lists[kind as usize]
    }
}

/// Bindless 描述符分配器
///
/// 每种描述符（sampler / srv / combined texture / uav）对应全局描述符表中的一个数组，
/// 分配时从 free list 取出一个下标，并把描述符写入该下标。着色器通过下标访问资源。
///
/// 可以 `clone`，所有 clone 共享同一组 free list。
///
/// 释放下标时，调用者需要保证 GPU 不再读取该槽位。
#[derive(Clone)]
pub struct DescriptorAllocator {
    settings: DescriptorAllocatorSettings,
    inner: Arc<Mutex<DescriptorAllocatorInner>>,
}
// new & init
impl DescriptorAllocator {
    pub fn new(settings: DescriptorAllocatorSettings) -> Self {
        let lists = GfxDescriptorKind::ALL.map(|kind| DescriptorFreeList::new(settings.capacity(kind)));
        Self {
            settings,
            inner: Arc::new(Mutex::new(DescriptorAllocatorInner { lists })),
        }
    }
}
impl Default for DescriptorAllocator {
    fn default() -> Self {
        Self::new(DescriptorAllocatorSettings::default())
    }
}
// getters
impl DescriptorAllocator {
    #[inline]
    pub fn settings(&self) -> &DescriptorAllocatorSettings {
        &self.settings
    }

    /// 当前仍在使用中的下标数量
    pub fn allocated_count(&self, kind: GfxDescriptorKind) -> u32 {
        self.inner.lock().list_mut(kind).allocated_count()
    }
}
// allocate & free
impl DescriptorAllocator {
    fn allocate(&self, device: &dyn GfxDevice, write: GfxDescriptorWrite) -> GfxResult<u32> {
        let kind = write.kind();
        let index = self.inner.lock().list_mut(kind).pop().ok_or(GfxError::DescriptorHeapExhausted {
            kind,
            capacity: self.settings.capacity(kind),
        })?;
        device.write_descriptor(index, write);
        Ok(index)
    }

    fn free(&self, kind: GfxDescriptorKind, index: u32) {
        self.inner.lock().list_mut(kind).push(index);
    }

    pub fn allocate_sampler(&self, device: &dyn GfxDevice, sampler: GfxSamplerHandle) -> GfxResult<BindlessSamplerHandle> {
        self.allocate(device, GfxDescriptorWrite::Sampler(sampler)).map(BindlessSamplerHandle::new)
    }

    pub fn allocate_srv(&self, device: &dyn GfxDevice, view: GfxImageViewHandle) -> GfxResult<BindlessSrvHandle> {
        self.allocate(device, GfxDescriptorWrite::Texture(view)).map(BindlessSrvHandle::new)
    }

    pub fn allocate_texture(
        &self,
        device: &dyn GfxDevice,
        view: GfxImageViewHandle,
        sampler: GfxSamplerHandle,
    ) -> GfxResult<BindlessTextureHandle> {
        self.allocate(device, GfxDescriptorWrite::SampledTexture(view, sampler)).map(BindlessTextureHandle::new)
    }

    pub fn allocate_uav(&self, device: &dyn GfxDevice, view: GfxImageViewHandle) -> GfxResult<BindlessUavHandle> {
        self.allocate(device, GfxDescriptorWrite::StorageTexture(view)).map(BindlessUavHandle::new)
    }

    pub fn free_sampler(&self, handle: BindlessSamplerHandle) {
        debug_assert!(!handle.is_null());
        self.free(GfxDescriptorKind::Sampler, handle.index());
    }

    pub fn free_srv(&self, handle: BindlessSrvHandle) {
        debug_assert!(!handle.is_null());
        self.free(GfxDescriptorKind::Texture, handle.index());
    }

    pub fn free_texture(&self, handle: BindlessTextureHandle) {
        debug_assert!(!handle.is_null());
        self.free(GfxDescriptorKind::SampledTexture, handle.index());
    }

    pub fn free_uav(&self, handle: BindlessUavHandle) {
        debug_assert!(!handle.is_null());
        self.free(GfxDescriptorKind::StorageTexture, handle.index());
    }
}

/// 记录通过它分配的所有描述符，`reset` 或 drop 时一起释放
///
/// 一般每个 frame in flight 持有一个，等到该帧的 GPU 工作完成之后再 `reset`
pub struct DescriptorAllocatorScope {
    allocator: DescriptorAllocator,
    allocated: Vec<(GfxDescriptorKind, u32)>,
}
impl DescriptorAllocatorScope {
    pub fn new(allocator: &DescriptorAllocator) -> Self {
        Self {
            allocator: allocator.clone(),
            allocated: Vec::new(),
        }
    }

    #[inline]
    pub fn allocator(&self) -> &DescriptorAllocator {
        &self.allocator
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.allocated.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty()
    }

    pub fn allocate_sampler(
        &mut self,
        device: &dyn GfxDevice,
        sampler: GfxSamplerHandle,
    ) -> GfxResult<BindlessSamplerHandle> {
        let handle = self.allocator.allocate_sampler(device, sampler)?;
        self.allocated.push((GfxDescriptorKind::Sampler, handle.index()));
        Ok(handle)
    }

    pub fn allocate_srv(&mut self, device: &dyn GfxDevice, view: GfxImageViewHandle) -> GfxResult<BindlessSrvHandle> {
        let handle = self.allocator.allocate_srv(device, view)?;
        self.allocated.push((GfxDescriptorKind::Texture, handle.index()));
        Ok(handle)
    }

    pub fn allocate_texture(
        &mut self,
        device: &dyn GfxDevice,
        view: GfxImageViewHandle,
        sampler: GfxSamplerHandle,
    ) -> GfxResult<BindlessTextureHandle> {
        let handle = self.allocator.allocate_texture(device, view, sampler)?;
        self.allocated.push((GfxDescriptorKind::SampledTexture, handle.index()));
        Ok(handle)
    }

    pub fn allocate_uav(&mut self, device: &dyn GfxDevice, view: GfxImageViewHandle) -> GfxResult<BindlessUavHandle> {
        let handle = self.allocator.allocate_uav(device, view)?;
        self.allocated.push((GfxDescriptorKind::StorageTexture, handle.index()));
        Ok(handle)
    }

    /// 释放所有通过该 scope 分配的描述符
    pub fn reset(&mut self) {
        if self.allocated.is_empty() {
            return;
        }
        log::trace!("descriptor scope: freeing {} descriptors", self.allocated.len());
        let mut inner = self.allocator.inner.lock();
        for (kind, index) in self.allocated.drain(..) {
            inner.list_mut(kind).push(index);
        }
    }
}
impl Drop for DescriptorAllocatorScope {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truvis_gfx::headless::HeadlessDevice;
    use truvis_gfx::sampler::GfxSamplerDesc;

    #[test]
    fn test_allocate_writes_descriptor() {
        let device = HeadlessDevice::default();
        let sampler = device.create_sampler(&GfxSamplerDesc::default()).unwrap();
        let allocator = DescriptorAllocator::default();

        let a = allocator.allocate_sampler(&device, sampler).unwrap();
        let b = allocator.allocate_sampler(&device, sampler).unwrap();
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(device.descriptor(GfxDescriptorKind::Sampler, 1), Some(GfxDescriptorWrite::Sampler(sampler)));

        // 回收的下标会被优先复用
        allocator.free_sampler(a);
        let c = allocator.allocate_sampler(&device, sampler).unwrap();
        assert_eq!(c.index(), 0);
        assert_eq!(allocator.allocated_count(GfxDescriptorKind::Sampler), 2);
    }

    #[test]
    fn test_capacity_exhausted() {
        let device = HeadlessDevice::default();
        let sampler = device.create_sampler(&GfxSamplerDesc::default()).unwrap();
        let allocator = DescriptorAllocator::new(DescriptorAllocatorSettings {
            max_samplers: 1,
            ..Default::default()
        });

        let _ = allocator.allocate_sampler(&device, sampler).unwrap();
        assert_eq!(
            allocator.allocate_sampler(&device, sampler),
            Err(GfxError::DescriptorHeapExhausted {
                kind: GfxDescriptorKind::Sampler,
                capacity: 1
            })
        );
    }

    #[test]
    fn test_kinds_are_independent() {
        let device = HeadlessDevice::default();
        let sampler = device.create_sampler(&GfxSamplerDesc::default()).unwrap();
        let allocator = DescriptorAllocator::default();

        let _ = allocator.allocate_sampler(&device, sampler).unwrap();
        let uav = allocator.allocate_uav(&device, GfxImageViewHandle::default()).unwrap();
        assert_eq!(uav.index(), 0);
        assert_eq!(allocator.allocated_count(GfxDescriptorKind::StorageTexture), 1);
        assert_eq!(allocator.allocated_count(GfxDescriptorKind::Texture), 0);
    }

    #[test]
    fn test_scope_frees_on_reset_and_drop() {
        let device = HeadlessDevice::default();
        let sampler = device.create_sampler(&GfxSamplerDesc::default()).unwrap();
        let allocator = DescriptorAllocator::default();

        let mut scope = DescriptorAllocatorScope::new(&allocator);
        let _ = scope.allocate_texture(&device, GfxImageViewHandle::default(), sampler).unwrap();
        let _ = scope.allocate_srv(&device, GfxImageViewHandle::default()).unwrap();
        assert_eq!(scope.len(), 2);
        assert_eq!(allocator.allocated_count(GfxDescriptorKind::SampledTexture), 1);

        scope.reset();
        assert!(scope.is_empty());
        assert_eq!(allocator.allocated_count(GfxDescriptorKind::SampledTexture), 0);
        assert_eq!(allocator.allocated_count(GfxDescriptorKind::Texture), 0);

        {
            let mut scope = DescriptorAllocatorScope::new(&allocator);
            let _ = scope.allocate_uav(&device, GfxImageViewHandle::default()).unwrap();
            assert_eq!(allocator.allocated_count(GfxDescriptorKind::StorageTexture), 1);
        }
        assert_eq!(allocator.allocated_count(GfxDescriptorKind::StorageTexture), 0);
    }

    #[test]
    fn test_null_handle() {
        assert!(BindlessUavHandle::default().is_null());
        assert!(!BindlessUavHandle::new(3).is_null());
    }
}
