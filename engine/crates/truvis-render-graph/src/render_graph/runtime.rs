//! 执行阶段传给 pass 回调的解析器
//!
//! 把声明阶段得到的 token 解析为本帧的物理资源：buffer view、image、bindless 描述符。
//! 另外提供对本帧 upload 分配器的访问，用于在执行时上传少量数据。

use std::cell::RefCell;

use ash::vk;
use slotmap::SecondaryMap;

use truvis_gfx::GfxResult;
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::handles::{GfxImageHandle, GfxImageViewHandle, GfxSemaphoreHandle};
use truvis_gfx::resources::buffer::{GfxBufferView, GfxDevicePtr};
use truvis_render_interface::bump_allocator::{UploadAllocation, UploadBumpAllocator};
use truvis_render_interface::descriptor_allocator::{BindlessSrvHandle, BindlessTextureHandle, BindlessUavHandle};

use super::handle::{RgBufferToken, RgSemaphoreId, RgTextureToken};

pub(crate) struct RgRtBuffer {
    pub name: String,
    pub view: GfxBufferView,
    pub device_ptr: GfxDevicePtr,
    /// 来自 upload 分配器的 buffer 可以在 host 上写入
    pub upload: Option<UploadAllocation<u8>>,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RgRtBufferUse {
    pub physical: u32,
    pub offset: vk::DeviceSize,
}

pub(crate) struct RgRtTexture {
    pub name: String,
    pub image: GfxImageHandle,
    pub view: GfxImageViewHandle,
    pub extent: vk::Extent3D,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RgRtTextureUse {
    pub physical: u32,
    pub layout: vk::ImageLayout,
    pub srv: Option<BindlessSrvHandle>,
    pub texture: Option<BindlessTextureHandle>,
    /// 按 mip 排列
    pub uavs: Vec<BindlessUavHandle>,
}

pub struct RgRuntime<'a> {
    pub(crate) serial: u32,
    pub(crate) buffers: Vec<Option<RgRtBuffer>>,
    pub(crate) buffer_uses: Vec<RgRtBufferUse>,
    pub(crate) textures: Vec<Option<RgRtTexture>>,
    pub(crate) texture_uses: Vec<RgRtTextureUse>,
    pub(crate) semaphores: SecondaryMap<RgSemaphoreId, GfxSemaphoreHandle>,
    pub(crate) upload_allocator: RefCell<&'a mut UploadBumpAllocator>,
}
// buffer
impl RgRuntime<'_> {
    fn buffer_use<T>(&self, token: RgBufferToken<T>) -> (&RgRtBuffer, vk::DeviceSize) {
        assert_eq!(token.serial, self.serial, "buffer token resolved against another frame's graph");
        let buffer_use = self.buffer_uses[token.index as usize];
        let Some(buffer) = self.buffers[buffer_use.physical as usize].as_ref() else {
            panic!("buffer token #{} resolves to an unallocated buffer", token.index);
        };
        (buffer, buffer_use.offset)
    }

    /// 从声明时的 offset 开始，到 buffer 结尾的 view
    pub fn get_buffer<T>(&self, token: RgBufferToken<T>) -> GfxBufferView {
        let (buffer, offset) = self.buffer_use(token);
        buffer.view.slice(offset)
    }

    pub fn get_buffer_device_ptr<T>(&self, token: RgBufferToken<T>) -> GfxDevicePtr {
        let (buffer, offset) = self.buffer_use(token);
        buffer.device_ptr.offset(offset)
    }

    /// 从声明时的 offset 开始能容纳的元素个数
    pub fn get_buffer_len<T>(&self, token: RgBufferToken<T>) -> usize {
        let view = self.get_buffer(token);
        (view.size / size_of::<T>() as vk::DeviceSize) as usize
    }

    /// 写入 host 可见的 buffer
    pub fn write_buffer<T: bytemuck::Pod>(&self, token: RgBufferToken<T>, data: &[T]) {
        let (buffer, offset) = self.buffer_use(token);
        let Some(upload) = buffer.upload.as_ref() else {
            panic!("buffer \"{}\" is not host visible", buffer.name);
        };
        self.upload_allocator.borrow().write_bytes(upload, offset, bytemuck::cast_slice(data));
    }
}
// texture
impl RgRuntime<'_> {
    fn texture_use(&self, token: RgTextureToken) -> (&RgRtTexture, &RgRtTextureUse) {
        assert_eq!(token.serial, self.serial, "texture token resolved against another frame's graph");
        let texture_use = &self.texture_uses[token.index as usize];
        let Some(texture) = self.textures[texture_use.physical as usize].as_ref() else {
            panic!("texture token #{} resolves to an unallocated texture", token.index);
        };
        (texture, texture_use)
    }

    pub fn get_texture(&self, token: RgTextureToken) -> GfxImageHandle {
        self.texture_use(token).0.image
    }

    /// 覆盖全部 mip 和 layer 的 view
    pub fn get_texture_view(&self, token: RgTextureToken) -> GfxImageViewHandle {
        self.texture_use(token).0.view
    }

    pub fn get_texture_extent(&self, token: RgTextureToken) -> vk::Extent3D {
        self.texture_use(token).0.extent
    }

    /// 声明时指定的 layout
    pub fn get_texture_layout(&self, token: RgTextureToken) -> vk::ImageLayout {
        self.texture_use(token).1.layout
    }

    pub fn try_get_texture_descriptor(&self, token: RgTextureToken) -> Option<BindlessSrvHandle> {
        self.texture_use(token).1.srv
    }

    pub fn get_texture_descriptor(&self, token: RgTextureToken) -> BindlessSrvHandle {
        let (texture, texture_use) = self.texture_use(token);
        texture_use
            .srv
            .unwrap_or_else(|| panic!("texture \"{}\" was not declared as a sampled read", texture.name))
    }

    pub fn try_get_sampled_texture_descriptor(&self, token: RgTextureToken) -> Option<BindlessTextureHandle> {
        self.texture_use(token).1.texture
    }

    pub fn get_sampled_texture_descriptor(&self, token: RgTextureToken) -> BindlessTextureHandle {
        let (texture, texture_use) = self.texture_use(token);
        texture_use
            .texture
            .unwrap_or_else(|| panic!("texture \"{}\" was not declared with a sampler", texture.name))
    }

    pub fn try_get_storage_texture_descriptor(&self, token: RgTextureToken, mip: u32) -> Option<BindlessUavHandle> {
        self.texture_use(token).1.uavs.get(mip as usize).copied()
    }

    pub fn get_storage_texture_descriptor(&self, token: RgTextureToken, mip: u32) -> BindlessUavHandle {
        let (texture, texture_use) = self.texture_use(token);
        texture_use
            .uavs
            .get(mip as usize)
            .copied()
            .unwrap_or_else(|| panic!("texture \"{}\" has no storage descriptor for mip {}", texture.name, mip))
    }
}
// upload & semaphore
impl RgRuntime<'_> {
    /// 从本帧的 upload 分配器分配
    pub fn allocate<T>(&self, device: &dyn GfxDevice, count: usize) -> GfxResult<UploadAllocation<T>> {
        self.upload_allocator.borrow_mut().allocate(device, count)
    }

    pub fn upload<T: bytemuck::Pod>(&self, device: &dyn GfxDevice, data: &[T]) -> GfxResult<UploadAllocation<T>> {
        self.upload_allocator.borrow_mut().upload(device, data)
    }

    pub fn get_semaphore(&self, id: RgSemaphoreId) -> GfxSemaphoreHandle {
        *self.semaphores.get(id).unwrap_or_else(|| panic!("semaphore {:?} is not bound this frame", id))
    }
}
