use std::collections::HashMap;

use slotmap::SecondaryMap;

use truvis_gfx::GfxResult;
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::handles::{GfxImageHandle, GfxImageViewHandle};
use truvis_gfx::resources::image::GfxImageDesc;
use truvis_gfx::resources::image_view::GfxImageViewDesc;

/// 长期存在的 image 以及基于它们创建的 image view
///
/// - 通过 (image, view desc) 查找已有的 image view，相同描述只创建一次
/// - 支持延迟销毁：提交销毁的帧完成之后（frames in flight 个帧之后）才真正销毁
pub struct GfxResourceArena {
    fif_count: u64,

    images: SecondaryMap<GfxImageHandle, GfxImageDesc>,

    /// 用于快速查询：(ImageHandle, ViewDesc) -> ImageViewHandle
    image_view_lookup: HashMap<(GfxImageHandle, GfxImageViewDesc), GfxImageViewHandle>,
    /// ImageHandle -> 所有关联的 (ViewDesc, ImageViewHandle)
    image_to_views: SecondaryMap<GfxImageHandle, Vec<(GfxImageViewDesc, GfxImageViewHandle)>>,

    /// (handle, 提交销毁时的帧序号)
    pending_destroy_images: Vec<(GfxImageHandle, u64)>,

    destroyed: bool,
}
// new & init
impl GfxResourceArena {
    pub fn new(fif_count: usize) -> Self {
        assert!(fif_count > 0);
        Self {
            fif_count: fif_count as u64,
            images: SecondaryMap::new(),
            image_view_lookup: HashMap::new(),
            image_to_views: SecondaryMap::new(),
            pending_destroy_images: Vec::new(),
            destroyed: false,
        }
    }
}
// destroy
impl GfxResourceArena {
    /// 立即销毁所有资源，调用前设备需要处于 idle 状态
    pub fn destroy(&mut self, device: &dyn GfxDevice) {
        let _span = truvis_crate_tools::profile_span!("GfxResourceArena::destroy");

        let images = self.images.keys().collect::<Vec<_>>();
        for image in images {
            self.destroy_image_immediate(device, image);
        }
        self.pending_destroy_images.clear();
        self.destroyed = true;
    }
}
impl Drop for GfxResourceArena {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(self.destroyed || self.images.is_empty(), "GfxResourceArena dropped without destroy");
        }
    }
}
// Subsystem API
impl GfxResourceArena {
    /// 销毁那些提交销毁时的帧已经完成的资源
    pub fn cleanup(&mut self, device: &dyn GfxDevice, current_frame_id: u64) {
        let _span = truvis_crate_tools::profile_span!("GfxResourceArena::cleanup");

        let fif = self.fif_count;
        let mut images_to_destroy = Vec::new();
        self.pending_destroy_images.retain(|(image, frame_id)| {
            if *frame_id + fif <= current_frame_id {
                images_to_destroy.push(*image);
                false
            } else {
                true
            }
        });
        for image in images_to_destroy {
            self.destroy_image_immediate(device, image);
        }
    }
}
// Image API
impl GfxResourceArena {
    pub fn create_image(&mut self, device: &dyn GfxDevice, desc: &GfxImageDesc) -> GfxResult<GfxImageHandle> {
        let image = device.create_image(desc)?;
        log::debug!("arena: created image \"{}\" {}x{} {:?}", desc.name, desc.extent.width, desc.extent.height, desc.format);
        self.images.insert(image, desc.clone());
        Ok(image)
    }

    #[inline]
    pub fn get_image_desc(&self, image: GfxImageHandle) -> Option<&GfxImageDesc> {
        self.images.get(image)
    }

    #[inline]
    pub fn contains_image(&self, image: GfxImageHandle) -> bool {
        self.images.contains_key(image)
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn pending_destroy_count(&self) -> usize {
        self.pending_destroy_images.len()
    }

    /// 在 `current_frame_id` 对应的帧完成后销毁
    pub fn destroy_image(&mut self, image: GfxImageHandle, current_frame_id: u64) {
        debug_assert!(self.images.contains_key(image));
        self.pending_destroy_images.push((image, current_frame_id));
    }

    /// 立即销毁 image 及其关联的所有 image view
    ///
    /// 调用者需要确保该资源不再被 GPU 使用
    pub fn destroy_image_immediate(&mut self, device: &dyn GfxDevice, image: GfxImageHandle) {
        if let Some(views) = self.image_to_views.remove(image) {
            for (view_desc, view) in views {
                self.image_view_lookup.remove(&(image, view_desc));
                device.destroy_image_view(view);
            }
        }

        self.pending_destroy_images.retain(|(h, _)| *h != image);

        if let Some(desc) = self.images.remove(image) {
            log::debug!("arena: destroyed image \"{}\"", desc.name);
            device.destroy_image(image);
        }
    }
}
// ImageView API
impl GfxResourceArena {
    /// 如果已经存在相同描述的 image view，则直接返回
    pub fn get_or_create_image_view(
        &mut self,
        device: &dyn GfxDevice,
        image: GfxImageHandle,
        view_desc: GfxImageViewDesc,
    ) -> GfxResult<GfxImageViewHandle> {
        let lookup_key = (image, view_desc);
        if let Some(&existing) = self.image_view_lookup.get(&lookup_key) {
            return Ok(existing);
        }

        assert!(self.images.contains_key(image), "image view of an image not owned by the arena");
        let view = device.create_image_view(image, &view_desc)?;
        self.image_view_lookup.insert(lookup_key, view);
        if let Some(views) = self.image_to_views.entry(image) {
            views.or_default().push((view_desc, view));
        }

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use truvis_gfx::headless::HeadlessDevice;

    fn color_desc(name: &str) -> GfxImageDesc {
        GfxImageDesc::new_2d(
            name,
            vk::Extent2D { width: 8, height: 8 },
            vk::Format::R16G16B16A16_SFLOAT,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::STORAGE,
        )
    }

    #[test]
    fn test_image_view_lookup() {
        let device = HeadlessDevice::default();
        let mut arena = GfxResourceArena::new(2);
        let mut image_desc = color_desc("a");
        image_desc.mip_levels = 2;
        let image = arena.create_image(&device, &image_desc).unwrap();

        let desc = GfxImageViewDesc::new_2d(vk::Format::R16G16B16A16_SFLOAT, vk::ImageAspectFlags::COLOR);
        let v0 = arena.get_or_create_image_view(&device, image, desc).unwrap();
        let v1 = arena.get_or_create_image_view(&device, image, desc).unwrap();
        let v2 = arena.get_or_create_image_view(&device, image, desc.with_single_mip(1)).unwrap();
        assert_eq!(v0, v1);
        assert_ne!(v0, v2);
        assert_eq!(device.live_image_view_count(), 2);

        arena.destroy(&device);
        assert_eq!(device.live_image_view_count(), 0);
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn test_delayed_destroy() {
        let device = HeadlessDevice::default();
        let mut arena = GfxResourceArena::new(2);
        let image = arena.create_image(&device, &color_desc("a")).unwrap();

        arena.destroy_image(image, 5);
        arena.cleanup(&device, 6);
        assert!(arena.contains_image(image));
        assert_eq!(device.live_image_count(), 1);

        arena.cleanup(&device, 7);
        assert!(!arena.contains_image(image));
        assert_eq!(device.live_image_count(), 0);
        assert_eq!(arena.pending_destroy_count(), 0);

        arena.destroy(&device);
    }
}
