use ash::vk;

use crate::foundation::queue::GfxQueueType;
use crate::handles::GfxImageHandle;

/// 全局内存 barrier
///
/// 对应 `VkMemoryBarrier2`，作用于所有资源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxMemoryBarrier {
    pub(crate) src_stage: vk::PipelineStageFlags2,
    pub(crate) src_access: vk::AccessFlags2,
    pub(crate) dst_stage: vk::PipelineStageFlags2,
    pub(crate) dst_access: vk::AccessFlags2,
}
impl Default for GfxMemoryBarrier {
    fn default() -> Self {
        Self::new()
    }
}
impl GfxMemoryBarrier {
    #[inline]
    pub fn new() -> Self {
        Self {
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
        }
    }

    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.src_stage = stage;
        self.src_access = access;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.dst_stage = stage;
        self.dst_access = access;
        self
    }

    #[inline]
    pub fn src_stage(&self) -> vk::PipelineStageFlags2 {
        self.src_stage
    }
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.src_access
    }
    #[inline]
    pub fn dst_stage(&self) -> vk::PipelineStageFlags2 {
        self.dst_stage
    }
    #[inline]
    pub fn dst_access(&self) -> vk::AccessFlags2 {
        self.dst_access
    }
}

/// 图像 barrier，可以同时完成 layout 转换
///
/// 对应 `VkImageMemoryBarrier2`，`src_queue`/`dst_queue` 不同时表示队列所有权转移
#[derive(Clone, Copy, Debug)]
pub struct GfxImageBarrier {
    pub(crate) image: GfxImageHandle,
    pub(crate) src_stage: vk::PipelineStageFlags2,
    pub(crate) src_access: vk::AccessFlags2,
    pub(crate) dst_stage: vk::PipelineStageFlags2,
    pub(crate) dst_access: vk::AccessFlags2,
    pub(crate) old_layout: vk::ImageLayout,
    pub(crate) new_layout: vk::ImageLayout,
    pub(crate) src_queue: Option<GfxQueueType>,
    pub(crate) dst_queue: Option<GfxQueueType>,
    pub(crate) subresource_range: vk::ImageSubresourceRange,
}
// vk::ImageSubresourceRange 没有实现 PartialEq / Hash，按字段比较
impl PartialEq for GfxImageBarrier {
    fn eq(&self, other: &Self) -> bool {
        self.image == other.image
            && self.src_stage == other.src_stage
            && self.src_access == other.src_access
            && self.dst_stage == other.dst_stage
            && self.dst_access == other.dst_access
            && self.old_layout == other.old_layout
            && self.new_layout == other.new_layout
            && self.src_queue == other.src_queue
            && self.dst_queue == other.dst_queue
            && self.range_key() == other.range_key()
    }
}
impl Eq for GfxImageBarrier {}
impl std::hash::Hash for GfxImageBarrier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.image.hash(state);
        self.src_stage.hash(state);
        self.src_access.hash(state);
        self.dst_stage.hash(state);
        self.dst_access.hash(state);
        self.old_layout.hash(state);
        self.new_layout.hash(state);
        self.src_queue.hash(state);
        self.dst_queue.hash(state);
        self.range_key().hash(state);
    }
}
impl Default for GfxImageBarrier {
    fn default() -> Self {
        Self::new()
    }
}
impl GfxImageBarrier {
    #[inline]
    pub fn new() -> Self {
        Self {
            image: GfxImageHandle::default(),
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::UNDEFINED,
            src_queue: None,
            dst_queue: None,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: vk::REMAINING_ARRAY_LAYERS,
            },
        }
    }

    #[inline]
    pub fn image(mut self, image: GfxImageHandle) -> Self {
        self.image = image;
        self
    }

    #[inline]
    pub fn layout_transfer(mut self, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> Self {
        self.old_layout = old_layout;
        self.new_layout = new_layout;
        self
    }

    #[inline]
    pub fn src_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.src_stage = stage;
        self.src_access = access;
        self
    }

    #[inline]
    pub fn dst_mask(mut self, stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        self.dst_stage = stage;
        self.dst_access = access;
        self
    }

    #[inline]
    pub fn queue_transfer(mut self, src_queue: GfxQueueType, dst_queue: GfxQueueType) -> Self {
        self.src_queue = Some(src_queue);
        self.dst_queue = Some(dst_queue);
        self
    }

    #[inline]
    pub fn image_aspect_flag(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.subresource_range.aspect_mask = aspect;
        self
    }

    #[inline]
    pub fn subresource_range(mut self, range: vk::ImageSubresourceRange) -> Self {
        self.subresource_range = range;
        self
    }
}
// getters
impl GfxImageBarrier {
    #[inline]
    pub fn get_image(&self) -> GfxImageHandle {
        self.image
    }
    #[inline]
    pub fn src_stage(&self) -> vk::PipelineStageFlags2 {
        self.src_stage
    }
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.src_access
    }
    #[inline]
    pub fn dst_stage(&self) -> vk::PipelineStageFlags2 {
        self.dst_stage
    }
    #[inline]
    pub fn dst_access(&self) -> vk::AccessFlags2 {
        self.dst_access
    }
    #[inline]
    pub fn old_layout(&self) -> vk::ImageLayout {
        self.old_layout
    }
    #[inline]
    pub fn new_layout(&self) -> vk::ImageLayout {
        self.new_layout
    }
    #[inline]
    pub fn queues(&self) -> Option<(GfxQueueType, GfxQueueType)> {
        self.src_queue.zip(self.dst_queue)
    }
    #[inline]
    pub fn get_subresource_range(&self) -> vk::ImageSubresourceRange {
        self.subresource_range
    }

    #[inline]
    fn range_key(&self) -> (vk::ImageAspectFlags, u32, u32, u32, u32) {
        let range = &self.subresource_range;
        (range.aspect_mask, range.base_mip_level, range.level_count, range.base_array_layer, range.layer_count)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_image_barrier_compares_subresource_range() {
        let color = GfxImageBarrier::new()
            .layout_transfer(vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL)
            .dst_mask(vk::PipelineStageFlags2::COMPUTE_SHADER, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        let depth = color.image_aspect_flag(vk::ImageAspectFlags::DEPTH);

        assert_eq!(color, color.clone());
        assert_ne!(color, depth);

        let set: HashSet<_> = [color, color, depth].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
