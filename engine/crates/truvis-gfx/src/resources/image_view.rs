use ash::vk;

/// image view 的描述
///
/// POD 结构，可以直接和 image 句柄组成 HashMap 的 key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageViewDesc {
    /// format 可以基于 vk::Image 重解释
    pub(crate) format: vk::Format,
    /// view type 可以基于 vk::Image 重解释
    pub(crate) view_type: vk::ImageViewType,
    /// aspect 可以基于 vk::Image 重解释
    pub(crate) aspect_mask: vk::ImageAspectFlags,
    /// base mip level 和 mip level count
    pub(crate) mip: (u8, u8),
    /// base layer 和 layer count
    pub(crate) layer: (u8, u8),
}
impl GfxImageViewDesc {
    pub fn new_2d(format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            format,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect_mask: aspect,
            mip: (0, 1),
            layer: (0, 1),
        }
    }

    /// 创建完整的视图描述
    ///
    /// # 参数
    /// - `format`: 图像格式（可重解释）
    /// - `view_type`: 视图类型（2D, 3D, Cube, Array 等）
    /// - `aspect_mask`: 图像 aspect（COLOR, DEPTH, STENCIL）
    /// - `mip_range`: (base_mip_level, level_count)
    /// - `layer_range`: (base_array_layer, layer_count)
    pub fn new(
        format: vk::Format,
        view_type: vk::ImageViewType,
        aspect_mask: vk::ImageAspectFlags,
        mip_range: (u8, u8),
        layer_range: (u8, u8),
    ) -> Self {
        Self {
            format,
            view_type,
            aspect_mask,
            mip: mip_range,
            layer: layer_range,
        }
    }

    /// 只看某一级 mip 的视图，storage image 的 descriptor 按 mip 分别创建
    #[inline]
    pub fn with_single_mip(mut self, mip: u32) -> Self {
        self.mip = (mip as u8, 1);
        self
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }
    #[inline]
    pub fn view_type(&self) -> vk::ImageViewType {
        self.view_type
    }
    #[inline]
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        self.aspect_mask
    }
    #[inline]
    pub fn mip_range(&self) -> (u32, u32) {
        (self.mip.0 as u32, self.mip.1 as u32)
    }
    #[inline]
    pub fn layer_range(&self) -> (u32, u32) {
        (self.layer.0 as u32, self.layer.1 as u32)
    }
}
