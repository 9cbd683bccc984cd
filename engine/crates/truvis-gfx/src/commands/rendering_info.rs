use ash::vk;

use crate::handles::{GfxImageHandle, GfxImageViewHandle};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GfxLoadOp<T> {
    Load,
    Clear(T),
    DontCare,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GfxStoreOp {
    #[default]
    Store,
    DontCare,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxColorAttachmentOps {
    pub load: GfxLoadOp<glam::Vec4>,
    pub store: GfxStoreOp,
}
impl Default for GfxColorAttachmentOps {
    fn default() -> Self {
        Self {
            load: GfxLoadOp::Load,
            store: GfxStoreOp::Store,
        }
    }
}
impl GfxColorAttachmentOps {
    #[inline]
    pub fn clear(value: glam::Vec4) -> Self {
        Self {
            load: GfxLoadOp::Clear(value),
            store: GfxStoreOp::Store,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxDepthAttachmentOps {
    pub load: GfxLoadOp<f32>,
    pub store: GfxStoreOp,
}
impl Default for GfxDepthAttachmentOps {
    fn default() -> Self {
        Self {
            load: GfxLoadOp::Load,
            store: GfxStoreOp::Store,
        }
    }
}
impl GfxDepthAttachmentOps {
    #[inline]
    pub fn clear(depth: f32) -> Self {
        Self {
            load: GfxLoadOp::Clear(depth),
            store: GfxStoreOp::Store,
        }
    }

    /// 只读深度：不清除，也不写回
    #[inline]
    pub fn read_only() -> Self {
        Self {
            load: GfxLoadOp::Load,
            store: GfxStoreOp::DontCare,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxColorAttachment {
    pub image: GfxImageHandle,
    pub view: GfxImageViewHandle,
    pub layout: vk::ImageLayout,
    pub ops: GfxColorAttachmentOps,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GfxDepthAttachment {
    pub image: GfxImageHandle,
    pub view: GfxImageViewHandle,
    pub layout: vk::ImageLayout,
    pub ops: GfxDepthAttachmentOps,
}

/// dynamic rendering 的参数
///
/// `color_attachments` 的下标就是 attachment location，空洞用 None 表示
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GfxRenderingInfo {
    pub render_area: vk::Extent2D,
    pub color_attachments: Vec<Option<GfxColorAttachment>>,
    pub depth_attachment: Option<GfxDepthAttachment>,
}
impl GfxRenderingInfo {
    /// 覆盖整个 render area 的 viewport
    pub fn full_viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.render_area.width as f32,
            height: self.render_area.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}
