//! Image 资源定义
//!
//! 物理 texture 分为四类：
//! - Transient：只在一帧内有效，由 [`RgBuilder::create_texture`](super::RgBuilder::create_texture) 创建，
//!   图像从 [`RgPersistent`](super::RgPersistent) 的池中复用
//! - Persistent：跨帧保留内容
//! - Temporal：多层的 persistent texture，每帧轮转一次，用于 history / 累积
//! - External：图像由调用者每帧通过 `set_external_texture` 提供

use std::sync::Arc;

use ash::vk;

use truvis_gfx::commands::command_recorder::GfxCommandRecorder;
use truvis_gfx::foundation::device::GfxDevice;
use truvis_gfx::handles::{GfxImageHandle, GfxImageViewHandle, GfxSamplerHandle};
use truvis_gfx::resources::image::GfxImageDesc;
use truvis_gfx::resources::image_view::GfxImageViewDesc;

use super::barrier::RgAccessTracker;
use super::handle::{RgPassId, RgTextureId};
use super::resource_state::{RgImageState, WRITE_ACCESS};

/// temporal texture 最多的层数
pub const RG_MAX_TEMPORAL_LAYERS: u32 = 4;

/// 对 temporal texture 的每一层调用一次，调用时图像处于 [`RgTemporalInit::state`]
pub type RgTextureInitCallback =
    Arc<dyn Fn(&dyn GfxDevice, GfxImageHandle, &mut dyn GfxCommandRecorder) + Send + Sync>;

/// temporal texture 在（重新）分配之后的初始化方式
#[derive(Clone)]
pub enum RgTemporalInit {
    /// 每一层都清除为这个值
    Clear(glam::Vec4),
    /// 以 `state` 访问每一层，由 callback 录制初始化命令
    Callback {
        state: RgImageState,
        callback: RgTextureInitCallback,
    },
}
impl RgTemporalInit {
    pub fn callback(
        state: RgImageState,
        callback: impl Fn(&dyn GfxDevice, GfxImageHandle, &mut dyn GfxCommandRecorder) + Send + Sync + 'static,
    ) -> Self {
        Self::Callback {
            state,
            callback: Arc::new(callback),
        }
    }

    /// init pass 访问各层时使用的状态
    #[inline]
    pub fn state(&self) -> RgImageState {
        match self {
            Self::Clear(_) => RgImageState::TRANSFER_DST,
            Self::Callback { state, .. } => *state,
        }
    }
}
impl std::fmt::Debug for RgTemporalInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clear(value) => f.debug_tuple("Clear").field(value).finish(),
            Self::Callback { state, .. } => f.debug_struct("Callback").field("state", state).finish_non_exhaustive(),
        }
    }
}
impl PartialEq for RgTemporalInit {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Clear(a), Self::Clear(b)) => a == b,
            (
                Self::Callback { state, callback },
                Self::Callback {
                    state: other_state,
                    callback: other_callback,
                },
            ) => state == other_state && Arc::ptr_eq(callback, other_callback),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RgTextureKind {
    Transient,
    Persistent,
    Temporal {
        /// 2..=RG_MAX_TEMPORAL_LAYERS
        layers: u32,
        init: Option<RgTemporalInit>,
    },
    External {
        /// 外部图像具备的 usage
        usage: vk::ImageUsageFlags,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct RgTextureCreateInfo {
    pub name: String,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub kind: RgTextureKind,
}
impl RgTextureCreateInfo {
    pub fn new_2d(name: impl Into<String>, extent: vk::Extent2D, format: vk::Format, kind: RgTextureKind) -> Self {
        Self {
            name: name.into(),
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            kind,
        }
    }

    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    pub(crate) fn validate(&self) {
        assert!(
            self.extent.width > 0 && self.extent.height > 0 && self.extent.depth > 0,
            "texture \"{}\" has an empty extent",
            self.name
        );
        assert!(self.mip_levels > 0, "texture \"{}\" has no mip levels", self.name);
        assert!(self.array_layers > 0, "texture \"{}\" has no array layers", self.name);
        if let RgTextureKind::Temporal { layers, .. } = self.kind {
            assert!(
                (2..=RG_MAX_TEMPORAL_LAYERS).contains(&layers),
                "temporal texture \"{}\" must have 2..={} layers, got {}",
                self.name,
                RG_MAX_TEMPORAL_LAYERS,
                layers
            );
        }
        if let RgTextureKind::Temporal { init: Some(init), .. } = &self.kind {
            assert!(
                init.state().access.intersects(WRITE_ACCESS),
                "temporal texture \"{}\" must be initialized with a write access, got {:?}",
                self.name,
                init.state()
            );
        }
    }

    pub(crate) fn image_desc(&self, name: String, usage: vk::ImageUsageFlags) -> GfxImageDesc {
        GfxImageDesc {
            name,
            image_type: if self.extent.depth > 1 {
                vk::ImageType::TYPE_3D
            } else {
                vk::ImageType::TYPE_2D
            },
            format: self.format,
            extent: self.extent,
            mip_levels: self.mip_levels,
            array_layers: self.array_layers,
            usage,
        }
    }

    /// 覆盖全部 mip 和 layer 的 view
    pub(crate) fn default_view_desc(&self) -> GfxImageViewDesc {
        let view_type = if self.extent.depth > 1 {
            vk::ImageViewType::TYPE_3D
        } else if self.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };
        GfxImageViewDesc::new(
            self.format,
            view_type,
            truvis_gfx::resources::image::VulkanFormatUtils::aspect_of(self.format),
            (0, self.mip_levels as u8),
            (0, self.array_layers as u8),
        )
    }

    #[inline]
    pub(crate) fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: truvis_gfx::resources::image::VulkanFormatUtils::aspect_of(self.format),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

/// 物理 texture 中随 temporal 轮转一起移动的部分
#[derive(Clone, Debug, Default)]
pub(crate) struct RgTextureSlot {
    pub image: Option<GfxImageHandle>,
    /// 当前图像具备的 usage
    pub usage: vk::ImageUsageFlags,
    pub tracker: RgAccessTracker,
    /// temporal texture 的层编号，轮转时跟着图像移动
    pub layer: u32,
}

pub(crate) struct RgPhysicalTexture {
    pub info: RgTextureCreateInfo,
    pub slot: RgTextureSlot,
    /// 第一次声明的 id，用户跨帧缓存的就是它
    pub id: RgTextureId,
    /// temporal init pass 的输入版本
    pub init_id: Option<RgTextureId>,
    /// temporal texture 的第一层所在的下标，其他类型为自身
    pub base: u32,
    /// temporal texture 的图像是新分配的，需要 init pass
    pub needs_init: bool,
    /// external texture 本帧绑定的 view
    pub external_view: Option<GfxImageViewHandle>,
}
impl RgPhysicalTexture {
    #[inline]
    pub fn temporal_layers(&self) -> u32 {
        match self.info.kind {
            RgTextureKind::Temporal { layers, .. } => layers,
            _ => 1,
        }
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self.info.kind, RgTextureKind::Transient)
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        matches!(self.info.kind, RgTextureKind::External { .. })
    }
}

/// 虚拟 texture 的一个版本
#[derive(Clone, Debug)]
pub(crate) struct RgTexture {
    pub name: String,
    pub parent: u32,
    pub def: Option<RgPassId>,
    pub kill: Option<RgPassId>,
    pub child: Option<RgTextureId>,
}

/// pass 对 texture 的一次使用
#[derive(Clone, Copy, Debug)]
pub(crate) struct RgTextureUse {
    /// 已经考虑了 temporal history 的物理下标
    pub physical: u32,
    pub sampler: Option<GfxSamplerHandle>,
    pub state: RgImageState,
}

/// transient 池中的图像
pub(crate) struct RgPooledTexture {
    pub key: GfxImageDesc,
    pub image: GfxImageHandle,
    pub last_used_frame: u64,
    /// 上一次使用结束时的访问历史，下一次取出时内容作废但仍需等待这些访问
    pub tracker: RgAccessTracker,
}
