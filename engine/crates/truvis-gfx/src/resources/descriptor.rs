use crate::handles::{GfxImageViewHandle, GfxSamplerHandle};

/// 全局 bindless descriptor 表的种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GfxDescriptorKind {
    Sampler,
    /// 只读纹理（SAMPLED_IMAGE）
    Texture,
    /// 纹理 + 采样器（COMBINED_IMAGE_SAMPLER）
    SampledTexture,
    /// 可读写图像（STORAGE_IMAGE）
    StorageTexture,
}
impl GfxDescriptorKind {
    pub const ALL: [Self; 4] = [Self::Sampler, Self::Texture, Self::SampledTexture, Self::StorageTexture];
}

/// 写入全局 descriptor 表某个槽位的内容
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxDescriptorWrite {
    Sampler(GfxSamplerHandle),
    Texture(GfxImageViewHandle),
    SampledTexture(GfxImageViewHandle, GfxSamplerHandle),
    StorageTexture(GfxImageViewHandle),
}
impl GfxDescriptorWrite {
    #[inline]
    pub fn kind(&self) -> GfxDescriptorKind {
        match self {
            Self::Sampler(_) => GfxDescriptorKind::Sampler,
            Self::Texture(_) => GfxDescriptorKind::Texture,
            Self::SampledTexture(..) => GfxDescriptorKind::SampledTexture,
            Self::StorageTexture(_) => GfxDescriptorKind::StorageTexture,
        }
    }
}
