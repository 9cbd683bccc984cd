//! GFX 资源句柄
//!
//! 使用 slotmap 的代际索引，句柄本身是 `Copy` 的 POD，可以作为 HashMap 的 key。

slotmap::new_key_type! {
    pub struct GfxBufferHandle;
    pub struct GfxImageHandle;
    pub struct GfxImageViewHandle;
    pub struct GfxSamplerHandle;
    pub struct GfxSemaphoreHandle;
    pub struct GfxCommandBufferHandle;
}
