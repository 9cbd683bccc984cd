//! RenderGraph 资源句柄定义
//!
//! - 虚拟资源 id：slotmap 的代际索引，每次写操作都会产生一个新的 id（新版本），旧 id 不再可用
//! - token：pass 声明读写时得到的凭证，只能在本帧的 [`RgRuntime`](super::RgRuntime) 中解析
//!
//! 这些句柄与 `truvis_gfx::handles` 中的物理句柄分离，物理资源在 `build` 时才确定。

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

slotmap::new_key_type! {
    /// pass 的句柄，只在创建它的 builder 中有效
    pub struct RgPassId;
    /// 虚拟 texture 的一个版本
    pub struct RgTextureId;
    /// 由 [`RgPersistent`](super::RgPersistent) 创建的 external semaphore
    pub struct RgSemaphoreId;
}

slotmap::new_key_type! {
    pub(crate) struct RgBufferKey;
}

/// 虚拟 buffer 的一个版本，`T` 是元素类型
pub struct RgBufferId<T> {
    pub(crate) key: RgBufferKey,
    _marker: PhantomData<fn() -> T>,
}

/// 以字节为单位的 buffer
pub type RgUntypedBufferId = RgBufferId<u8>;

impl<T> RgBufferId<T> {
    #[inline]
    pub(crate) fn new(key: RgBufferKey) -> Self {
        Self {
            key,
            _marker: PhantomData,
        }
    }

    /// 换一个元素类型来看待同一个版本
    #[inline]
    pub fn cast<U>(self) -> RgBufferId<U> {
        RgBufferId::new(self.key)
    }
}
impl<T> Clone for RgBufferId<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for RgBufferId<T> {}
impl<T> PartialEq for RgBufferId<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl<T> Eq for RgBufferId<T> {}
impl<T> Hash for RgBufferId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
impl<T> fmt::Debug for RgBufferId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgBuffer({:?})", self.key)
    }
}

/// pass 读写 buffer 时得到的凭证
///
/// `serial` 标识创建它的 builder，在其他帧的 runtime 中解析会 panic
pub struct RgBufferToken<T> {
    pub(crate) index: u32,
    pub(crate) serial: u32,
    _marker: PhantomData<fn() -> T>,
}
impl<T> RgBufferToken<T> {
    #[inline]
    pub(crate) fn new(index: u32, serial: u32) -> Self {
        Self {
            index,
            serial,
            _marker: PhantomData,
        }
    }
}
impl<T> Clone for RgBufferToken<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for RgBufferToken<T> {}
impl<T> PartialEq for RgBufferToken<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.serial == other.serial
    }
}
impl<T> Eq for RgBufferToken<T> {}
impl<T> fmt::Debug for RgBufferToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgBufferToken(#{}@{})", self.index, self.serial)
    }
}

/// pass 读写 texture 时得到的凭证
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RgTextureToken {
    pub(crate) index: u32,
    pub(crate) serial: u32,
}
impl fmt::Debug for RgTextureToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgTextureToken(#{}@{})", self.index, self.serial)
    }
}
