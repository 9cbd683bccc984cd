use ash::vk;

use crate::handles::GfxBufferHandle;

/// Buffer 所在的内存堆
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum GfxMemoryHeap {
    /// device local，host 不可见
    #[default]
    Default,
    /// host visible + coherent，用于每帧上传的数据
    Upload,
    /// host visible + cached，用于 GPU 回读
    Readback,
}
impl GfxMemoryHeap {
    #[inline]
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, Self::Default)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxBufferDesc {
    pub name: String,
    pub heap: GfxMemoryHeap,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

/// GPU 虚拟地址（buffer device address）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct GfxDevicePtr(pub vk::DeviceAddress);
impl GfxDevicePtr {
    pub const NULL: Self = Self(0);

    #[inline]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn offset(&self, bytes: vk::DeviceSize) -> Self {
        debug_assert!(!self.is_null());
        Self(self.0 + bytes)
    }
}

/// buffer 的一段连续区间
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxBufferView {
    pub buffer: GfxBufferHandle,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}
impl GfxBufferView {
    #[inline]
    pub fn new(buffer: GfxBufferHandle, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        Self { buffer, offset, size }
    }

    /// 从 `offset` 开始直到 view 末尾
    #[inline]
    pub fn slice(&self, offset: vk::DeviceSize) -> Self {
        assert!(offset <= self.size, "buffer slice offset {offset} out of range {}", self.size);
        Self {
            buffer: self.buffer,
            offset: self.offset + offset,
            size: self.size - offset,
        }
    }

    #[inline]
    pub fn sub_view(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Self {
        assert!(offset + size <= self.size, "buffer sub view [{offset}, {}) out of range {}", offset + size, self.size);
        Self {
            buffer: self.buffer,
            offset: self.offset + offset,
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::Key;

    #[test]
    fn test_view_slice() {
        let view = GfxBufferView::new(GfxBufferHandle::null(), 64, 256);
        let sliced = view.slice(16);
        assert_eq!(sliced.offset, 80);
        assert_eq!(sliced.size, 240);

        let sub = view.sub_view(32, 32);
        assert_eq!(sub.offset, 96);
        assert_eq!(sub.size, 32);
    }

    #[test]
    #[should_panic]
    fn test_view_slice_out_of_range() {
        let view = GfxBufferView::new(GfxBufferHandle::null(), 0, 16);
        let _ = view.sub_view(8, 16);
    }
}
