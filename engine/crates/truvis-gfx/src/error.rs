use crate::resources::descriptor::GfxDescriptorKind;

/// GFX 层可恢复的错误
///
/// 只包含设备可能在运行时返回的错误；句柄误用等编程错误直接 panic。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GfxError {
    #[error("out of device memory: requested {requested} bytes, budget {budget} bytes")]
    OutOfDeviceMemory { requested: u64, budget: u64 },

    #[error("out of host memory")]
    OutOfHostMemory,

    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    #[error("{kind:?} descriptor heap exhausted (capacity {capacity})")]
    DescriptorHeapExhausted { kind: GfxDescriptorKind, capacity: u32 },

    #[error("timeout while waiting for semaphore")]
    Timeout,

    #[error("device lost")]
    DeviceLost,
}

pub type GfxResult<T> = Result<T, GfxError>;
