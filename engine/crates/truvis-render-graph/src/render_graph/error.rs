use truvis_gfx::GfxError;

/// RenderGraph 中可以恢复的错误
///
/// 误用 API（读取已经被覆盖的版本、token 来自其他帧等）属于编程错误，直接 panic
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RgError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    /// external 资源在本帧被使用，但是没有调用 `set_external_*` 绑定
    #[error("external resource \"{name}\" is used but not bound")]
    ExternalNotBound { name: String },
}

pub type RgResult<T> = Result<T, RgError>;
