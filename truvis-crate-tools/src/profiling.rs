//! tracy 性能分析的薄封装
//!
//! `tracy_client::span!` 在没有运行中的 Client 时会 panic，
//! 这里统一通过 `Client::running()` 判断，测试和 headless 运行都不需要启动 tracy。

#[cfg(feature = "profiling")]
pub use tracy_client;

/// 创建一个作用域内有效的 tracy zone
///
/// ```ignore
/// let _span = truvis_crate_tools::profile_span!("RgBuilder::build");
/// ```
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_span {
    ($name:expr) => {
        $crate::profiling::tracy_client::Client::running()
            .map(|client| client.span_alloc(Some($name), "", file!(), line!(), 0))
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_span {
    ($name:expr) => {{
        let _ = $name;
    }};
}

/// 标记一帧结束
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_frame_mark {
    () => {
        if let Some(client) = $crate::profiling::tracy_client::Client::running() {
            client.frame_mark();
        }
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_frame_mark {
    () => {};
}
