//! Truvis 的 GFX 边界层
//!
//! RenderGraph 只通过这里定义的 trait 与 GPU 交互：
//! - [`foundation::device::GfxDevice`]：资源创建/销毁、semaphore、提交
//! - [`commands::command_recorder::GfxCommandRecorder`]：命令录制
//!
//! 所有资源都以 slotmap 句柄表示，描述结构体直接使用 `ash::vk` 的类型。
//! [`headless::HeadlessDevice`] 是一个纯软件实现，在 host 内存上执行传输命令，
//! 按 semaphore 依赖顺序完成提交，用于测试和无窗口运行。

pub mod commands;
pub mod error;
pub mod foundation;
pub mod handles;
pub mod headless;
pub mod resources;
pub mod sampler;

pub use error::{GfxError, GfxResult};
