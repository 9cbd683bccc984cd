//! 纯软件的 GfxDevice 实现
//!
//! - buffer 由 host 内存模拟，`copy_buffer`/`fill_buffer` 会真正执行
//! - image 只记录 layout 和最后一次 clear 的值，用于校验 barrier
//! - 提交按 semaphore 依赖顺序完成，没有真正的并行
//!
//! 校验失败不会 panic，而是记录在 [`HeadlessDevice::validation_errors`] 中，由测试断言。

mod command;
mod device;
mod recorder;

pub use command::{HeadlessCommand, HeadlessCommandBufferRecord, HeadlessSubmission};
pub use device::{HeadlessDevice, HeadlessSettings};
pub use recorder::HeadlessCommandRecorder;
