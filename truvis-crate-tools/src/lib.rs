//! Truvis 工具集
//!
//! 提供日志初始化、性能分析宏等在各个 crate 之间共享的工具。
//!
//! # 性能分析
//! 启用 `profiling` feature 后，[`profile_span!`] 会创建 tracy zone；
//! 未启用时展开为空，不会引入任何运行时开销。

pub mod init_log;
pub mod profiling;
