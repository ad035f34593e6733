//! 基础设施模块
//!
//! 封装外部依赖（命令执行、HTTP 回调）

pub mod command;
pub mod notifier;

pub use command::{CommandError, CommandRunner};
pub use notifier::StatusNotifier;
