//! 核心：错误类型与恢复事件

pub mod error;

pub use error::{CurriculumError, RecoveryEvent};
