//! Kurikulum - 课程目标树整理与 AI 辅助派生
//!
//! 模块划分：
//! - **allocation**: 课时分配校验与周计划推导
//! - **batch**: 分块请求编排（节流、部分失败、默认值补齐）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与本地恢复事件
//! - **curriculum**: 课程树数据模型与层级扁平化
//! - **generation**: 生成服务请求构造与各产物生成流程
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / 脚本化 Mock）
//! - **observability**: 日志初始化
//! - **parse**: 回复清洗与容错解析
//! - **reconcile**: 外部排序提案与权威目标序列的对齐
//! - **store**: SQLite 文档持久化

pub mod allocation;
pub mod batch;
pub mod config;
pub mod core;
pub mod curriculum;
pub mod generation;
pub mod llm;
pub mod observability;
pub mod parse;
pub mod reconcile;
pub mod store;

pub use crate::core::{CurriculumError, RecoveryEvent};
pub use generation::CurriculumGenerator;
