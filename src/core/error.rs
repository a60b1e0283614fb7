//! 错误类型与本地恢复事件
//!
//! 只有「无法得到任何可用产物」的情况才作为 CurriculumError 向上抛出；
//! 结构不匹配、单行默认值、分块失败都在管线内部就地恢复，记录为 RecoveryEvent。

use thiserror::Error;

/// 生成流程中向调用方暴露的错误
#[derive(Error, Debug)]
pub enum CurriculumError {
    /// 清洗 + 容错解析后仍不是合法结构，raw 保留原始文本用于排查
    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String, raw: String },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("LLM error: {0}")]
    Llm(String),

    /// 批量生成全部分块失败等聚合失败
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CurriculumError {
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

impl From<rusqlite::Error> for CurriculumError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Store(value.to_string())
    }
}

/// 管线内部已恢复的异常，随产物一起返回，不会作为错误抛出
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryEvent {
    /// 提案形状不匹配任何策略，已回退为原始顺序
    StructuralMismatch {
        expected_rows: usize,
        expected_groups: usize,
        got: Option<usize>,
    },
    /// 细粒度重排中的越界 / 重复下标，被替换为占位行
    InvalidIndex { position: usize, index: i64 },
    /// 单行取值非法，已替换为默认值
    PerRowDefault { row: usize, rejected: Option<String> },
    /// 整个分块失败，其位置将由默认值填充
    ChunkFailure {
        chunk: usize,
        start: usize,
        end: usize,
        reason: String,
    },
}
