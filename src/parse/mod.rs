//! 响应解析层：清洗（sanitizer）→ 容错解析（tolerant）
//!
//! 生成服务返回的文本不可信，这一层是结构上的唯一防线。

pub mod sanitizer;
pub mod tolerant;

use serde_json::Value;

use crate::core::CurriculumError;

pub use sanitizer::sanitize;
pub use tolerant::{parse_tolerant, repair, strip_line_comments};

/// 从整段回复文本得到 JSON 值
pub fn parse_response(text: &str) -> Result<Value, CurriculumError> {
    parse_tolerant(sanitize(text)).map_err(|e| match e {
        CurriculumError::MalformedResponse { reason, .. } => {
            CurriculumError::malformed(reason, text)
        }
        other => other,
    })
}
