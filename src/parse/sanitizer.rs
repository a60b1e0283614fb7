//! 响应清洗：从任意回复文本中截取候选 JSON 片段
//!
//! 顺序：围栏代码块（```json ... ``` 或 ``` ... ```）内部 → 首个 `{`/`[` 到最后一个同类闭合符 → 原文 trim。
//! 这是尽力而为的启发式，允许返回无法解析的文本，错误留给解析阶段。

const FENCE: &str = "```";

/// 截取候选结构化片段
pub fn sanitize(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(inner) = fenced_interior(trimmed) {
        return inner;
    }
    bracket_span(trimmed).unwrap_or(trimmed)
}

/// 第一对围栏之间的内容；起始围栏后的语言标记（如 json）整行跳过
fn fenced_interior(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let mut rest = &text[open + FENCE.len()..];
    if let Some(newline) = rest.find('\n') {
        let tag = rest[..newline].trim();
        if tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            rest = &rest[newline + 1..];
        }
    }
    let close = rest.find(FENCE)?;
    Some(rest[..close].trim())
}

/// `{` 与 `[` 谁先出现就按谁截取，到同类闭合符最后一次出现处（含）
fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
