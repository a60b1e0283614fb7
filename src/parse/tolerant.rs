//! 容错解析：严格解析失败后做一轮固定的文本修复再试一次
//!
//! 修复顺序：补齐相邻 `}{` / `][` 之间缺失的逗号 → 给裸键加引号 → 删除闭合符前的尾逗号 →
//! 顶层出现并列值时包成数组。只修一轮，不迭代到不动点。全部为纯函数，无共享状态。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::CurriculumError;

static MISSING_OBJECT_SEP: OnceLock<Regex> = OnceLock::new();
static MISSING_ARRAY_SEP: OnceLock<Regex> = OnceLock::new();
static BARE_KEY: OnceLock<Regex> = OnceLock::new();
static TRAILING_SEP: OnceLock<Regex> = OnceLock::new();

/// 解析清洗后的文本；失败时 MalformedResponse 携带原始文本
pub fn parse_tolerant(text: &str) -> Result<Value, CurriculumError> {
    let stripped = strip_line_comments(text);
    if let Ok(value) = serde_json::from_str(&stripped) {
        return Ok(value);
    }

    let repaired = repair(&stripped);
    serde_json::from_str(&repaired).map_err(|e| {
        tracing::debug!("Tolerant parse failed after repair: {}; raw: {}", e, text);
        CurriculumError::malformed(e.to_string(), text)
    })
}

/// 删除字符串字面量之外的 `//` 行注释
pub fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// 单轮文本修复；字符串字面量内部原样保留
pub fn repair(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for (literal, segment) in segments(text) {
        if literal {
            out.push_str(segment);
        } else {
            out.push_str(&repair_structure(segment));
        }
    }
    let text = out.trim();

    if has_top_level_siblings(text) {
        format!("[{text}]")
    } else {
        text.to_string()
    }
}

fn repair_structure(text: &str) -> String {
    let object_sep = MISSING_OBJECT_SEP.get_or_init(|| Regex::new(r"\}\s*\{").unwrap());
    let array_sep = MISSING_ARRAY_SEP.get_or_init(|| Regex::new(r"\]\s*\[").unwrap());
    let bare_key = BARE_KEY
        .get_or_init(|| Regex::new(r"([\{,]\s*)([A-Za-z_][A-Za-z0-9_]*)(\s*:)").unwrap());
    let trailing = TRAILING_SEP.get_or_init(|| Regex::new(r",(\s*[\}\]])").unwrap());

    let text = object_sep.replace_all(text, "},{");
    let text = array_sep.replace_all(&text, "],[");
    let text = bare_key.replace_all(&text, r#"$1"$2"$3"#);
    trailing.replace_all(&text, "$1").into_owned()
}

/// 切分为 (是否字符串字面量, 片段)；字面量片段包含两侧引号，未闭合的字符串延伸到末尾
fn segments(text: &str) -> Vec<(bool, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    out.push((true, &text[start..=i]));
                    start = i + 1;
                    in_string = false;
                }
                _ => {}
            }
        } else if c == '"' {
            if start < i {
                out.push((false, &text[start..i]));
            }
            start = i;
            in_string = true;
        }
    }
    if start < text.len() {
        out.push((in_string, &text[start..]));
    }
    out
}

/// 深度 0 处出现逗号，说明是多个并列值（如 `{..},{..}`）
fn has_top_level_siblings(text: &str) -> bool {
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth -= 1,
            ',' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_strict_input_passes_through() {
        let value = parse_tolerant(r#"{"order": [2, 0, 1]}"#).unwrap();
        assert_eq!(value, json!({"order": [2, 0, 1]}));
    }

    #[test]
    fn test_line_comments_are_stripped_outside_strings() {
        let text = "[\n  1, // pertama\n  2 // kedua\n]";
        assert_eq!(parse_tolerant(text).unwrap(), json!([1, 2]));

        let text = r#"{"url": "http://contoh.id/a"}"#;
        assert_eq!(parse_tolerant(text).unwrap(), json!({"url": "http://contoh.id/a"}));
    }

    #[test]
    fn test_missing_separator_between_objects() {
        let text = r#"[{"index": 0, "value": "2 JP"} {"index": 1, "value": "3 JP"}]"#;
        let value = parse_tolerant(text).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_sibling_objects_become_array() {
        let value = parse_tolerant(r#"{"a": 1} {"b": 2}"#).unwrap();
        assert_eq!(value, json!([{"a": 1}, {"b": 2}]));
    }

    #[test]
    fn test_bare_keys_and_trailing_commas() {
        let text = r#"{index: 3, value: "4 JP",}"#;
        assert_eq!(parse_tolerant(text).unwrap(), json!({"index": 3, "value": "4 JP"}));

        let text = "[[1, 2] [3, 4],]";
        assert_eq!(parse_tolerant(text).unwrap(), json!([[1, 2], [3, 4]]));
    }

    #[test]
    fn test_unrepairable_input_is_malformed() {
        let err = parse_tolerant("maaf, tidak ada data").unwrap_err();
        match err {
            CurriculumError::MalformedResponse { raw, .. } => {
                assert_eq!(raw, "maaf, tidak ada data");
            }
            other => panic!("Expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_repair_is_single_pass() {
        let pathological = "{".repeat(64) + &"}{".repeat(64);
        assert!(parse_tolerant(&pathological).is_err());
    }

    #[test]
    fn test_repair_leaves_string_contents_alone() {
        let text = r#"[{"topic": "membaca, catatan: penting"},]"#;
        assert_eq!(
            parse_tolerant(text).unwrap(),
            json!([{"topic": "membaca, catatan: penting"}])
        );

        let text = r#"[{"topic": "pola } {, ]"} {index: 1, "topic": "a,]"},]"#;
        assert_eq!(
            parse_tolerant(text).unwrap(),
            json!([{"topic": "pola } {, ]"}, {"index": 1, "topic": "a,]"}])
        );
    }

    #[test]
    fn test_segments_split_on_string_literals() {
        let parts = segments(r#"{"a\"b": 1, "c"#);
        assert_eq!(
            parts,
            vec![(false, "{"), (true, r#""a\"b""#), (false, ": 1, "), (true, r#""c"#)]
        );
    }
}
