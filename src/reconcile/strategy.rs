//! 对齐策略选择
//!
//! 按结构匹配依次尝试：细粒度重排（长度 = 目标数）→ 粗粒度重排（长度 = 材料数且为材料排列）→ 原序回退。
//! 新策略只需增加一个变体和对应的分支，不影响已有策略。

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 提案中的一项：下标 + 可选的主题名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalEntry {
    pub index: i64,
    pub topic: Option<String>,
}

/// 回退到原序的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    /// 没有可用提案（解析失败等）
    NoProposal,
    /// 不是下标数组，也不是 {index, ...} 记录数组
    NotAnIndexList,
    /// 长度既不等于目标数也不等于材料数
    LengthMismatch { got: usize },
    /// 长度等于材料数，但不是合法的材料排列
    InvalidGroupOrder,
}

impl MismatchReason {
    pub fn proposal_len(&self) -> Option<usize> {
        match self {
            MismatchReason::LengthMismatch { got } => Some(*got),
            _ => None,
        }
    }
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchReason::NoProposal => write!(f, "no usable proposal"),
            MismatchReason::NotAnIndexList => write!(f, "proposal is not an index list"),
            MismatchReason::LengthMismatch { got } => write!(f, "proposal length {got}"),
            MismatchReason::InvalidGroupOrder => write!(f, "invalid material order"),
        }
    }
}

/// 选中的策略（携带执行该策略所需的数据）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    FineGrained(Vec<ProposalEntry>),
    Coarse(Vec<usize>),
    Identity(MismatchReason),
}

/// 策略种类，随产物返回用于展示与诊断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FineGrained,
    Coarse,
    Identity,
}

impl Strategy {
    /// 按结构选择策略：rows 为目标数 N，groups 为材料数 G
    pub fn select(proposal: Option<&Value>, rows: usize, groups: usize) -> Strategy {
        let Some(value) = proposal else {
            return Strategy::Identity(MismatchReason::NoProposal);
        };
        let Some(entries) = index_entries(value) else {
            return Strategy::Identity(MismatchReason::NotAnIndexList);
        };

        if entries.len() == rows {
            return Strategy::FineGrained(entries);
        }
        if entries.len() == groups {
            return match group_order(&entries, groups) {
                Some(order) => Strategy::Coarse(order),
                None => Strategy::Identity(MismatchReason::InvalidGroupOrder),
            };
        }
        Strategy::Identity(MismatchReason::LengthMismatch { got: entries.len() })
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::FineGrained(_) => StrategyKind::FineGrained,
            Strategy::Coarse(_) => StrategyKind::Coarse,
            Strategy::Identity(_) => StrategyKind::Identity,
        }
    }
}

/// 把提案归一为下标列表；对象包装（如 {"order": [...]}）取第一个数组字段
fn index_entries(value: &Value) -> Option<Vec<ProposalEntry>> {
    match value {
        Value::Array(items) => items.iter().map(entry_of).collect(),
        Value::Object(map) => map
            .values()
            .find(|v| v.is_array())
            .and_then(|v| v.as_array())
            .and_then(|items| items.iter().map(entry_of).collect()),
        _ => None,
    }
}

fn entry_of(item: &Value) -> Option<ProposalEntry> {
    match item {
        Value::Object(map) => {
            let index = map
                .get("index")
                .or_else(|| map.get("idx"))
                .and_then(as_integer)?;
            let topic = ["topic", "topik", "materi"]
                .iter()
                .find_map(|k| map.get(*k))
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string());
            Some(ProposalEntry { index, topic })
        }
        other => as_integer(other).map(|index| ProposalEntry { index, topic: None }),
    }
}

/// 接受整数、整值浮点与数字字符串
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 合法的材料排列：每个值都在 [0, G) 内且不重复
fn group_order(entries: &[ProposalEntry], groups: usize) -> Option<Vec<usize>> {
    let mut seen = HashSet::with_capacity(groups);
    entries
        .iter()
        .map(|e| {
            usize::try_from(e.index)
                .ok()
                .filter(|g| *g < groups && seen.insert(*g))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_select_fine_grained_for_row_length() {
        let proposal = json!([4, 3, 2, 1, 0]);
        assert_eq!(Strategy::select(Some(&proposal), 5, 2).kind(), StrategyKind::FineGrained);
    }

    #[test]
    fn test_fine_grained_wins_when_rows_equal_groups() {
        let proposal = json!([1, 0]);
        assert_eq!(Strategy::select(Some(&proposal), 2, 2).kind(), StrategyKind::FineGrained);
    }

    #[test]
    fn test_select_coarse_for_group_permutation() {
        let proposal = json!([1, 0]);
        assert_eq!(Strategy::select(Some(&proposal), 5, 2), Strategy::Coarse(vec![1, 0]));
    }

    #[test]
    fn test_invalid_group_order_falls_back() {
        for proposal in [json!([1, 1]), json!([0, 2]), json!([-1, 0])] {
            assert_eq!(
                Strategy::select(Some(&proposal), 5, 2),
                Strategy::Identity(MismatchReason::InvalidGroupOrder)
            );
        }
    }

    #[test]
    fn test_length_and_type_mismatch() {
        let proposal = json!([0, 1, 2]);
        assert_eq!(
            Strategy::select(Some(&proposal), 5, 2),
            Strategy::Identity(MismatchReason::LengthMismatch { got: 3 })
        );
        let proposal = json!(["a", "b", "c", "d", "e"]);
        assert_eq!(
            Strategy::select(Some(&proposal), 5, 2),
            Strategy::Identity(MismatchReason::NotAnIndexList)
        );
        assert_eq!(
            Strategy::select(None, 5, 2),
            Strategy::Identity(MismatchReason::NoProposal)
        );
    }

    #[test]
    fn test_records_and_wrapped_lists() {
        let proposal = json!({"urutan": [
            {"index": "1", "topic": "Geometri"},
            {"index": 0.0}
        ]});
        match Strategy::select(Some(&proposal), 2, 1) {
            Strategy::FineGrained(entries) => {
                assert_eq!(entries[0].index, 1);
                assert_eq!(entries[0].topic.as_deref(), Some("Geometri"));
                assert_eq!(entries[1].topic, None);
            }
            other => panic!("Expected FineGrained, got {other:?}"),
        }
    }

    #[test]
    fn test_wrapper_uses_first_array_in_document_order() {
        let proposal: Value =
            serde_json::from_str(r#"{"urutan": [1, 0], "alasan": ["a", "b"]}"#).unwrap();
        assert_eq!(Strategy::select(Some(&proposal), 5, 2), Strategy::Coarse(vec![1, 0]));
    }
}
