//! 课时分配校验
//!
//! 只接受「正整数 + 固定单位」（如 "4 JP"）的取值；缺失、重复、格式错误或超出单行上限的行逐行替换为保守默认值并记日志。
//! 不校验总和是否等于目标总课时：该约束只写在给生成服务的指令里，这里明确不做保证。

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;

use crate::core::RecoveryEvent;
use crate::curriculum::{AllocationRow, SequencedRow};

/// 提案中的一条 {index, value}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetEntry {
    pub index: Option<usize>,
    pub value: Option<String>,
}

/// 校验后的分配
#[derive(Debug, Clone)]
pub struct ValidatedAllocation {
    pub rows: Vec<AllocationRow>,
    pub events: Vec<RecoveryEvent>,
}

impl ValidatedAllocation {
    /// 实际总课时（仅供展示，与指令中的目标总数可能不同）
    pub fn total_budget(&self) -> u64 {
        self.rows
            .iter()
            .filter_map(AllocationRow::budget_amount)
            .map(u64::from)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct AllocationValidator {
    unit: String,
    default_amount: u32,
    max_amount: u32,
    pattern: Regex,
}

impl AllocationValidator {
    pub fn new(unit: impl Into<String>, default_amount: u32) -> Self {
        let unit = unit.into();
        let pattern =
            Regex::new(&format!(r"^\s*([1-9][0-9]*)\s*{}\s*$", regex::escape(unit.trim())))
                .unwrap();
        Self {
            unit,
            default_amount: default_amount.max(1),
            max_amount: u32::MAX,
            pattern,
        }
    }

    /// 单行课时上限；超过上限的取值按格式错误处理
    pub fn with_max_amount(mut self, max_amount: u32) -> Self {
        self.max_amount = max_amount.max(self.default_amount);
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn default_value(&self) -> String {
        format!("{} {}", self.default_amount, self.unit)
    }

    pub fn accepts(&self, value: &str) -> bool {
        self.pattern
            .captures(value)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .is_some_and(|amount| amount <= self.max_amount)
    }

    /// 每个 SequencedRow 恰好产出一条 AllocationRow
    pub fn validate(&self, rows: &[SequencedRow], entries: &[BudgetEntry]) -> ValidatedAllocation {
        let mut by_row: HashMap<usize, Vec<Option<&str>>> = HashMap::new();
        for (position, entry) in entries.iter().enumerate() {
            let index = entry.index.unwrap_or(position);
            if index >= rows.len() {
                tracing::warn!("Allocation entry for unknown row {} ignored", index);
                continue;
            }
            by_row.entry(index).or_default().push(entry.value.as_deref());
        }

        let mut events = Vec::new();
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let proposed = by_row.get(&i).map(Vec::as_slice).unwrap_or_default();
                let accepted = match proposed {
                    [Some(value)] if self.accepts(value) => Some(value.trim().to_string()),
                    _ => None,
                };
                let time_budget = accepted.unwrap_or_else(|| {
                    let rejected = describe_rejected(proposed);
                    tracing::warn!(
                        "Allocation row {} ({}) replaced with default {}: {:?}",
                        i,
                        row.code,
                        self.default_value(),
                        rejected
                    );
                    events.push(RecoveryEvent::PerRowDefault { row: i, rejected });
                    self.default_value()
                });
                AllocationRow {
                    order: row.sequence,
                    topic: row.topic.clone(),
                    code: row.code.clone(),
                    objective_text: row.objective_text.clone(),
                    time_budget,
                    semester: row.semester.clone(),
                }
            })
            .collect();

        ValidatedAllocation { rows, events }
    }
}

fn describe_rejected(proposed: &[Option<&str>]) -> Option<String> {
    match proposed {
        [] => None,
        [single] => single.map(str::to_string),
        many => Some(format!("{} duplicate entries", many.len())),
    }
}

/// 从解析后的值中取出 {index, value} 列表；数字取值会保留为文本，交由格式校验拒绝
pub fn budget_entries(value: &Value) -> Vec<BudgetEntry> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .values()
            .find_map(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };
    items.iter().map(entry_of).collect()
}

fn entry_of(item: &Value) -> BudgetEntry {
    match item {
        Value::Object(map) => {
            let index = map.get("index").and_then(|v| match v {
                Value::Number(n) => n.as_u64().map(|n| n as usize),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });
            let value = ["value", "alokasi", "time_budget", "jp"]
                .iter()
                .find_map(|k| map.get(*k))
                .and_then(value_text);
            BudgetEntry { index, value }
        }
        other => BudgetEntry {
            index: None,
            value: value_text(other),
        },
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
