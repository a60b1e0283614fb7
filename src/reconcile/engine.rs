//! 对齐引擎：把生成服务给出的顺序映射回权威的扁平目标序列
//!
//! 外部给出的顺序只是可选增强：任何结构不匹配都回退到原序，从不向调用方报错。

use std::collections::HashSet;

use serde_json::Value;

use crate::core::RecoveryEvent;
use crate::curriculum::{FlatObjectiveRecord, SequencedRow};
use crate::reconcile::strategy::{ProposalEntry, Strategy, StrategyKind};

/// 对齐结果
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub rows: Vec<SequencedRow>,
    pub strategy: StrategyKind,
    pub events: Vec<RecoveryEvent>,
}

/// 对齐：records 为权威扁平序列（长度 N），material_count 为材料数 G
pub fn reconcile(
    records: &[FlatObjectiveRecord],
    material_count: usize,
    proposal: Option<&Value>,
) -> Reconciliation {
    let strategy = Strategy::select(proposal, records.len(), material_count);
    let kind = strategy.kind();
    let mut events = Vec::new();

    let rows = match strategy {
        Strategy::FineGrained(entries) => fine_grained(records, &entries, &mut events),
        Strategy::Coarse(order) => coarse(records, &order),
        Strategy::Identity(reason) => {
            tracing::warn!(
                "Sequencing proposal ignored ({}): expected {} rows or {} groups, using original order",
                reason,
                records.len(),
                material_count
            );
            events.push(RecoveryEvent::StructuralMismatch {
                expected_rows: records.len(),
                expected_groups: material_count,
                got: reason.proposal_len(),
            });
            identity(records)
        }
    };

    Reconciliation {
        rows,
        strategy: kind,
        events,
    }
}

/// 原序输出
pub fn identity(records: &[FlatObjectiveRecord]) -> Vec<SequencedRow> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| SequencedRow::from_record(r, i + 1, None))
        .collect()
}

/// 逐项重排；越界或重复的下标就地替换为占位行，不丢弃整个提案
fn fine_grained(
    records: &[FlatObjectiveRecord],
    entries: &[ProposalEntry],
    events: &mut Vec<RecoveryEvent>,
) -> Vec<SequencedRow> {
    let mut used = HashSet::with_capacity(records.len());
    let rows: Vec<SequencedRow> = entries
        .iter()
        .enumerate()
        .map(|(pos, entry)| {
            let record = usize::try_from(entry.index)
                .ok()
                .filter(|i| used.insert(*i))
                .and_then(|i| records.get(i));
            match record {
                Some(r) => SequencedRow::from_record(r, pos + 1, entry.topic.clone()),
                None => {
                    tracing::warn!(
                        "Sequencing proposal position {} has invalid index {}",
                        pos,
                        entry.index
                    );
                    events.push(RecoveryEvent::InvalidIndex {
                        position: pos,
                        index: entry.index,
                    });
                    SequencedRow::placeholder(pos + 1, entry.index)
                }
            }
        })
        .collect();

    let missing: Vec<&str> = records
        .iter()
        .enumerate()
        .filter(|(i, _)| !used.contains(i))
        .map(|(_, r)| r.code.as_str())
        .collect();
    if !missing.is_empty() {
        tracing::warn!("Objectives not referenced by proposal: {}", missing.join(", "));
    }
    rows
}

/// 按材料整体重排，材料内保持原有子序
fn coarse(records: &[FlatObjectiveRecord], order: &[usize]) -> Vec<SequencedRow> {
    order
        .iter()
        .flat_map(move |group| records.iter().filter(move |r| r.material_index == *group))
        .enumerate()
        .map(|(i, r)| SequencedRow::from_record(r, i + 1, None))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::curriculum::{flatten, CurriculumTree, MaterialGroup};

    /// 材料 0 有 2 个目标，材料 1 有 3 个目标
    fn records() -> Vec<FlatObjectiveRecord> {
        flatten(&CurriculumTree::new(vec![
            MaterialGroup::new("Ganjil", "Bilangan").with_sub("Cacah", ["b1", "b2"]),
            MaterialGroup::new("Genap", "Geometri")
                .with_sub("Datar", ["g1", "g2"])
                .with_sub("Ruang", ["g3"]),
        ]))
    }

    fn texts(rows: &[SequencedRow]) -> Vec<&str> {
        rows.iter().map(|r| r.objective_text.as_str()).collect()
    }

    fn sequences(rows: &[SequencedRow]) -> Vec<usize> {
        rows.iter().map(|r| r.sequence).collect()
    }

    #[test]
    fn test_fine_grained_reverse() {
        let out = reconcile(&records(), 2, Some(&json!([4, 3, 2, 1, 0])));
        assert_eq!(out.strategy, StrategyKind::FineGrained);
        assert_eq!(texts(&out.rows), vec!["g3", "g2", "g1", "b2", "b1"]);
        assert_eq!(sequences(&out.rows), vec![1, 2, 3, 4, 5]);
        assert!(out.events.is_empty());
    }

    #[test]
    fn test_fine_grained_out_of_range_becomes_placeholder() {
        let out = reconcile(&records(), 2, Some(&json!([4, 3, 2, 1, 99])));
        assert_eq!(out.rows.len(), 5);
        assert_eq!(texts(&out.rows[..4]), vec!["g3", "g2", "g1", "b2"]);
        assert_eq!(out.rows.iter().filter(|r| r.is_placeholder()).count(), 1);
        assert!(out.rows[4].is_placeholder());
        assert_eq!(out.rows[4].sequence, 5);
        assert_eq!(
            out.events,
            vec![RecoveryEvent::InvalidIndex { position: 4, index: 99 }]
        );
    }

    #[test]
    fn test_fine_grained_duplicate_is_not_emitted_twice() {
        let out = reconcile(&records(), 2, Some(&json!([0, 0, 1, 2, 3])));
        assert_eq!(out.rows.iter().filter(|r| r.code == "1.1").count(), 1);
        assert!(out.rows[1].is_placeholder());
    }

    #[test]
    fn test_fine_grained_keeps_proposed_topics() {
        let proposal = json!([
            {"index": 2, "topic": "Bangun Datar"},
            {"index": 0},
            {"index": 1},
            {"index": 3},
            {"index": 4}
        ]);
        let out = reconcile(&records(), 2, Some(&proposal));
        assert_eq!(out.rows[0].topic, "Bangun Datar");
        assert_eq!(out.rows[0].code, "2.1");
        assert_eq!(out.rows[1].topic, "Bilangan");
    }

    #[test]
    fn test_coarse_group_reorder() {
        let out = reconcile(&records(), 2, Some(&json!([1, 0])));
        assert_eq!(out.strategy, StrategyKind::Coarse);
        assert_eq!(texts(&out.rows), vec!["g1", "g2", "g3", "b1", "b2"]);
        assert_eq!(sequences(&out.rows), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_coarse_skips_empty_groups() {
        let records = flatten(&CurriculumTree::new(vec![
            MaterialGroup::new("Ganjil", "A").with_sub("a", ["a1", "a2"]),
            MaterialGroup::new("Ganjil", "Kosong"),
            MaterialGroup::new("Genap", "C").with_sub("c", ["c1", "c2"]),
        ]));
        let out = reconcile(&records, 3, Some(&json!([2, 1, 0])));
        assert_eq!(out.strategy, StrategyKind::Coarse);
        assert_eq!(texts(&out.rows), vec!["c1", "c2", "a1", "a2"]);
    }

    #[test]
    fn test_identity_fallback_on_length_mismatch() {
        let records = records();
        let out = reconcile(&records, 2, Some(&json!([2, 0, 1])));
        assert_eq!(out.strategy, StrategyKind::Identity);
        assert_eq!(out.rows, identity(&records));
        assert_eq!(sequences(&out.rows), vec![1, 2, 3, 4, 5]);
        assert_eq!(
            out.events,
            vec![RecoveryEvent::StructuralMismatch {
                expected_rows: 5,
                expected_groups: 2,
                got: Some(3),
            }]
        );
    }

    #[test]
    fn test_identity_without_proposal() {
        let records = records();
        let out = reconcile(&records, 2, None);
        assert_eq!(out.rows, identity(&records));
    }
}
