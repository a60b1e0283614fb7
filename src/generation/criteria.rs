//! 达成标准的分块生成任务
//!
//! 每块只发送块内的行（块内下标从 0 起）；回复按 index 归位，缺少 index 时按位置对应。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::batch::ChunkJob;
use crate::curriculum::{CriterionRow, MasteryLevel, SequencedRow};
use crate::generation::request::{Action, CriteriaPayload, RowItem, ServiceRequest};
use crate::llm::LlmClient;

/// 未生成的达成标准使用的描述
pub const CRITERIA_PENDING: &str = "[not generated, please review]";

pub struct CriteriaJob {
    llm: Arc<dyn LlmClient>,
}

impl CriteriaJob {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ChunkJob for CriteriaJob {
    type Unit = SequencedRow;
    type Output = CriterionRow;

    async fn request(&self, chunk: &[SequencedRow], offset: usize) -> Result<String, String> {
        let payload = CriteriaPayload {
            rows: chunk
                .iter()
                .enumerate()
                .map(|(index, row)| RowItem {
                    index,
                    code: &row.code,
                    topic: &row.topic,
                    objective: &row.objective_text,
                })
                .collect(),
        };
        let request =
            ServiceRequest::new(Action::DraftCriteria, &payload).map_err(|e| e.to_string())?;
        tracing::debug!("Requesting criteria for rows {}..{}", offset, offset + chunk.len());
        self.llm.complete(&request.to_messages()).await
    }

    fn decode(&self, value: &Value, chunk: &[SequencedRow]) -> Result<Vec<CriterionRow>, String> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(map) => map
                .values()
                .find_map(|v| v.as_array())
                .ok_or_else(|| "no criteria list in response".to_string())?,
            _ => return Err("criteria response is not a list".to_string()),
        };
        if items.len() != chunk.len() {
            return Err(format!("expected {} items, got {}", chunk.len(), items.len()));
        }

        let drafts = items
            .iter()
            .map(draft_of)
            .collect::<Result<Vec<_>, _>>()?;
        let order = placement(&drafts, chunk.len());

        Ok(order
            .into_iter()
            .map(|(draft, row)| {
                let draft = &drafts[draft];
                let row = &chunk[row];
                CriterionRow {
                    code: row.code.clone(),
                    topic: row.topic.clone(),
                    objective_text: row.objective_text.clone(),
                    criteria_by_level: draft.criteria.clone(),
                    target_level: draft.target_level,
                }
            })
            .collect())
    }

    fn fallback(&self, unit: &SequencedRow, _position: usize) -> CriterionRow {
        pending_criterion(unit)
    }
}

/// 带标记的默认达成标准行
pub fn pending_criterion(row: &SequencedRow) -> CriterionRow {
    CriterionRow {
        code: row.code.clone(),
        topic: row.topic.clone(),
        objective_text: row.objective_text.clone(),
        criteria_by_level: std::array::from_fn(|_| CRITERIA_PENDING.to_string()),
        target_level: MasteryLevel::Proficient,
    }
}

#[derive(Debug)]
struct CriterionDraft {
    index: Option<usize>,
    criteria: [String; 4],
    target_level: MasteryLevel,
}

fn draft_of(item: &Value) -> Result<CriterionDraft, String> {
    let map = item
        .as_object()
        .ok_or_else(|| "criteria item is not an object".to_string())?;
    let index = map
        .get("index")
        .and_then(Value::as_u64)
        .map(|i| i as usize);
    let criteria = criteria_of(map.get("criteria").or_else(|| map.get("kriteria")))
        .ok_or_else(|| format!("criteria item {index:?} lacks four level descriptors"))?;
    let target_level = ["target_level", "target"]
        .iter()
        .find_map(|k| map.get(*k))
        .and_then(Value::as_str)
        .and_then(MasteryLevel::parse_loose)
        .unwrap_or(MasteryLevel::Proficient);
    Ok(CriterionDraft {
        index,
        criteria,
        target_level,
    })
}

/// 四级描述：数组（按级别顺序）或以级别名为键的对象
fn criteria_of(value: Option<&Value>) -> Option<[String; 4]> {
    let texts: Vec<String> = match value? {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<_>>()?,
        Value::Object(map) => {
            let mut by_level: [Option<String>; 4] = Default::default();
            for (key, text) in map {
                let level = MasteryLevel::parse_loose(key)?;
                let slot = MasteryLevel::ALL.iter().position(|l| *l == level)?;
                by_level[slot] = text.as_str().map(str::to_string);
            }
            by_level.into_iter().collect::<Option<_>>()?
        }
        _ => return None,
    };
    texts.try_into().ok()
}

/// (draft 下标, 块内行下标)；index 齐全且构成排列时按 index 归位，否则按位置
fn placement(drafts: &[CriterionDraft], len: usize) -> Vec<(usize, usize)> {
    let mut by_index: Vec<Option<usize>> = vec![None; len];
    let indexed = drafts.iter().enumerate().all(|(draft, d)| match d.index {
        Some(i) if i < len && by_index[i].is_none() => {
            by_index[i] = Some(draft);
            true
        }
        _ => false,
    });
    if indexed {
        by_index
            .into_iter()
            .enumerate()
            .filter_map(|(row, draft)| draft.map(|d| (d, row)))
            .collect()
    } else {
        (0..len).map(|i| (i, i)).collect()
    }
}
