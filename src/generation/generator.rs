//! 各类产物的生成流程
//!
//! 每个流程：构造请求 → 等待回复 → 同步执行清洗 / 解析 / 对齐（或校验）。
//! 只有无法得到任何可用产物（输入为空、服务调用失败、单请求回复无法解析、批量全部失败）时才返回错误。

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::allocation::{budget_entries, build_schedule, AllocationValidator};
use crate::batch::{BatchOrchestrator, ChunkAccumulator};
use crate::config::GenerationSection;
use crate::core::{CurriculumError, RecoveryEvent};
use crate::curriculum::{
    flatten, AllocationRow, CriterionRow, CurriculumTree, MaterialGroup, SequencedRow, WeekPlan,
};
use crate::generation::criteria::CriteriaJob;
use crate::generation::request::{
    Action, AllocationPayload, ElementOutcome, ObjectivePayload, RowItem, SequencingItem,
    SequencingPayload, ServiceRequest,
};
use crate::llm::LlmClient;
use crate::parse::parse_response;
use crate::reconcile::{reconcile, StrategyKind};

/// 目标生成的输入
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectiveRequest {
    pub elements: Vec<ElementOutcome>,
    pub grade: String,
    pub notes: String,
}

/// ATP 流程产物
#[derive(Debug, Clone)]
pub struct FlowArtifact {
    pub rows: Vec<SequencedRow>,
    pub strategy: StrategyKind,
    pub events: Vec<RecoveryEvent>,
}

/// 课时分配产物；nominal_total 仅是写给生成服务的目标，不做强制
#[derive(Debug, Clone)]
pub struct AllocationArtifact {
    pub rows: Vec<AllocationRow>,
    pub total_budget: u64,
    pub nominal_total: u64,
    pub events: Vec<RecoveryEvent>,
}

/// 达成标准产物
#[derive(Debug, Clone)]
pub struct CriteriaArtifact {
    pub rows: Vec<CriterionRow>,
    pub failed_chunks: usize,
    pub events: Vec<RecoveryEvent>,
}

/// 生成器：持有 LLM 客户端与生成参数
pub struct CurriculumGenerator {
    llm: Arc<dyn LlmClient>,
    settings: GenerationSection,
}

impl CurriculumGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, settings: GenerationSection) -> Self {
        Self { llm, settings }
    }

    pub fn settings(&self) -> &GenerationSection {
        &self.settings
    }

    async fn call(&self, request: &ServiceRequest) -> Result<String, CurriculumError> {
        self.llm
            .complete(&request.to_messages())
            .await
            .map_err(CurriculumError::Llm)
    }

    /// 根据要素 / CP、年级与备注生成课程目标树
    pub async fn generate_objectives(
        &self,
        input: &ObjectiveRequest,
    ) -> Result<CurriculumTree, CurriculumError> {
        if input.elements.is_empty() {
            return Err(CurriculumError::EmptyInput("no elements given".to_string()));
        }
        let payload = ObjectivePayload {
            elements: &input.elements,
            grade: &input.grade,
            notes: &input.notes,
        };
        let text = self
            .call(&ServiceRequest::new(Action::GenerateObjectives, &payload)?)
            .await?;
        let value = parse_response(&text)?;
        tree_from_value(value).map_err(|e| CurriculumError::malformed(e.to_string(), text))
    }

    /// 生成 ATP 流程：扁平化 → 请求排序 → 对齐；回复无法解析时按原序输出
    pub async fn generate_flow(&self, tree: &CurriculumTree) -> Result<FlowArtifact, CurriculumError> {
        let records = flatten(tree);
        if records.is_empty() {
            return Err(CurriculumError::EmptyInput("curriculum has no objectives".to_string()));
        }
        let payload = SequencingPayload {
            material_count: tree.material_count(),
            items: records
                .iter()
                .enumerate()
                .map(|(index, r)| SequencingItem {
                    index,
                    code: &r.code,
                    material: &r.material_title,
                    objective: &r.objective_text,
                })
                .collect(),
        };
        let text = self
            .call(&ServiceRequest::new(Action::SequenceFlow, &payload)?)
            .await?;

        let proposal = match parse_response(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Sequencing response unusable, keeping original order: {}", e);
                None
            }
        };
        let out = reconcile(&records, tree.material_count(), proposal.as_ref());
        tracing::info!(
            "Flow generated: {} rows via {:?} strategy",
            out.rows.len(),
            out.strategy
        );
        Ok(FlowArtifact {
            rows: out.rows,
            strategy: out.strategy,
            events: out.events,
        })
    }

    /// 生成课时分配：一次请求，逐行校验
    pub async fn generate_allocation(
        &self,
        rows: &[SequencedRow],
        weekly_hours: u32,
    ) -> Result<AllocationArtifact, CurriculumError> {
        if rows.is_empty() {
            return Err(CurriculumError::EmptyInput("flow has no rows".to_string()));
        }
        if weekly_hours == 0 {
            return Err(CurriculumError::Config(
                "weekly hours must be positive".to_string(),
            ));
        }
        let semesters: HashSet<&str> = rows.iter().map(|r| r.semester.as_str()).collect();
        let nominal_total =
            nominal_total(weekly_hours, self.settings.weeks_per_semester, semesters.len())
                .ok_or_else(|| {
                    CurriculumError::Config(format!(
                        "total hours overflow for {} weekly hours over {} semesters",
                        weekly_hours,
                        semesters.len()
                    ))
                })?;

        let payload = AllocationPayload {
            weekly_hours,
            total_hours: nominal_total,
            unit: &self.settings.time_unit,
            rows: row_items(rows),
        };
        let text = self
            .call(&ServiceRequest::new(Action::AllocateTime, &payload)?)
            .await?;
        let value = parse_response(&text)?;

        let validator =
            AllocationValidator::new(&self.settings.time_unit, self.settings.default_time_budget)
                .with_max_amount(u32::try_from(nominal_total).unwrap_or(u32::MAX));
        let validated = validator.validate(rows, &budget_entries(&value));
        let total_budget = validated.total_budget();
        if total_budget != nominal_total {
            tracing::info!(
                "Allocation totals {} {}, instructed total was {}",
                total_budget,
                self.settings.time_unit,
                nominal_total
            );
        }
        Ok(AllocationArtifact {
            rows: validated.rows,
            total_budget,
            nominal_total,
            events: validated.events,
        })
    }

    /// 生成达成标准：可按学期筛选，分块请求，失败块用带标记的默认行补齐
    pub async fn generate_criteria(
        &self,
        rows: &[SequencedRow],
        semester: Option<&str>,
    ) -> Result<CriteriaArtifact, CurriculumError> {
        let selected: Vec<SequencedRow> = rows
            .iter()
            .filter(|r| !r.is_placeholder())
            .filter(|r| semester.map_or(true, |s| r.semester == s))
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(CurriculumError::EmptyInput(format!(
                "no rows for semester {}",
                semester.unwrap_or("(all)")
            )));
        }

        let orchestrator =
            BatchOrchestrator::new(self.settings.criteria_chunk_size, self.settings.pacing());
        let job = CriteriaJob::new(self.llm.clone());
        let mut acc = ChunkAccumulator::new();
        let outcome = orchestrator.run(&job, &selected, &mut acc).await;

        if outcome.all_failed() {
            return Err(CurriculumError::GenerationFailed(format!(
                "all {} criteria chunks failed",
                outcome.chunks
            )));
        }
        Ok(CriteriaArtifact {
            rows: outcome.rows,
            failed_chunks: outcome.failed_chunks,
            events: outcome.events,
        })
    }

    /// 由课时分配推导周计划
    pub fn build_schedule(
        &self,
        rows: &[AllocationRow],
        weekly_hours: u32,
    ) -> Result<Vec<WeekPlan>, CurriculumError> {
        build_schedule(rows, weekly_hours, self.settings.weeks_per_semester)
    }
}

/// 每周课时 × 每学期周数 × 学期数
fn nominal_total(weekly_hours: u32, weeks_per_semester: usize, semesters: usize) -> Option<u64> {
    u64::from(weekly_hours)
        .checked_mul(u64::try_from(weeks_per_semester).ok()?)?
        .checked_mul(u64::try_from(semesters).ok()?)
}

fn row_items(rows: &[SequencedRow]) -> Vec<RowItem<'_>> {
    rows.iter()
        .enumerate()
        .map(|(index, r)| RowItem {
            index,
            code: &r.code,
            topic: &r.topic,
            objective: &r.objective_text,
        })
        .collect()
}

/// 接受材料数组或 {"materials": [...]} 两种形状
fn tree_from_value(value: Value) -> Result<CurriculumTree, serde_json::Error> {
    match value {
        Value::Array(_) => Ok(CurriculumTree::new(serde_json::from_value::<Vec<MaterialGroup>>(
            value,
        )?)),
        other => serde_json::from_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn settings() -> GenerationSection {
        GenerationSection {
            pacing_ms: 0,
            criteria_chunk_size: 2,
            ..GenerationSection::default()
        }
    }

    fn tree() -> CurriculumTree {
        CurriculumTree::new(vec![
            MaterialGroup::new("Ganjil", "Bilangan").with_sub("Cacah", ["b1", "b2"]),
            MaterialGroup::new("Genap", "Geometri").with_sub("Datar", ["g1", "g2", "g3"]),
        ])
    }

    fn scripted(replies: Vec<&str>) -> (Arc<ScriptedLlmClient>, CurriculumGenerator) {
        let llm = Arc::new(ScriptedLlmClient::with_texts(replies));
        (llm.clone(), CurriculumGenerator::new(llm, settings()))
    }

    #[tokio::test]
    async fn test_generate_objectives_parses_tree() {
        let reply = r#"Berikut rancangannya:
```json
[{"semester": "Ganjil", "title": "Bilangan", "sub_materials": [{"title": "Cacah", "objectives": ["b1", "b2"]}]}]
```"#;
        let (_, generator) = scripted(vec![reply]);
        let input = ObjectiveRequest {
            elements: vec![ElementOutcome {
                element: "Bilangan".into(),
                cp: "Peserta didik dapat ...".into(),
            }],
            grade: "Fase A".into(),
            notes: String::new(),
        };
        let tree = generator.generate_objectives(&input).await.unwrap();
        assert_eq!(tree.objective_count(), 2);
        assert_eq!(tree.materials[0].semester, "Ganjil");
    }

    #[tokio::test]
    async fn test_generate_objectives_wrong_shape_is_malformed() {
        let (_, generator) = scripted(vec![r#"{"materials": "tidak ada"}"#]);
        let input = ObjectiveRequest {
            elements: vec![ElementOutcome { element: "x".into(), cp: "y".into() }],
            ..Default::default()
        };
        let err = generator.generate_objectives(&input).await.unwrap_err();
        assert!(matches!(err, CurriculumError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_generate_flow_coarse() {
        let (llm, generator) = scripted(vec!["Urutan materi: [1, 0]"]);
        let flow = generator.generate_flow(&tree()).await.unwrap();
        assert_eq!(flow.strategy, StrategyKind::Coarse);
        let codes: Vec<_> = flow.rows.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["2.1", "2.2", "2.3", "1.1", "1.2"]);

        let sent: Value = serde_json::from_str(&llm.requests()[0][1].content).unwrap();
        assert_eq!(sent["material_count"], 2);
        assert_eq!(sent["items"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_generate_flow_unparsable_reply_keeps_order() {
        let (_, generator) = scripted(vec!["Maaf, saya tidak bisa mengurutkan."]);
        let flow = generator.generate_flow(&tree()).await.unwrap();
        assert_eq!(flow.strategy, StrategyKind::Identity);
        assert_eq!(flow.rows[0].code, "1.1");
        assert_eq!(flow.rows.len(), 5);
    }

    #[tokio::test]
    async fn test_generate_flow_errors() {
        let (_, generator) = scripted(vec![]);
        let err = generator.generate_flow(&CurriculumTree::default()).await.unwrap_err();
        assert!(matches!(err, CurriculumError::EmptyInput(_)));

        let llm = Arc::new(ScriptedLlmClient::new(vec![Err("connection refused".to_string())]));
        let generator = CurriculumGenerator::new(llm, settings());
        let err = generator.generate_flow(&tree()).await.unwrap_err();
        assert!(matches!(err, CurriculumError::Llm(_)));
    }

    #[tokio::test]
    async fn test_generate_allocation_validates_rows() {
        let flow = crate::reconcile::identity(&flatten(&tree()));
        let (_, generator) = scripted(vec![
            r#"[{"index": 0, "value": "4 JP"}, {"index": 1, "value": "4"},
                {"index": 2, "value": "6 JP"}, {"index": 3, "value": "-3 JP"},
                {"index": 4, "value": "8 JP"}]"#,
        ]);
        let alloc = generator.generate_allocation(&flow, 4).await.unwrap();
        let budgets: Vec<_> = alloc.rows.iter().map(|r| r.time_budget.as_str()).collect();
        assert_eq!(budgets, vec!["4 JP", "2 JP", "6 JP", "2 JP", "8 JP"]);
        assert_eq!(alloc.total_budget, 22);
        assert_eq!(alloc.nominal_total, 4 * 18 * 2);
        assert_eq!(alloc.events.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_criteria_semester_filter_and_total_failure() {
        let flow = crate::reconcile::identity(&flatten(&tree()));
        let reply = r#"[{"index": 0, "criteria": ["a", "b", "c", "d"]},
                        {"index": 1, "criteria": ["e", "f", "g", "h"]}]"#;
        let (llm, generator) = scripted(vec![reply]);
        let criteria = generator.generate_criteria(&flow, Some("Ganjil")).await.unwrap();
        assert_eq!(criteria.rows.len(), 2);
        assert_eq!(criteria.rows[1].criteria_by_level[0], "e");
        assert_eq!(llm.request_count(), 1);

        let (_, generator) = scripted(vec!["oops", "oops"]);
        let err = generator.generate_criteria(&flow, Some("Genap")).await.unwrap_err();
        assert!(matches!(err, CurriculumError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_generate_allocation_bounds_weekly_hours() {
        let flow = crate::reconcile::identity(&flatten(&tree()));
        let (llm, generator) = scripted(vec![]);
        let err = generator.generate_allocation(&flow, 0).await.unwrap_err();
        assert!(matches!(err, CurriculumError::Config(_)));
        assert_eq!(llm.request_count(), 0);

        let (_, generator) = scripted(vec![
            r#"["4000000000 JP", "4000000000 JP", "4 JP", "4 JP", "4 JP"]"#,
        ]);
        let alloc = generator.generate_allocation(&flow, 300_000_000).await.unwrap();
        assert_eq!(alloc.nominal_total, 300_000_000 * 18 * 2);
        assert_eq!(alloc.total_budget, 8_000_000_012);

        let (_, generator) = scripted(vec![r#"["4000000000 JP", "4 JP", "4 JP", "4 JP", "4 JP"]"#]);
        let alloc = generator.generate_allocation(&flow, 4).await.unwrap();
        assert_eq!(alloc.rows[0].time_budget, "2 JP");
        assert_eq!(alloc.total_budget, 18);

        assert_eq!(nominal_total(u32::MAX, usize::MAX, 2), None);
    }
}
