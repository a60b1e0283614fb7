//! 生成服务请求：动作标签 + JSON 负载，渲染为 system / user 两条消息
//!
//! system 消息给出该动作的输出契约；user 消息只携带序列化后的负载。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::CurriculumError;
use crate::llm::Message;

/// 请求动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    GenerateObjectives,
    SequenceFlow,
    AllocateTime,
    DraftCriteria,
}

impl Action {
    fn instructions(&self) -> &'static str {
        match self {
            Action::GenerateObjectives => {
                "You draft learning objectives for a school curriculum. From the elements and \
                 learning outcomes (CP) in the payload, for the given grade, write a JSON array of \
                 materials: [{\"semester\": \"...\", \"title\": \"...\", \"sub_materials\": \
                 [{\"title\": \"...\", \"objectives\": [\"...\"]}]}]. Respond with JSON only."
            }
            Action::SequenceFlow => {
                "You order learning objectives into a teaching sequence. The payload lists every \
                 objective with its 0-based index. Respond with a JSON array containing each index \
                 exactly once, in teaching order, optionally as objects {\"index\": n, \"topic\": \
                 \"...\"}. Do not invent indices. Respond with JSON only."
            }
            Action::AllocateTime => {
                "You allocate lesson time. For every row in the payload return {\"index\": n, \
                 \"value\": \"<positive integer> <unit>\"} using the unit given in the payload. The \
                 values should add up to total_hours. Respond with a JSON array only."
            }
            Action::DraftCriteria => {
                "You write mastery criteria. For every row in the payload return {\"index\": n, \
                 \"criteria\": [four descriptors ordered needs_guidance, developing, proficient, \
                 advanced], \"target_level\": \"proficient\"}. Keep one item per row, in the same \
                 order. Respond with a JSON array only."
            }
        }
    }
}

/// 发往生成服务的一次请求
#[derive(Debug, Clone, Serialize)]
pub struct ServiceRequest {
    pub action: Action,
    pub payload: Value,
}

impl ServiceRequest {
    pub fn new(action: Action, payload: impl Serialize) -> Result<Self, CurriculumError> {
        Ok(Self {
            action,
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn to_messages(&self) -> Vec<Message> {
        vec![
            Message::system(self.action.instructions()),
            Message::user(self.payload.to_string()),
        ]
    }
}

/// 目标生成负载中的一个要素及其学习成果（CP）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementOutcome {
    pub element: String,
    pub cp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectivePayload<'a> {
    pub elements: &'a [ElementOutcome],
    pub grade: &'a str,
    pub notes: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequencingItem<'a> {
    pub index: usize,
    pub code: &'a str,
    pub material: &'a str,
    pub objective: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequencingPayload<'a> {
    pub material_count: usize,
    pub items: Vec<SequencingItem<'a>>,
}

/// 课时分配与达成标准共用的行描述
#[derive(Debug, Clone, Serialize)]
pub struct RowItem<'a> {
    pub index: usize,
    pub code: &'a str,
    pub topic: &'a str,
    pub objective: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationPayload<'a> {
    pub weekly_hours: u32,
    pub total_hours: u64,
    pub unit: &'a str,
    pub rows: Vec<RowItem<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriteriaPayload<'a> {
    pub rows: Vec<RowItem<'a>>,
}
