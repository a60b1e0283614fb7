//! 课程数据模型
//!
//! CurriculumTree 为编辑会话独占的权威树；其余结构都是从树派生的只读视图或产物行。

use serde::{Deserialize, Serialize};

/// 课程目标树：按声明顺序排列的材料组
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumTree {
    #[serde(default)]
    pub materials: Vec<MaterialGroup>,
}

/// 材料组（带学期标签）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialGroup {
    #[serde(alias = "semester_label")]
    pub semester: String,
    #[serde(alias = "material")]
    pub title: String,
    #[serde(default, alias = "subs", alias = "sub_material")]
    pub sub_materials: Vec<SubMaterialGroup>,
}

/// 子材料组：标题 + 自由文本目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMaterialGroup {
    #[serde(alias = "sub_material")]
    pub title: String,
    #[serde(default, alias = "tujuan")]
    pub objectives: Vec<String>,
}

impl CurriculumTree {
    pub fn new(materials: Vec<MaterialGroup>) -> Self {
        Self { materials }
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn objective_count(&self) -> usize {
        self.materials
            .iter()
            .flat_map(|m| m.sub_materials.iter())
            .map(|s| s.objectives.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.objective_count() == 0
    }
}

impl MaterialGroup {
    pub fn new(semester: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            semester: semester.into(),
            title: title.into(),
            sub_materials: Vec::new(),
        }
    }

    pub fn with_sub<I, S>(mut self, title: impl Into<String>, objectives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_materials.push(SubMaterialGroup {
            title: title.into(),
            objectives: objectives.into_iter().map(Into::into).collect(),
        });
        self
    }
}

/// 扁平化后的单条目标（只读视图）；code 每次扁平化时重新计算
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatObjectiveRecord {
    pub semester: String,
    pub material_title: String,
    pub objective_text: String,
    /// "<材料序号>.<材料内目标序号>"，均从 1 开始
    pub code: String,
    /// 材料在整棵树中的下标（0 起），供粗粒度重排分组
    pub material_index: usize,
}

/// ATP 流程行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedRow {
    pub topic: String,
    pub objective_text: String,
    pub code: String,
    /// 1 起连续编号
    pub sequence: usize,
    pub semester: String,
}

/// 越界下标占位行使用的编码
pub const PLACEHOLDER_CODE: &str = "?";

impl SequencedRow {
    pub fn from_record(record: &FlatObjectiveRecord, sequence: usize, topic: Option<String>) -> Self {
        Self {
            topic: topic
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| record.material_title.clone()),
            objective_text: record.objective_text.clone(),
            code: record.code.clone(),
            sequence,
            semester: record.semester.clone(),
        }
    }

    pub fn placeholder(sequence: usize, index: i64) -> Self {
        Self {
            topic: format!("[invalid index {index}]"),
            objective_text: String::new(),
            code: PLACEHOLDER_CODE.to_string(),
            sequence,
            semester: String::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.code == PLACEHOLDER_CODE
    }
}

/// 课时分配行；time_budget 为「正整数 + 单位」原文，如 "4 JP"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub order: usize,
    pub topic: String,
    pub code: String,
    pub objective_text: String,
    pub time_budget: String,
    pub semester: String,
}

impl AllocationRow {
    /// 取 time_budget 开头的整数部分
    pub fn budget_amount(&self) -> Option<u32> {
        let digits: String = self
            .time_budget
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok().filter(|n| *n > 0)
    }
}

/// 四级达成水平
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    /// 需要指导
    NeedsGuidance,
    /// 发展中
    Developing,
    /// 达标
    Proficient,
    /// 优秀
    Advanced,
}

impl MasteryLevel {
    pub const ALL: [MasteryLevel; 4] = [
        MasteryLevel::NeedsGuidance,
        MasteryLevel::Developing,
        MasteryLevel::Proficient,
        MasteryLevel::Advanced,
    ];

    /// 宽松解析：接受 snake_case 名称、1-4 的序号或常见的印尼语 / 英语标签
    pub fn parse_loose(s: &str) -> Option<Self> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "1" | "needs_guidance" | "perlu_bimbingan" | "beginning" => Some(Self::NeedsGuidance),
            "2" | "developing" | "cukup" | "berkembang" => Some(Self::Developing),
            "3" | "proficient" | "baik" | "cakap" => Some(Self::Proficient),
            "4" | "advanced" | "sangat_baik" | "mahir" => Some(Self::Advanced),
            _ => None,
        }
    }
}

impl std::fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MasteryLevel::NeedsGuidance => write!(f, "needs_guidance"),
            MasteryLevel::Developing => write!(f, "developing"),
            MasteryLevel::Proficient => write!(f, "proficient"),
            MasteryLevel::Advanced => write!(f, "advanced"),
        }
    }
}

/// 达成标准行：四级描述按 MasteryLevel::ALL 顺序排列
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionRow {
    pub code: String,
    pub topic: String,
    pub objective_text: String,
    pub criteria_by_level: [String; 4],
    pub target_level: MasteryLevel,
}

/// 周计划中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekEntry {
    pub code: String,
    pub topic: String,
    pub hours: u32,
}

/// 某学期某一周的安排
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekPlan {
    pub semester: String,
    /// 学期内 1 起
    pub week: usize,
    pub entries: Vec<WeekEntry>,
}

impl WeekPlan {
    pub fn hours(&self) -> u32 {
        self.entries.iter().map(|e| e.hours).sum()
    }
}
