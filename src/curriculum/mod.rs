//! 课程层：数据模型与层级扁平化

pub mod flatten;
pub mod model;

pub use flatten::flatten;
pub use model::{
    AllocationRow, CriterionRow, CurriculumTree, FlatObjectiveRecord, MasteryLevel, MaterialGroup,
    SequencedRow, SubMaterialGroup, WeekEntry, WeekPlan, PLACEHOLDER_CODE,
};
