//! 生成层：请求构造与各产物的生成流程

pub mod criteria;
pub mod generator;
pub mod request;

pub use criteria::{pending_criterion, CriteriaJob, CRITERIA_PENDING};
pub use generator::{
    AllocationArtifact, CriteriaArtifact, CurriculumGenerator, FlowArtifact, ObjectiveRequest,
};
pub use request::{Action, ElementOutcome, ServiceRequest};
