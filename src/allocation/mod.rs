//! 课时层：分配校验与周计划推导

pub mod schedule;
pub mod validator;

pub use schedule::build_schedule;
pub use validator::{budget_entries, AllocationValidator, BudgetEntry, ValidatedAllocation};
