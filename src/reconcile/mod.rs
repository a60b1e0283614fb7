//! 对齐层：策略选择与行输出

pub mod engine;
pub mod strategy;

pub use engine::{identity, reconcile, Reconciliation};
pub use strategy::{MismatchReason, ProposalEntry, Strategy, StrategyKind};
