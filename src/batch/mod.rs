//! 批量编排层

pub mod orchestrator;

pub use orchestrator::{BatchOrchestrator, BatchOutcome, ChunkAccumulator, ChunkJob};
