//! 批量编排：把大工作量切成固定大小的连续分块，逐块串行请求
//!
//! - 分块之间（第一块之前除外）必须等待 pacing，作为限流 / 背压策略
//! - 单块失败（请求失败、解析失败、条数对不上）只记日志并跳过，不影响其它块，不自动重试
//! - 结束后所有未填充的位置用带标记的默认值补齐，保证产物恰好 M 行
//!
//! 结果累加器由调用方持有并传入，不同产物的并发生成互不污染。

use std::collections::BTreeMap;
use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::RecoveryEvent;
use crate::parse::parse_response;

/// 一类可分块生成的工作
#[async_trait]
pub trait ChunkJob: Send + Sync {
    type Unit: Sync;
    type Output: Send;

    /// 为一个分块发起一次外部请求，返回原始回复文本；offset 为该块首项的绝对位置
    async fn request(&self, chunk: &[Self::Unit], offset: usize) -> Result<String, String>;

    /// 把解析后的值解码为该块的输出（条数须与 chunk 一致，由编排器检查）
    fn decode(&self, value: &Value, chunk: &[Self::Unit]) -> Result<Vec<Self::Output>, String>;

    /// 未获得结果的位置使用的默认值
    fn fallback(&self, unit: &Self::Unit, position: usize) -> Self::Output;
}

/// 按绝对位置累积的结果，由一次编排调用独占
#[derive(Debug)]
pub struct ChunkAccumulator<T> {
    results: BTreeMap<usize, T>,
}

impl<T> Default for ChunkAccumulator<T> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
        }
    }
}

impl<T> ChunkAccumulator<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_chunk(&mut self, offset: usize, items: Vec<T>) {
        for (i, item) in items.into_iter().enumerate() {
            self.results.insert(offset + i, item);
        }
    }

    pub fn contains(&self, position: usize) -> bool {
        self.results.contains_key(&position)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn take(&mut self, position: usize) -> Option<T> {
        self.results.remove(&position)
    }
}

/// 编排结果：rows 恰好 M 行
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub rows: Vec<T>,
    pub chunks: usize,
    pub failed_chunks: usize,
    /// 使用默认值的绝对位置
    pub defaulted: Vec<usize>,
    pub events: Vec<RecoveryEvent>,
}

impl<T> BatchOutcome<T> {
    /// 非空工作量下所有分块都失败
    pub fn all_failed(&self) -> bool {
        self.chunks > 0 && self.failed_chunks == self.chunks
    }
}

/// 分块编排器
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    chunk_size: usize,
    pacing: Duration,
}

impl BatchOrchestrator {
    pub fn new(chunk_size: usize, pacing: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pacing,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 连续分块的绝对范围
    pub fn chunk_ranges(&self, total: usize) -> Vec<Range<usize>> {
        (0..total)
            .step_by(self.chunk_size)
            .map(|start| start..(start + self.chunk_size).min(total))
            .collect()
    }

    /// 逐块串行执行 job，并用默认值补齐
    pub async fn run<J: ChunkJob>(
        &self,
        job: &J,
        units: &[J::Unit],
        acc: &mut ChunkAccumulator<J::Output>,
    ) -> BatchOutcome<J::Output> {
        let ranges = self.chunk_ranges(units.len());
        let mut events = Vec::new();
        let mut failed_chunks = 0;

        for (chunk_index, range) in ranges.iter().enumerate() {
            if chunk_index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            let chunk = &units[range.clone()];
            match self.run_chunk(job, chunk, range.start).await {
                Ok(items) => acc.insert_chunk(range.start, items),
                Err(reason) => {
                    tracing::warn!(
                        "Chunk {} ({}..{}) failed, positions left for defaults: {}",
                        chunk_index,
                        range.start,
                        range.end,
                        reason
                    );
                    failed_chunks += 1;
                    events.push(RecoveryEvent::ChunkFailure {
                        chunk: chunk_index,
                        start: range.start,
                        end: range.end,
                        reason,
                    });
                }
            }
        }

        let mut defaulted = Vec::new();
        let rows = units
            .iter()
            .enumerate()
            .map(|(position, unit)| {
                acc.take(position).unwrap_or_else(|| {
                    defaulted.push(position);
                    job.fallback(unit, position)
                })
            })
            .collect();

        tracing::info!(
            "Batch finished: {} units in {} chunks, {} chunks failed, {} positions defaulted",
            units.len(),
            ranges.len(),
            failed_chunks,
            defaulted.len()
        );

        BatchOutcome {
            rows,
            chunks: ranges.len(),
            failed_chunks,
            defaulted,
            events,
        }
    }

    async fn run_chunk<J: ChunkJob>(
        &self,
        job: &J,
        chunk: &[J::Unit],
        offset: usize,
    ) -> Result<Vec<J::Output>, String> {
        let text = job.request(chunk, offset).await?;
        let value = parse_response(&text).map_err(|e| e.to_string())?;
        let items = job.decode(&value, chunk)?;
        if items.len() != chunk.len() {
            return Err(format!(
                "expected {} items, got {}",
                chunk.len(),
                items.len()
            ));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    /// 把每个单元翻倍；failing 中的块号返回无法解析的文本
    struct DoublingJob {
        failing: Vec<usize>,
        short: Vec<usize>,
        offsets: Mutex<Vec<usize>>,
        requested_at: Mutex<Vec<Instant>>,
        chunk_size: usize,
    }

    impl DoublingJob {
        fn new(chunk_size: usize) -> Self {
            Self {
                failing: Vec::new(),
                short: Vec::new(),
                offsets: Mutex::new(Vec::new()),
                requested_at: Mutex::new(Vec::new()),
                chunk_size,
            }
        }
    }

    #[async_trait]
    impl ChunkJob for DoublingJob {
        type Unit = i64;
        type Output = String;

        async fn request(&self, chunk: &[i64], offset: usize) -> Result<String, String> {
            self.offsets.lock().unwrap().push(offset);
            self.requested_at.lock().unwrap().push(Instant::now());
            let chunk_index = offset / self.chunk_size;
            if self.failing.contains(&chunk_index) {
                return Ok("maaf, terjadi kesalahan".to_string());
            }
            let mut doubled: Vec<i64> = chunk.iter().map(|u| u * 2).collect();
            if self.short.contains(&chunk_index) {
                doubled.pop();
            }
            Ok(format!("```json\n{}\n```", serde_json::to_string(&doubled).unwrap()))
        }

        fn decode(&self, value: &Value, _chunk: &[i64]) -> Result<Vec<String>, String> {
            value
                .as_array()
                .ok_or_else(|| "not an array".to_string())
                .map(|items| items.iter().map(|v| v.to_string()).collect())
        }

        fn fallback(&self, _unit: &i64, position: usize) -> String {
            format!("default-{position}")
        }
    }

    #[test]
    fn test_chunk_ranges() {
        let orchestrator = BatchOrchestrator::new(5, Duration::ZERO);
        assert_eq!(orchestrator.chunk_ranges(12), vec![0..5, 5..10, 10..12]);
        assert!(orchestrator.chunk_ranges(0).is_empty());
        assert_eq!(BatchOrchestrator::new(0, Duration::ZERO).chunk_size(), 1);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_filled_with_defaults() {
        let units: Vec<i64> = (0..12).collect();
        let mut job = DoublingJob::new(5);
        job.failing = vec![1];
        let orchestrator = BatchOrchestrator::new(5, Duration::ZERO);
        let mut acc = ChunkAccumulator::new();

        let outcome = orchestrator.run(&job, &units, &mut acc).await;

        assert_eq!(*job.offsets.lock().unwrap(), vec![0, 5, 10]);
        assert_eq!(outcome.rows.len(), 12);
        assert_eq!(outcome.chunks, 3);
        assert_eq!(outcome.failed_chunks, 1);
        assert_eq!(outcome.defaulted, vec![5, 6, 7, 8, 9]);
        for (i, row) in outcome.rows.iter().enumerate() {
            if (5..10).contains(&i) {
                assert_eq!(row, &format!("default-{i}"));
            } else {
                assert_eq!(row, &(i as i64 * 2).to_string());
            }
        }
        assert!(!outcome.all_failed());
    }

    #[tokio::test]
    async fn test_misaligned_chunk_is_skipped() {
        let units: Vec<i64> = (0..6).collect();
        let mut job = DoublingJob::new(3);
        job.short = vec![0];
        let orchestrator = BatchOrchestrator::new(3, Duration::ZERO);
        let mut acc = ChunkAccumulator::new();

        let outcome = orchestrator.run(&job, &units, &mut acc).await;

        assert_eq!(outcome.defaulted, vec![0, 1, 2]);
        assert_eq!(outcome.rows[3], "6");
        match &outcome.events[0] {
            RecoveryEvent::ChunkFailure { chunk, start, end, .. } => {
                assert_eq!((*chunk, *start, *end), (0, 0, 3));
            }
            other => panic!("Expected ChunkFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_all_chunks_failed() {
        let units: Vec<i64> = (0..4).collect();
        let mut job = DoublingJob::new(2);
        job.failing = vec![0, 1];
        let orchestrator = BatchOrchestrator::new(2, Duration::ZERO);
        let outcome = orchestrator.run(&job, &units, &mut ChunkAccumulator::new()).await;
        assert!(outcome.all_failed());
        assert_eq!(outcome.rows.len(), 4);
    }

    #[tokio::test]
    async fn test_pacing_between_chunks() {
        let pacing = Duration::from_millis(200);
        let units: Vec<i64> = (0..3).collect();
        let job = DoublingJob::new(1);
        let orchestrator = BatchOrchestrator::new(1, pacing);
        let started = Instant::now();
        orchestrator.run(&job, &units, &mut ChunkAccumulator::new()).await;

        let requested_at = job.requested_at.lock().unwrap().clone();
        assert_eq!(requested_at.len(), 3);
        assert!(requested_at[0].duration_since(started) < pacing / 2);
        for pair in requested_at.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= pacing);
        }
        assert!(started.elapsed() >= pacing * 2);
    }
}
