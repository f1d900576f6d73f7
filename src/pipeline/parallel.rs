//! Sharded parallel runs.
//!
//! ```text
//!            partition([start, end), n)
//!     ┌──────────────┼──────────────┐
//!  worker 0       worker 1       worker 2      (spawn_blocking, own engine)
//!     │              │              │
//!     └──── ShardReport over mpsc ──┘
//!                    │
//!              coordinator: union done/error, append-merge lists once
//! ```
//!
//! Workers share nothing. Each builds its own [`TodLoop`] through the
//! factory, runs its shard sequentially and reports back over a channel.

use super::{PipelineError, RunReport, TodLoop};
use crate::storage::OutcomeLists;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Split `[start, end)` into at most `n_workers` contiguous shards.
///
/// The first `len % n` shards get one extra unit. Empty shards are omitted.
pub fn partition(start: usize, end: usize, n_workers: usize) -> Vec<Range<usize>> {
    let len = end.saturating_sub(start);
    let n = n_workers.max(1);
    let base = len / n;
    let extra = len % n;

    let mut shards = Vec::with_capacity(n.min(len));
    let mut cursor = start;
    for i in 0..n {
        let size = base + usize::from(i < extra);
        if size == 0 {
            continue;
        }
        shards.push(cursor..cursor + size);
        cursor += size;
    }
    shards
}

/// Result of one worker.
#[derive(Debug, Clone)]
pub struct ShardReport {
    pub worker: usize,
    pub range: Range<usize>,
    pub report: RunReport,
}

/// Engine factory handed the worker number.
pub type EngineFactory = dyn Fn(usize) -> Result<TodLoop, PipelineError> + Send + Sync;

/// Coordinates one engine per shard on the blocking thread pool.
pub struct ParallelRunner {
    factory: Arc<EngineFactory>,
    workers: usize,
    outcome_lists: Option<OutcomeLists>,
}

impl ParallelRunner {
    pub fn new<F>(workers: usize, factory: F) -> Self
    where
        F: Fn(usize) -> Result<TodLoop, PipelineError> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            workers: workers.max(1),
            outcome_lists: None,
        }
    }

    #[must_use]
    pub fn with_outcome_lists(mut self, lists: OutcomeLists) -> Self {
        self.outcome_lists = Some(lists);
        self
    }

    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Run `[start, end)` across the workers and merge their reports.
    ///
    /// The range is checked against the unit list of a factory-built engine
    /// first, so an out-of-bounds range fails before any unit runs.
    ///
    /// A unit failure stays inside its shard. A worker whose engine cannot be
    /// built or initialized fails the whole run once every other worker has
    /// finished.
    pub async fn run(&self, start: usize, end: usize) -> Result<RunReport, PipelineError> {
        // Reject a bad range before any shard touches a unit
        let units = (self.factory)(0)?.unit_count();
        if start > end || end > units {
            return Err(PipelineError::RangeOutOfBounds { start, end, units });
        }

        let shards = partition(start, end, self.workers);
        info!(
            start,
            end,
            workers = self.workers,
            shards = shards.len(),
            "Starting parallel run"
        );

        let (tx, mut rx) = mpsc::channel::<ShardReport>(shards.len().max(1));
        let mut tasks = JoinSet::new();

        for (worker, range) in shards.into_iter().enumerate() {
            let factory = Arc::clone(&self.factory);
            let tx = tx.clone();
            tasks.spawn_blocking(move || -> Result<(), PipelineError> {
                let mut engine = factory(worker)?;
                engine.set_worker(worker);
                let report = engine.run_shard(range.clone())?;
                info!(
                    worker,
                    start = range.start,
                    end = range.end,
                    done = report.done.len(),
                    errors = report.errors.len(),
                    "Shard finished"
                );
                if tx.blocking_send(ShardReport { worker, range, report }).is_err() {
                    warn!(worker, "Coordinator gone, shard report dropped");
                }
                Ok(())
            });
        }
        drop(tx);

        let mut merged = RunReport::default();
        let mut received = 0usize;
        while let Some(shard) = rx.recv().await {
            received += 1;
            merged.merge(shard.report);
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| PipelineError::Worker(e.to_string()));
            if let Err(e) | Ok(Err(e)) = outcome {
                warn!(error = %e, "Worker failed");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        if let Some(lists) = &self.outcome_lists {
            lists.record(&merged.done, &merged.errors)?;
        }
        info!(
            shards = received,
            processed = merged.processed,
            done = merged.done.len(),
            errors = merged.errors.len(),
            vetoed = merged.vetoed.len(),
            "Parallel run complete"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_covers_range_without_overlap() {
        let shards = partition(0, 10, 3);
        assert_eq!(shards, vec![0..4, 4..7, 7..10]);

        let mut covered: Vec<usize> = shards.into_iter().flatten().collect();
        covered.sort_unstable();
        assert_eq!(covered, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_partition_offset_range() {
        assert_eq!(partition(5, 12, 2), vec![5..9, 9..12]);
    }

    #[test]
    fn test_partition_more_workers_than_units() {
        assert_eq!(partition(0, 2, 5), vec![0..1, 1..2]);
        assert!(partition(3, 3, 4).is_empty());
    }

    #[test]
    fn test_partition_zero_workers_means_one() {
        assert_eq!(partition(0, 4, 0), vec![0..4]);
    }
}
