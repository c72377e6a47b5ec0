//! Round-robin worker pool that runs a fixed list of transfer units.

use std::sync::Arc;

use crate::error::{Result, TransferError};
use crate::types::{TransferOutcome, TransferSummary, TransferUnit, UnitKind};

use super::provider::TransferProvider;

/// First failure seen by a worker
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnitFailure {
    /// Index of the failed unit in the submitted list
    pub unit_index: usize,
    /// Error message
    pub message: String,
}

/// Counters and outcomes owned by one worker until the join barrier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker id, `0..threads`
    pub worker_id: usize,
    /// Units this worker finished (successfully or not)
    pub processed: usize,
    /// File units that succeeded
    pub succeeded: usize,
    /// Directory units created
    pub directories: usize,
    /// Successful file transfers, tagged with their unit index
    pub outcomes: Vec<(usize, TransferOutcome)>,
    /// Lowest-index failure of this worker
    pub first_error: Option<UnitFailure>,
}

impl WorkerReport {
    /// Report for a worker whose task aborted before returning.
    ///
    /// Every unit assigned to it counts as processed and failed.
    fn aborted(worker_id: usize, assigned: &[usize], reason: String) -> Self {
        let message = TransferError::WorkerAborted { worker_id, reason }.to_string();
        Self {
            worker_id,
            processed: assigned.len(),
            succeeded: 0,
            directories: 0,
            outcomes: Vec::new(),
            first_error: assigned.first().map(|&unit_index| UnitFailure {
                unit_index,
                message,
            }),
        }
    }

    /// Units this worker failed
    pub fn failed(&self) -> usize {
        self.processed - self.succeeded - self.directories
    }
}

/// Merged result of one orchestrator run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferResults {
    /// File units that succeeded; each has exactly one entry in `outcomes`
    pub succeeded: usize,
    /// Directory units created; these have no outcome
    pub directories: usize,
    /// Units that failed
    pub failed: usize,
    /// Successful file transfers, in unit-index order
    pub outcomes: Vec<TransferOutcome>,
    /// First failure of the lowest-id worker that failed anything
    pub first_error: Option<String>,
    /// Units processed by each worker, indexed by worker id
    pub per_worker_processed: Vec<usize>,
}

impl TransferResults {
    /// Succeeded/failed totals
    pub fn summary(&self) -> TransferSummary {
        TransferSummary {
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }

    /// Combine worker reports after every worker has finished
    pub fn from_reports(mut reports: Vec<WorkerReport>) -> Self {
        reports.sort_by_key(|r| r.worker_id);

        let mut results = TransferResults::default();
        let mut indexed: Vec<(usize, TransferOutcome)> = Vec::new();
        for report in reports {
            results.succeeded += report.succeeded;
            results.directories += report.directories;
            results.failed += report.failed();
            results.per_worker_processed.push(report.processed);
            if results.first_error.is_none()
                && let Some(failure) = report.first_error
            {
                results.first_error = Some(failure.message);
            }
            indexed.extend(report.outcomes);
        }
        indexed.sort_by_key(|(index, _)| *index);
        results.outcomes = indexed.into_iter().map(|(_, outcome)| outcome).collect();
        results
    }
}

/// Indices handled by worker `worker_id` of `threads`: `worker_id, worker_id + threads, ...`
pub fn assigned_indices(worker_id: usize, threads: usize, unit_count: usize) -> Vec<usize> {
    (worker_id..unit_count).step_by(threads.max(1)).collect()
}

/// Run every unit on a pool of `threads` workers.
///
/// Worker `t` processes the units at `t, t + threads, ...` in increasing order.
/// A failing unit is counted and logged, it never stops its worker or the run.
/// Returns once every worker has finished.
pub async fn run_transfers(
    provider: Arc<dyn TransferProvider>,
    units: Arc<[TransferUnit]>,
    threads: usize,
) -> TransferResults {
    let threads = threads.max(1);
    tracing::debug!(units = units.len(), threads, "Starting transfer workers");

    let handles: Vec<_> = (0..threads)
        .map(|worker_id| {
            let provider = Arc::clone(&provider);
            let units = Arc::clone(&units);
            tokio::spawn(run_worker(worker_id, threads, provider, units))
        })
        .collect();

    let mut reports = Vec::with_capacity(threads);
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                tracing::error!(worker_id, error = %e, "Transfer worker aborted");
                let assigned = assigned_indices(worker_id, threads, units.len());
                reports.push(WorkerReport::aborted(worker_id, &assigned, e.to_string()));
            }
        }
    }

    let results = TransferResults::from_reports(reports);
    tracing::debug!(
        succeeded = results.succeeded,
        directories = results.directories,
        failed = results.failed,
        "Transfer workers finished"
    );
    results
}

async fn run_worker(
    worker_id: usize,
    threads: usize,
    provider: Arc<dyn TransferProvider>,
    units: Arc<[TransferUnit]>,
) -> WorkerReport {
    let mut report = WorkerReport {
        worker_id,
        ..Default::default()
    };

    for unit_index in assigned_indices(worker_id, threads, units.len()) {
        let unit = &units[unit_index];
        let result = execute_unit(provider.as_ref(), unit).await;
        report.processed += 1;
        match result {
            Ok(Some(outcome)) => {
                report.succeeded += 1;
                report.outcomes.push((unit_index, outcome));
            }
            Ok(None) => report.directories += 1,
            Err(e) => {
                tracing::warn!(
                    worker_id,
                    unit_index,
                    path = %unit.remote_path(),
                    error = %e,
                    "Transfer failed"
                );
                if report.first_error.is_none() {
                    report.first_error = Some(UnitFailure {
                        unit_index,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    report
}

/// Run a single unit; directories succeed without an outcome
async fn execute_unit(
    provider: &dyn TransferProvider,
    unit: &TransferUnit,
) -> Result<Option<TransferOutcome>> {
    match unit.kind {
        UnitKind::Upload => {
            tracing::info!(source = %unit.source, destination = %unit.target, "Uploading artifact");
            provider.upload(unit).await.map(Some)
        }
        UnitKind::Download => {
            tracing::info!(source = %unit.source, destination = %unit.target, "Downloading artifact");
            provider.download(unit).await.map(Some)
        }
        UnitKind::Directory => provider.create_dir(unit).await.map(|()| None),
    }
}
