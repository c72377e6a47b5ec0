//! Transfer orchestration -- parallel execution of file-level upload/download units.
//!
//! Split into focused submodules:
//! - [`provider`] - Transfer provider trait and the dry-run provider
//! - [`orchestration`] - Round-robin worker pool and result merging
//! - [`units`] - Building units from local files and search results

mod orchestration;
mod provider;
mod units;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use orchestration::{
    TransferResults, UnitFailure, WorkerReport, assigned_indices, run_transfers,
};
pub use provider::{DryRunProvider, TransferProvider};
pub use units::{download_units, upload_units};
