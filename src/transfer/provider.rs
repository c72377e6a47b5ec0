//! Transfer provider trait and the dry-run implementation.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Checksums, TransferOutcome, TransferUnit};

/// Performs single-file transfers on behalf of the orchestrator.
///
/// Implementations are shared by every worker of a pool, so they must be
/// `Send + Sync`. A returned error fails only the unit it was called for.
#[async_trait]
pub trait TransferProvider: Send + Sync {
    /// Send `unit.source` (local) to `unit.target` (repository)
    async fn upload(&self, unit: &TransferUnit) -> Result<TransferOutcome>;

    /// Fetch `unit.source` (repository) into `unit.target` (local)
    async fn download(&self, unit: &TransferUnit) -> Result<TransferOutcome>;

    /// Recreate a repository folder locally
    async fn create_dir(&self, unit: &TransferUnit) -> Result<()> {
        tokio::fs::create_dir_all(unit.local_path()).await?;
        Ok(())
    }
}

/// Provider that reports every unit as transferred without doing any I/O
#[derive(Clone, Copy, Debug, Default)]
pub struct DryRunProvider;

impl DryRunProvider {
    fn outcome(unit: &TransferUnit) -> TransferOutcome {
        TransferOutcome {
            local_path: unit.local_path(),
            remote_path: unit.remote_path().to_string(),
            checksums: Checksums::default(),
            size: 0,
        }
    }
}

#[async_trait]
impl TransferProvider for DryRunProvider {
    async fn upload(&self, unit: &TransferUnit) -> Result<TransferOutcome> {
        tracing::info!(source = %unit.source, destination = %unit.target, "[Dry run] Uploading artifact");
        Ok(Self::outcome(unit))
    }

    async fn download(&self, unit: &TransferUnit) -> Result<TransferOutcome> {
        tracing::info!(source = %unit.source, destination = %unit.target, "[Dry run] Downloading artifact");
        Ok(Self::outcome(unit))
    }

    async fn create_dir(&self, unit: &TransferUnit) -> Result<()> {
        tracing::info!(destination = %unit.target, "[Dry run] Creating directory");
        Ok(())
    }
}
