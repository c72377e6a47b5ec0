//! Command layer -- `search`, `upload` and `download` as whole operations.
//!
//! Each transfer command runs its groups one after another, sums the counters of
//! every group and then decides once, after the last group, whether the
//! transferred artifacts are recorded as build info.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::build_info::{BuildContext, BuildInfoAggregator, BuildInfoStore};
use crate::error::Result;
use crate::search::{
    PropertyBuildFilter, ReduceMode, SearchService, SearchSpec, reduce_dir_result, search_by_spec,
};
use crate::transfer::{
    DryRunProvider, TransferProvider, TransferResults, download_units, run_transfers, upload_units,
};
use crate::types::{ResultItem, TransferFlags, TransferOutcome, TransferSummary, TransferUnit};
use crate::utils::{add_props, collect_local_files, deb_props};

/// One upload group: local files matching `pattern` go under `target`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadSpec {
    /// Local file, directory or wildcard pattern
    pub pattern: String,
    /// Repository path; a trailing `/` makes it a directory
    pub target: String,
    /// Descend into sub-directories
    pub recursive: bool,
    /// Drop the local directory layout
    pub flat: bool,
    /// Properties attached to every uploaded file, `k=v;k2=v2`
    pub props: Option<String>,
    /// Follow symlinks when collecting files
    pub symlinks: bool,
    /// Ask the remote to explode archives
    pub explode_archive: bool,
    /// Debian coordinates, `distribution/component/architecture`
    pub deb: Option<String>,
}

/// One download group: repository entries matching `search` go under `target`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadSpec {
    /// What to fetch
    pub search: SearchSpec,
    /// Local directory
    pub target: String,
    /// Drop the repository directory layout
    pub flat: bool,
}

/// Settings shared by every group of a transfer command
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferOptions {
    /// Worker count
    pub threads: usize,
    /// Count units without transferring anything
    pub dry_run: bool,
    /// Checksum-only deploy threshold in bytes
    pub min_checksum_deploy_size: u64,
    /// Build the transferred artifacts belong to
    pub build: Option<BuildContext>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            threads: 3,
            dry_run: false,
            min_checksum_deploy_size: 10_240 * 1000,
            build: None,
        }
    }
}

/// Overall outcome of a transfer command
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// Every unit succeeded
    Success,
    /// At least one unit failed
    Failure,
}

/// What a transfer command reports back
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandReport {
    /// Success when nothing failed
    pub status: CommandStatus,
    /// Totals across every group
    pub totals: TransferSummary,
    /// Directories created locally; not part of `totals`
    pub directories: usize,
    /// Whether a partial build-info record was written
    pub build_info_recorded: bool,
    /// First failure, for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_error: Option<String>,
}

impl CommandReport {
    fn new(
        totals: TransferSummary,
        directories: usize,
        build_info_recorded: bool,
        first_error: Option<String>,
    ) -> Self {
        Self {
            status: if totals.is_success() {
                CommandStatus::Success
            } else {
                CommandStatus::Failure
            },
            totals,
            directories,
            build_info_recorded,
            first_error,
        }
    }
}

/// Running totals of a multi-group command
#[derive(Default)]
struct CommandTotals {
    summary: TransferSummary,
    directories: usize,
    outcomes: Vec<TransferOutcome>,
    first_error: Option<String>,
}

impl CommandTotals {
    fn add(&mut self, results: TransferResults) {
        self.summary.merge(results.summary());
        self.directories += results.directories;
        self.outcomes.extend(results.outcomes);
        if self.first_error.is_none() {
            self.first_error = results.first_error;
        }
    }
}

/// Search the repository, optionally reducing the result tree
pub async fn search(
    service: &dyn SearchService,
    spec: &SearchSpec,
    reduce: Option<ReduceMode>,
) -> Result<Vec<ResultItem>> {
    let items = search_by_spec(service, spec, &PropertyBuildFilter).await?;
    Ok(match reduce {
        Some(mode) => reduce_dir_result(items, mode),
        None => items,
    })
}

fn select_provider(
    provider: Arc<dyn TransferProvider>,
    options: &TransferOptions,
) -> Arc<dyn TransferProvider> {
    if options.dry_run {
        Arc::new(DryRunProvider)
    } else {
        provider
    }
}

fn base_flags(options: &TransferOptions) -> TransferFlags {
    TransferFlags {
        dry_run: options.dry_run,
        min_checksum_deploy_size: options.min_checksum_deploy_size,
        ..Default::default()
    }
}

/// Prepare provenance for a command: `None` when it does not apply
async fn prepare_build_info<'a>(
    options: &TransferOptions,
    store: &'a dyn BuildInfoStore,
) -> Result<Option<BuildInfoAggregator<'a>>> {
    let aggregator = BuildInfoAggregator::for_command(options.build.as_ref(), options.dry_run, store);
    if let Some(aggregator) = &aggregator {
        store
            .ensure_general_details(aggregator.context(), Utc::now())
            .await?;
    }
    Ok(aggregator)
}

/// Commit provenance once every group has finished
async fn finish(
    operation: &str,
    totals: CommandTotals,
    aggregator: Option<&BuildInfoAggregator<'_>>,
) -> Result<CommandReport> {
    tracing::info!(
        succeeded = totals.summary.succeeded,
        failed = totals.summary.failed,
        "{} {} artifacts.",
        operation,
        totals.summary.succeeded
    );
    if totals.summary.failed > 0 {
        tracing::error!(
            failed = totals.summary.failed,
            "Failed {} {} artifacts.",
            operation.to_lowercase(),
            totals.summary.failed
        );
    }

    let recorded = match aggregator {
        Some(aggregator) => aggregator.commit(totals.summary, &totals.outcomes).await?,
        None => false,
    };
    Ok(CommandReport::new(
        totals.summary,
        totals.directories,
        recorded,
        totals.first_error,
    ))
}

/// Upload every group of local files.
///
/// Per-file failures are counted, never returned. Errors come from invalid
/// patterns and from build-info reads or writes.
pub async fn upload(
    provider: Arc<dyn TransferProvider>,
    specs: &[UploadSpec],
    options: &TransferOptions,
    store: &dyn BuildInfoStore,
) -> Result<CommandReport> {
    let provider = select_provider(provider, options);
    let aggregator = prepare_build_info(options, store).await?;
    let mut totals = CommandTotals::default();

    for spec in specs {
        let files = collect_local_files(&spec.pattern, spec.recursive, spec.symlinks)?;
        tracing::debug!(pattern = %spec.pattern, files = files.files.len(), "Collected local files");

        let mut props = spec.props.clone().unwrap_or_default();
        if let Some(deb) = &spec.deb {
            props = add_props(&props, &deb_props(deb)?);
        }
        if let Some(aggregator) = &aggregator {
            props = aggregator.stamp_props(&props).await?;
        }
        let flags = TransferFlags {
            flat: spec.flat,
            symlinks: spec.symlinks,
            explode_archive: spec.explode_archive,
            ..base_flags(options)
        };

        let units: Arc<[TransferUnit]> = upload_units(&files, &spec.target, &props, &flags).into();
        totals.add(run_transfers(Arc::clone(&provider), units, options.threads).await);
    }

    finish("Uploaded", totals, aggregator.as_ref()).await
}

/// Download every group of repository entries.
///
/// Folder entries are only kept when a group includes directories, and then
/// reduced to the deepest entry of each path chain so a folder is created
/// only when nothing below it is fetched.
pub async fn download(
    service: &dyn SearchService,
    provider: Arc<dyn TransferProvider>,
    specs: &[DownloadSpec],
    options: &TransferOptions,
    store: &dyn BuildInfoStore,
) -> Result<CommandReport> {
    let provider = select_provider(provider, options);
    let aggregator = prepare_build_info(options, store).await?;
    let mut totals = CommandTotals::default();

    for spec in specs {
        let items = search_by_spec(service, &spec.search, &PropertyBuildFilter).await?;
        let items = if spec.search.include_dirs {
            reduce_dir_result(items, ReduceMode::Deepest)
        } else {
            items.into_iter().filter(|item| !item.is_folder()).collect()
        };

        let flags = TransferFlags {
            flat: spec.flat,
            ..base_flags(options)
        };
        let units: Arc<[TransferUnit]> = download_units(&items, &spec.target, &flags).into();
        totals.add(run_transfers(Arc::clone(&provider), units, options.threads).await);
    }

    finish("Downloaded", totals, aggregator.as_ref()).await
}
