//! Build provenance -- stamping uploads with build properties and recording
//! transferred artifacts as partial build-info records.
//!
//! Records live in a per-build directory under a local root:
//!
//! ```text
//! <root>/<name>_<number>/general.json      build start details
//! <root>/<name>_<number>/partials/<n>.json one record per successful command
//! ```
//!
//! Name and number are percent-encoded so any value maps to a single directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BuildInfoError, Error, Result};
use crate::types::{TransferOutcome, TransferSummary};
use crate::utils::{add_props, file_name};

const GENERAL_DETAILS_FILE: &str = "general.json";
const PARTIALS_DIR: &str = "partials";

/// Build a command's transfers are correlated to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    /// Build name
    pub name: String,
    /// Build number
    pub number: String,
}

impl BuildContext {
    /// Context from optional CLI/config values.
    ///
    /// Returns `Ok(None)` when neither is set and an error when only one is.
    /// Empty strings count as unset.
    pub fn from_parts(name: Option<&str>, number: Option<&str>) -> Result<Option<Self>> {
        let name = name.filter(|s| !s.is_empty());
        let number = number.filter(|s| !s.is_empty());
        match (name, number) {
            (Some(name), Some(number)) => Ok(Some(Self {
                name: name.to_string(),
                number: number.to_string(),
            })),
            (None, None) => Ok(None),
            _ => Err(BuildInfoError::Incomplete.into()),
        }
    }
}

/// Details recorded when a build starts
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralDetails {
    /// Build name
    pub build_name: String,
    /// Build number
    pub build_number: String,
    /// Build start, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Build start as a readable date
    pub started: DateTime<Utc>,
}

/// One transferred artifact in a build record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// File name of the local side of the transfer
    pub name: String,
    /// Hex-encoded MD5
    pub md5: String,
    /// Hex-encoded SHA-1
    pub sha1: String,
}

impl From<&TransferOutcome> for Artifact {
    fn from(outcome: &TransferOutcome) -> Self {
        Self {
            name: file_name(&outcome.local_path),
            md5: outcome.checksums.md5.clone(),
            sha1: outcome.checksums.sha1.clone(),
        }
    }
}

/// Artifacts contributed to a build by one command invocation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialBuildRecord {
    /// Build name
    pub build_name: String,
    /// Build number
    pub build_number: String,
    /// When the record was written, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Transferred artifacts
    pub artifacts: Vec<Artifact>,
}

/// Read access to the build start timestamp
#[async_trait]
pub trait BuildTimestampSource: Send + Sync {
    /// Build start in milliseconds, or `None` if the build was never initialised
    async fn read_timestamp(&self, name: &str, number: &str) -> Result<Option<i64>>;
}

/// Persistent build-info storage
#[async_trait]
pub trait BuildInfoStore: BuildTimestampSource {
    /// Record build start details unless they already exist; returns the stored details
    async fn ensure_general_details(
        &self,
        ctx: &BuildContext,
        started: DateTime<Utc>,
    ) -> Result<GeneralDetails>;

    /// Persist one partial record atomically
    async fn save_partial(&self, record: &PartialBuildRecord) -> Result<()>;
}

/// [`BuildInfoStore`] backed by JSON files in a local directory
#[derive(Clone, Debug)]
pub struct FileBuildInfoStore {
    root: PathBuf,
}

impl FileBuildInfoStore {
    /// Store rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the records of one build
    pub fn build_dir(&self, name: &str, number: &str) -> PathBuf {
        self.root.join(format!(
            "{}_{}",
            urlencoding::encode(name),
            urlencoding::encode(number)
        ))
    }

    /// Stored start details of a build, if any
    pub fn read_general_details(&self, name: &str, number: &str) -> Result<Option<GeneralDetails>> {
        let path = self.build_dir(name, number).join(GENERAL_DETAILS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Every partial record of a build, oldest first
    pub fn read_partials(&self, name: &str, number: &str) -> Result<Vec<PartialBuildRecord>> {
        let dir = self.build_dir(name, number).join(PARTIALS_DIR);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut numbered = partial_files(&dir)?;
        numbered.sort_by_key(|(seq, _)| *seq);
        numbered.iter().map(|(_, path)| read_json(path)).collect()
    }

    /// Run file work on the blocking pool
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileBuildInfoStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|e| storage_error(&self.root, e))?
    }

    fn ensure_general_details_blocking(
        &self,
        ctx: &BuildContext,
        started: DateTime<Utc>,
    ) -> Result<GeneralDetails> {
        if let Some(existing) = self.read_general_details(&ctx.name, &ctx.number)? {
            return Ok(existing);
        }

        let details = GeneralDetails {
            build_name: ctx.name.clone(),
            build_number: ctx.number.clone(),
            timestamp: started.timestamp_millis(),
            started,
        };
        let path = self
            .build_dir(&ctx.name, &ctx.number)
            .join(GENERAL_DETAILS_FILE);
        write_json_atomic(&path, &details)?;
        tracing::debug!(
            build_name = %ctx.name,
            build_number = %ctx.number,
            "Initialised build-info record"
        );
        Ok(details)
    }

    fn save_partial_blocking(&self, record: &PartialBuildRecord) -> Result<()> {
        let dir = self
            .build_dir(&record.build_name, &record.build_number)
            .join(PARTIALS_DIR);
        create_dir(&dir)?;

        let next = partial_files(&dir)?
            .iter()
            .map(|(seq, _)| seq + 1)
            .max()
            .unwrap_or(0);
        let path = dir.join(format!("{next}.json"));
        write_json_atomic(&path, record)?;
        tracing::debug!(
            path = %path.display(),
            artifacts = record.artifacts.len(),
            "Saved partial build-info record"
        );
        Ok(())
    }
}

#[async_trait]
impl BuildTimestampSource for FileBuildInfoStore {
    async fn read_timestamp(&self, name: &str, number: &str) -> Result<Option<i64>> {
        let (name, number) = (name.to_string(), number.to_string());
        self.blocking(move |store| {
            Ok(store
                .read_general_details(&name, &number)?
                .map(|details| details.timestamp))
        })
        .await
    }
}

#[async_trait]
impl BuildInfoStore for FileBuildInfoStore {
    async fn ensure_general_details(
        &self,
        ctx: &BuildContext,
        started: DateTime<Utc>,
    ) -> Result<GeneralDetails> {
        let ctx = ctx.clone();
        self.blocking(move |store| store.ensure_general_details_blocking(&ctx, started))
            .await
    }

    async fn save_partial(&self, record: &PartialBuildRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |store| store.save_partial_blocking(&record))
            .await
    }
}

fn storage_error(path: &Path, reason: impl ToString) -> Error {
    BuildInfoError::Storage {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| storage_error(dir, e))
}

/// `(sequence, path)` of every `<n>.json` file in `dir`
fn partial_files(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let entries = std::fs::read_dir(dir).map_err(|e| storage_error(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| storage_error(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "json")
            && let Some(seq) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
        {
            files.push((seq, path));
        }
    }
    Ok(files)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read(path).map_err(|e| storage_error(path, e))?;
    serde_json::from_slice(&content).map_err(|e| storage_error(path, e))
}

/// Write `value` next to `path` and rename it into place
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    let content = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).map_err(|e| storage_error(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        storage_error(path, e)
    })
}

/// Stamps transfer properties and commits transferred artifacts for one build.
pub struct BuildInfoAggregator<'a> {
    ctx: BuildContext,
    store: &'a dyn BuildInfoStore,
}

impl<'a> BuildInfoAggregator<'a> {
    /// Aggregator for `ctx`
    pub fn new(ctx: BuildContext, store: &'a dyn BuildInfoStore) -> Self {
        Self { ctx, store }
    }

    /// Aggregator for a command, if provenance applies to it.
    ///
    /// Returns `None` without a build context or for a dry run.
    pub fn for_command(
        ctx: Option<&BuildContext>,
        dry_run: bool,
        store: &'a dyn BuildInfoStore,
    ) -> Option<Self> {
        match ctx {
            Some(ctx) if !dry_run => Some(Self::new(ctx.clone(), store)),
            _ => None,
        }
    }

    /// Build this aggregator records for
    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Append `build.name`, `build.number` and `build.timestamp` to `props`
    pub async fn stamp_props(&self, props: &str) -> Result<String> {
        let timestamp = self
            .store
            .read_timestamp(&self.ctx.name, &self.ctx.number)
            .await?
            .ok_or_else(|| BuildInfoError::NotFound {
                name: self.ctx.name.clone(),
                number: self.ctx.number.clone(),
            })?;
        let build_props = format!(
            "build.name={};build.number={};build.timestamp={}",
            self.ctx.name, self.ctx.number, timestamp
        );
        Ok(add_props(props, &build_props))
    }

    /// Persist `outcomes` as one partial record when nothing failed.
    ///
    /// Returns whether a record was written. A summary with failures is not an
    /// error; the record is skipped.
    pub async fn commit(
        &self,
        summary: TransferSummary,
        outcomes: &[TransferOutcome],
    ) -> Result<bool> {
        if !summary.is_success() {
            tracing::warn!(
                build_name = %self.ctx.name,
                build_number = %self.ctx.number,
                failed = summary.failed,
                "Skipping build-info record: some transfers failed"
            );
            return Ok(false);
        }

        let record = PartialBuildRecord {
            build_name: self.ctx.name.clone(),
            build_number: self.ctx.number.clone(),
            timestamp: Utc::now().timestamp_millis(),
            artifacts: outcomes.iter().map(Artifact::from).collect(),
        };
        self.store.save_partial(&record).await?;
        tracing::info!(
            build_name = %self.ctx.name,
            build_number = %self.ctx.number,
            artifacts = record.artifacts.len(),
            "Recorded build artifacts"
        );
        Ok(true)
    }
}
