//! # artifact-transfer
//!
//! Search, upload and download artifacts against a remote artifact repository,
//! recording what was transferred as build provenance.
//!
//! ## Overview
//!
//! - **Search** - wildcard or raw criteria queries, optionally reduced to the
//!   deepest or shallowest entries of each path chain
//! - **Transfer** - file-level units run on a fixed round-robin worker pool;
//!   failures are counted, never fatal
//! - **Build info** - uploads are stamped with build properties and the
//!   transferred artifacts are recorded once per command, only if nothing failed
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use artifact_transfer::{ArtifactoryClient, Config, FileBuildInfoStore};
//! use artifact_transfer::commands::{self, TransferOptions, UploadSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.server.url = "https://repo.example.com/artifactory/".to_string();
//!
//!     let client = Arc::new(ArtifactoryClient::new(&config.server)?);
//!     let store = FileBuildInfoStore::new(&config.build.build_dir);
//!
//!     let specs = vec![UploadSpec {
//!         pattern: "build/libs/*.jar".to_string(),
//!         target: "libs-release/app/".to_string(),
//!         ..Default::default()
//!     }];
//!     let report = commands::upload(client, &specs, &TransferOptions::default(), &store).await?;
//!     println!("{} uploaded, {} failed", report.totals.succeeded, report.totals.failed);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Build provenance stamping and partial build-info records
pub mod build_info;
/// HTTP client for the repository service
pub mod client;
/// Search, upload and download commands
pub mod commands;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Repository search and result reduction
pub mod search;
/// Tracing initialisation
pub mod telemetry;
/// Parallel transfer orchestration
pub mod transfer;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

pub use build_info::{BuildContext, BuildInfoAggregator, BuildInfoStore, FileBuildInfoStore};
pub use client::ArtifactoryClient;
pub use config::Config;
pub use error::{BuildInfoError, Error, Result, TransferError};
pub use search::{ReduceMode, SearchService, SearchSpec};
pub use transfer::{DryRunProvider, TransferProvider, TransferResults, run_transfers};
pub use types::{ResultItem, TransferOutcome, TransferSummary, TransferUnit};
