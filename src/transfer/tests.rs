//! Tests for the transfer orchestrator and unit construction.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use super::*;
use crate::error::{Error, Result, TransferError};
use crate::types::{
    Checksums, ItemType, ResultItem, TransferFlags, TransferOutcome, TransferUnit, UnitKind,
};
use crate::utils::LocalFiles;

/// Provider that fails or panics on selected sources and records every call
#[derive(Default)]
struct MockTransferProvider {
    fail: HashSet<String>,
    panic_on: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockTransferProvider {
    fn failing(sources: &[&str]) -> Self {
        Self {
            fail: sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn panicking(sources: &[&str]) -> Self {
        Self {
            panic_on: sources.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn transfer(&self, unit: &TransferUnit) -> Result<TransferOutcome> {
        self.calls.lock().unwrap().push(unit.source.clone());
        if self.panic_on.contains(&unit.source) {
            panic!("provider blew up on {}", unit.source);
        }
        if self.fail.contains(&unit.source) {
            return Err(Error::Transfer(TransferError::Rejected {
                operation: "upload",
                path: unit.target.clone(),
                status: "500 Internal Server Error".to_string(),
            }));
        }
        Ok(TransferOutcome {
            local_path: unit.local_path(),
            remote_path: unit.remote_path().to_string(),
            checksums: Checksums {
                md5: format!("md5-{}", unit.source),
                sha1: format!("sha1-{}", unit.source),
                sha256: None,
            },
            size: 1,
        })
    }
}

#[async_trait]
impl TransferProvider for MockTransferProvider {
    async fn upload(&self, unit: &TransferUnit) -> Result<TransferOutcome> {
        self.transfer(unit)
    }

    async fn download(&self, unit: &TransferUnit) -> Result<TransferOutcome> {
        self.transfer(unit)
    }
}

fn upload_unit(index: usize) -> TransferUnit {
    TransferUnit {
        kind: UnitKind::Upload,
        source: format!("f{index}"),
        target: format!("libs/f{index}"),
        props: String::new(),
        expected: None,
        flags: TransferFlags::default(),
    }
}

fn units(count: usize) -> Arc<[TransferUnit]> {
    (0..count).map(upload_unit).collect::<Vec<_>>().into()
}

// -----------------------------------------------------------------------
// Round-robin assignment
// -----------------------------------------------------------------------

#[test]
fn round_robin_assignment_partitions_all_indices() {
    assert_eq!(assigned_indices(0, 2, 5), vec![0, 2, 4]);
    assert_eq!(assigned_indices(1, 2, 5), vec![1, 3]);
    assert_eq!(assigned_indices(3, 4, 2), Vec::<usize>::new());

    for threads in 1..6 {
        let mut all: Vec<usize> = (0..threads)
            .flat_map(|t| assigned_indices(t, threads, 11))
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..11).collect::<Vec<_>>());
    }
}

// -----------------------------------------------------------------------
// run_transfers
// -----------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_failure_is_counted_and_the_rest_continue() {
    let provider = Arc::new(MockTransferProvider::failing(&["f2"]));

    let results = run_transfers(provider.clone(), units(5), 2).await;

    assert_eq!(results.succeeded, 4);
    assert_eq!(results.failed, 1);
    assert_eq!(results.per_worker_processed, vec![3, 2]);
    assert!(!results.summary().is_success());
    assert!(results.first_error.as_deref().unwrap().contains("libs/f2"));

    let remote: Vec<_> = results
        .outcomes
        .iter()
        .map(|o| o.remote_path.as_str())
        .collect();
    assert_eq!(remote, vec!["libs/f0", "libs/f1", "libs/f3", "libs/f4"]);
    assert_eq!(provider.calls.lock().unwrap().len(), 5);
}

#[tokio::test]
async fn first_error_comes_from_lowest_worker_id() {
    // worker 1 fails index 1, worker 0 fails index 2
    let provider = Arc::new(MockTransferProvider::failing(&["f1", "f2"]));

    let results = run_transfers(provider, units(4), 2).await;

    assert_eq!(results.failed, 2);
    assert!(results.first_error.unwrap().contains("libs/f2"));
}

#[tokio::test]
async fn panicking_worker_fails_all_of_its_units() {
    let provider = Arc::new(MockTransferProvider::panicking(&["f1"]));

    let results = run_transfers(provider, units(4), 2).await;

    assert_eq!(results.succeeded, 2);
    assert_eq!(results.failed, 2);
    assert_eq!(results.per_worker_processed, vec![2, 2]);
    assert!(results.first_error.unwrap().contains("worker 1 aborted"));
    assert_eq!(results.outcomes.len(), 2);
}

#[tokio::test]
async fn zero_threads_runs_on_one_worker() {
    let provider = Arc::new(MockTransferProvider::default());
    let results = run_transfers(provider, units(3), 0).await;
    assert_eq!(results.succeeded, 3);
    assert_eq!(results.per_worker_processed, vec![3]);
}

#[tokio::test]
async fn more_threads_than_units_leaves_idle_workers() {
    let provider = Arc::new(MockTransferProvider::default());
    let results = run_transfers(provider, units(2), 4).await;
    assert_eq!(results.succeeded, 2);
    assert_eq!(results.per_worker_processed, vec![1, 1, 0, 0]);
}

#[tokio::test]
async fn empty_unit_list_succeeds_trivially() {
    let provider = Arc::new(MockTransferProvider::default());
    let results = run_transfers(provider, units(0), 3).await;
    assert_eq!(results.summary().succeeded, 0);
    assert!(results.summary().is_success());
    assert!(results.first_error.is_none());
}

#[tokio::test]
async fn directory_units_are_created_locally_without_outcome() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("a/b");
    let unit = TransferUnit {
        kind: UnitKind::Directory,
        source: "libs/a/b".to_string(),
        target: dir.to_string_lossy().into_owned(),
        props: String::new(),
        expected: None,
        flags: TransferFlags::default(),
    };
    let provider = Arc::new(MockTransferProvider::default());

    let results = run_transfers(provider.clone(), vec![unit].into(), 1).await;

    assert_eq!(results.succeeded, 0);
    assert_eq!(results.directories, 1);
    assert_eq!(results.failed, 0);
    assert!(results.outcomes.is_empty());
    assert!(dir.is_dir());
    assert!(provider.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn dry_run_provider_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("never");
    let units: Arc<[TransferUnit]> = vec![
        upload_unit(0),
        TransferUnit {
            kind: UnitKind::Directory,
            source: "libs/never".to_string(),
            target: dir.to_string_lossy().into_owned(),
            props: String::new(),
            expected: None,
            flags: TransferFlags::default(),
        },
    ]
    .into();

    let results = run_transfers(Arc::new(DryRunProvider), units, 2).await;

    assert_eq!(results.succeeded, 1);
    assert_eq!(results.directories, 1);
    assert_eq!(results.outcomes.len(), 1);
    assert_eq!(results.outcomes[0].checksums, Checksums::default());
    assert!(!dir.exists());
}

// -----------------------------------------------------------------------
// TransferResults::from_reports
// -----------------------------------------------------------------------

#[test]
fn reports_are_merged_in_worker_order() {
    let reports = vec![
        WorkerReport {
            worker_id: 1,
            processed: 2,
            succeeded: 1,
            directories: 0,
            outcomes: vec![(1, TransferOutcome::default())],
            first_error: Some(UnitFailure {
                unit_index: 3,
                message: "from worker 1".to_string(),
            }),
        },
        WorkerReport {
            worker_id: 0,
            processed: 3,
            succeeded: 1,
            directories: 1,
            outcomes: vec![(4, TransferOutcome::default())],
            first_error: Some(UnitFailure {
                unit_index: 2,
                message: "from worker 0".to_string(),
            }),
        },
    ];

    let results = TransferResults::from_reports(reports);

    assert_eq!(results.succeeded, 2);
    assert_eq!(results.directories, 1);
    assert_eq!(results.failed, 2);
    assert_eq!(results.per_worker_processed, vec![3, 2]);
    assert_eq!(results.first_error.as_deref(), Some("from worker 0"));
    assert_eq!(results.outcomes.len(), 2);
}

// -----------------------------------------------------------------------
// Unit construction
// -----------------------------------------------------------------------

fn local_files() -> LocalFiles {
    LocalFiles {
        base_dir: PathBuf::from("build/libs/"),
        files: vec![
            PathBuf::from("build/libs/a.jar"),
            PathBuf::from("build/libs/sub/b.jar"),
        ],
    }
}

#[test]
fn upload_units_keep_layout_relative_to_base() {
    let flags = TransferFlags::default();
    let units = upload_units(&local_files(), "libs-release/app/", "os=linux", &flags);

    let targets: Vec<_> = units.iter().map(|u| u.target.as_str()).collect();
    assert_eq!(targets, vec!["libs-release/app/a.jar", "libs-release/app/sub/b.jar"]);
    assert!(units.iter().all(|u| u.kind == UnitKind::Upload));
    assert!(units.iter().all(|u| u.props == "os=linux"));
    assert_eq!(units[1].source, "build/libs/sub/b.jar");
}

#[test]
fn upload_units_flat_keeps_file_names_only() {
    let flags = TransferFlags {
        flat: true,
        ..Default::default()
    };
    let units = upload_units(&local_files(), "libs-release/", "", &flags);
    let targets: Vec<_> = units.iter().map(|u| u.target.as_str()).collect();
    assert_eq!(targets, vec!["libs-release/a.jar", "libs-release/b.jar"]);
}

#[test]
fn upload_units_without_trailing_separator_use_exact_target() {
    let files = LocalFiles {
        base_dir: PathBuf::new(),
        files: vec![PathBuf::from("./notes.txt")],
    };
    let units = upload_units(&files, "docs/readme.txt", "", &TransferFlags::default());
    assert_eq!(units[0].target, "docs/readme.txt");

    let units = upload_units(&files, "docs/", "", &TransferFlags::default());
    assert_eq!(units[0].target, "docs/notes.txt");
}

fn result_item(path: &str, name: &str, item_type: ItemType) -> ResultItem {
    ResultItem {
        repo: "libs".to_string(),
        path: path.to_string(),
        name: name.to_string(),
        actual_md5: "m".to_string(),
        actual_sha1: "s".to_string(),
        item_type,
        ..Default::default()
    }
}

#[test]
fn download_units_recreate_repository_layout() {
    let items = vec![
        result_item("org/acme", "core.jar", ItemType::File),
        result_item(".", "readme.txt", ItemType::File),
        result_item("org", "empty", ItemType::Folder),
        result_item(".", ".", ItemType::Folder),
    ];

    let units = download_units(&items, "out/", &TransferFlags::default());

    assert_eq!(units.len(), 3);
    assert_eq!(units[0].kind, UnitKind::Download);
    assert_eq!(units[0].source, "libs/org/acme/core.jar");
    assert_eq!(units[0].target, "out/org/acme/core.jar");
    assert_eq!(units[0].expected.as_ref().unwrap().sha1, "s");
    assert_eq!(units[1].target, "out/readme.txt");
    assert_eq!(units[2].kind, UnitKind::Directory);
    assert_eq!(units[2].source, "libs/org/empty");
    assert_eq!(units[2].target, "out/org/empty");
}

#[test]
fn download_units_flat_and_bare_targets() {
    let items = vec![result_item("org/acme", "core.jar", ItemType::File)];
    let flags = TransferFlags {
        flat: true,
        ..Default::default()
    };

    assert_eq!(download_units(&items, "out", &flags)[0].target, "out/core.jar");
    assert_eq!(download_units(&items, "", &flags)[0].target, "core.jar");
}
