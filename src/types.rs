//! Core types for artifact-transfer

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::utils::add_separator;

/// Kind of repository entry returned by a search
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// Regular file
    #[default]
    File,
    /// Directory
    Folder,
}

/// A key/value property attached to a repository entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Property key (e.g., "build.name")
    pub key: String,
    /// Property value; properties without a value come back with none
    #[serde(default)]
    pub value: String,
}

/// One matched repository entry as returned by the search endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultItem {
    /// Repository key
    pub repo: String,
    /// Directory portion of the entry, "." for the repository root
    #[serde(default)]
    pub path: String,
    /// Entry name, "." for the repository-root pseudo entry
    pub name: String,
    /// MD5 computed by the remote
    #[serde(default)]
    pub actual_md5: String,
    /// SHA-1 computed by the remote
    #[serde(default)]
    pub actual_sha1: String,
    /// Size in bytes
    #[serde(default)]
    pub size: i64,
    /// Attached properties, in the order the remote returned them
    #[serde(default)]
    pub properties: Vec<Property>,
    /// File or folder
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
}

impl ResultItem {
    /// Repository-relative path `repo/path/name`.
    ///
    /// Entries directly under the repository root (`path == "."`) become `repo/name`.
    /// Folders always carry a trailing `/`, so `a/b/` can never be mistaken for a
    /// prefix of the sibling `a/bc`.
    pub fn relative_path(&self) -> String {
        let mut url = self.repo.clone();
        if self.path != "." {
            url = add_separator(&url, "/", &self.path);
        }
        url = add_separator(&url, "/", &self.name);
        if self.is_folder() && !url.ends_with('/') {
            url.push('/');
        }
        url
    }

    /// True for the pseudo entry a recursive folder search returns for the repository root
    pub fn is_repo_root(&self) -> bool {
        self.name == "."
    }

    /// True when the entry is a folder
    pub fn is_folder(&self) -> bool {
        self.item_type == ItemType::Folder
    }

    /// First value of the property `key`, if any
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    /// Checksums the remote computed for this entry
    pub fn checksums(&self) -> Checksums {
        Checksums {
            md5: self.actual_md5.clone(),
            sha1: self.actual_sha1.clone(),
            sha256: None,
        }
    }
}

/// Checksums of a transferred file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    /// Hex-encoded MD5
    pub md5: String,
    /// Hex-encoded SHA-1
    pub sha1: String,
    /// Hex-encoded SHA-256, only known for locally hashed files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Transfer-wide flags copied into every unit
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferFlags {
    /// Drop the source directory layout at the destination
    pub flat: bool,
    /// Follow symlinks when collecting local files
    pub symlinks: bool,
    /// Ask the remote to explode uploaded archives
    pub explode_archive: bool,
    /// Count units without touching the remote
    pub dry_run: bool,
    /// Files at least this large (bytes) are first offered as checksum-only deploys
    pub min_checksum_deploy_size: u64,
}

/// What a unit does
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitKind {
    /// Local file to repository path
    Upload,
    /// Repository file to local path
    Download,
    /// Repository folder recreated locally (no network call)
    Directory,
}

/// One file-level transfer job.
///
/// `source` and `target` are a local path and a repository-relative path; which is
/// which depends on [`UnitKind`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferUnit {
    /// Direction of the transfer
    pub kind: UnitKind,
    /// Where the bytes come from
    pub source: String,
    /// Where the bytes go
    pub target: String,
    /// Matrix properties attached on upload, `k=v;k2=v2`
    pub props: String,
    /// Checksums the remote announced for a download, used for verification
    pub expected: Option<Checksums>,
    /// Transfer-wide flags
    pub flags: TransferFlags,
}

impl TransferUnit {
    /// Local side of the unit
    pub fn local_path(&self) -> PathBuf {
        match self.kind {
            UnitKind::Upload => PathBuf::from(&self.source),
            UnitKind::Download | UnitKind::Directory => PathBuf::from(&self.target),
        }
    }

    /// Repository side of the unit
    pub fn remote_path(&self) -> &str {
        match self.kind {
            UnitKind::Upload => &self.target,
            UnitKind::Download | UnitKind::Directory => &self.source,
        }
    }
}

/// Result of one successful unit
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Local file read or written
    pub local_path: PathBuf,
    /// Repository-relative path
    pub remote_path: String,
    /// Checksums reported by the remote (or computed locally when the remote is silent)
    pub checksums: Checksums,
    /// Bytes transferred
    pub size: u64,
}

/// Succeeded/failed totals of a command
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSummary {
    /// Units that completed
    pub succeeded: usize,
    /// Units that failed
    pub failed: usize,
}

impl TransferSummary {
    /// True when no unit failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Add another group's totals to this one
    pub fn merge(&mut self, other: TransferSummary) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}
