//! Turning matched files into transfer units.

use std::path::{Component, Path};

use crate::types::{ResultItem, TransferFlags, TransferUnit, UnitKind};
use crate::utils::{LocalFiles, add_separator, file_name};

/// `/`-joined normal components of `path`, dropping `.` and root prefixes
fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Map local files onto repository targets.
///
/// A `target` ending in `/` is a directory: each file lands under it, either by
/// file name (`flat`) or by its path relative to `files.base_dir`. Any other
/// target is used as the exact repository path.
pub fn upload_units(
    files: &LocalFiles,
    target: &str,
    props: &str,
    flags: &TransferFlags,
) -> Vec<TransferUnit> {
    files
        .files
        .iter()
        .map(|file| {
            let remote = if target.ends_with('/') {
                let relative = if flags.flat {
                    file_name(file)
                } else {
                    let stripped = file.strip_prefix(&files.base_dir).unwrap_or(file);
                    slash_path(stripped)
                };
                format!("{target}{relative}")
            } else {
                target.to_string()
            };
            TransferUnit {
                kind: UnitKind::Upload,
                source: file.to_string_lossy().into_owned(),
                target: remote,
                props: props.to_string(),
                expected: None,
                flags: flags.clone(),
            }
        })
        .collect()
}

/// Map repository entries onto local paths under `target`.
///
/// Files become download units, folders become directory units. With `flat`
/// only the entry name is kept, otherwise the entry's repository path (without
/// the repository key) is recreated under `target`.
pub fn download_units(items: &[ResultItem], target: &str, flags: &TransferFlags) -> Vec<TransferUnit> {
    items
        .iter()
        .filter(|item| !item.is_repo_root())
        .map(|item| {
            let relative = if flags.flat || item.path == "." {
                item.name.clone()
            } else {
                add_separator(&item.path, "/", &item.name)
            };
            let local = if target.is_empty() || target.ends_with('/') {
                format!("{target}{relative}")
            } else {
                format!("{target}/{relative}")
            };
            let source = item.relative_path().trim_end_matches('/').to_string();

            if item.is_folder() {
                TransferUnit {
                    kind: UnitKind::Directory,
                    source,
                    target: local,
                    props: String::new(),
                    expected: None,
                    flags: flags.clone(),
                }
            } else {
                TransferUnit {
                    kind: UnitKind::Download,
                    source,
                    target: local,
                    props: String::new(),
                    expected: Some(item.checksums()),
                    flags: flags.clone(),
                }
            }
        })
        .collect()
}
