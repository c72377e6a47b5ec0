//! Utility functions for path manipulation, local file collection and checksums

use crate::error::{Error, Result};
use crate::types::Checksums;
use regex::Regex;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Read buffer size used when hashing local files
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Join two path fragments with `separator`, skipping empty fragments
///
/// # Examples
///
/// ```
/// use artifact_transfer::utils::add_separator;
///
/// assert_eq!(add_separator("libs", "/", "org"), "libs/org");
/// assert_eq!(add_separator("libs", "/", ""), "libs");
/// assert_eq!(add_separator("", "/", "org"), "org");
/// ```
#[must_use]
pub fn add_separator(left: &str, separator: &str, right: &str) -> String {
    if right.is_empty() {
        return left.to_string();
    }
    if left.is_empty() {
        return right.to_string();
    }
    format!("{left}{separator}{right}")
}

/// Append `additional` matrix properties to `existing`, inserting a `;` when needed
///
/// # Examples
///
/// ```
/// use artifact_transfer::utils::add_props;
///
/// assert_eq!(add_props("a=1", "b=2"), "a=1;b=2");
/// assert_eq!(add_props("a=1;", "b=2"), "a=1;b=2");
/// assert_eq!(add_props("", "b=2"), "b=2");
/// ```
#[must_use]
pub fn add_props(existing: &str, additional: &str) -> String {
    let mut props = existing.to_string();
    if !props.is_empty() && !props.ends_with(';') && !additional.is_empty() {
        props.push(';');
    }
    props.push_str(additional);
    props
}

/// Debian coordinates `distribution/component/architecture` as `deb.*` matrix properties.
///
/// A `/` inside one coordinate is written as `\/`.
///
/// # Examples
///
/// ```
/// use artifact_transfer::utils::deb_props;
///
/// assert_eq!(
///     deb_props("bookworm/main/amd64").unwrap(),
///     "deb.distribution=bookworm;deb.component=main;deb.architecture=amd64"
/// );
/// ```
pub fn deb_props(deb: &str) -> Result<String> {
    let mut parts = Vec::with_capacity(3);
    let mut current = String::new();
    let mut chars = deb.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'/') => {
                chars.next();
                current.push('/');
            }
            '/' => parts.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    parts.push(current);

    match parts.as_slice() {
        [distribution, component, architecture]
            if parts.iter().all(|part| !part.is_empty()) =>
        {
            Ok(format!(
                "deb.distribution={distribution};deb.component={component};deb.architecture={architecture}"
            ))
        }
        _ => Err(Error::config(
            "deb",
            format!("expected distribution/component/architecture, got '{deb}'"),
        )),
    }
}

/// Last component of a `/` or platform separated path
#[must_use]
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Pretty-print a response body when it is JSON, otherwise return it as (lossy) text
pub fn indent_json(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

/// True when the pattern contains a wildcard character
#[must_use]
pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Translate a wildcard pattern into an anchored regular expression.
///
/// `*` matches within a single path segment unless `recursive` is set, in which case
/// it also crosses directory boundaries. `?` always matches one non-separator char.
pub fn wildcard_to_regex(pattern: &str, recursive: bool) -> Result<Regex> {
    let star = if recursive { ".*" } else { "[^/]*" };
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(star),
            '?' => expr.push_str("[^/]"),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| Error::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Directory part of a pattern that precedes its first wildcard
///
/// # Examples
///
/// ```
/// use artifact_transfer::utils::pattern_base_dir;
///
/// assert_eq!(pattern_base_dir("build/libs/*.jar"), "build/libs/");
/// assert_eq!(pattern_base_dir("*.jar"), "");
/// assert_eq!(pattern_base_dir("build/a?/x.jar"), "build/");
/// ```
#[must_use]
pub fn pattern_base_dir(pattern: &str) -> &str {
    let wildcard_at = pattern.find(['*', '?']).unwrap_or(pattern.len());
    match pattern[..wildcard_at].rfind('/') {
        Some(idx) => &pattern[..=idx],
        None => "",
    }
}

/// Local files matched by an upload pattern, with the directory they are relative to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFiles {
    /// Directory the pattern is anchored at; target layouts are computed relative to it
    pub base_dir: PathBuf,
    /// Matched files, sorted
    pub files: Vec<PathBuf>,
}

/// Collect local files matching an upload pattern.
///
/// - A pattern naming an existing file yields just that file.
/// - A pattern naming an existing directory yields its files (all descendants when
///   `recursive`, direct children otherwise).
/// - Otherwise the pattern is treated as a wildcard expression.
///
/// Symlinks are followed only when `follow_symlinks` is set.
pub fn collect_local_files(
    pattern: &str,
    recursive: bool,
    follow_symlinks: bool,
) -> Result<LocalFiles> {
    if pattern.is_empty() {
        return Err(Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern is empty".to_string(),
        });
    }

    let normalized = pattern.replace('\\', "/");
    let as_path = Path::new(&normalized);

    if !has_wildcards(&normalized) {
        if as_path.is_file() {
            let base_dir = as_path.parent().map(Path::to_path_buf).unwrap_or_default();
            return Ok(LocalFiles {
                base_dir,
                files: vec![as_path.to_path_buf()],
            });
        }
        if as_path.is_dir() {
            let max_depth = if recursive { usize::MAX } else { 1 };
            let files = walk_files(as_path, max_depth, follow_symlinks, |_| true);
            return Ok(LocalFiles {
                base_dir: as_path.to_path_buf(),
                files,
            });
        }
        tracing::debug!(pattern = %normalized, "Pattern matches no local file or directory");
        return Ok(LocalFiles {
            base_dir: as_path.parent().map(Path::to_path_buf).unwrap_or_default(),
            files: Vec::new(),
        });
    }

    let base = pattern_base_dir(&normalized);
    let walk_root = if base.is_empty() { "." } else { base };
    let regex = wildcard_to_regex(&normalized, recursive)?;
    let max_depth = if recursive {
        usize::MAX
    } else {
        normalized[base.len()..].split('/').count()
    };

    let files = walk_files(Path::new(walk_root), max_depth, follow_symlinks, |path| {
        let candidate = path.to_string_lossy().replace('\\', "/");
        let candidate = if base.is_empty() {
            candidate.trim_start_matches("./").to_string()
        } else {
            candidate
        };
        regex.is_match(&candidate)
    });

    Ok(LocalFiles {
        base_dir: PathBuf::from(base),
        files,
    })
}

fn walk_files(
    root: &Path,
    max_depth: usize,
    follow_symlinks: bool,
    mut keep: impl FnMut(&Path) -> bool,
) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .follow_links(follow_symlinks)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable local entry");
                None
            }
        })
        .filter(|entry| {
            let file_type = entry.file_type();
            // unfollowed links are kept when they point at a file
            file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())
        })
        .map(walkdir::DirEntry::into_path)
        .filter(|path| keep(path))
        .collect();
    files.sort();
    files
}

/// Compute MD5, SHA-1 and SHA-256 of a local file in one pass
///
/// Returns the checksums and the number of bytes read.
pub fn compute_checksums(path: &Path) -> std::io::Result<(Checksums, u64)> {
    let mut file = std::fs::File::open(path)?;
    let mut md5_ctx = md5::Context::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut total = 0u64;

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        md5_ctx.consume(&buffer[..read]);
        sha1.update(&buffer[..read]);
        sha256.update(&buffer[..read]);
        total += read as u64;
    }

    Ok((
        Checksums {
            md5: format!("{:x}", md5_ctx.compute()),
            sha1: hex::encode(sha1.finalize()),
            sha256: Some(hex::encode(sha256.finalize())),
        },
        total,
    ))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str) -> PathBuf {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, rel.as_bytes()).unwrap();
        path
    }

    #[test]
    fn add_props_skips_separator_when_nothing_is_added() {
        assert_eq!(add_props("a=1", ""), "a=1");
    }

    #[test]
    fn indent_json_pretty_prints_json_and_passes_text_through() {
        let pretty = indent_json(br#"{"errors":[{"status":400}]}"#);
        assert!(pretty.contains('\n'));
        assert!(pretty.contains("\"status\": 400"));
        assert_eq!(indent_json(b"plain text"), "plain text");
    }

    #[test]
    fn wildcard_star_stays_within_segment_unless_recursive() {
        let flat = wildcard_to_regex("dir/*.txt", false).unwrap();
        assert!(flat.is_match("dir/a.txt"));
        assert!(!flat.is_match("dir/sub/a.txt"));

        let deep = wildcard_to_regex("dir/*.txt", true).unwrap();
        assert!(deep.is_match("dir/sub/a.txt"));
    }

    #[test]
    fn wildcard_escapes_regex_metacharacters() {
        let re = wildcard_to_regex("a+b(1).txt", false).unwrap();
        assert!(re.is_match("a+b(1).txt"));
        assert!(!re.is_match("aab1.txt"));
    }

    #[test]
    fn question_mark_matches_single_character() {
        let re = wildcard_to_regex("v?.jar", false).unwrap();
        assert!(re.is_match("v1.jar"));
        assert!(!re.is_match("v10.jar"));
    }

    #[test]
    fn collect_single_existing_file() {
        let temp = TempDir::new().unwrap();
        let file = touch(temp.path(), "a.txt");

        let found = collect_local_files(file.to_str().unwrap(), false, false).unwrap();
        assert_eq!(found.files, vec![file]);
        assert_eq!(found.base_dir, temp.path());
    }

    #[test]
    fn collect_directory_respects_recursive_flag() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "top.txt");
        touch(temp.path(), "sub/deep.txt");
        let root = temp.path().to_str().unwrap();

        let shallow = collect_local_files(root, false, false).unwrap();
        assert_eq!(shallow.files.len(), 1);

        let deep = collect_local_files(root, true, false).unwrap();
        assert_eq!(deep.files.len(), 2);
    }

    #[test]
    fn collect_wildcard_pattern() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "out/a.jar");
        let b = touch(temp.path(), "out/b.jar");
        touch(temp.path(), "out/notes.md");
        touch(temp.path(), "out/nested/c.jar");

        let pattern = format!("{}/out/*.jar", temp.path().to_str().unwrap());
        let found = collect_local_files(&pattern, false, false).unwrap();
        assert_eq!(found.files, vec![a, b]);
        assert_eq!(
            found.base_dir,
            PathBuf::from(format!("{}/out/", temp.path().to_str().unwrap()))
        );

        let recursive = collect_local_files(&pattern, true, false).unwrap();
        assert_eq!(recursive.files.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn collect_keeps_symlinked_files_when_not_following_links() {
        let temp = TempDir::new().unwrap();
        let real = touch(temp.path(), "real.txt");
        let plain = touch(temp.path(), "up/plain.txt");
        let link = temp.path().join("up/link.txt");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let linked_dir = temp.path().join("up/linked_dir");
        std::os::unix::fs::symlink(temp.path().join("up"), &linked_dir).unwrap();

        let up = temp.path().join("up");
        let found = collect_local_files(up.to_str().unwrap(), true, false).unwrap();
        assert_eq!(found.files, vec![link.clone(), plain]);

        let (sums, _) = compute_checksums(&link).unwrap();
        assert_eq!(sums, compute_checksums(&real).unwrap().0);
    }

    #[test]
    fn deb_props_expands_coordinates() {
        assert_eq!(
            deb_props("bookworm/main/amd64").unwrap(),
            "deb.distribution=bookworm;deb.component=main;deb.architecture=amd64"
        );
        assert_eq!(
            deb_props(r"stable\/updates/main/i386").unwrap(),
            "deb.distribution=stable/updates;deb.component=main;deb.architecture=i386"
        );
    }

    #[test]
    fn deb_props_rejects_incomplete_coordinates() {
        for bad in ["bookworm/main", "bookworm//amd64", "a/b/c/d", ""] {
            match deb_props(bad) {
                Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("deb")),
                other => panic!("unexpected result for {bad:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn collect_missing_path_yields_nothing() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.txt");
        let found = collect_local_files(missing.to_str().unwrap(), false, false).unwrap();
        assert!(found.files.is_empty());
    }

    #[test]
    fn collect_rejects_empty_pattern() {
        assert!(matches!(
            collect_local_files("", false, false),
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[test]
    fn checksums_match_known_digests() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        let (sums, size) = compute_checksums(&path).unwrap();
        assert_eq!(size, 5);
        assert_eq!(sums.md5, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(sums.sha1, "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert_eq!(
            sums.sha256.as_deref(),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }
}
