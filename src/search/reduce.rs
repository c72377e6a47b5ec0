//! Path-tree reduction of flat search results.
//!
//! A recursive folder search returns folders together with everything under them.
//! Callers usually want one of two views of that tree:
//! - [`ReduceMode::Deepest`] keeps entries with no selected descendant (bottom chain)
//! - [`ReduceMode::Shallowest`] keeps entries with no selected ancestor (top chain)
//!
//! Both reductions work on repository-relative keys where folders end in `/`, so an
//! ancestor test is a plain prefix test against a key that ends in a separator.

use std::collections::BTreeMap;

use crate::types::ResultItem;

/// Which end of each ancestor chain to keep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceMode {
    /// Keep only entries that have no selected descendant
    Deepest,
    /// Keep only entries that have no selected ancestor
    Shallowest,
}

/// Reduce search results to the deepest or shallowest entries of each path chain.
///
/// The repository-root pseudo entry (`name == "."`) is never a candidate and is
/// dropped. Entries normalizing to the same relative path collapse into one (the
/// last one wins). The output does not depend on input order and is sorted by
/// relative path.
pub fn reduce_dir_result(items: Vec<ResultItem>, mode: ReduceMode) -> Vec<ResultItem> {
    let mut by_path: BTreeMap<String, ResultItem> = BTreeMap::new();
    for item in items {
        if item.is_repo_root() {
            continue;
        }
        let key = item.relative_path();
        if by_path.insert(key.clone(), item).is_some() {
            tracing::debug!(path = %key, "Duplicate search result collapsed during reduction");
        }
    }

    if by_path.len() <= 1 {
        return by_path.into_values().collect();
    }

    let keys: Vec<&str> = by_path.keys().map(String::as_str).collect();
    let kept: Vec<String> = match mode {
        ReduceMode::Deepest => filter_bottom_chain(&keys),
        ReduceMode::Shallowest => filter_top_chain(&keys),
    }
    .into_iter()
    .map(str::to_string)
    .collect();

    let mut result = Vec::with_capacity(kept.len());
    for key in kept {
        if let Some(item) = by_path.remove(&key) {
            result.push(item);
        }
    }
    result
}

/// True when `ancestor` is a folder key that strictly contains `path`
fn is_ancestor(ancestor: &str, path: &str) -> bool {
    ancestor.ends_with('/') && path.len() > ancestor.len() && path.starts_with(ancestor)
}

/// Keep keys that are not an ancestor of any other key.
///
/// Scans in descending order. All descendants of a folder sort directly after it
/// in ascending order, so in a descending scan they appear just before it and the
/// last kept key is one of them whenever any exist. Testing against that single
/// key is enough. Returned keys are sorted ascending.
pub fn filter_bottom_chain<'a>(keys: &[&'a str]) -> Vec<&'a str> {
    let mut sorted = keys.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();

    let mut kept: Vec<&'a str> = Vec::with_capacity(sorted.len());
    for key in sorted {
        match kept.last() {
            Some(last) if is_ancestor(key, last) => {}
            _ => kept.push(key),
        }
    }
    kept.reverse();
    kept
}

/// Keep keys that have no ancestor among the other keys.
///
/// Scans in ascending order with a cursor on the last kept folder. Descendants of
/// a kept folder form a contiguous run right after it, and every key in that run
/// is dropped, so the cursor only moves once the run is over. Returned keys are
/// sorted ascending.
pub fn filter_top_chain<'a>(keys: &[&'a str]) -> Vec<&'a str> {
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut kept: Vec<&'a str> = Vec::with_capacity(sorted.len());
    let mut ancestor: Option<&'a str> = None;
    for key in sorted {
        if ancestor.is_some_and(|a| is_ancestor(a, key)) {
            continue;
        }
        kept.push(key);
        if key.ends_with('/') {
            ancestor = Some(key);
        }
    }
    kept
}
