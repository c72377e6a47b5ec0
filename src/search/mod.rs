//! Repository search -- query construction, execution and result reduction.
//!
//! Split into focused submodules:
//! - [`reduce`] - Path-tree reduction of flat result lists
//!
//! A search is one `items.find(<criteria>).include(<fields>)` round trip per
//! [`SearchSpec`]. Criteria come either from a wildcard pattern
//! (`repo/dir/*.jar`) or from a raw, pre-built criteria expression.

pub mod reduce;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};
use crate::types::ResultItem;

pub use reduce::{ReduceMode, filter_bottom_chain, filter_top_chain, reduce_dir_result};

/// Fields requested for every search result
pub const DEFAULT_RETURN_FIELDS: [&str; 8] = [
    "name",
    "repo",
    "path",
    "actual_md5",
    "actual_sha1",
    "size",
    "property",
    "type",
];

/// How the items of a search are selected
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecPattern {
    /// `repo/path/name` pattern where `*` and `?` are wildcards
    Wildcard(String),
    /// Raw criteria expression, used verbatim inside `items.find(...)`
    Aql(String),
}

/// One search specification
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchSpec {
    /// Item selection
    pub pattern: SpecPattern,
    /// Also match items in sub-directories of the pattern's directory
    pub recursive: bool,
    /// Return folders as well as files
    pub include_dirs: bool,
    /// Required properties, `k=v;k2=v2`
    pub props: Option<String>,
    /// Only keep items produced by this build, `name` or `name/number`
    pub build: Option<String>,
}

impl SearchSpec {
    /// Recursive, files-only search for a wildcard pattern
    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Self {
            pattern: SpecPattern::Wildcard(pattern.into()),
            recursive: true,
            include_dirs: false,
            props: None,
            build: None,
        }
    }

    /// Search with a raw criteria expression
    pub fn aql(criteria: impl Into<String>) -> Self {
        Self {
            pattern: SpecPattern::Aql(criteria.into()),
            recursive: true,
            include_dirs: false,
            props: None,
            build: None,
        }
    }

    /// Criteria expression for this spec
    pub fn criteria(&self) -> Result<String> {
        match &self.pattern {
            SpecPattern::Wildcard(pattern) => {
                create_aql_body(pattern, self.recursive, self.include_dirs, self.props.as_deref())
            }
            SpecPattern::Aql(criteria) => Ok(criteria.clone()),
        }
    }
}

/// Remote side of a search: sends one query and returns the parsed result list
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Run a complete `items.find(...).include(...)` query
    async fn aql_search(&self, query: &str) -> Result<Vec<ResultItem>>;
}

/// Narrows search results down to the items produced by a build
#[async_trait]
pub trait BuildFilter: Send + Sync {
    /// Keep only the items belonging to `build` (`name` or `name/number`)
    async fn filter_by_build(&self, build: &str, items: Vec<ResultItem>)
    -> Result<Vec<ResultItem>>;
}

/// [`BuildFilter`] that matches the `build.name` / `build.number` properties stamped on upload
#[derive(Clone, Copy, Debug, Default)]
pub struct PropertyBuildFilter;

#[async_trait]
impl BuildFilter for PropertyBuildFilter {
    async fn filter_by_build(
        &self,
        build: &str,
        items: Vec<ResultItem>,
    ) -> Result<Vec<ResultItem>> {
        let (name, number) = match build.rsplit_once('/') {
            Some((name, number)) => (name, Some(number)),
            None => (build, None),
        };
        Ok(items
            .into_iter()
            .filter(|item| {
                item.property("build.name") == Some(name)
                    && number.is_none_or(|n| item.property("build.number") == Some(n))
            })
            .collect())
    }
}

#[derive(Deserialize)]
struct SearchEnvelope {
    #[serde(default)]
    results: Vec<ResultItem>,
}

/// Parse the `{"results": [...]}` envelope returned by the search endpoint
pub fn parse_search_response(body: &[u8]) -> Result<Vec<ResultItem>> {
    let envelope: SearchEnvelope = serde_json::from_slice(body)?;
    Ok(envelope.results)
}

/// Wrap criteria into a full query requesting [`DEFAULT_RETURN_FIELDS`]
///
/// # Examples
///
/// ```
/// use artifact_transfer::search::build_query;
///
/// let query = build_query(r#"{"repo":"libs"}"#);
/// assert!(query.starts_with(r#"items.find({"repo":"libs"}).include("name","repo""#));
/// ```
#[must_use]
pub fn build_query(criteria: &str) -> String {
    let fields: Vec<String> = DEFAULT_RETURN_FIELDS
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect();
    format!("items.find({criteria}).include({})", fields.join(","))
}

/// Build the criteria expression for a wildcard pattern `repo/dir/name`.
///
/// The first segment is the repository. The last segment is matched against the
/// item name, everything in between against its path. A trailing `/` selects
/// everything in that directory. Recursive patterns also match any path below
/// the directory.
pub fn create_aql_body(
    pattern: &str,
    recursive: bool,
    include_dirs: bool,
    props: Option<&str>,
) -> Result<String> {
    let pattern = pattern.trim_start_matches('/');
    let (repo, rest) = match pattern.split_once('/') {
        Some((repo, rest)) => (repo, rest),
        None => (pattern, ""),
    };
    if repo.is_empty() {
        return Err(Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern must start with a repository name".to_string(),
        });
    }
    if crate::utils::has_wildcards(repo) {
        return Err(Error::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "wildcards are not allowed in the repository name".to_string(),
        });
    }

    let (dir, name) = match rest.rsplit_once('/') {
        Some((dir, "")) => (dir, "*"),
        Some((dir, name)) => (dir, name),
        None if rest.is_empty() => (".", "*"),
        None => (".", rest),
    };

    let mut criteria = Map::new();
    criteria.insert("repo".to_string(), json!(repo));

    let exact = json!({ "path": { "$match": dir }, "name": { "$match": name } });
    if recursive {
        let below = if dir == "." {
            "*".to_string()
        } else {
            format!("{dir}/*")
        };
        let nested = json!({ "path": { "$match": below }, "name": { "$match": name } });
        criteria.insert("$or".to_string(), json!([exact, nested]));
    } else if let Value::Object(clauses) = exact {
        criteria.extend(clauses);
    }

    criteria.insert(
        "type".to_string(),
        json!(if include_dirs { "any" } else { "file" }),
    );

    for (key, value) in parse_props(props.unwrap_or_default()) {
        criteria.insert(format!("@{key}"), json!(value));
    }

    Ok(Value::Object(criteria).to_string())
}

/// Split `k=v;k2=v2` into pairs, ignoring empty entries
pub fn parse_props(props: &str) -> Vec<(String, String)> {
    props
        .split(';')
        .filter(|p| !p.trim().is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
            None => (p.trim().to_string(), String::new()),
        })
        .collect()
}

/// Run one search specification.
///
/// One remote round trip; any transport, status or decode failure is returned as
/// a single error. When the spec names a build, non-empty results are passed
/// through `build_filter`.
pub async fn search_by_spec(
    service: &dyn SearchService,
    spec: &SearchSpec,
    build_filter: &dyn BuildFilter,
) -> Result<Vec<ResultItem>> {
    let query = build_query(&spec.criteria()?);
    tracing::debug!(query = %query, "Searching repository");

    let mut results = service.aql_search(&query).await?;

    if let Some(build) = spec.build.as_deref()
        && !results.is_empty()
    {
        results = build_filter.filter_by_build(build, results).await?;
    }

    log_search_results(results.len());
    Ok(results)
}

/// Log how many artifacts a search found
pub fn log_search_results(count: usize) {
    let suffix = if count == 1 { "artifact." } else { "artifacts." };
    tracing::info!(count, "Found {} {}", count, suffix);
}
