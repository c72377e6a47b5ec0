//! HTTP client for the remote repository service.
//!
//! Three calls are used:
//! - `POST <url>/api/search/aql` with a plain-text query
//! - `PUT <url>/<repo/path>;<props>` to deploy a file, optionally checksum-only
//! - `GET <url>/<repo/path>` to fetch a file

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::config::ServerConfig;
use crate::error::{Error, Result, TransferError};
use crate::search::{SearchService, parse_props, parse_search_response};
use crate::transfer::TransferProvider;
use crate::types::{Checksums, ResultItem, TransferOutcome, TransferUnit};
use crate::utils::{compute_checksums, indent_json};

const SEARCH_ENDPOINT: &str = "api/search/aql";

#[derive(Clone, Debug)]
enum Auth {
    Anonymous,
    Basic {
        user: String,
        password: Option<String>,
    },
    Bearer(String),
}

/// Client for one repository service
#[derive(Clone, Debug)]
pub struct ArtifactoryClient {
    http: reqwest::Client,
    base: Url,
    auth: Auth,
}

#[derive(Deserialize)]
struct DeployResponse {
    #[serde(default)]
    checksums: Option<RemoteChecksums>,
}

#[derive(Deserialize)]
struct RemoteChecksums {
    #[serde(default)]
    md5: String,
    #[serde(default)]
    sha1: String,
    #[serde(default)]
    sha256: Option<String>,
}

impl ArtifactoryClient {
    /// Create a client from server settings
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the HTTP client cannot be created
    pub fn new(server: &ServerConfig) -> Result<Self> {
        let mut url = server.url.trim().to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        let base = Url::parse(&url)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(server.timeout_secs))
            .user_agent(concat!("artifact-transfer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let auth = match (&server.access_token, &server.user) {
            (Some(token), _) if !token.is_empty() => Auth::Bearer(token.clone()),
            (_, Some(user)) if !user.is_empty() => Auth::Basic {
                user: user.clone(),
                password: server.password.clone(),
            },
            _ => Auth::Anonymous,
        };

        Ok(Self { http, base, auth })
    }

    /// Base URL every request is resolved against, always ending in `/`
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of a repository path, each segment percent-encoded
    fn artifact_url(&self, repo_path: &str, props: &str) -> Result<Url> {
        let mut relative = repo_path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let props = encode_props(props);
        if !props.is_empty() {
            relative.push(';');
            relative.push_str(&props);
        }
        Ok(self.base.join(&relative)?)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.auth {
            Auth::Anonymous => builder,
            Auth::Basic { user, password } => builder.basic_auth(user, password.as_ref()),
            Auth::Bearer(token) => builder.bearer_auth(token),
        }
    }

    /// Offer a checksum-only deploy; `Ok(None)` means the remote lacks the content
    async fn try_checksum_deploy(
        &self,
        unit: &TransferUnit,
        url: &Url,
        local: &Checksums,
    ) -> Result<Option<Checksums>> {
        let response = with_checksum_headers(self.request(reqwest::Method::PUT, url.clone()), local)
            .header("X-Checksum-Deploy", "true")
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(destination = %unit.target, "Checksum deploy missed, uploading content");
            return Ok(None);
        }
        if !is_deploy_success(status) {
            return Err(TransferError::Rejected {
                operation: "upload",
                path: unit.target.clone(),
                status: status.to_string(),
            }
            .into());
        }
        let body = response.bytes().await?;
        Ok(Some(remote_checksums(&body, local)))
    }

    async fn upload_content(
        &self,
        unit: &TransferUnit,
        url: &Url,
        local_path: &Path,
        local: &Checksums,
        size: u64,
    ) -> Result<Checksums> {
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|e| local_file_error(local_path, e))?;
        let body = reqwest::Body::wrap_stream(tokio_util::io::ReaderStream::new(file));

        let mut request = with_checksum_headers(self.request(reqwest::Method::PUT, url.clone()), local)
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(body);
        if unit.flags.explode_archive {
            request = request.header("X-Explode-Archive", "true");
        }

        let response = request.send().await?;
        let status = response.status();
        if !is_deploy_success(status) {
            return Err(TransferError::Rejected {
                operation: "upload",
                path: unit.target.clone(),
                status: status.to_string(),
            }
            .into());
        }
        let body = response.bytes().await?;
        Ok(remote_checksums(&body, local))
    }
}

#[async_trait]
impl SearchService for ArtifactoryClient {
    async fn aql_search(&self, query: &str) -> Result<Vec<ResultItem>> {
        let url = self.base.join(SEARCH_ENDPOINT)?;
        let response = self
            .request(reqwest::Method::POST, url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(query.to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if status != reqwest::StatusCode::OK {
            return Err(Error::RemoteStatus {
                status: status.to_string(),
                body: indent_json(&body),
            });
        }
        parse_search_response(&body)
    }
}

#[async_trait]
impl TransferProvider for ArtifactoryClient {
    async fn upload(&self, unit: &TransferUnit) -> Result<TransferOutcome> {
        let local_path = unit.local_path();
        let hash_path = local_path.clone();
        let (local, size) = tokio::task::spawn_blocking(move || compute_checksums(&hash_path))
            .await
            .map_err(|e| local_file_error(&local_path, e))?
            .map_err(|e| local_file_error(&local_path, e))?;

        let url = self.artifact_url(&unit.target, &unit.props)?;

        // a checksum-only deploy cannot carry the explode request
        let mut deployed = None;
        if !unit.flags.explode_archive && size >= unit.flags.min_checksum_deploy_size {
            deployed = self.try_checksum_deploy(unit, &url, &local).await?;
        }
        let checksums = match deployed {
            Some(checksums) => checksums,
            None => {
                self.upload_content(unit, &url, &local_path, &local, size)
                    .await?
            }
        };

        Ok(TransferOutcome {
            local_path,
            remote_path: unit.target.clone(),
            checksums,
            size,
        })
    }

    async fn download(&self, unit: &TransferUnit) -> Result<TransferOutcome> {
        let url = self.artifact_url(&unit.source, "")?;
        let response = self.request(reqwest::Method::GET, url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Rejected {
                operation: "download",
                path: unit.source.clone(),
                status: status.to_string(),
            }
            .into());
        }

        let announced = response
            .headers()
            .get("X-Checksum-Sha1")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| {
                unit.expected
                    .as_ref()
                    .map(|c| c.sha1.clone())
                    .filter(|sha1| !sha1.is_empty())
            });

        let local_path = unit.local_path();
        if let Some(parent) = local_path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| local_file_error(parent, e))?;
        }
        let (checksums, size) =
            write_verified(response.bytes_stream(), &local_path, announced).await?;

        Ok(TransferOutcome {
            local_path,
            remote_path: unit.source.clone(),
            checksums,
            size,
        })
    }
}

/// Sibling of `local_path` a download is streamed into before it is complete
fn partial_path(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}

/// Stream `body` to `local_path`, hashing it on the way.
///
/// Bytes go to a `.part` sibling that is renamed into place only after the
/// whole body arrived and matched `expected_sha1`. On any failure the
/// sibling is removed and `local_path` is left as it was.
async fn write_verified<S, B, E>(
    body: S,
    local_path: &Path,
    expected_sha1: Option<String>,
) -> Result<(Checksums, u64)>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    Error: From<E>,
{
    let partial = partial_path(local_path);
    let written = match stream_to_file(body, &partial).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };
    let (checksums, _) = &written;

    if let Some(expected) = expected_sha1
        && !expected.eq_ignore_ascii_case(&checksums.sha1)
    {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(TransferError::ChecksumMismatch {
            path: local_path.to_path_buf(),
            expected,
            actual: checksums.sha1.clone(),
        }
        .into());
    }

    if let Err(e) = tokio::fs::rename(&partial, local_path).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(local_file_error(local_path, e));
    }
    Ok(written)
}

async fn stream_to_file<S, B, E>(body: S, path: &Path) -> Result<(Checksums, u64)>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    Error: From<E>,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| local_file_error(path, e))?;

    let mut md5_ctx = md5::Context::new();
    let mut sha1 = Sha1::new();
    let mut size = 0u64;
    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        md5_ctx.consume(chunk);
        sha1.update(chunk);
        size += chunk.len() as u64;
        file.write_all(chunk)
            .await
            .map_err(|e| local_file_error(path, e))?;
    }
    file.flush().await.map_err(|e| local_file_error(path, e))?;

    Ok((
        Checksums {
            md5: format!("{:x}", md5_ctx.compute()),
            sha1: hex::encode(sha1.finalize()),
            sha256: None,
        },
        size,
    ))
}

fn is_deploy_success(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::OK || status == reqwest::StatusCode::CREATED
}

fn with_checksum_headers(
    builder: reqwest::RequestBuilder,
    checksums: &Checksums,
) -> reqwest::RequestBuilder {
    let builder = builder
        .header("X-Checksum-Sha1", &checksums.sha1)
        .header("X-Checksum-Md5", &checksums.md5);
    match &checksums.sha256 {
        Some(sha256) => builder.header("X-Checksum-Sha256", sha256),
        None => builder,
    }
}

/// Checksums from a deploy response, falling back to the local ones
fn remote_checksums(body: &[u8], local: &Checksums) -> Checksums {
    match serde_json::from_slice::<DeployResponse>(body) {
        Ok(DeployResponse {
            checksums: Some(remote),
        }) if !remote.sha1.is_empty() => Checksums {
            md5: remote.md5,
            sha1: remote.sha1,
            sha256: remote.sha256.or_else(|| local.sha256.clone()),
        },
        _ => local.clone(),
    }
}

/// `k=v;k2=v2` with every key and value percent-encoded
fn encode_props(props: &str) -> String {
    parse_props(props)
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn local_file_error(path: &Path, reason: impl ToString) -> Error {
    TransferError::LocalFile {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
    .into()
}
