//! Test configuration helpers for pointing the client at a mock repository service

use std::path::Path;
use std::sync::Arc;

use artifact_transfer::commands::TransferOptions;
use artifact_transfer::config::ServerConfig;
use artifact_transfer::{ArtifactoryClient, BuildContext, Config};
use wiremock::MockServer;

/// Configuration targeting `server`, with build records kept under `build_dir`
pub fn test_config(server: &MockServer, build_dir: &Path) -> Config {
    let mut config = Config::default();
    config.server = ServerConfig {
        url: format!("{}/artifactory/", server.uri()),
        user: Some("ci".to_string()),
        password: Some("secret".to_string()),
        timeout_secs: 10,
        ..Default::default()
    };
    config.build.build_dir = build_dir.to_path_buf();
    config
}

/// Client for `server`
pub fn test_client(server: &MockServer) -> Arc<ArtifactoryClient> {
    let config = test_config(server, Path::new("unused"));
    Arc::new(ArtifactoryClient::new(&config.server).unwrap())
}

/// Transfer options with a build context and checksum deploys disabled
pub fn build_options(threads: usize, name: &str, number: &str) -> TransferOptions {
    TransferOptions {
        threads,
        dry_run: false,
        min_checksum_deploy_size: u64::MAX,
        build: Some(BuildContext {
            name: name.to_string(),
            number: number.to_string(),
        }),
    }
}
