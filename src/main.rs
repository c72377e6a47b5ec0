//! artifact-transfer command line
//!
//! ## Commands
//!
//! - `search`: List repository entries matching a pattern
//! - `upload`: Deploy local files to the repository
//! - `download`: Fetch repository entries to the local filesystem
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::Level;

use artifact_transfer::commands::{
    self, CommandReport, CommandStatus, DownloadSpec, TransferOptions, UploadSpec,
};
use artifact_transfer::telemetry::init_tracing;
use artifact_transfer::{ArtifactoryClient, Config, FileBuildInfoStore, ReduceMode, SearchSpec};

#[derive(Parser)]
#[command(name = "artifact-transfer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search, upload and download repository artifacts", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "ARTIFACT_TRANSFER_CONFIG")]
    config: Option<PathBuf>,

    /// Repository service URL
    #[arg(long, global = true, env = "ARTIFACT_TRANSFER_URL")]
    url: Option<String>,

    /// User for basic authentication
    #[arg(long, global = true, env = "ARTIFACT_TRANSFER_USER")]
    user: Option<String>,

    /// Password or API key for basic authentication
    #[arg(long, global = true, env = "ARTIFACT_TRANSFER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Access token, used instead of user/password
    #[arg(long, global = true, env = "ARTIFACT_TRANSFER_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Number of parallel transfer workers
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Show what would be transferred without transferring
    #[arg(long, global = true)]
    dry_run: bool,

    /// Build name recorded with transferred artifacts
    #[arg(long, global = true, env = "ARTIFACT_TRANSFER_BUILD_NAME")]
    build_name: Option<String>,

    /// Build number recorded with transferred artifacts
    #[arg(long, global = true, env = "ARTIFACT_TRANSFER_BUILD_NUMBER")]
    build_number: Option<String>,

    /// Directory holding local build-info records
    #[arg(long, global = true)]
    build_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List repository entries matching a pattern
    Search {
        /// `repo/path/name` wildcard pattern, or raw criteria with --aql
        pattern: String,

        /// Treat the pattern as a raw criteria expression
        #[arg(long)]
        aql: bool,

        /// Also match entries in sub-directories
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        recursive: bool,

        /// Return folders as well as files
        #[arg(long)]
        include_dirs: bool,

        /// Required properties, `k=v;k2=v2`
        #[arg(long)]
        props: Option<String>,

        /// Only entries produced by this build, `name` or `name/number`
        #[arg(long)]
        build: Option<String>,

        /// Reduce results to one end of each path chain
        #[arg(long, value_enum)]
        reduce: Option<ReduceArg>,
    },

    /// Deploy local files to the repository
    Upload {
        /// Local file, directory or wildcard pattern
        pattern: String,

        /// Repository path; end it with `/` to upload into a directory
        target: String,

        /// Drop the local directory layout
        #[arg(long)]
        flat: bool,

        /// Descend into sub-directories
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        recursive: bool,

        /// Properties attached to every uploaded file, `k=v;k2=v2`
        #[arg(long)]
        props: Option<String>,

        /// Follow symlinks when collecting files
        #[arg(long)]
        symlinks: bool,

        /// Ask the repository to extract uploaded archives
        #[arg(long)]
        explode: bool,

        /// Debian coordinates `distribution/component/architecture`; escape a `/` inside one as `\/`
        #[arg(long)]
        deb: Option<String>,
    },

    /// Fetch repository entries to the local filesystem
    Download {
        /// `repo/path/name` wildcard pattern
        pattern: String,

        /// Local directory
        #[arg(default_value = "")]
        target: String,

        /// Drop the repository directory layout
        #[arg(long)]
        flat: bool,

        /// Also match entries in sub-directories
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        recursive: bool,

        /// Recreate matched folders locally
        #[arg(long)]
        include_dirs: bool,

        /// Required properties, `k=v;k2=v2`
        #[arg(long)]
        props: Option<String>,

        /// Only entries produced by this build, `name` or `name/number`
        #[arg(long)]
        build: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReduceArg {
    /// Keep entries with nothing selected below them
    Deepest,
    /// Keep entries with nothing selected above them
    Shallowest,
}

impl From<ReduceArg> for ReduceMode {
    fn from(arg: ReduceArg) -> Self {
        match arg {
            ReduceArg::Deepest => ReduceMode::Deepest,
            ReduceArg::Shallowest => ReduceMode::Shallowest,
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;

    if let Some(url) = &cli.url {
        config.server.url = url.clone();
    }
    if cli.user.is_some() {
        config.server.user = cli.user.clone();
    }
    if cli.password.is_some() {
        config.server.password = cli.password.clone();
    }
    if cli.access_token.is_some() {
        config.server.access_token = cli.access_token.clone();
    }
    if let Some(threads) = cli.threads {
        config.transfer.threads = threads;
    }
    if cli.dry_run {
        config.transfer.dry_run = true;
    }
    if cli.build_name.is_some() {
        config.build.build_name = cli.build_name.clone();
    }
    if cli.build_number.is_some() {
        config.build.build_number = cli.build_number.clone();
    }
    if let Some(dir) = &cli.build_dir {
        config.build.build_dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn transfer_options(config: &Config) -> Result<TransferOptions> {
    Ok(TransferOptions {
        threads: config.transfer.threads,
        dry_run: config.transfer.dry_run,
        min_checksum_deploy_size: config.transfer.min_checksum_deploy_size,
        build: config.build.context()?,
    })
}

fn search_spec(
    pattern: String,
    aql: bool,
    recursive: bool,
    include_dirs: bool,
    props: Option<String>,
    build: Option<String>,
) -> SearchSpec {
    let mut spec = if aql {
        SearchSpec::aql(pattern)
    } else {
        SearchSpec::wildcard(pattern)
    };
    spec.recursive = recursive;
    spec.include_dirs = include_dirs;
    spec.props = props;
    spec.build = build;
    spec
}

fn print_report(report: &CommandReport) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(match report.status {
        CommandStatus::Success => ExitCode::SUCCESS,
        CommandStatus::Failure => ExitCode::FAILURE,
    })
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let client = Arc::new(
        ArtifactoryClient::new(&config.server).context("Failed to create repository client")?,
    );
    let store = FileBuildInfoStore::new(&config.build.build_dir);

    match cli.command {
        Commands::Search {
            pattern,
            aql,
            recursive,
            include_dirs,
            props,
            build,
            reduce,
        } => {
            let spec = search_spec(pattern, aql, recursive, include_dirs, props, build);
            let items = commands::search(client.as_ref(), &spec, reduce.map(Into::into)).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Upload {
            pattern,
            target,
            flat,
            recursive,
            props,
            symlinks,
            explode,
            deb,
        } => {
            let specs = vec![UploadSpec {
                pattern,
                target,
                recursive,
                flat,
                props,
                symlinks,
                explode_archive: explode,
                deb,
            }];
            let options = transfer_options(&config)?;
            let report = commands::upload(client, &specs, &options, &store).await?;
            print_report(&report)
        }
        Commands::Download {
            pattern,
            target,
            flat,
            recursive,
            include_dirs,
            props,
            build,
        } => {
            let specs = vec![DownloadSpec {
                search: search_spec(pattern, false, recursive, include_dirs, props, build),
                target,
                flat,
            }];
            let options = transfer_options(&config)?;
            let report =
                commands::download(client.as_ref(), client.clone(), &specs, &options, &store)
                    .await?;
            print_report(&report)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            let code = e
                .downcast_ref::<artifact_transfer::Error>()
                .map(artifact_transfer::Error::exit_code)
                .unwrap_or(1);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
