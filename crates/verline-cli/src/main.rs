//! Verline - version lines for parameterized runs
//!
//! The `verline` command records runs against a hub repository: one line per
//! configuration fingerprint, one index on the primary line.
//!
//! ## Commands
//!
//! - `record`: Push an artifact under its configuration's line
//! - `fingerprint`: Print the fingerprint of a configuration
//! - `index`: Show every recorded version
//! - `delete`: Remove the working copy (and optionally the remote)
//! - `demo`: Record a toy two-layer network for a few hidden sizes

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, Level};

use verline_core::{
    render_index, Configuration, FileArtifact, LocalWorkingCopy, RecordOutcome, StateDict,
    Tensor, VersioningOrchestrator,
};
use verline_remote::{HubClient, HubConfig, LocalGitHost, RepoId, RepositoryHost};

#[derive(Parser)]
#[command(name = "verline")]
#[command(author = "Verline Developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic version lines for parameterized runs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Remote repository id, e.g. `team/my-model`
    #[arg(long, global = true, env = "VERLINE_REPO")]
    repo: Option<String>,

    /// Local working copy directory
    #[arg(long, global = true, env = "VERLINE_DIR", default_value = ".verline")]
    dir: PathBuf,

    /// Serve repositories from bare git repos under this directory instead of the hub
    #[arg(long, global = true, env = "VERLINE_LOCAL_HOST")]
    local_host: Option<PathBuf>,

    /// Create hub repositories as private
    #[arg(long, global = true)]
    private: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one run: the artifact goes to the line of its configuration
    Record {
        /// Configuration as inline JSON, or `@path` to a JSON file
        #[arg(short, long)]
        config: String,

        /// Artifact file to snapshot
        #[arg(short, long)]
        artifact: PathBuf,
    },

    /// Print the fingerprint (line name) of a configuration
    Fingerprint {
        /// Configuration as inline JSON, or `@path` to a JSON file
        #[arg(short, long)]
        config: String,
    },

    /// Show the global index of recorded versions
    Index {
        /// Output format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: IndexFormat,
    },

    /// Remove the local working copy
    Delete {
        /// Also delete the remote repository
        #[arg(long)]
        purge_remote: bool,
    },

    /// Record a toy two-layer network for each hidden size
    Demo {
        /// Start from scratch: delete the local working copy first
        #[arg(long)]
        fresh: bool,

        /// Hidden sizes to record
        #[arg(long, value_delimiter = ',', default_value = "8,16,32")]
        hidden_sizes: Vec<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IndexFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    verline_core::init_tracing(cli.json, level);

    match &cli.command {
        Commands::Fingerprint { config } => return cmd_fingerprint(config),
        // Local removal needs neither the host nor credentials.
        Commands::Delete {
            purge_remote: false,
        } => return cmd_remove_local(&cli.dir),
        _ => {}
    }

    let repo = cli
        .repo
        .as_deref()
        .context("a repository id is required (--repo or VERLINE_REPO)")?;
    let repo_id = RepoId::new(repo).context("Invalid repository id")?;

    match &cli.local_host {
        Some(root) => run(LocalGitHost::new(root), repo_id, &cli.dir, cli.command).await,
        None => {
            let config = HubConfig::from_env().with_private(cli.private);
            let host = HubClient::new(config).context("Failed to create hub client")?;
            run(host, repo_id, &cli.dir, cli.command).await
        }
    }
}

async fn run<H: RepositoryHost>(
    host: H,
    repo_id: RepoId,
    dir: &Path,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::Record { config, artifact } => {
            cmd_record(host, repo_id, dir, &config, &artifact).await
        }
        Commands::Index { format } => cmd_index(host, repo_id, dir, format).await,
        Commands::Delete { purge_remote } => cmd_delete(host, repo_id, dir, purge_remote).await,
        Commands::Demo {
            fresh,
            hidden_sizes,
        } => cmd_demo(host, repo_id, dir, fresh, &hidden_sizes).await,
        Commands::Fingerprint { config } => cmd_fingerprint(&config),
    }
}

/// Parse `--config`: inline JSON, or `@path` naming a JSON file.
fn load_configuration(arg: &str) -> Result<Configuration> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path))?,
        None => arg.to_string(),
    };
    text.parse::<Configuration>()
        .context("Failed to parse configuration")
}

fn print_outcome(outcome: &RecordOutcome) {
    let path = if outcome.changed {
        "new configuration, index updated"
    } else {
        "configuration unchanged"
    };
    println!("Recorded {} ({})", outcome.fingerprint, path);
    println!("  line: {}", outcome.line);
}

async fn open<H: RepositoryHost>(
    host: H,
    repo_id: RepoId,
    dir: &Path,
) -> Result<VersioningOrchestrator<H>> {
    VersioningOrchestrator::open(host, repo_id.clone(), dir)
        .await
        .with_context(|| format!("Failed to open {} at {:?}", repo_id, dir))
}

/// Record one artifact file under its configuration.
async fn cmd_record<H: RepositoryHost>(
    host: H,
    repo_id: RepoId,
    dir: &Path,
    config: &str,
    artifact: &Path,
) -> Result<()> {
    let config = load_configuration(config)?;
    if !artifact.is_file() {
        bail!("Artifact file not found: {:?}", artifact);
    }

    let mut orch = open(host, repo_id, dir).await?;
    let outcome = orch
        .record(&config, &FileArtifact::new(artifact))
        .await
        .context("Record failed")?;
    print_outcome(&outcome);
    Ok(())
}

fn cmd_fingerprint(config: &str) -> Result<()> {
    let config = load_configuration(config)?;
    println!("{}", config.fingerprint());
    Ok(())
}

async fn cmd_index<H: RepositoryHost>(
    host: H,
    repo_id: RepoId,
    dir: &Path,
    format: IndexFormat,
) -> Result<()> {
    let mut orch = open(host, repo_id, dir).await?;
    let index = orch.load_index().await.context("Failed to load index")?;
    match format {
        IndexFormat::Markdown => print!("{}", render_index(&index, &orch.repository_url())),
        IndexFormat::Json => println!("{}", serde_json::to_string_pretty(&index)?),
    }
    Ok(())
}

async fn cmd_delete<H: RepositoryHost>(
    host: H,
    repo_id: RepoId,
    dir: &Path,
    purge_remote: bool,
) -> Result<()> {
    if !purge_remote {
        return cmd_remove_local(dir);
    }
    let orch = open(host, repo_id.clone(), dir).await?;
    orch.delete(true).await.context("Delete failed")?;
    println!("Deleted {:?} and remote repository {}", dir, repo_id);
    Ok(())
}

fn cmd_remove_local(dir: &Path) -> Result<()> {
    remove_working_copy(dir)?;
    println!("Deleted {:?}", dir);
    Ok(())
}

fn remove_working_copy(dir: &Path) -> Result<()> {
    LocalWorkingCopy::init(dir)
        .and_then(LocalWorkingCopy::remove)
        .with_context(|| format!("Failed to remove working copy {:?}", dir))
}

async fn cmd_demo<H: RepositoryHost>(
    host: H,
    repo_id: RepoId,
    dir: &Path,
    fresh: bool,
    hidden_sizes: &[usize],
) -> Result<()> {
    if fresh {
        info!("Removing local working copy {:?}", dir);
        remove_working_copy(dir)?;
    }

    let mut orch = open(host, repo_id, dir).await?;
    let mut rng = SplitMix::from_clock();
    for &hidden_size in hidden_sizes {
        let config = Configuration::from_value(serde_json::json!({ "hidden_size": hidden_size }))?;
        // Training would happen here; fresh random weights stand in for it.
        let model = boring_model(hidden_size, &mut rng)?;
        let outcome = orch.record(&config, &model).await.context("Record failed")?;
        print_outcome(&outcome);
    }
    println!("See {}", orch.repository_url());
    Ok(())
}

/// Linear(2, h) -> ReLU -> Linear(h, 4), as a state dict.
fn boring_model(hidden_size: usize, rng: &mut SplitMix) -> Result<StateDict> {
    let mut sd = StateDict::new();
    for (name, in_features, out_features) in [
        ("in_dense", 2, hidden_size),
        ("out_dense", hidden_size, 4),
    ] {
        let bound = 1.0 / (in_features as f32).sqrt();
        let mut uniform = |n: usize| (0..n).map(|_| rng.uniform(bound)).collect::<Vec<_>>();
        let weight = Tensor::new(
            vec![out_features, in_features],
            uniform(out_features * in_features),
        )?;
        let bias = Tensor::new(vec![out_features], uniform(out_features))?;
        sd.insert(format!("{name}.weight"), weight);
        sd.insert(format!("{name}.bias"), bias);
    }
    Ok(sd)
}

/// Small deterministic generator for demo weights.
struct SplitMix(u64);

impl SplitMix {
    fn from_clock() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        SplitMix(seed)
    }

    fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in `[-bound, bound)`.
    fn uniform(&mut self, bound: f32) -> f32 {
        let unit = (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32;
        (unit * 2.0 - 1.0) * bound
    }
}
