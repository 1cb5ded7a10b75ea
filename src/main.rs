use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use litnote::config::{find_config_file, load_config, save_config, Config, TransferMode};
use litnote::utils::LineReporter;
use litnote::{BatchOrchestrator, Pipeline, ProgressCallback, ProgressEvent, RunSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// litnote - Turn academic PDFs into citation-keyed Markdown notes
#[derive(Parser, Debug)]
#[command(name = "litnote")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn academic PDFs into citation-keyed Markdown notes with a shared BibTeX bibliography", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times for more verbosity: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress INFO lines and non-error logging
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process a single PDF, or every PDF in a folder
    #[command(alias = "p")]
    Process {
        /// PDF file or folder of PDFs
        path: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Process every PDF directly inside a folder
    #[command(alias = "b")]
    Batch {
        /// Folder of PDFs
        folder: PathBuf,

        #[command(flatten)]
        options: RunOptions,
    },

    /// Write a configuration file with the default settings
    InitConfig {
        /// Destination (default: ./litnote.toml)
        path: Option<PathBuf>,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the environment variables litnote reads
    Env,
}

/// Options shared by `process` and `batch`
#[derive(Args, Debug, Default, Clone)]
struct RunOptions {
    /// Output directory for notes, PDFs and the bibliography
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// OpenAI API key for the title-guessing fallback
    #[arg(long = "api-key", short = 'k', env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Note template file
    #[arg(long, short)]
    template: Option<PathBuf>,

    /// Bibliography file (relative paths resolve against the output directory)
    #[arg(long = "bibtex", short = 'b')]
    bibliography: Option<PathBuf>,

    /// Items whose lookups may run at the same time
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Copy PDFs instead of moving them
    #[arg(long)]
    copy: bool,

    /// Replace existing notes with different content
    #[arg(long)]
    overwrite: bool,

    /// Skip all network lookups
    #[arg(long)]
    offline: bool,

    /// Check the output directory is writable before starting
    #[arg(long)]
    validate_write_permission: bool,
}

impl RunOptions {
    /// Apply flags on top of the loaded configuration
    fn apply(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            config.api_keys.openai = Some(key.clone());
        }
        if let Some(template) = &self.template {
            config.template.path = Some(template.clone());
        }
        if let Some(bibliography) = &self.bibliography {
            config.output.bibliography = bibliography.clone();
        }
        if let Some(jobs) = self.jobs {
            config.batch.workers = jobs;
        }
        if self.copy {
            config.output.transfer = TransferMode::Copy;
        }
        if self.overwrite {
            config.output.overwrite_notes = true;
        }
        if self.offline {
            config.resolver.offline = true;
        }
        if self.validate_write_permission {
            config.output.validate_write_permission = true;
        }
    }
}

/// Print all environment variables litnote reads
fn print_env_vars() {
    println!("litnote - Environment Variables");
    println!();
    println!("API Keys:");
    println!("  OPENAI_API_KEY              Key for the title-guessing fallback (also read from .env)");
    println!();
    println!("Configuration (override the config file; nested keys use '__'):");
    println!("  LITNOTE_OUTPUT__PATH                  Output directory (default: .)");
    println!("  LITNOTE_OUTPUT__BIBLIOGRAPHY          Bibliography file (default: reference.bib)");
    println!("  LITNOTE_OUTPUT__TRANSFER              move or copy (default: move)");
    println!("  LITNOTE_OUTPUT__OVERWRITE_NOTES       Replace differing notes (default: false)");
    println!("  LITNOTE_TEMPLATE__PATH                Note template file");
    println!("  LITNOTE_RESOLVER__OFFLINE             Skip network lookups (default: false)");
    println!("  LITNOTE_RESOLVER__MAILTO              Contact address sent to CrossRef");
    println!("  LITNOTE_RESOLVER__LLM_MODEL           Model for title guessing (default: gpt-4o-mini)");
    println!("  LITNOTE_BATCH__WORKERS                Concurrent lookups (default: 2)");
    println!();
    println!("Other Settings:");
    println!("  RUST_LOG                    Rust logging level (e.g., debug, info, warn, error)");
    println!();
    println!("Config file locations:");
    println!("  ./litnote.toml");
    if let Some(dir) = dirs::config_dir() {
        println!("  {}", dir.join("litnote").join("config.toml").display());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before parsing so `-k` can fall back to it
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = if cli.quiet { "error" } else { log_level };

    // stdout is reserved for INFO:/ERROR: lines
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("litnote={}", env_filter)),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Env => {
            print_env_vars();
            Ok(())
        }
        Commands::InitConfig { path, force } => {
            let path = path.unwrap_or_else(|| PathBuf::from("litnote.toml"));
            if path.exists() && !force {
                bail!("{} already exists (use --force to replace it)", path.display());
            }
            let mut defaults = Config::default();
            // never persist a key picked up from the environment
            defaults.api_keys.openai = None;
            save_config(&defaults, &path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("INFO: Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Process { path, options } => {
            let config = resolve_config(cli.config.as_deref(), &options)?;
            run(config, &path, cli.quiet).await
        }
        Commands::Batch { folder, options } => {
            if !folder.is_dir() {
                bail!("{} is not a folder", folder.display());
            }
            let config = resolve_config(cli.config.as_deref(), &options)?;
            run(config, &folder, cli.quiet).await
        }
    }
}

/// Config file (explicit or discovered), then environment, then flags
fn resolve_config(explicit: Option<&Path>, options: &RunOptions) -> Result<Config> {
    let file = match explicit {
        Some(path) => {
            if !path.is_file() {
                bail!("Config file not found: {}", path.display());
            }
            Some(path.to_path_buf())
        }
        None => find_config_file(),
    };
    if let Some(path) = &file {
        tracing::info!("Using config file: {}", path.display());
    }

    let mut config = load_config(file.as_deref()).context("Failed to load configuration")?;
    options.apply(&mut config);
    Ok(config)
}

async fn run(config: Config, input: &Path, quiet: bool) -> Result<()> {
    if !input.exists() {
        bail!("Input path does not exist: {}", input.display());
    }

    let reporter = Arc::new(LineReporter::stdout().quiet(quiet));
    let pipeline = Pipeline::new(config).context("Failed to set up citation lookup")?;

    let callback: ProgressCallback = {
        let reporter = Arc::clone(&reporter);
        Arc::new(move |event: &ProgressEvent<'_>| reporter.report_result(event.result))
    };
    let orchestrator = BatchOrchestrator::new(pipeline).on_progress(callback);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing items already in progress");
            cancel.cancel();
        }
    });

    let summary: RunSummary = if input.is_dir() {
        reporter.info(&format!("Processing folder: {}", input.display()));
        orchestrator.run_folder(input).await?
    } else {
        orchestrator.run_files(vec![input.to_path_buf()]).await?
    };

    reporter.report_summary(&summary);
    Ok(())
}
