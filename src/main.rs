//! # Local Brain CLI (`brain`)
//!
//! ## Usage
//!
//! ```bash
//! brain --config ./config/brain.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `brain init` | Create the SQLite index and run schema migrations |
//! | `brain rebuild` | Re-index the bulk conversation export |
//! | `brain ingest` | Index live-log interactions past the cursor |
//! | `brain context "<query>"` | Print the context block a prompt would get |
//! | `brain ask <prompt…>` | Answer a prompt with retrieved context |
//! | `brain stats` | Show index statistics |
//! | `brain ping` | Check the chat backend is reachable |
//! | `brain watch` | Rebuild whenever the export changes |
//! | `brain serve` | Start the HTTP service |
//!
//! Logs go to stderr and honor `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use local_brain::ask::{cli_system_prompt, AskRequest, Assistant};
use local_brain::chat::{self, ChatBackend, OpenAiCompatChat};
use local_brain::config::{self, Config};
use local_brain::context::{assemble_context, ContextAssembler};
use local_brain::cursor::FileCursorStore;
use local_brain::embedding::create_embedder;
use local_brain::ingest::Ingestor;
use local_brain::interaction_log::InteractionLog;
use local_brain::progress::ProgressMode;
use local_brain::store::sqlite::SqliteStore;
use local_brain::store::IndexStore;
use local_brain::{migrate, server, stats, watch};

/// Local Brain: retrieval over your past conversations for a local LLM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/brain.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "brain",
    about = "Local Brain: retrieval over your past conversations for a local LLM",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/brain.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the index schema. Safe to run repeatedly.
    Init,

    /// Rebuild the bulk-export partition of the index.
    ///
    /// Deletes every `bulk_export` entry, then re-reads the export tree.
    /// Live entries are left untouched.
    Rebuild {
        #[arg(long, value_enum, default_value_t = ProgressArg::Auto)]
        progress: ProgressArg,
    },

    /// Ingest new lines of the live interaction log.
    Ingest {
        #[arg(long, value_enum, default_value_t = ProgressArg::Auto)]
        progress: ProgressArg,
    },

    /// Print the context block retrieved for a query.
    Context {
        query: String,

        /// Number of neighbors to retrieve (default: retrieval.top_k).
        #[arg(long)]
        k: Option<usize>,

        /// Character budget (default: retrieval.max_context_chars).
        #[arg(long)]
        max_chars: Option<usize>,
    },

    /// Ask the model a question, grounded in retrieved context.
    Ask {
        /// The question or instruction.
        #[arg(required = true)]
        prompt: Vec<String>,

        /// Skip retrieval and send the prompt as is.
        #[arg(long)]
        no_rag: bool,

        /// Override the chat model from config.
        #[arg(long)]
        model: Option<String>,

        /// File whose contents are appended to the system prompt.
        #[arg(long)]
        system: Option<PathBuf>,
    },

    /// Show index statistics.
    Stats,

    /// Send a diagnostic prompt to the chat backend.
    Ping,

    /// Watch the export directory and rebuild on change.
    Watch,

    /// Start the HTTP service on `[server].bind`.
    Serve,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Auto,
    Off,
    Human,
    Json,
}

impl ProgressArg {
    fn mode(self) -> ProgressMode {
        match self {
            ProgressArg::Auto => ProgressMode::default_for_tty(),
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

async fn open_store(cfg: &Config) -> Result<Arc<dyn IndexStore>> {
    Ok(Arc::new(SqliteStore::open(cfg).await?))
}

async fn build_ingestor(cfg: &Config, progress: ProgressArg) -> Result<Ingestor> {
    let store = open_store(cfg).await?;
    let embedder = create_embedder(&cfg.embedding)?;
    let cursor_store = Arc::new(FileCursorStore::new(&cfg.paths.cursor));
    Ok(Ingestor::new(cfg, store, embedder, cursor_store).with_progress(progress.mode().reporter()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Index initialized at {}", cfg.paths.index_db().display());
        }
        Commands::Rebuild { progress } => {
            let ingestor = build_ingestor(&cfg, progress).await?;
            let report = ingestor.rebuild_index().await?;

            println!("rebuild");
            match report.deleted {
                Some(n) => println!("  cleared entries: {}", n),
                None => println!("  cleared entries: (delete failed, see log)"),
            }
            println!("  messages read: {}", report.records);
            println!("  entries written: {}", report.entries);
            println!("  batches: {}", report.batches);
            println!("  skipped files: {}", report.warnings.len());
            println!("ok");
        }
        Commands::Ingest { progress } => {
            let ingestor = build_ingestor(&cfg, progress).await?;
            let report = ingestor.ingest_live().await?;

            println!("ingest live");
            println!("  lines scanned: {}", report.lines_scanned);
            println!("  entries written: {}", report.entries);
            println!("  skipped lines: {}", report.warnings.len());
            println!("  empty turns: {}", report.skipped_noise);
            println!(
                "  cursor: {} -> {}",
                report.previous.last_line, report.cursor.last_line
            );
            println!("ok");
        }
        Commands::Context {
            query,
            k,
            max_chars,
        } => {
            let store = open_store(&cfg).await?;
            let embedder = create_embedder(&cfg.embedding)?;
            let context = assemble_context(
                store.as_ref(),
                embedder.as_ref(),
                &query,
                k.unwrap_or(cfg.retrieval.top_k),
                max_chars.unwrap_or(cfg.retrieval.max_context_chars),
            )
            .await?;

            if context.is_empty() {
                eprintln!("No context fits for this query.");
            } else {
                println!("{}", context);
            }
        }
        Commands::Ask {
            prompt,
            no_rag,
            model,
            system,
        } => {
            let store = open_store(&cfg).await?;
            let embedder = create_embedder(&cfg.embedding)?;
            let chat: Arc<dyn ChatBackend> = Arc::new(OpenAiCompatChat::new(&cfg.chat)?);
            let assistant = Assistant::new(
                ContextAssembler::new(store, embedder, &cfg.retrieval),
                chat,
                InteractionLog::new(&cfg.paths.live_log),
            );

            let outcome = assistant
                .ask(&AskRequest {
                    prompt: prompt.join(" "),
                    system_prompt: cli_system_prompt(system.as_deref()),
                    use_rag: !no_rag,
                    model,
                    source: "cli".to_string(),
                })
                .await?;

            println!("{}", outcome.reply);
        }
        Commands::Stats => {
            migrate::run_migrations(&cfg).await?;
            stats::run_stats(&cfg).await?;
        }
        Commands::Ping => {
            let backend = OpenAiCompatChat::new(&cfg.chat)?;
            println!(
                "Pinging {} with model '{}'",
                backend.endpoint(),
                backend.default_model()
            );
            let reply = chat::ping(&backend).await?;
            println!("Response: {}", reply);
        }
        Commands::Watch => {
            let ingestor = build_ingestor(&cfg, ProgressArg::Off).await?;
            watch::run_watch(&ingestor, &cfg.paths.export_dir, cfg.watch.poll_secs).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
