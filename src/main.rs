//! # DeskQA CLI (`dqa`)
//!
//! The `dqa` binary is the primary interface for DeskQA. It provides
//! commands for building the document corpus, asking one-shot questions,
//! running an interactive chat session, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! dqa --config ./config/dqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dqa corpus` | Build the corpus and report ingested/skipped files |
//! | `dqa ask "<question>"` | One-shot question, no session history |
//! | `dqa chat` | Password-gated interactive chat session |
//! | `dqa serve` | Start the password-gated HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Verify which documents make it into the corpus
//! dqa corpus --config ./config/dqa.toml
//!
//! # Ask a single question from a script
//! dqa ask "When does the office open?" --config ./config/dqa.toml
//!
//! # Interactive session (prompts for the password)
//! dqa chat --config ./config/dqa.toml
//!
//! # HTTP API for a web front end
//! dqa serve --config ./config/dqa.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use deskqa::chat;
use deskqa::config;
use deskqa::corpus::{build_corpus, CorpusStore};
use deskqa::extract::ExtractorRegistry;
use deskqa::server;
use deskqa::synthesis::ChatCompletionClient;

/// DeskQA — document-grounded question answering over office files.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dqa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dqa",
    about = "DeskQA — document-grounded question answering over office files",
    version,
    long_about = "DeskQA ingests a directory of office documents (PDF, PowerPoint, plain text, \
    HWP, Excel) into an in-memory corpus and answers questions about it through a hosted \
    chat-completion model, grounded by naive truncation or semantic retrieval. Interactive \
    and HTTP surfaces are gated by a shared password."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/dqa.toml`. Document directory, retrieval,
    /// synthesis, and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/dqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Build the corpus and report what got in.
    ///
    /// Scans the document directory, extracts every recognized file, and
    /// prints the ingested files, any skipped files with their causes, and
    /// the total corpus size. Nothing is persisted; this is a dry run of
    /// the ingestion every other command performs at startup.
    Corpus {
        /// Print the full corpus text to stdout after the report.
        #[arg(long)]
        dump: bool,
    },

    /// Ask a one-shot question with no session history.
    ///
    /// Builds the corpus, selects grounding for the question, and prints
    /// the model's answer. Intended for scripts and operators; not gated
    /// by the access password.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Start an interactive chat session in the terminal.
    ///
    /// Prompts for the shared access password, then reads questions line
    /// by line until EOF or `exit`/`quit`. Conversation history within the
    /// session feeds back into each prompt.
    Chat,

    /// Start the password-gated HTTP API.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `/auth`, `/chat`, `/refresh`, and `/health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let registry = ExtractorRegistry::with_defaults();

    match cli.command {
        Commands::Corpus { dump } => {
            let corpus = build_corpus(&cfg, &registry)?;
            println!("ingested {} file(s):", corpus.files.len());
            for name in &corpus.files {
                println!("  {}", name);
            }
            if !corpus.skipped.is_empty() {
                println!("skipped {} file(s):", corpus.skipped.len());
                for (name, cause) in &corpus.skipped {
                    println!("  {} ({})", name, cause);
                }
            }
            println!(
                "corpus: {} characters from {}",
                corpus.text.chars().count(),
                cfg.documents.dir.display()
            );
            if dump {
                println!("{}", corpus.text);
            }
        }
        Commands::Ask { question } => {
            let client = ChatCompletionClient::from_config(&cfg.synthesis)?;
            chat::run_ask(&cfg, &registry, &client, &question).await?;
        }
        Commands::Chat => {
            let client = ChatCompletionClient::from_config(&cfg.synthesis)?;
            let store = CorpusStore::initialize(&cfg, &registry).await?;
            chat::run_chat(&cfg, &store, &client).await?;
        }
        Commands::Serve => {
            let client = Arc::new(ChatCompletionClient::from_config(&cfg.synthesis)?);
            let store = Arc::new(CorpusStore::initialize(&cfg, &registry).await?);
            server::run_server(&cfg, store, Arc::new(registry), client).await?;
        }
    }

    Ok(())
}
