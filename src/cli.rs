use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::{
    config::Overrides,
    query::{DEFAULT_SCORE_THRESHOLD, DEFAULT_TOP_K, QueryParams},
};

#[derive(Debug, Parser)]
#[command(
    name = "medrag",
    about = "Answer questions from your medical documents with cited sources"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding provider: colbert or hashing
    #[arg(long, global = true)]
    pub embedder: Option<String>,

    /// Override the ColBERT model ID or local model path
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Store segments in this Qdrant server (gRPC, e.g. http://localhost:6334)
    #[arg(long, global = true)]
    pub qdrant_url: Option<String>,

    /// Language model used to write answers
    #[arg(long, global = true)]
    pub llm_model: Option<String>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            embedder: self.embedder.clone(),
            model_name: self.model.clone(),
            qdrant_url: self.qdrant_url.clone(),
            llm_model: self.llm_model.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chunk, embed and store documents (pdf, txt, md)
    Ingest(IngestArgs),
    /// Ask a question about the stored documents
    Ask(AskArgs),
    /// Delete every stored segment
    Reset,
    /// Show system status and statistics
    Status(StatusArgs),
    /// Manage stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Start MCP server for AI agent integration
    Mcp,
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Ingest --

#[derive(Debug, Parser)]
pub struct IngestArgs {
    /// Files or directories; directories are searched recursively
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Output one JSON report per file
    #[arg(long)]
    pub json: bool,
}

// -- Ask --

#[derive(Debug, Parser)]
pub struct AskArgs {
    /// The question
    pub question: String,

    /// Number of segments to retrieve
    #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Minimum cosine similarity for a segment to be used
    #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD)]
    pub score_threshold: f32,

    /// Keep vector-search order instead of re-ranking by word overlap
    #[arg(long)]
    pub no_rerank: bool,

    /// Re-rank with BM25 over the whole corpus first
    #[arg(long)]
    pub bm25: bool,

    /// Output the answer as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskArgs {
    pub fn params(&self) -> QueryParams {
        QueryParams {
            question: self.question.clone(),
            top_k: self.top_k,
            score_threshold: self.score_threshold,
            rerank: !self.no_rerank,
            bm25: self.bm25,
        }
    }
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show resolved settings and where stored values differ
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting in config.redb
    Set {
        /// Setting key (see `medrag config show`)
        key: String,
        value: String,
    },
    /// Remove a stored setting (revert to environment or default)
    Clear {
        key: String,
    },
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "medrag",
            &mut std::io::stdout(),
        );
    }
}
