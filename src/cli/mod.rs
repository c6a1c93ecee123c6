//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "contractiq",
    version,
    author = "neur0map",
    about = "Grounded question answering over legal contracts",
    long_about = "ContractIQ ingests contract text into a local corpus, indexes it for semantic search \
                  and answers questions with a language model that may only use the retrieved clauses, \
                  citing the chunks it relied on."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/contractiq/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest contract text files (*.txt) into the corpus
    Ingest {
        /// Directory searched recursively for .txt files
        dir: PathBuf,

        /// Source tag stored on each document
        #[arg(long, default_value = crate::ingest::DEFAULT_SOURCE)]
        source: String,
    },

    /// Embed stored chunks and upsert them into the vector index
    Index {
        /// Create the Pinecone index first if it does not exist
        #[arg(long)]
        create: bool,
    },

    /// Ask a question about the contracts
    Ask {
        /// Question to ask
        question: String,

        /// Restrict retrieval to one document
        #[arg(short, long)]
        doc_id: Option<String>,

        /// Number of chunks to retrieve (defaults to answer.top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Include ranked matches and raw model output
        #[arg(long)]
        debug: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List documents in the corpus
    Docs {
        /// Only titles containing this text
        #[arg(short, long)]
        query: Option<String>,

        #[arg(short, long, default_value = "10")]
        limit: usize,

        #[arg(short, long, default_value = "0")]
        offset: usize,
    },

    /// Show a document's chunks in reading order
    Chunks {
        doc_id: String,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Import or browse CUAD annotations
    Annotations {
        #[command(subcommand)]
        action: AnnotationsAction,
    },

    /// Show corpus and index statistics
    Stats,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum AnnotationsAction {
    /// Import annotations from CUAD_v1.json
    Import {
        /// Path to the SQuAD-layout annotation file
        file: PathBuf,
    },

    /// List a document's annotations
    List {
        doc_id: String,

        /// Only labels containing this text
        #[arg(long)]
        label: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
