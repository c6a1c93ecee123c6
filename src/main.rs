use contractiq::answer::{AnswerPipeline, AnswerRequest, AnswerResult};
use contractiq::cli::{AnnotationsAction, Cli, Commands, ConfigAction};
use contractiq::config::Config;
use contractiq::embedding::{EmbeddingProvider, IndexBuilder, LazyEmbedder};
use contractiq::error::{ContractIqError, Result};
use contractiq::generation;
use contractiq::ingest::{self, Chunker, Ingestor};
use contractiq::retrieval::{self, Retriever};
use contractiq::storage::{Database, SqliteCorpus};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Handle commands
    match cli.command {
        Commands::Ingest { dir, source } => {
            cmd_ingest(cli.config, &dir, &source)?;
        }
        Commands::Index { create } => {
            cmd_index(cli.config, create)?;
        }
        Commands::Ask {
            question,
            doc_id,
            top_k,
            debug,
            json,
        } => {
            cmd_ask(cli.config, &question, doc_id, top_k, debug, json)?;
        }
        Commands::Docs {
            query,
            limit,
            offset,
        } => {
            cmd_docs(cli.config, query, limit, offset)?;
        }
        Commands::Chunks { doc_id, limit } => {
            cmd_chunks(cli.config, &doc_id, limit)?;
        }
        Commands::Annotations { action } => {
            cmd_annotations(cli.config, action)?;
        }
        Commands::Stats => {
            cmd_stats(cli.config)?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "contractiq=debug"
    } else {
        "contractiq=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_ingest(config_path: Option<PathBuf>, dir: &Path, source: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = open_corpus(&config)?;
    let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;

    let report = Ingestor::new(corpus, chunker, source).ingest_directory(dir)?;

    println!("✓ Ingested {} files from {}", report.files, dir.display());
    println!("  New documents: {}", report.documents_inserted);
    println!(
        "  New chunks:    {} (of {})",
        report.chunks_inserted, report.chunks_total
    );
    if report.files_failed > 0 {
        println!("  Unreadable:    {}", report.files_failed);
    }
    if report.duplicate_titles > 0 {
        println!("  Same title:    {} (skipped, see log)", report.duplicate_titles);
    }
    if report.conflicting > 0 {
        println!("  Text changed:  {} (kept stored version)", report.conflicting);
    }

    Ok(())
}

fn cmd_index(config_path: Option<PathBuf>, create: bool) -> Result<()> {
    let mut config = load_config(config_path)?;

    if create {
        let ensured = retrieval::provision_index(&config.index)?;
        let description = &ensured.description;
        if ensured.created {
            println!("✓ Created index {}", description.name);
        } else {
            println!("✓ Index {} exists", description.name);
        }
        println!("  Dimension: {}", description.dimension);
        println!("  Host:      {}", description.host);

        if config.index.host.trim().is_empty() {
            println!("  Set index.host to this host in your config");
            config.index.host = description.host.clone();
        }
    }

    let corpus = open_corpus(&config)?;
    let embedder = open_embedder(&config)?;
    let index = retrieval::open_index(&config.index, &corpus, embedder.model_name())?;

    let builder = IndexBuilder::new(embedder, index, corpus, config.embedding.batch_size);
    let report = builder.run()?;

    println!(
        "✓ Indexed {} chunks in {:.1}s",
        report.processed,
        report.duration_ms as f64 / 1000.0
    );
    if report.failed > 0 {
        println!("  Failed to embed: {} chunks (see log)", report.failed);
    }

    Ok(())
}

fn cmd_ask(
    config_path: Option<PathBuf>,
    question: &str,
    doc_id: Option<String>,
    top_k: Option<usize>,
    debug: bool,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = open_corpus(&config)?;
    let embedder = open_embedder(&config)?;
    let index = retrieval::open_index(&config.index, &corpus, embedder.model_name())?;
    let generator = generation::from_config(&config.llm)?;

    let pipeline = AnswerPipeline::new(
        Retriever::new(embedder, index),
        Arc::new(corpus),
        generator,
        config.answer.options(),
    );

    let mut request =
        AnswerRequest::new(question, top_k.unwrap_or(config.answer.top_k)).with_debug(debug);
    if let Some(doc_id) = doc_id {
        request = request.with_doc_id(doc_id);
    }

    let result = pipeline.answer(&request)?;

    if json {
        let output = serde_json::to_string_pretty(&result).map_err(|e| ContractIqError::Json {
            source: e,
            context: "Failed to serialize answer".to_string(),
        })?;
        println!("{}", output);
    } else {
        print_answer(&result);
    }

    Ok(())
}

fn print_answer(result: &AnswerResult) {
    println!("{}", result.answer.trim());

    if !result.citations.is_empty() {
        println!();
        println!("Citations:");
        for citation in &result.citations {
            println!("  [{}] \"{}\"", citation.chunk_id, citation.quote);
        }
    }

    println!();
    println!("Retrieved chunks: {}", result.retrieved_chunk_ids.join(", "));
    if let Some(doc_id) = &result.doc_id_filter {
        println!("Document filter:  {}", doc_id);
    }

    if let Some(debug) = &result.debug {
        println!();
        println!("Matches:");
        for (rank, m) in debug.matches.iter().enumerate() {
            println!("  {:>2}. {} ({:.4})", rank + 1, m.chunk_id, m.score);
        }
        println!();
        println!("Raw output:");
        println!("{}", debug.raw_output);
    }
}

fn cmd_docs(
    config_path: Option<PathBuf>,
    query: Option<String>,
    limit: usize,
    offset: usize,
) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = open_corpus(&config)?;

    let documents = corpus.list_documents(limit, offset, query.as_deref())?;
    if documents.is_empty() {
        println!("No documents found");
        return Ok(());
    }

    for document in documents {
        println!("{}  {}", document.doc_id, document.title);
    }

    Ok(())
}

fn cmd_chunks(config_path: Option<PathBuf>, doc_id: &str, limit: usize) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = open_corpus(&config)?;

    let document = corpus.get_document(doc_id)?.ok_or_else(|| {
        ContractIqError::InvalidArgument(format!("Unknown document: {}", doc_id))
    })?;
    println!("{} ({})", document.title, document.doc_id);

    for chunk in corpus.fetch_chunks_for_doc(doc_id, limit)? {
        println!();
        println!(
            "#{} [{}..{}] {}",
            chunk.chunk_index, chunk.start_char, chunk.end_char, chunk.chunk_id
        );
        println!("{}", chunk.text);
    }

    Ok(())
}

fn cmd_annotations(config_path: Option<PathBuf>, action: AnnotationsAction) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = open_corpus(&config)?;

    match action {
        AnnotationsAction::Import { file } => {
            let report = ingest::import_annotations(&corpus, &file)?;
            println!("✓ Imported annotations from {}", file.display());
            println!("  Inserted:        {}", report.inserted);
            println!("  Already present: {}", report.already_present);
            println!("  Unknown docs:    {}", report.unknown_document);
        }
        AnnotationsAction::List {
            doc_id,
            label,
            limit,
        } => {
            let annotations = corpus.fetch_annotations_for_doc(&doc_id, label.as_deref(), limit)?;
            if annotations.is_empty() {
                println!("No annotations found");
            }
            for annotation in annotations {
                println!("{}", annotation.label);
                if annotation.answer_texts.is_empty() {
                    println!("  (no answer)");
                }
                for (text, start) in annotation
                    .answer_texts
                    .iter()
                    .zip(annotation.answer_starts.iter())
                {
                    println!("  @{}: {}", start, text);
                }
            }
        }
    }

    Ok(())
}

fn cmd_stats(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let corpus = open_corpus(&config)?;
    let stats = corpus.stats()?;

    println!("Corpus: {}", expand_path(&config.storage.sqlite_path())?.display());
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!("  Annotations: {}", stats.annotations);
    println!("  Embeddings:  {}", stats.embeddings);

    Ok(())
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let toml = toml::to_string_pretty(&config)?;
            println!("{}", toml);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            // Create parent directory
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ContractIqError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            let config = Config::default();
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'contractiq config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        return Ok(config);
    }

    Config::load(&path)
}

fn open_corpus(config: &Config) -> Result<SqliteCorpus> {
    let db_path = expand_path(&config.storage.sqlite_path())?;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ContractIqError::Io {
            source: e,
            context: format!("Failed to create data directory: {:?}", parent),
        })?;
    }

    Ok(SqliteCorpus::new(Database::new(&db_path)?))
}

fn open_embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let cache_dir = config
        .embedding
        .cache_dir
        .as_deref()
        .map(expand_path)
        .transpose()?;

    let embedder = LazyEmbedder::fastembed(
        &config.embedding.model,
        cache_dir,
        config.embedding.batch_size,
    )?;
    Ok(Arc::new(embedder))
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| ContractIqError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            ContractIqError::Config("Cannot determine home directory".to_string())
        })?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
