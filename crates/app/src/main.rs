use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use pdf_insight_core::llm::{DEFAULT_CHAT_BASE_URL, DEFAULT_CHAT_MODEL};
use pdf_insight_core::{
    discover_pdf_files, ingest_uploads_best_effort, load_uploads, CharacterNgramEmbedder,
    ConversationLog, ConversationalRag, Embedder, EmbeddingConfig, HttpEmbedder, InMemoryVectorIndex,
    IngestError, IngestionOptions, IngestionReport, LlmConfig, LopdfExtractor, OpenAiCompatibleChat,
    PipelineConfig, QdrantStore, SkippedPdf, TurnOutcome, UploadedPdf, VectorIndex,
    VectorStoreConfig, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_TOP_K,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Rag = ConversationalRag<Box<dyn Embedder>, Box<dyn VectorIndex>, OpenAiCompatibleChat>;

#[derive(Parser)]
#[command(name = "pdf-insight", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// API key for the chat completion provider.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of an OpenAI-compatible chat completion API.
    #[arg(long, env = "PDF_INSIGHT_LLM_BASE_URL", default_value = DEFAULT_CHAT_BASE_URL)]
    llm_base_url: String,

    /// Chat model name.
    #[arg(long, env = "PDF_INSIGHT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    model: String,

    /// Sampling temperature.
    #[arg(long, env = "PDF_INSIGHT_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Upper bound on generated tokens per call.
    #[arg(long, env = "PDF_INSIGHT_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Request timeout in seconds for every remote call.
    #[arg(long, env = "PDF_INSIGHT_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Number of chunks retrieved per question.
    #[arg(long, env = "PDF_INSIGHT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Maximum chunk length in characters.
    #[arg(long, env = "PDF_INSIGHT_CHUNK_SIZE", default_value_t = 5_000)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, env = "PDF_INSIGHT_CHUNK_OVERLAP", default_value_t = 500)]
    chunk_overlap: usize,

    #[arg(long, value_enum, env = "PDF_INSIGHT_VECTOR_STORE", default_value_t = StoreKind::Memory)]
    vector_store: StoreKind,

    /// Qdrant base URL
    #[arg(long, env = "PDF_INSIGHT_QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "PDF_INSIGHT_QDRANT_COLLECTION", default_value = "pdf_insight_chunks")]
    qdrant_collection: String,

    #[arg(long, value_enum, env = "PDF_INSIGHT_EMBEDDER", default_value_t = EmbedderKind::Ngram)]
    embedder: EmbedderKind,

    /// Base URL of an OpenAI-compatible embeddings API.
    #[arg(long, env = "PDF_INSIGHT_EMBEDDING_URL", default_value = "http://localhost:8080/v1")]
    embedding_url: String,

    #[arg(
        long,
        env = "PDF_INSIGHT_EMBEDDING_MODEL",
        default_value = "sentence-transformers/all-MiniLM-L6-v2"
    )]
    embedding_model: String,

    #[arg(long, env = "PDF_INSIGHT_EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    #[arg(long, env = "PDF_INSIGHT_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Qdrant,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmbedderKind {
    /// Offline character trigram hashing.
    Ngram,
    /// Remote `/embeddings` endpoint.
    Http,
}

#[derive(Args)]
struct Sources {
    /// PDF file to upload; repeat for several files.
    #[arg(long = "pdf")]
    pdfs: Vec<PathBuf>,

    /// Folder searched recursively for PDFs.
    #[arg(long)]
    folder: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract and chunk PDFs, then print what would be indexed.
    Inspect {
        #[command(flatten)]
        sources: Sources,
    },
    /// Index PDFs into the configured vector store without asking anything.
    Ingest {
        #[command(flatten)]
        sources: Sources,
    },
    /// Ask a single question. Without PDFs, an existing Qdrant collection is used.
    Ask {
        #[command(flatten)]
        sources: Sources,
        #[arg(long)]
        question: String,
        #[arg(long, default_value = "default")]
        session: String,
    },
    /// Chat about the uploaded PDFs. `/reset`, `/history` and `/quit` are commands.
    Chat {
        #[command(flatten)]
        sources: Sources,
        #[arg(long, default_value = "default")]
        session: String,
    },
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let timeout = Duration::from_secs(self.timeout_secs);
        let embedding = match self.embedder {
            EmbedderKind::Ngram => EmbeddingConfig::CharacterNgram {
                dimensions: self.embedding_dimensions,
            },
            EmbedderKind::Http => EmbeddingConfig::Http {
                base_url: self.embedding_url.clone(),
                model: self.embedding_model.clone(),
                api_key: self.embedding_api_key.clone(),
                dimensions: self.embedding_dimensions,
                timeout,
            },
        };
        let vector_store = match self.vector_store {
            StoreKind::Memory => VectorStoreConfig::InMemory,
            StoreKind::Qdrant => VectorStoreConfig::Qdrant {
                url: self.qdrant_url.clone(),
                collection: self.qdrant_collection.clone(),
                timeout,
            },
        };

        PipelineConfig {
            ingestion: IngestionOptions {
                chunk_max_chars: self.chunk_size,
                chunk_overlap_chars: self.chunk_overlap,
            },
            top_k: self.top_k,
            llm: LlmConfig {
                base_url: self.llm_base_url.clone(),
                api_key: self.api_key.clone(),
                model: self.model.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                timeout,
            },
            embedding,
            vector_store,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-insight boot"
    );

    match cli.command {
        Command::Inspect { sources } => inspect(&config, &sources)?,
        Command::Ingest { sources } => {
            config.validate_backends()?;
            let rag = build_pipeline(&config).await?;
            let (uploads, unreadable) = collect_uploads(&sources);
            anyhow::ensure!(!uploads.is_empty(), "no PDFs to ingest");
            let mut report = rag.ingest(&uploads).await?;
            report.skipped_files.extend(unreadable);
            print_ingestion(&report);
            if matches!(config.vector_store, VectorStoreConfig::InMemory) {
                warn!("the in-memory index is dropped on exit; use --vector-store qdrant to keep it");
            }
        }
        Command::Ask {
            sources,
            question,
            session,
        } => {
            config.validate()?;
            let rag = build_pipeline(&config).await?;
            upload(&rag, &sources).await?;
            let outcome = rag.submit_turn(&session, &question).await?;
            print_outcome(&outcome);
        }
        Command::Chat { sources, session } => {
            config.validate()?;
            let rag = build_pipeline(&config).await?;
            upload(&rag, &sources).await?;
            chat_loop(&rag, &session).await?;
        }
    }

    Ok(())
}

fn collect_uploads(sources: &Sources) -> (Vec<UploadedPdf>, Vec<SkippedPdf>) {
    let mut paths = sources.pdfs.clone();
    if let Some(folder) = &sources.folder {
        paths.extend(discover_pdf_files(folder));
    }
    let (uploads, skipped) = load_uploads(&paths);
    for file in &skipped {
        warn!(source = %file.source, reason = %file.reason, "unreadable pdf");
    }
    (uploads, skipped)
}

fn inspect(config: &PipelineConfig, sources: &Sources) -> anyhow::Result<()> {
    let (uploads, unreadable) = collect_uploads(sources);
    let mut report = ingest_uploads_best_effort(&uploads, &LopdfExtractor, &config.ingestion)?;
    report.skipped_files.extend(unreadable);

    println!(
        "settings: chunk_size={} chunk_overlap={} top_k={} model={} embedding_dimensions={}",
        config.ingestion.chunk_max_chars,
        config.ingestion.chunk_overlap_chars,
        config.top_k,
        config.llm.model,
        config.embedding.dimensions()
    );
    for document in &report.documents {
        let chunks = report
            .chunks
            .iter()
            .filter(|chunk| chunk.document_id == document.document_id)
            .count();
        println!(
            "{} pages={} chunks={} sha256={}",
            document.source, document.page_count, chunks, document.checksum
        );
    }
    print_skipped(&report.skipped_files);
    println!(
        "{} chunks from {} documents",
        report.chunks.len(),
        report.documents.len()
    );
    Ok(())
}

/// Callers validate `config` first; ingestion skips the credential check.
async fn build_pipeline(config: &PipelineConfig) -> anyhow::Result<Rag> {
    let embedder: Box<dyn Embedder> = match &config.embedding {
        EmbeddingConfig::CharacterNgram { dimensions } => {
            Box::new(CharacterNgramEmbedder::new(*dimensions))
        }
        EmbeddingConfig::Http {
            base_url,
            model,
            api_key,
            dimensions,
            timeout,
        } => Box::new(HttpEmbedder::new(
            base_url,
            model.clone(),
            api_key.clone(),
            *dimensions,
            *timeout,
        )?),
    };

    let index: Box<dyn VectorIndex> = match &config.vector_store {
        VectorStoreConfig::InMemory => Box::new(InMemoryVectorIndex::new(embedder.dimensions())),
        VectorStoreConfig::Qdrant {
            url,
            collection,
            timeout,
        } => {
            let store =
                QdrantStore::new(url, collection.clone(), embedder.dimensions(), *timeout)?;
            store
                .ensure_collection()
                .await
                .with_context(|| format!("qdrant collection {collection} at {url}"))?;
            Box::new(store)
        }
    };

    let chat = OpenAiCompatibleChat::new(
        &config.llm.base_url,
        config.llm.api_key.clone().unwrap_or_default(),
        config.llm.model.clone(),
        config.llm.temperature,
        config.llm.max_tokens,
        config.llm.timeout,
    )?;

    Ok(ConversationalRag::new(embedder, index, chat)
        .with_ingestion_options(config.ingestion.clone())
        .with_top_k(config.top_k))
}

async fn upload(rag: &Rag, sources: &Sources) -> anyhow::Result<()> {
    let (uploads, unreadable) = collect_uploads(sources);
    if uploads.is_empty() {
        print_skipped(&unreadable);
        let stats = rag.attach_index().await?;
        if stats.is_empty() {
            warn!("no PDFs uploaded; questions will fail until documents are indexed");
        } else {
            println!("using {} chunks already in the index", stats.chunks);
        }
        return Ok(());
    }

    match rag.ingest(&uploads).await {
        Ok(mut report) => {
            report.skipped_files.extend(unreadable);
            print_ingestion(&report);
            Ok(())
        }
        Err(IngestError::NoDocuments) => {
            print_skipped(&unreadable);
            warn!("none of the uploaded PDFs contained readable text");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

async fn chat_loop(rag: &Rag, session: &str) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("session {session}: ask a question, or /reset, /history, /quit");
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                rag.reset_session(session).await;
                println!("conversation cleared");
            }
            "/history" => print_history(&rag.history(session).await),
            question => match rag.submit_turn(session, question).await {
                Ok(outcome) => print_outcome(&outcome),
                Err(error) => {
                    warn!(stage = ?error.stage(), "turn failed");
                    println!("error: {error}");
                }
            },
        }
    }

    Ok(())
}

fn print_ingestion(report: &IngestionReport) {
    println!(
        "{} chunks indexed from {} documents at {}",
        report.chunks.len(),
        report.documents.len(),
        Utc::now().to_rfc3339()
    );
    print_skipped(&report.skipped_files);
}

fn print_skipped(skipped: &[SkippedPdf]) {
    for file in skipped {
        println!("skipped {}: {}", file.source, file.reason);
    }
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("{}", outcome.answer.trim());
    for source in &outcome.sources {
        println!(
            "  [{}] {} page {} score={:.4}",
            source.rank, source.chunk.source, source.chunk.page, source.score
        );
    }
}

fn print_history(log: &ConversationLog) {
    if log.is_empty() {
        println!("(no turns yet)");
        return;
    }
    for turn in log.turns() {
        println!("{}: {}", turn.role.as_str(), turn.content);
    }
}
