use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use pdf_rag_core::config::{
    AzureSettings, GeminiSettings, OpenAiSettings, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
    DEFAULT_TABLE, DEFAULT_TOP_K,
};
use pdf_rag_core::{
    discover_pdf_files, list_sources, reset_store, AskRequest, DropOutcome, InMemorySessionStore,
    IngestionReport, LanceVectorStore, ProviderClient, RagCoordinator, RetrievedChunk,
    ScopeRequest, SessionStore, Settings, DEFAULT_SESSION_ID,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Coordinator = RagCoordinator<
    LanceVectorStore,
    Arc<ProviderClient>,
    Arc<ProviderClient>,
    InMemorySessionStore,
>;

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Args)]
struct SettingsArgs {
    /// Model provider: openai, azure or gemini.
    #[arg(long, env = "PROVIDER", default_value = "gemini", global = true)]
    provider: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com", global = true)]
    openai_base_url: String,

    #[arg(long, env = "OPENAI_CHAT_MODEL", default_value = "gpt-4o-mini", global = true)]
    openai_chat_model: String,

    #[arg(long, env = "OPENAI_EMBED_MODEL", default_value = "text-embedding-3-large", global = true)]
    openai_embed_model: String,

    #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true, global = true)]
    azure_api_key: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_ENDPOINT", global = true)]
    azure_endpoint: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_CHAT_DEPLOYMENT", global = true)]
    azure_chat_deployment: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_EMBED_DEPLOYMENT", global = true)]
    azure_embed_deployment: Option<String>,

    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = "2024-06-01", global = true)]
    azure_api_version: String,

    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    google_api_key: Option<String>,

    #[arg(long, env = "GEMINI_CHAT_MODEL", default_value = "gemini-2.5-pro", global = true)]
    gemini_chat_model: String,

    #[arg(long, env = "GEMINI_EMBED_MODEL", default_value = "text-embedding-004", global = true)]
    gemini_embed_model: String,

    #[arg(long, env = "TEMPERATURE", default_value_t = 0.1, global = true)]
    temperature: f32,

    /// Default number of chunks retrieved per question.
    #[arg(long, env = "TOP_K", default_value_t = DEFAULT_TOP_K, global = true)]
    top_k: usize,

    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE, global = true)]
    chunk_size: usize,

    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP, global = true)]
    chunk_overlap: usize,

    #[arg(long, env = "UPLOAD_DIR", default_value = "./data/uploads", global = true)]
    upload_dir: PathBuf,

    /// Directory holding the vector table.
    #[arg(long, env = "LANCE_DIR", default_value = "./.data/lancedb", global = true)]
    store_dir: PathBuf,

    #[arg(long, env = "LANCE_TABLE", default_value = DEFAULT_TABLE, global = true)]
    table: String,
}

impl SettingsArgs {
    fn into_settings(self) -> Settings {
        let mut openai = OpenAiSettings::default();
        openai.api_key = self.openai_api_key;
        openai.base_url = self.openai_base_url;
        openai.chat_model = self.openai_chat_model;
        openai.embed_model = self.openai_embed_model;

        let mut gemini = GeminiSettings::default();
        gemini.api_key = self.google_api_key;
        gemini.chat_model = self.gemini_chat_model;
        gemini.embed_model = self.gemini_embed_model;

        Settings {
            provider: self.provider,
            openai,
            azure: AzureSettings {
                api_key: self.azure_api_key,
                endpoint: self.azure_endpoint,
                chat_deployment: self.azure_chat_deployment,
                embed_deployment: self.azure_embed_deployment,
                api_version: self.azure_api_version,
            },
            gemini,
            temperature: self.temperature,
            top_k: self.top_k,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            upload_dir: self.upload_dir,
            store_dir: self.store_dir,
            table: self.table,
        }
    }
}

#[derive(Args)]
struct ScopeArgs {
    /// Restrict retrieval to these source filenames.
    #[arg(long = "doc")]
    docs: Vec<String>,

    /// Raw filter expression, e.g. "metadata['page'] > 3 AND metadata['section'] = 'Scope'".
    #[arg(long = "where", conflicts_with_all = ["docs", "scope_json"])]
    where_clause: Option<String>,

    /// Scope as JSON: a string, a list of filenames or {"source": ...}.
    #[arg(long, conflicts_with = "docs")]
    scope_json: Option<String>,

    /// Corpus returned by a previous upload.
    #[arg(long)]
    corpus: Option<String>,

    #[arg(long)]
    k: Option<usize>,
}

impl ScopeArgs {
    fn scope(&self) -> anyhow::Result<ScopeRequest> {
        if let Some(raw) = &self.where_clause {
            return Ok(ScopeRequest::raw(raw.clone()));
        }
        if let Some(json) = &self.scope_json {
            let value: serde_json::Value =
                serde_json::from_str(json).context("--scope-json is not valid JSON")?;
            return Ok(ScopeRequest::from_json(&value)?);
        }
        if self.docs.is_empty() {
            Ok(ScopeRequest::All)
        } else {
            Ok(ScopeRequest::sources(self.docs.iter().cloned()))
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Store PDFs in the upload directory and index them as a new corpus.
    Upload {
        /// PDF file to upload; repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Answer one question from the indexed PDFs.
    Ask {
        #[arg(long)]
        question: String,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session: String,
    },
    /// Interactive conversation over stdin. Type /reset to clear history.
    Chat {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session: String,
    },
    /// Print the chunks a question would retrieve.
    Retrieve {
        #[arg(long)]
        query: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Summarise the indexed content.
    Summarize {
        #[arg(long, default_value = "Summarize the document")]
        query: String,
        #[arg(long)]
        corpus: Option<String>,
    },
    /// List indexed source filenames.
    Sources {
        #[arg(long)]
        corpus: Option<String>,
    },
    /// Drop the vector table.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = cli.settings.into_settings();
    settings.validate()?;
    settings
        .ensure_dirs()
        .context("failed to create storage directories")?;

    let store = LanceVectorStore::open(&settings.store_dir, settings.table.clone()).await?;
    info!(
        version = app_version,
        provider = %settings.provider,
        table = %store.table_name(),
        rows = store.row_count().await?,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match cli.command {
        Command::Upload { files, folder } => {
            let mut paths = files;
            if let Some(folder) = folder {
                paths.extend(discover_pdf_files(&folder));
            }
            if paths.is_empty() {
                bail!("nothing to upload: pass --file or --folder");
            }

            let mut payloads = Vec::with_capacity(paths.len());
            for path in &paths {
                let name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .with_context(|| format!("{} has no file name", path.display()))?
                    .to_string();
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                payloads.push((name, bytes));
            }

            let report = coordinator(store, &settings)?
                .ingest_uploads(payloads)
                .await?;
            print_report(&report);
        }
        Command::Ask {
            question,
            scope,
            session,
        } => {
            let request = AskRequest {
                question,
                scope: scope.scope()?,
                session_id: Some(session),
                corpus_id: scope.corpus.clone(),
                k: scope.k,
            };
            let answer = coordinator(store, &settings)?.ask(&request).await?;
            println!("{}", answer.text);
            print_sources(&answer.sources);
        }
        Command::Chat { scope, session } => {
            run_chat(&coordinator(store, &settings)?, &scope, &session).await?;
        }
        Command::Retrieve { query, scope } => {
            let hits = coordinator(store, &settings)?
                .retrieve(&query, &scope.scope()?, scope.k, scope.corpus.as_deref())
                .await?;
            if hits.is_empty() {
                println!("no matching chunks");
            }
            for hit in hits {
                println!(
                    "[{} | p.{} | {}] score={:.4}",
                    hit.metadata.source, hit.metadata.page, hit.metadata.section, hit.score
                );
                println!("{}\n", hit.content);
            }
        }
        Command::Summarize { query, corpus } => {
            let summary = coordinator(store, &settings)?
                .summarize(&query, corpus.as_deref())
                .await?;
            println!("{}", summary.text);
            print_sources(&summary.sources);
        }
        // sources and reset only touch the table, so they run without credentials
        Command::Sources { corpus } => {
            for source in list_sources(&store, corpus.as_deref()).await? {
                println!("{source}");
            }
        }
        Command::Reset => match reset_store(&store).await? {
            DropOutcome::Dropped => println!("table {} dropped", store.table_name()),
            DropOutcome::AlreadyAbsent => println!("table {} did not exist", store.table_name()),
        },
    }

    Ok(())
}

/// Builds the model client and the coordinator around it. Fails fast when
/// the selected provider lacks credentials.
fn coordinator(store: LanceVectorStore, settings: &Settings) -> anyhow::Result<Coordinator> {
    let provider = Arc::new(ProviderClient::from_settings(settings)?);
    info!(provider = %provider.kind(), "model provider ready");

    Ok(RagCoordinator::new(
        store,
        provider.clone(),
        provider,
        InMemorySessionStore::new(),
        settings,
    )?)
}

async fn run_chat(coordinator: &Coordinator, scope: &ScopeArgs, session: &str) -> anyhow::Result<()> {
    let scope_request = scope.scope()?;
    if !scope_request.is_all() {
        info!(scope = ?scope_request, "chat scope");
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/reset" {
            coordinator.sessions().clear(session).await;
            println!("history cleared");
            continue;
        }

        let request = AskRequest {
            question: line.to_string(),
            scope: scope_request.clone(),
            session_id: Some(session.to_string()),
            corpus_id: scope.corpus.clone(),
            k: scope.k,
        };
        match coordinator.ask(&request).await {
            Ok(answer) => {
                println!("{}", answer.text);
                print_sources(&answer.sources);
            }
            Err(error) => warn!(%error, "question failed"),
        }
    }

    Ok(())
}

fn print_report(report: &IngestionReport) {
    for skipped in &report.skipped {
        warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
    }
    if let Some(warning) = &report.warning {
        println!("warning: {warning}");
    }
    println!("indexed={} at {}", report.indexed, report.completed_at.to_rfc3339());
    if let Some(corpus_id) = &report.corpus_id {
        println!("corpus_id={corpus_id}");
    }
    for source in &report.sources {
        println!("  {source}");
    }
}

fn print_sources(sources: &[RetrievedChunk]) {
    if sources.is_empty() {
        return;
    }
    println!("\nsources:");
    for hit in sources {
        println!("  {} p.{}", hit.metadata.source, hit.metadata.page);
    }
}
