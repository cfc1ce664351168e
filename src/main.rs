use anyhow::{Context, Result};
use citeflow_core::config::{Config, Mode, PipelineOptions};
use citeflow_core::embedding::gemini::GeminiEmbedder;
use citeflow_core::llm::gemini::GeminiClient;
use citeflow_core::orchestrator::{CancellationToken, PipelineDeps, PipelineOrchestrator};
use citeflow_core::pdf::loader::PdfLoader;
use citeflow_core::pdf::HttpPdfFetcher;
use citeflow_core::planner::executor::PlanExecutor;
use citeflow_core::registry::PaperRegistry;
use citeflow_core::repository::sqlite::SqliteRepository;
use citeflow_core::sources::arxiv::ArxivClient;
use citeflow_core::sources::openalex::OpenAlexClient;
use citeflow_core::sources::rate_limit::{LeakyBucket, TrailingDelayLimiter};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "citeflow")]
#[command(about = "Citation-first research aggregation pipeline")]
#[command(
    long_about = "Turns a natural-language research topic into a citation-grounded synthesis report.\n\nEvery substantive claim in the output is traceable to a verbatim snippet in a source document. A QUICK run returns an abstract-only paper list; a FULL run screens, extracts evidence, clusters themes, drafts claims, mines gaps, writes a grounded Markdown report, and audits every citation before publishing."
)]
#[command(after_help = "Examples:
  citeflow research \"transformer architectures\" --mode full
  citeflow research \"what is attention\" --mode quick
  citeflow status")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        about = "Run the pipeline on a research topic",
        long_about = "Drives a session from planning through audited publication (FULL mode) or an abstract-only listing (QUICK mode).\n\nMode is inferred from the topic's wording unless overridden with --mode: words like \"quick\" or \"just find\" select QUICK; \"comprehensive\", \"survey\", or \"deep dive\" select FULL; the default is FULL.",
        after_help = "Examples:
  citeflow research \"transformer architectures\" --max-papers 20 --max-pdf 5
  citeflow research \"what is attention\" --mode quick"
    )]
    Research {
        /// Research topic in natural language
        topic: String,

        /// Force QUICK or FULL instead of inferring from the topic
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// Ceiling on papers kept after dedup
        #[arg(long, default_value_t = 200)]
        max_papers: usize,

        /// PDF-download gate threshold
        #[arg(long, default_value_t = 40)]
        max_pdf: usize,

        /// Auto-approve every approval gate instead of waiting for a decision
        #[arg(long)]
        auto_approve: bool,

        /// Output report language (internal search queries stay English)
        #[arg(long, default_value = "en")]
        language: String,
    },

    #[command(
        about = "Resume a paused or interrupted session",
        after_help = "Example:
  citeflow resume sess_3fae2b9c-...")]
    Resume {
        /// Session id to resume from its latest checkpoint
        session_id: String,
    },

    #[command(
        about = "Show pipeline configuration and storage location",
        after_help = "Example:
  citeflow status"
    )]
    Status,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Quick,
    Full,
}

impl From<ModeArg> for Mode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Quick => Mode::Quick,
            ModeArg::Full => Mode::Full,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = Config::load_or_default().context("loading configuration")?;
    let _log_guard = citeflow_core::logging::init(config.data_dir());

    let cli = Cli::parse();
    match cli.command {
        Commands::Status => {
            println!("Database:  {}", config.database_path().display());
            println!("PDF cache: {}", config.pdf_cache_dir().display());
            println!("Defaults:  {:?}", config.options);
        }
        Commands::Research {
            topic,
            mode,
            max_papers,
            max_pdf,
            auto_approve,
            language,
        } => {
            let orchestrator = build_orchestrator(&config)?;
            let options = PipelineOptions {
                mode: mode.map(Mode::from),
                max_papers_total: max_papers,
                max_pdf_download: max_pdf,
                output_language: language,
                gate_auto_approve: auto_approve,
                ..PipelineOptions::default()
            };
            let session_id = orchestrator
                .run(topic, options, CancellationToken::new())
                .await
                .context("running pipeline")?;
            println!("session: {session_id}");
        }
        Commands::Resume { session_id } => {
            let orchestrator = build_orchestrator(&config)?;
            orchestrator
                .resume(session_id.into(), CancellationToken::new())
                .await
                .context("resuming session")?;
        }
    }

    Ok(())
}

fn build_orchestrator(config: &Config) -> Result<PipelineOrchestrator> {
    let api_key = std::env::var("GOOGLE_API_KEY").context("GOOGLE_API_KEY must be set")?;
    let contact_email = std::env::var("CITEFLOW_CONTACT_EMAIL").ok();

    let llm = Arc::new(GeminiClient::new(api_key.clone(), "gemini-2.0-flash"));
    let embedder = Arc::new(GeminiEmbedder::new(api_key, "text-embedding-004"));
    let cache = Arc::new(citeflow_core::cache::memory::MemoryCache::new());
    let repository = Arc::new(
        SqliteRepository::open(&config.database_path()).context("opening repository")?,
    );
    let pdf_fetcher = Arc::new(HttpPdfFetcher::new());

    let arxiv_limiter = Arc::new(TrailingDelayLimiter::new(Duration::from_millis(3500)));
    let openalex_bucket = Arc::new(LeakyBucket::new(10, 10.0));
    let sources: Vec<Arc<dyn citeflow_core::sources::SearchSource>> = vec![
        Arc::new(ArxivClient::new(arxiv_limiter)),
        Arc::new(OpenAlexClient::new(openalex_bucket, contact_email)),
    ];
    let plan_executor = Arc::new(PlanExecutor::new(sources, llm.clone()));

    let pdf_extractor: Arc<dyn citeflow_core::pdf::loader::PdfTextExtractor> =
        Arc::new(citeflow_core::pdf::loader::PlainTextPdfExtractor);
    let pdf_loader = Arc::new(PdfLoader::new(
        pdf_fetcher.clone(),
        pdf_extractor,
        cache.clone(),
    ));

    let deps = PipelineDeps {
        repository,
        cache,
        llm,
        embedder,
        pdf_loader,
        pdf_fetcher,
        plan_executor,
    };

    Ok(PipelineOrchestrator::new(
        PaperRegistry::new(),
        deps,
        &config.options,
    ))
}
