use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_client::OpenAi;
use scraperapi_client::ScraperApiClient;
use tweetscout::extractor::{ExtractorSettings, LlmExtractor};
use tweetscout::geocoder::NominatimGeocoder;
use tweetscout::storage::{CatalogGateway, LocalRepository};
use tweetscout::traits::ArtifactStore;
use tweetscout::{CancelFlag, JobRegistry, JobSpec, Pipeline, PipelineDeps, PipelineSettings};
use tweetscout_common::{Config, JobState, Protocol, SearchQuery};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn directive_level(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "tweetscout", about = "Scrape, augment and persist tweets for one search query")]
struct Cli {
    /// Job id; generated when omitted
    #[arg(long)]
    job_id: Option<u64>,

    /// Correlation id shared by related jobs
    #[arg(long, default_value = "1")]
    tracer_id: String,

    /// Search query
    #[arg(long, default_value = "Wildfire")]
    query: String,

    /// First day of the search window (YYYY-MM-DD)
    #[arg(long, alias = "start_date", default_value = "2024-03-10")]
    start_date: String,

    /// Last day of the search window (YYYY-MM-DD)
    #[arg(long, alias = "end_date", default_value = "2024-03-15")]
    end_date: String,

    /// Parent directory for per-job scratch space
    #[arg(long, alias = "work_dir", default_value = "./.tmp")]
    work_dir: PathBuf,

    /// Topic the relevance filter keeps
    #[arg(long, default_value = "natural disasters")]
    filter_topic: String,

    #[arg(long, value_enum, ignore_case = true, env = "LOG_LEVEL", default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Retry failed extractions once with a relaxed schema
    #[arg(long)]
    enable_fallback_prompt: bool,
}

fn init_tracing(level: LogLevel) -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for target in ["tweetscout", "scraperapi_client", "ai_client"] {
        filter = filter.add_directive(format!("{target}={}", level.directive_level()).parse()?);
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn build_store(config: &Config) -> Result<Arc<dyn ArtifactStore>> {
    if config.storage_protocol != Protocol::Local {
        anyhow::bail!(
            "STORAGE_PROTOCOL={} is not supported; only local storage is available",
            config.storage_protocol
        );
    }
    let local = LocalRepository::new(&config.storage_root);

    let Some(catalog) = config.catalog.clone() else {
        info!(root = %config.storage_root.display(), "No catalog configured, storing locally only");
        return Ok(Arc::new(local));
    };

    let gateway = CatalogGateway::new(local, catalog, config.http_timeout);
    if let Err(e) = gateway.ping().await {
        warn!(error = %e, "Catalog not reachable; registrations will fail until it is");
    }
    Ok(Arc::new(gateway))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_level)?;

    info!("tweetscout starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let query = SearchQuery::parse(&cli.query, &cli.start_date, &cli.end_date)
        .context("Invalid search parameters")?;

    let registry = Arc::new(JobRegistry::new());
    let job = match cli.job_id {
        Some(id) => registry.create_job_with_id(id, &cli.tracer_id)?,
        None => registry.create_job(&cli.tracer_id)?,
    };
    info!(job_id = job.id, name = job.name.as_str(), "Job registered");

    let search = ScraperApiClient::new(&config.scraperapi_key)
        .with_endpoint(&config.search_endpoint)
        .with_timeout(config.http_timeout);
    let agent = OpenAi::new(&config.openai_api_key, &config.openai_model)
        .with_timeout(config.http_timeout);
    let extractor = LlmExtractor::new(
        Arc::new(agent),
        ExtractorSettings {
            fallback_prompt: cli.enable_fallback_prompt,
        },
    );
    let geocoder = NominatimGeocoder::new(&config.geocoder_url, config.http_timeout);

    let deps = PipelineDeps {
        search: Arc::new(search),
        extractor: Arc::new(extractor),
        geocoder: Arc::new(geocoder),
        store: build_store(&config).await?,
    };
    let mut settings = PipelineSettings::new(&cli.work_dir);
    settings.retry = settings.retry.with_max_attempts(config.fetch_max_attempts);
    settings.protocol = config.storage_protocol;

    let pipeline = Pipeline::new(deps, settings).with_registry(registry.clone());

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling job");
                cancel.cancel();
            }
        });
    }

    let spec = JobSpec {
        job_id: job.id,
        tracer_id: cli.tracer_id.clone(),
        query,
        filter_topic: cli.filter_topic.clone(),
    };
    let outcome = pipeline.run(&spec, cancel).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.state == JobState::Failed {
        std::process::exit(1);
    }
    Ok(())
}
