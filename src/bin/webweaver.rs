//! webweaver CLI: run a deep research query end to end and write the report to disk.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use webweaver::config::{SearchProviderKind, Settings};
use webweaver::llm::LlmClient;
use webweaver::logging;
use webweaver::orchestrator::Orchestrator;
use webweaver::search::{ApiSearchProvider, LiteSearchProvider, SearchProvider};

#[derive(Parser, Debug)]
#[command(name = "webweaver")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log verbosity, e.g. "info", "debug", "webweaver=debug".
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a research query and write a Markdown report.
    Run {
        /// The research question. Omit when using --query-file.
        query: Option<String>,

        /// Read the query from a file instead of the command line.
        #[arg(long)]
        query_file: Option<PathBuf>,

        /// Where to write the final report. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Directory under which this run's artifacts (events, evidence, outline) are stored.
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,

        /// Use the async-streaming execution shape (per-URL fan-out within a search step).
        #[arg(long)]
        r#async: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run { query, query_file, output, artifacts_dir, r#async } => {
            run_command(query, query_file, output, artifacts_dir, r#async).await
        }
    }
}

async fn run_command(
    query: Option<String>,
    query_file: Option<PathBuf>,
    output: Option<PathBuf>,
    artifacts_dir: Option<PathBuf>,
    concurrent: bool,
) -> anyhow::Result<()> {
    let query = match (query, query_file) {
        (Some(q), _) => q,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to read --query-file {}: {e}", path.display()))?
            .trim()
            .to_string(),
        (None, None) => anyhow::bail!("provide a query argument or --query-file"),
    };
    if query.trim().is_empty() {
        anyhow::bail!("query is empty");
    }

    let mut settings = Settings::from_env()?;
    if let Some(dir) = artifacts_dir {
        settings.artifacts_dir = dir.to_string_lossy().to_string();
    }

    let llm = LlmClient::new(
        &settings.llm_api_key,
        settings.llm_base_url.as_deref(),
        &settings.llm_model,
        settings.llm_timeout(),
    );

    let search: Arc<dyn SearchProvider> = match settings.search_provider {
        SearchProviderKind::Api => Arc::new(
            ApiSearchProvider::new(
                settings.search_api_key.clone().unwrap_or_default(),
                settings.search_max_retries,
                settings.search_backoff_base_s,
                settings.search_backoff_cap_s,
                settings.http_timeout(),
            ),
        ),
        SearchProviderKind::Lite => Arc::new(LiteSearchProvider::new(
            settings.http_timeout(),
            settings.http_user_agent.clone(),
        )),
    };

    let orchestrator = Orchestrator::new(settings, llm, search);
    let run_id = orchestrator.run_id().to_string();
    tracing::info!(run_id, "starting research run");

    let outcome = orchestrator.run(&query, concurrent).await?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, &outcome.report).await?;
            eprintln!("report written to {}", path.display());
        }
        None => {
            println!("{}", outcome.report);
        }
    }
    eprintln!("artifacts: {}", outcome.run_dir.display());

    Ok(())
}
