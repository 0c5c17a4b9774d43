// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use bloodbank_search::{
    Config, EntityType, RecordEvent, SearchRequest, SearchContext, Validator, VectorIndex,
    api, mcp::BloodBankMcp,
    pipeline::{ProgressTracker, ingest_bulk},
    utils::{RetryPolicy, logging},
};
use clap::{ArgAction, Parser, Subcommand};
use rmcp::{ServiceExt, transport::stdio};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "bloodbank_search")]
#[command(author = "cipher")]
#[command(version)]
#[command(about = "Natural-language search over blood bank donors, hospitals and requests", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "BLOODBANK_SEARCH_HOST")]
        host: Option<String>,

        #[arg(long, env = "BLOODBANK_SEARCH_PORT")]
        port: Option<u16>,
    },

    /// Run one query and print the ranked results
    Search {
        query: String,

        #[arg(short, long)]
        k: Option<usize>,

        /// Print the response body as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load record events from a JSON array or JSON-lines file
    Ingest {
        #[arg(short, long, value_name = "FILE")]
        file: PathBuf,

        /// Remove every indexed record before loading
        #[arg(long)]
        reset: bool,
    },

    /// Remove one record from the index
    Delete {
        #[arg(long)]
        entity_type: EntityType,

        #[arg(long)]
        source_id: String,
    },

    Stats,

    Health,

    Reset {
        #[arg(long)]
        confirm: bool,
    },

    /// Start MCP (Model Context Protocol) server for agentic tool integration
    Mcp {
        #[arg(long, default_value = "stdio")]
        transport: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logger(cli.color, cli.verbose);
    colored::control::set_override(cli.color);

    let config = if cli.config.exists() {
        info!("Loading configuration from: {}", cli.config.display());
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using defaults and environment",
            cli.config.display()
        );
        Config::load(None).context("Failed to load configuration")?
    };

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(config, host, port).await,
        Commands::Search { query, k, json } => cmd_search(config, query, k, json).await,
        Commands::Ingest { file, reset } => cmd_ingest(config, file, reset, cli.color).await,
        Commands::Delete {
            entity_type,
            source_id,
        } => cmd_delete(config, entity_type, source_id).await,
        Commands::Stats => cmd_stats(config).await,
        Commands::Health => cmd_health(config).await,
        Commands::Reset { confirm } => cmd_reset(config, confirm).await,
        Commands::Mcp { transport } => cmd_mcp(config, &transport).await,
    }
}

async fn open(config: &Config) -> Result<SearchContext> {
    SearchContext::init(config)
        .await
        .context("Failed to initialise search service")
}

async fn cmd_serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let service = Arc::new(open(&config).await?);
    service.start_refresher();

    let served = api::serve(service.clone()).await;
    let stats = service.shutdown().await;
    info!(
        "Drained ingest queue: {} upserted, {} deleted, {} skipped, {} failed",
        stats.upserted, stats.deleted, stats.skipped, stats.failed
    );

    served.context("HTTP server failed")
}

async fn cmd_search(config: Config, query: String, k: Option<usize>, json: bool) -> Result<()> {
    let service = open(&config).await?;
    let request = SearchRequest { query, k };

    let response = service.search(&request).await.map_err(|e| {
        error!("Search failed: {}", e);
        anyhow::anyhow!(e.public_message())
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.results.is_empty() {
        println!("\n{}\n", logging::format_warning(&response.ai_summary));
        return Ok(());
    }

    println!("\nResults for: \"{}\"\n", request.query);
    for (rank, hit) in response.results.iter().enumerate() {
        println!("{}", logging::format_hit(rank + 1, hit));
    }
    println!("\n{}\n", logging::format_info(&response.ai_summary));

    Ok(())
}

async fn cmd_ingest(config: Config, file: PathBuf, reset: bool, color: bool) -> Result<()> {
    Validator::validate_file_path(&file)?;
    let input = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let events = RecordEvent::parse_batch(&input).context("Failed to parse record events")?;

    info!("Loaded {} events from {}", events.len(), file.display());
    let start = Instant::now();

    let retry = RetryPolicy::from_config(&config.ingest);
    let workers = config.ingest.parallel_workers;
    let service = open(&config).await?;

    if reset {
        warn!("Resetting index before ingest");
        service.index().reset().await.context("Failed to reset index")?;
    }

    let progress = ProgressTracker::with_color(events.len(), color);
    let stats = ingest_bulk(service.index(), events, &retry, workers, &progress).await;
    progress.finish();

    let summary = format!(
        "Ingest complete in {:.2}s: {} upserted, {} deleted, {} skipped, {} failed ({:.1}% applied)",
        start.elapsed().as_secs_f64(),
        stats.upserted,
        stats.deleted,
        stats.skipped,
        stats.failed,
        stats.success_rate()
    );
    if stats.failed > 0 {
        println!("{}", logging::format_warning(&summary));
    } else {
        println!("{}", logging::format_success(&summary));
    }

    service.shutdown().await;
    Ok(())
}

async fn cmd_delete(config: Config, entity_type: EntityType, source_id: String) -> Result<()> {
    let event = RecordEvent::delete(entity_type, source_id);
    Validator::validate_event(&event)?;
    let key = event.key();

    let service = open(&config).await?;
    let removed = service.index().delete(&key).await?;
    if removed {
        println!("{}", logging::format_success(&format!("Removed {}", key)));
    } else {
        println!("{}", logging::format_info(&format!("{} was not indexed", key)));
    }

    service.shutdown().await;
    Ok(())
}

async fn cmd_stats(config: Config) -> Result<()> {
    let service = open(&config).await?;
    let stats = service.stats()?;

    println!("\nIndex statistics (dimension {})\n", stats.dimension);
    for (entity_type, ns) in &stats.namespaces {
        println!(
            "  {:<10} {:>8} live {:>6} tombstones",
            entity_type.as_str(),
            ns.live,
            ns.tombstones
        );
    }
    println!("  {:<10} {:>8} live\n", "total", stats.total_live);

    service.shutdown().await;
    Ok(())
}

async fn cmd_health(config: Config) -> Result<()> {
    let service = open(&config).await?;
    let report = service.health().await;
    println!("{}", report.format());
    service.shutdown().await;

    if !report.is_healthy() {
        return Err(anyhow::anyhow!("Service is unhealthy"));
    }
    Ok(())
}

async fn cmd_reset(config: Config, confirm: bool) -> Result<()> {
    if !confirm {
        println!(
            "{}",
            logging::format_error("This will delete every indexed record. Use --confirm to proceed")
        );
        return Ok(());
    }

    warn!("Resetting index - all records will be removed");
    let service = open(&config).await?;
    service.index().reset().await.context("Failed to reset index")?;
    println!("{}", logging::format_success("Index reset complete"));

    service.shutdown().await;
    Ok(())
}

async fn cmd_mcp(config: Config, transport: &str) -> Result<()> {
    info!("Starting MCP server (transport: {})", transport);

    if transport != "stdio" {
        error!("Only stdio transport is currently supported");
        return Err(anyhow::anyhow!("Unsupported transport: {}", transport));
    }

    let service = Arc::new(open(&config).await?);
    service.start_refresher();

    let running = BloodBankMcp::new(service.clone())
        .serve(stdio())
        .await
        .context("Failed to start MCP server")?;
    info!("MCP server ready");
    running.waiting().await?;

    service.shutdown().await;
    Ok(())
}
