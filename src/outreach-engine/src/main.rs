//! Outreach Engine: prospecting sequence automation service.
//!
//! Main entry point that loads configuration, wires the sequence engine and
//! starts the HTTP and metrics servers.

use clap::{Parser, ValueEnum};
use outreach_api::ApiServer;
use outreach_core::config::AppConfig;
use outreach_core::event_bus::TracingSink;
use outreach_sequences::SequenceEngine;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Parser, Debug)]
#[command(name = "outreach-engine")]
#[command(about = "Multi-step prospecting sequence automation engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "OUTREACH__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "OUTREACH__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Create the demo sequences at startup
    #[arg(long, default_value_t = false)]
    seed_demo_data: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "outreach_engine=info,outreach_sequences=info,outreach_api=info,tower_http=info".into()
    });
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Outreach Engine starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if cli.seed_demo_data {
        config.sequences.seed_demo_data = true;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        failure_policy = ?config.sequences.failure_policy,
        "Configuration loaded"
    );

    let engine =
        SequenceEngine::new(&config.sequences).with_event_sink(Arc::new(TracingSink));
    if config.sequences.seed_demo_data {
        engine.seed_demo_sequences();
    }

    let api_server = ApiServer::new(config.clone(), engine);

    if config.metrics.enabled {
        if let Err(e) = api_server.start_metrics() {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("Outreach Engine is ready to serve traffic");

    tokio::select! {
        result = api_server.start_http() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server exited with error");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("Outreach Engine shut down");
    Ok(())
}
