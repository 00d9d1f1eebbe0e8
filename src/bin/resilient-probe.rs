//! Diagnostic CLI: drive the engine against a live endpoint and print
//! breaker and connectivity state.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use resilient_client::config::loader::load_config;
use resilient_client::observability::{logging, metrics};
use resilient_client::{
    EngineConfig, LogNotifier, RequestOptions, ResilientRequestExecutor, Shutdown,
};

#[derive(Parser)]
#[command(name = "resilient-probe")]
#[command(about = "Exercise the resilience engine against a live endpoint", long_about = None)]
struct Cli {
    /// Path to an engine config file (TOML); defaults apply when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue requests and report outcomes plus breaker state.
    Probe {
        /// Target URL.
        url: String,

        /// Number of requests to issue.
        #[arg(short, long, default_value_t = 5)]
        count: u32,
    },
    /// Validate a config file and print the effective settings.
    CheckConfig {
        /// Path to the config file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = EngineConfig::default();
            // No liveness endpoint to ping in ad-hoc probing.
            config.network.ping_enabled = false;
            config
        }
    };

    logging::init_logging(&config.observability);
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    match cli.command {
        Commands::Probe { url, count } => {
            let executor = ResilientRequestExecutor::builder(config)
                .notifier(Arc::new(LogNotifier))
                .build();
            let shutdown = Shutdown::new();
            let tasks = executor.spawn_background(&shutdown);

            for i in 1..=count {
                let outcome = executor.execute(&url, RequestOptions::default()).await;
                match (&outcome.data, &outcome.error) {
                    (Some(_), None) => println!(
                        "[{i}/{count}] ok (attempts={}, source={:?})",
                        outcome.attempts, outcome.source
                    ),
                    (_, Some(error)) => println!(
                        "[{i}/{count}] failed: {error} (attempts={})",
                        outcome.attempts
                    ),
                    _ => println!("[{i}/{count}] no data"),
                }
            }

            let breaker = executor.breaker_state(&url_host(&url));
            println!(
                "breaker: state={} failures={} successes={} attempts={}",
                breaker.state, breaker.failure_count, breaker.success_count, breaker.attempt_count
            );
            let status = executor.network_status();
            println!(
                "network: online={} quality={} rtt_ms={:?}",
                status.is_online,
                status.quality.as_str(),
                status.rtt_ms
            );

            shutdown.trigger();
            for task in tasks {
                let _ = task.await;
            }
        }
        Commands::CheckConfig { path } => {
            let config = load_config(&path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn url_host(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| url.to_string())
}
