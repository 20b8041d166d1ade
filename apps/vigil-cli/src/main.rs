//! # Vigil CLI
//!
//! Operator tool for the admission-control gateway: policy dry runs and
//! request signing.

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use vigil_core::domain::{Strategy, Tier};

mod config;
mod signing;
mod simulate;
mod telemetry;

use config::AppConfig;
use signing::RequestArgs;
use simulate::SimulationOptions;
use telemetry::TelemetryConfig;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Admission control dry runs and request signing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a synthetic request trace through the gateway
    Simulate {
        /// Subscription tier whose policy is exercised
        #[arg(long, default_value = "free")]
        tier: Tier,

        /// Override the configured strategy
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Override requests per window
        #[arg(long)]
        limit: Option<u32>,

        /// Override the window length
        #[arg(long)]
        window_secs: Option<u64>,

        /// Override the token bucket burst size
        #[arg(long)]
        burst: Option<u32>,

        /// Number of requests in the trace
        #[arg(long, default_value_t = 100)]
        requests: u32,

        /// Distinct callers the trace rotates through
        #[arg(long, default_value_t = 1)]
        identifiers: u32,

        /// Requests evaluated concurrently per step
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Time between steps
        #[arg(long, default_value_t = 100)]
        interval_ms: u64,

        /// HTTP method; state-changing methods also exercise CSRF tokens
        #[arg(long, default_value = "GET")]
        method: String,

        /// Use the wall clock and the configured Redis store
        #[arg(long)]
        live: bool,
    },
    /// Sign a request and print the headers to attach
    Sign {
        #[command(flatten)]
        request: RequestArgs,

        /// Unix timestamp to sign; defaults to now
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Verify a request signature
    Verify {
        #[command(flatten)]
        request: RequestArgs,

        /// Hex signature from X-Signature
        #[arg(long)]
        signature: String,

        /// Unix timestamp from X-Timestamp
        #[arg(long)]
        timestamp: i64,

        /// Accepted age in seconds; defaults to REQUEST_MAX_AGE_SECS
        #[arg(long)]
        max_age_secs: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env().context("invalid configuration")?;

    let output = match cli.command {
        Commands::Simulate {
            tier,
            strategy,
            limit,
            window_secs,
            burst,
            requests,
            identifiers,
            concurrency,
            interval_ms,
            method,
            live,
        } => {
            let options = SimulationOptions {
                tier,
                strategy,
                limit,
                window_secs,
                burst,
                requests,
                identifiers,
                concurrency,
                interval: Duration::from_millis(interval_ms),
                method,
                live,
            };
            let report = simulate::run(&config, &options).await?;
            serde_json::to_value(report)?
        }
        Commands::Sign { request, timestamp } => signing::sign(&request, timestamp)?,
        Commands::Verify {
            request,
            signature,
            timestamp,
            max_age_secs,
        } => signing::verify(
            &request,
            &signature,
            timestamp,
            max_age_secs.unwrap_or(config.max_request_age_secs),
        )?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
