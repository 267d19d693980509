//! CLI commands and handlers

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{info, warn};

use super::services::AppServices;
use crate::shared::config::AppConfig;
use crate::shared::errors::AppError;

/// Address whose nonce is read when probing endpoints
const PROBE_ACCOUNT: &str = "0x0000000000000000000000000000000000000000";

#[derive(Parser)]
#[command(name = "flasharb", version)]
#[command(about = "CEX/DEX price-gap scanner with flash-loan execution")]
pub struct Cli {
    /// Path to the TOML configuration
    #[arg(short, long, global = true, default_value = "Config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Scan continuously until Ctrl-C
    Run {
        /// Submit executable opportunities, overriding scanner.execution_enabled
        #[arg(long)]
        execute: bool,
    },

    /// Run a single scan cycle and report every opportunity
    ScanOnce,

    /// Show endpoint health for every chain
    Endpoints {
        /// Send one request per endpoint through the pool first
        #[arg(long)]
        probe: bool,
    },
}

pub struct CommandExecutor;

impl CommandExecutor {
    /// Execute the selected command
    pub async fn execute(command: Commands, config: AppConfig) -> Result<(), AppError> {
        match command {
            Commands::Run { execute } => Self::execute_run_command(execute, config).await,
            Commands::ScanOnce => Self::execute_scan_once_command(config).await,
            Commands::Endpoints { probe } => Self::execute_endpoints_command(probe, config).await,
        }
    }

    async fn execute_run_command(execute: bool, mut config: AppConfig) -> Result<(), AppError> {
        if execute {
            config.scanner.execution_enabled = true;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let services = AppServices::build(&config, shutdown_rx.clone())?;
        let scanner = services.scanner(shutdown_rx);

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown requested, finishing in-flight work");
                    let _ = shutdown_tx.send(true);
                }
                Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
            }
        });

        scanner.run().await;
        Ok(())
    }

    async fn execute_scan_once_command(config: AppConfig) -> Result<(), AppError> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let services = AppServices::build(&config, shutdown_rx.clone())?;
        let mut opportunities = services.scanner(shutdown_rx).scan_once().await;
        opportunities.sort_by(|a, b| (&a.chain, &a.symbol).cmp(&(&b.chain, &b.symbol)));

        for opportunity in &opportunities {
            match opportunity.reason {
                None => info!(
                    "{} on {}: {:?} cex {:.4} dex {:.4} edge {:.1} bps net {:.2} EXECUTABLE",
                    opportunity.symbol,
                    opportunity.chain,
                    opportunity.direction,
                    opportunity.cex_price,
                    opportunity.dex_price,
                    opportunity.edge_bps,
                    opportunity.net_profit
                ),
                Some(reason) => info!(
                    "{} on {}: cex {:.4} dex {:.4} edge {:.1} bps net {:.2} rejected: {}",
                    opportunity.symbol,
                    opportunity.chain,
                    opportunity.cex_price,
                    opportunity.dex_price,
                    opportunity.edge_bps,
                    opportunity.net_profit,
                    reason
                ),
            }
        }
        info!(
            "{} market(s) scanned, {} executable",
            opportunities.len(),
            opportunities.iter().filter(|o| o.executable).count()
        );
        Ok(())
    }

    async fn execute_endpoints_command(probe: bool, config: AppConfig) -> Result<(), AppError> {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let services = AppServices::build(&config, shutdown_rx)?;

        for chain in &services.chains {
            let pool = &chain.pool;
            if probe {
                for _ in 0..pool.len() {
                    let result = pool
                        .call(|node| async move { node.transaction_count(PROBE_ACCOUNT).await })
                        .await;
                    if let Err(e) = result {
                        warn!("Probe on {} failed: {}", chain.chain, e);
                    }
                }
            }

            info!("{}:", chain.chain);
            for endpoint in pool.snapshot() {
                info!(
                    "  #{} {} {:?} health {:.2} failures {}/{} consecutive {}",
                    endpoint.id,
                    endpoint.url,
                    endpoint.state,
                    endpoint.health,
                    endpoint.total_failures,
                    endpoint.total_requests,
                    endpoint.consecutive_failures
                );
            }
            if let Some(outage) = pool.outage_duration() {
                warn!("  no closed endpoint for {:?}", outage);
            }
        }
        Ok(())
    }
}
