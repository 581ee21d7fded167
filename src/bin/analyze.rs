// DANS : src/bin/analyze.rs

use anyhow::Result;
use quote_fill::{
    config::Config,
    data_pipeline::{api_connectors::JupiterPriceApi, run_analysis, TerminalProgress},
    decoders::{pricing::CachedPrices, JupiterRouteExtractor},
    monitoring::metrics::start_metrics_server,
    rpc::ResilientRpcClient,
    state::AccountInfoCache,
};
use std::sync::Arc;
use tracing::{error, info};

async fn run_analyzer() -> Result<()> {
    let config = Config::load()?;
    let cli_target = std::env::args().nth(1);
    let settings = config.analysis_settings(cli_target.as_deref())?;

    if let Some(port) = config.metrics_port {
        info!("[Analyzer] Exposition des métriques sur le port {}.", port);
        tokio::spawn(start_metrics_server(port));
    }

    let rpc = Arc::new(
        ResilientRpcClient::new(
            config.solana_rpc_url.clone(),
            config.rpc_max_retries,
            config.rpc_retry_delay_ms,
        )
        .with_tx_concurrency(config.rpc_tx_concurrency),
    );
    let accounts = Arc::new(AccountInfoCache::new(rpc.clone(), settings.account_lookup_delay));
    let prices = Arc::new(CachedPrices::new(JupiterPriceApi::new(config.price_api_url.clone())));
    let extractor = Arc::new(JupiterRouteExtractor::new(prices));

    let report = run_analysis(&settings, rpc, accounts, extractor, Arc::new(TerminalProgress)).await?;

    // Termine la ligne de progression avant le bilan.
    println!();
    println!("{}", report);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    quote_fill::monitoring::logging::setup_logging();
    if let Err(e) = run_analyzer().await {
        println!();
        error!("[Analyzer] L'analyse a échoué : {:?}.", e);
        std::process::exit(1);
    }
    Ok(())
}
