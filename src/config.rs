// DANS : src/config.rs

use crate::rpc::resilient_client::DEFAULT_TX_CONCURRENCY;
use crate::venues::Venue;
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::{str::FromStr, time::Duration};

/// Limite imposée par getSignaturesForAddress.
pub const MAX_PAGE_SIZE: usize = 1000;

const DEFAULT_PRICE_API_URL: &str = "https://lite-api.jup.ag/price/v3";

fn default_pages() -> usize { 100 }
fn default_page_size() -> usize { MAX_PAGE_SIZE }
fn default_rpc_max_retries() -> u8 { 3 }
fn default_rpc_retry_delay_ms() -> u64 { 500 }
fn default_rpc_tx_concurrency() -> usize { DEFAULT_TX_CONCURRENCY }
fn default_price_api_url() -> String { DEFAULT_PRICE_API_URL.to_string() }

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub solana_rpc_url: String,
    pub analyze_target: Option<String>,
    pub analyze_address: Option<String>,
    #[serde(default = "default_pages")]
    pub analyze_pages: usize,
    #[serde(default = "default_page_size")]
    pub analyze_page_size: usize,
    #[serde(default)]
    pub fetch_tx_delay_ms: u64,
    #[serde(default)]
    pub fetch_acc_delay_ms: u64,
    #[serde(default = "default_rpc_max_retries")]
    pub rpc_max_retries: u8,
    #[serde(default = "default_rpc_retry_delay_ms")]
    pub rpc_retry_delay_ms: u64,
    /// getTransaction simultanés au plus, par page.
    #[serde(default = "default_rpc_tx_concurrency")]
    pub rpc_tx_concurrency: usize,
    #[serde(default = "default_price_api_url")]
    pub price_api_url: String,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>()?;
        Ok(config)
    }

    /// Résout les paramètres d'une analyse. `cli_target` (premier argument du
    /// binaire) a priorité sur `ANALYZE_TARGET`.
    pub fn analysis_settings(&self, cli_target: Option<&str>) -> Result<AnalysisSettings> {
        let target_name = cli_target
            .or(self.analyze_target.as_deref())
            .ok_or_else(|| anyhow!("Aucune cible spécifiée (argument ou ANALYZE_TARGET). Cibles valides : {}", Venue::keys().join(", ")))?;
        let venue = Venue::from_str(target_name)?;

        let address = match &self.analyze_address {
            Some(raw) => Pubkey::from_str(raw)
                .with_context(|| format!("ANALYZE_ADDRESS invalide : {}", raw))?,
            None => venue.address(),
        };

        if self.analyze_pages == 0 {
            bail!("ANALYZE_PAGES doit être au moins 1");
        }
        if self.analyze_page_size == 0 || self.analyze_page_size > MAX_PAGE_SIZE {
            bail!("ANALYZE_PAGE_SIZE doit être compris entre 1 et {} (reçu {})", MAX_PAGE_SIZE, self.analyze_page_size);
        }

        Ok(AnalysisSettings {
            venue,
            address,
            page_count: self.analyze_pages,
            page_size: self.analyze_page_size,
            inter_page_delay: Duration::from_millis(self.fetch_tx_delay_ms),
            account_lookup_delay: Duration::from_millis(self.fetch_acc_delay_ms),
        })
    }
}

/// Les valeurs consommées par le pipeline, une fois validées.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    pub venue: Venue,
    pub address: Pubkey,
    pub page_count: usize,
    pub page_size: usize,
    pub inter_page_delay: Duration,
    pub account_lookup_delay: Duration,
}

impl AnalysisSettings {
    /// Nombre maximal de transactions que la pagination peut ramener.
    pub fn expected_transactions(&self) -> usize {
        self.page_count * self.page_size
    }
}
