// src/decoders/pricing.rs

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::{pubkey, pubkey::Pubkey};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Mints valorisés à 1 USD sans appel réseau.
pub const USD_STABLECOINS: [Pubkey; 2] = [
    pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"), // USDC
    pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"), // USDT
];

/// Prix USD d'un token entier. `Ok(None)` = prix inconnu.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn usd_price(&self, mint: &Pubkey) -> Result<Option<f64>>;
}

/// Enveloppe une source de prix : stablecoins en dur, un seul appel par mint.
pub struct CachedPrices<S> {
    inner: S,
    cache: Mutex<HashMap<Pubkey, Option<f64>>>,
}

impl<S: PriceSource> CachedPrices<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: PriceSource> PriceSource for CachedPrices<S> {
    async fn usd_price(&self, mint: &Pubkey) -> Result<Option<f64>> {
        if USD_STABLECOINS.contains(mint) {
            return Ok(Some(1.0));
        }

        let mut cache = self.cache.lock().await;
        if let Some(price) = cache.get(mint) {
            return Ok(*price);
        }

        // Un échec est mémorisé comme prix inconnu : le mint n'est plus
        // redemandé pendant l'analyse.
        let price = match self.inner.usd_price(mint).await {
            Ok(price) => {
                debug!(%mint, ?price, "[Prices] Prix chargé.");
                price
            }
            Err(e) => {
                warn!(%mint, error = %format!("{:#}", e), "[Prices] Prix indisponible, mint ignoré.");
                None
            }
        };
        cache.insert(*mint, price);
        Ok(price)
    }
}
