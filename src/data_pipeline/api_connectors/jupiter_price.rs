// src/data_pipeline/api_connectors/jupiter_price.rs

use crate::decoders::PriceSource;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

/// Une entrée de la réponse de l'API Price v3 de Jupiter.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub usd_price: f64,
    #[serde(default)]
    pub decimals: Option<u8>,
}

/// Réponse indexée par mint (base58). Un mint inconnu est simplement absent.
pub type PriceResponse = HashMap<String, PriceEntry>;

pub fn price_for(response: &PriceResponse, mint: &Pubkey) -> Option<f64> {
    response
        .get(&mint.to_string())
        .map(|entry| entry.usd_price)
        .filter(|price| price.is_finite() && *price > 0.0)
}

/// Prix USD courant d'un mint via l'API Price de Jupiter.
pub struct JupiterPriceApi {
    client: reqwest::Client,
    url: String,
}

impl JupiterPriceApi {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl PriceSource for JupiterPriceApi {
    async fn usd_price(&self, mint: &Pubkey) -> Result<Option<f64>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("ids", mint.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await?;
            return Err(anyhow!("Erreur API Price Jupiter: {} - {}", status, error_body));
        }

        let response_text = response.text().await?;
        let prices: PriceResponse = serde_json::from_str(&response_text)
            .map_err(|e| anyhow!("Erreur de décodage JSON Price: {}. Réponse reçue: {}", e, response_text))?;

        Ok(price_for(&prices, mint))
    }
}
