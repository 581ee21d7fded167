use super::{AccountSource, HistoricalTransaction, HistorySource, SignatureRecord};
use crate::monitoring::metrics;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::{stream, StreamExt, TryStreamExt};
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_client::GetConfirmedSignaturesForAddress2Config,
    rpc_config::RpcTransactionConfig,
    rpc_request::RpcRequest,
};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature,
};
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding};
use std::{future::Future, str::FromStr, sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Un "wrapper" autour du RpcClient de Solana qui ajoute une logique de
/// ré-essai bornée (backoff exponentiel) pour les erreurs réseau temporaires.
/// Une fois les tentatives épuisées, l'erreur remonte et l'analyse s'arrête.
#[derive(Clone)]
pub struct ResilientRpcClient {
    client: Arc<RpcClient>,
    max_retries: u8,
    delay_ms: u64,
    tx_concurrency: usize,
}

/// Nombre de getTransaction en vol par défaut pour une page.
pub const DEFAULT_TX_CONCURRENCY: usize = 16;

/// Applique `call` à chaque élément avec au plus `limit` appels en vol.
/// Les résultats gardent l'ordre d'entrée ; la première erreur interrompt le lot.
pub fn fetch_ordered<'a, I, T, F, Fut>(
    items: &'a [I],
    limit: usize,
    call: F,
) -> impl Future<Output = Result<Vec<T>>> + Send + 'a
where
    I: Sync,
    T: Send + 'a,
    F: FnMut(&'a I) -> Fut + Send + 'a,
    Fut: Future<Output = Result<T>> + Send + 'a,
{
    stream::iter(items).map(call).buffered(limit.max(1)).try_collect()
}

impl ResilientRpcClient {
    /// Construit un nouveau client RPC résilient (commitment `confirmed`).
    pub fn new(rpc_url: String, max_retries: u8, delay_ms: u64) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed())),
            max_retries,
            delay_ms,
            tx_concurrency: DEFAULT_TX_CONCURRENCY,
        }
    }

    pub fn with_tx_concurrency(mut self, tx_concurrency: usize) -> Self {
        self.tx_concurrency = tx_concurrency.max(1);
        self
    }

    /// Détermine si une erreur du client est temporaire et si une nouvelle tentative doit être effectuée.
    fn is_retryable(error: &ClientError) -> bool {
        matches!(
            error.kind(),
            ClientErrorKind::Reqwest(_) | ClientErrorKind::RpcError(_) | ClientErrorKind::Io(_)
        )
    }

    fn backoff(&self, attempt: u8) -> Duration {
        Duration::from_millis(self.delay_ms.saturating_mul(1u64 << attempt.min(10)))
    }

    async fn with_retry<T, F, Fut>(&self, method: &'static str, mut call: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0u8;
        loop {
            let timer = metrics::RPC_REQUEST_LATENCY.with_label_values(&[method]).start_timer();
            let outcome = call().await;
            timer.observe_duration();

            match outcome {
                Ok(value) => {
                    metrics::RPC_REQUESTS_TOTAL.with_label_values(&[method, "success"]).inc();
                    return Ok(value);
                }
                Err(e) if Self::is_retryable(&e) && attempt < self.max_retries => {
                    metrics::RPC_REQUESTS_TOTAL.with_label_values(&[method, "retry"]).inc();
                    let delay = self.backoff(attempt);
                    warn!(method, attempt, delay_ms = delay.as_millis() as u64, error = %e, "[RPC] Erreur temporaire, nouvelle tentative.");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    metrics::RPC_REQUESTS_TOTAL.with_label_values(&[method, "failure"]).inc();
                    return Err(e);
                }
            }
        }
    }

    async fn get_transaction(&self, signature: &Signature) -> Result<Option<HistoricalTransaction>> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.client.commitment()),
            max_supported_transaction_version: Some(0),
        };
        let params = serde_json::json!([signature.to_string(), config]);

        // On passe par `send` pour récupérer `null` au lieu d'une erreur de désérialisation.
        let encoded = self
            .with_retry("get_transaction", || {
                self.client
                    .send::<Option<EncodedConfirmedTransactionWithStatusMeta>>(RpcRequest::GetTransaction, params.clone())
            })
            .await
            .with_context(|| format!("Échec final de get_transaction pour {}", signature))?;

        match encoded {
            Some(encoded) => Ok(HistoricalTransaction::from_encoded_or_skip(signature, encoded)),
            None => {
                debug!(%signature, "[RPC] Transaction inconnue du nœud.");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl HistorySource for ResilientRpcClient {
    async fn list_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
        before: Option<Signature>,
    ) -> Result<Vec<SignatureRecord>> {
        let statuses = self
            .with_retry("get_signatures_for_address", || {
                let config = GetConfirmedSignaturesForAddress2Config {
                    before,
                    until: None,
                    limit: Some(limit),
                    commitment: Some(self.client.commitment()),
                };
                self.client.get_signatures_for_address_with_config(address, config)
            })
            .await
            .with_context(|| format!("Échec final de get_signatures_for_address pour {}", address))?;

        statuses
            .into_iter()
            .map(|status| {
                let signature = Signature::from_str(&status.signature)
                    .map_err(|e| anyhow!("Signature invalide {} : {}", status.signature, e))?;
                Ok(SignatureRecord {
                    signature,
                    block_time: status.block_time,
                    failed: status.err.is_some(),
                })
            })
            .collect()
    }

    async fn get_transactions(&self, signatures: &[Signature]) -> Result<Vec<Option<HistoricalTransaction>>> {
        // Un getTransaction par signature, au plus `tx_concurrency` à la fois.
        fetch_ordered(signatures, self.tx_concurrency, |signature| self.get_transaction(signature)).await
    }
}

#[async_trait]
impl AccountSource for ResilientRpcClient {
    async fn get_accounts_info(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        let response = self
            .with_retry("get_multiple_accounts", || {
                self.client.get_multiple_accounts_with_commitment(keys, CommitmentConfig::processed())
            })
            .await
            .with_context(|| format!("Échec final de get_multiple_accounts ({} clés)", keys.len()))?;
        Ok(response.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn backoff_doubles_from_the_base_delay() {
        let client = ResilientRpcClient::new("http://localhost:8899".to_string(), 3, 500);
        assert_eq!(client.backoff(0), Duration::from_millis(500));
        assert_eq!(client.backoff(1), Duration::from_millis(1000));
        assert_eq!(client.backoff(3), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn ordered_fetch_bounds_requests_in_flight() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u64> = (0..20).collect();

        let results = fetch_ordered(&items[..], 4, |item| {
            let (in_flight, peak) = (&in_flight, &peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                // Les derniers éléments répondent plus vite que les premiers.
                sleep(Duration::from_millis(100 - *item * 5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(*item * 10)
            }
        })
        .await
        .unwrap();

        assert_eq!(results, items.iter().map(|i| i * 10).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn ordered_fetch_stops_on_the_first_error() {
        let items = [1u8, 2, 3];
        let outcome: Result<Vec<u8>> = fetch_ordered(&items[..], 2, |item| async move {
            if *item == 2 {
                anyhow::bail!("503 Service Unavailable")
            }
            Ok(*item)
        })
        .await;
        assert!(outcome.is_err());
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let client = ResilientRpcClient::new("http://localhost:8899".to_string(), 3, 500).with_tx_concurrency(0);
        assert_eq!(client.tx_concurrency, 1);
    }
}
