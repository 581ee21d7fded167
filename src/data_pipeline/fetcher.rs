// DANS : src/data_pipeline/fetcher.rs

use crate::config::AnalysisSettings;
use crate::monitoring::metrics;
use crate::rpc::{HistoricalTransaction, HistorySource};
use anyhow::{anyhow, Result};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::mpsc::UnboundedSender, time::sleep};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub pages: usize,
    pub fetched: usize,
    /// Signatures listées mais inconnues de getTransaction.
    pub missing: usize,
    pub end_of_history: bool,
}

/// Parcourt l'historique d'une adresse à reculons, page par page, et pousse
/// les transactions complètes dans la file du consumer.
pub struct PageFetcher {
    source: Arc<dyn HistorySource>,
    address: Pubkey,
    page_count: usize,
    page_size: usize,
    inter_page_delay: Duration,
    fetched: Arc<AtomicUsize>,
}

impl PageFetcher {
    pub fn new(source: Arc<dyn HistorySource>, settings: &AnalysisSettings, fetched: Arc<AtomicUsize>) -> Self {
        Self {
            source,
            address: settings.address,
            page_count: settings.page_count,
            page_size: settings.page_size,
            inter_page_delay: settings.inter_page_delay,
            fetched,
        }
    }

    /// La file est fermée quand `queue` est relâché, à la fin de cette fonction.
    pub async fn run(self, queue: UnboundedSender<HistoricalTransaction>) -> Result<FetchSummary> {
        let mut summary = FetchSummary::default();
        let mut cursor: Option<Signature> = None;

        for page in 0..self.page_count {
            let records = self
                .source
                .list_signatures(&self.address, self.page_size, cursor)
                .await?;

            let Some(oldest) = records.last() else {
                info!(page, address = %self.address, "[Fetcher] Fin de l'historique atteinte.");
                summary.end_of_history = true;
                break;
            };
            cursor = Some(oldest.signature);

            let signatures: Vec<Signature> = records.iter().map(|r| r.signature).collect();
            let transactions = self.source.get_transactions(&signatures).await?;

            let mut pushed = 0;
            for transaction in transactions {
                let Some(transaction) = transaction else {
                    summary.missing += 1;
                    metrics::TRANSACTIONS_MISSING.inc();
                    continue;
                };
                queue
                    .send(transaction)
                    .map_err(|_| anyhow!("La file de transactions a été fermée par le consumer"))?;
                metrics::QUEUE_DEPTH.inc();
                pushed += 1;
            }

            summary.pages += 1;
            summary.fetched += pushed;
            self.fetched.fetch_add(pushed, Ordering::Relaxed);
            metrics::PAGES_FETCHED.inc();
            metrics::TRANSACTIONS_FETCHED.inc_by(pushed as u64);
            debug!(page, signatures = signatures.len(), pushed, cursor = ?cursor, "[Fetcher] Page mise en file.");

            if !self.inter_page_delay.is_zero() && page + 1 < self.page_count {
                sleep(self.inter_page_delay).await;
            }
        }

        info!(pages = summary.pages, fetched = summary.fetched, missing = summary.missing, "[Fetcher] Pagination terminée.");
        Ok(summary)
    }
}
