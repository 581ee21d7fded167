// DANS : src/data_pipeline/consumer.rs

use super::progress::{ProgressObserver, ProgressSnapshot};
use crate::decoders::{SwapExtractor, SwapResult};
use crate::filtering::Aggregator;
use crate::monitoring::metrics;
use crate::rpc::HistoricalTransaction;
use crate::state::{AccountFetchError, AccountInfoCache};
use crate::venues::{Venue, JUPITER_V6_PROGRAM_ID};
use anyhow::Result;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Issue d'une extraction, une fois les erreurs non fatales absorbées.
#[derive(Debug)]
pub enum ExtractOutcome {
    Decoded(SwapResult),
    Empty,
    Failed(anyhow::Error),
}

#[derive(Debug)]
pub struct ConsumerSummary {
    pub examined: usize,
    pub skipped_failed: usize,
    pub skipped_unrouted: usize,
    pub decoded: usize,
    pub empty: usize,
    pub decode_failures: usize,
    pub aggregator: Aggregator,
}

/// Dépile les transactions dans l'ordre d'arrivée et les fait passer par
/// pré-filtre, extraction puis agrégation.
pub struct Consumer {
    extractor: Arc<dyn SwapExtractor>,
    accounts: Arc<AccountInfoCache>,
    router_program: Pubkey,
    observer: Arc<dyn ProgressObserver>,
    fetched: Arc<AtomicUsize>,
    expected: usize,
    summary: ConsumerSummary,
}

impl Consumer {
    pub fn new(
        extractor: Arc<dyn SwapExtractor>,
        accounts: Arc<AccountInfoCache>,
        target: Venue,
        observer: Arc<dyn ProgressObserver>,
        fetched: Arc<AtomicUsize>,
        expected: usize,
    ) -> Self {
        Self {
            extractor,
            accounts,
            router_program: JUPITER_V6_PROGRAM_ID,
            observer,
            fetched,
            expected,
            summary: ConsumerSummary {
                examined: 0,
                skipped_failed: 0,
                skipped_unrouted: 0,
                decoded: 0,
                empty: 0,
                decode_failures: 0,
                aggregator: Aggregator::new(target),
            },
        }
    }

    /// Se termine quand le fetcher a relâché l'émetteur et que la file est vide.
    /// Seul un échec réseau du cache de comptes est fatal.
    pub async fn run(mut self, mut queue: UnboundedReceiver<HistoricalTransaction>) -> Result<ConsumerSummary> {
        while let Some(transaction) = queue.recv().await {
            metrics::QUEUE_DEPTH.dec();
            self.summary.examined += 1;
            self.observer.on_progress(&self.snapshot());
            self.process(transaction).await?;
        }

        info!(
            examined = self.summary.examined,
            decoded = self.summary.decoded,
            decode_failures = self.summary.decode_failures,
            accepted = self.summary.aggregator.accepted(),
            "[Consumer] File épuisée."
        );
        Ok(self.summary)
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            fetched: self.fetched.load(Ordering::Relaxed),
            expected: self.expected,
            examined: self.summary.examined,
            decode_failures: self.summary.decode_failures,
            stats: self.summary.aggregator.stats(),
        }
    }

    async fn process(&mut self, transaction: HistoricalTransaction) -> Result<()> {
        if transaction.is_failed() {
            self.summary.skipped_failed += 1;
            metrics::TRANSACTIONS_EXAMINED.with_label_values(&["failed"]).inc();
            return Ok(());
        }
        if !transaction.invokes_program(&self.router_program) {
            self.summary.skipped_unrouted += 1;
            metrics::TRANSACTIONS_EXAMINED.with_label_values(&["unrouted"]).inc();
            return Ok(());
        }
        metrics::TRANSACTIONS_EXAMINED.with_label_values(&["extracted"]).inc();

        let signature = transaction.first_signature().copied().unwrap_or_default();
        match self.extract(&signature, &transaction).await? {
            ExtractOutcome::Decoded(result) => {
                self.summary.decoded += 1;
                let accepted = self.summary.aggregator.accept(&result);
                debug!(%signature, accepted, legs = result.swap_legs.len(), "[Consumer] Swap décodé.");
            }
            ExtractOutcome::Empty => self.summary.empty += 1,
            ExtractOutcome::Failed(error) => {
                self.summary.decode_failures += 1;
                metrics::DECODE_FAILURES.inc();
                self.observer.on_decode_failure(&signature, &error);
            }
        }
        Ok(())
    }

    async fn extract(&self, signature: &Signature, transaction: &HistoricalTransaction) -> Result<ExtractOutcome> {
        let outcome = self
            .extractor
            .extract(signature, self.accounts.as_ref(), transaction, transaction.block_time)
            .await;

        match outcome {
            Ok(Some(result)) => Ok(ExtractOutcome::Decoded(result)),
            Ok(None) => Ok(ExtractOutcome::Empty),
            Err(error) if error.downcast_ref::<AccountFetchError>().is_some() => Err(error),
            Err(error) => Ok(ExtractOutcome::Failed(error)),
        }
    }
}
