// src/data_pipeline/mod.rs

pub mod api_connectors;
pub mod consumer;
pub mod fetcher;
pub mod progress;

pub use consumer::{Consumer, ConsumerSummary, ExtractOutcome};
pub use fetcher::{FetchSummary, PageFetcher};
pub use progress::{ProgressObserver, ProgressSnapshot, TerminalProgress};

use crate::config::AnalysisSettings;
use crate::decoders::SwapExtractor;
use crate::filtering::AggregateStats;
use crate::rpc::HistorySource;
use crate::state::AccountInfoCache;
use crate::venues::Venue;
use anyhow::Result;
use std::{
    fmt,
    sync::{atomic::AtomicUsize, Arc},
};
use tokio::sync::mpsc;
use tracing::info;

/// Bilan d'une analyse complète.
#[derive(Debug)]
pub struct AnalysisReport {
    pub venue: Venue,
    pub fetch: FetchSummary,
    pub consumer: ConsumerSummary,
}

impl AnalysisReport {
    pub fn stats(&self) -> AggregateStats {
        self.consumer.aggregator.stats()
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.consumer;
        writeln!(f, "Result for target {}", self.venue.key())?;
        writeln!(
            f,
            "  pages: {}, transactions: {}, missing: {}",
            self.fetch.pages, self.fetch.fetched, self.fetch.missing
        )?;
        writeln!(
            f,
            "  examined: {}, failed: {}, unrouted: {}, decoded: {}, empty: {}, decode failures: {}",
            c.examined, c.skipped_failed, c.skipped_unrouted, c.decoded, c.empty, c.decode_failures
        )?;
        writeln!(
            f,
            "  accepted: {}, rejected: {}",
            c.aggregator.accepted(),
            c.aggregator.rejected()
        )?;
        write!(f, "output-over-quote ratio:  {}", self.stats())
    }
}

/// Lance le fetcher et le consumer sur la même tâche, reliés par une file
/// non bornée. La première erreur fatale de l'un des deux interrompt l'autre.
pub async fn run_analysis(
    settings: &AnalysisSettings,
    history: Arc<dyn HistorySource>,
    accounts: Arc<AccountInfoCache>,
    extractor: Arc<dyn SwapExtractor>,
    observer: Arc<dyn ProgressObserver>,
) -> Result<AnalysisReport> {
    info!(
        venue = settings.venue.key(),
        address = %settings.address,
        pages = settings.page_count,
        page_size = settings.page_size,
        "[Pipeline] Démarrage de l'analyse."
    );

    let fetched = Arc::new(AtomicUsize::new(0));
    let (sender, receiver) = mpsc::unbounded_channel();

    let fetcher = PageFetcher::new(history, settings, fetched.clone());
    let consumer = Consumer::new(
        extractor,
        accounts,
        settings.venue,
        observer,
        fetched,
        settings.expected_transactions(),
    );

    let (fetch, consumer) = tokio::try_join!(fetcher.run(sender), consumer.run(receiver))?;

    Ok(AnalysisReport {
        venue: settings.venue,
        fetch,
        consumer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::{AccountInfoProvider, SwapLeg, SwapResult};
    use crate::rpc::{
        transaction::TransactionInstruction, AccountSource, HistoricalTransaction, SignatureRecord,
    };
    use crate::venues::JUPITER_V6_PROGRAM_ID;
    use anyhow::bail;
    use async_trait::async_trait;
    use solana_sdk::{account::Account, pubkey::Pubkey, signature::Signature};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn sig(n: u8) -> Signature {
        Signature::from([n; 64])
    }

    fn routed_tx(n: u8) -> HistoricalTransaction {
        HistoricalTransaction {
            signatures: vec![sig(n)],
            instructions: vec![TransactionInstruction {
                program_id: JUPITER_V6_PROGRAM_ID,
                accounts: vec![],
                data: vec![],
                inner: vec![],
            }],
            ..HistoricalTransaction::default()
        }
    }

    /// Historique en mémoire, pages les plus récentes d'abord.
    struct FakeHistory {
        pages: Vec<Vec<HistoricalTransaction>>,
        /// Signatures listées dont getTransaction renvoie null.
        unknown: Vec<Signature>,
        cursors: StdMutex<Vec<Option<Signature>>>,
    }

    impl FakeHistory {
        fn new(pages: Vec<Vec<HistoricalTransaction>>) -> Self {
            Self {
                pages,
                unknown: vec![],
                cursors: StdMutex::new(vec![]),
            }
        }

        fn list_calls(&self) -> usize {
            self.cursors.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HistorySource for FakeHistory {
        async fn list_signatures(
            &self,
            _address: &Pubkey,
            limit: usize,
            before: Option<Signature>,
        ) -> Result<Vec<SignatureRecord>> {
            self.cursors.lock().unwrap().push(before);
            let page = match before {
                None => 0,
                Some(cursor) => match self
                    .pages
                    .iter()
                    .position(|p| p.last().and_then(|tx| tx.first_signature()) == Some(&cursor))
                {
                    Some(index) => index + 1,
                    None => bail!("curseur inconnu"),
                },
            };
            Ok(self
                .pages
                .get(page)
                .map(|txs| {
                    txs.iter()
                        .take(limit)
                        .map(|tx| SignatureRecord {
                            signature: tx.signatures[0],
                            block_time: tx.block_time,
                            failed: tx.is_failed(),
                        })
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn get_transactions(&self, signatures: &[Signature]) -> Result<Vec<Option<HistoricalTransaction>>> {
            Ok(signatures
                .iter()
                .map(|s| {
                    if self.unknown.contains(s) {
                        return None;
                    }
                    self.pages.iter().flatten().find(|tx| tx.signatures[0] == *s).cloned()
                })
                .collect())
        }
    }

    enum Scripted {
        Swap { amm: &'static str, out: u64, exact: u64, out_usd: f64, exact_usd: f64 },
        Fail,
        ReadAccounts,
    }

    /// Décodeur scripté par signature ; `Ok(None)` pour les signatures sans script.
    #[derive(Default)]
    struct ScriptedExtractor {
        script: HashMap<Signature, Scripted>,
        seen: StdMutex<Vec<Signature>>,
    }

    #[async_trait]
    impl SwapExtractor for ScriptedExtractor {
        async fn extract(
            &self,
            signature: &Signature,
            accounts: &dyn AccountInfoProvider,
            _transaction: &HistoricalTransaction,
            _block_time: Option<i64>,
        ) -> Result<Option<SwapResult>> {
            self.seen.lock().unwrap().push(*signature);
            match self.script.get(signature) {
                None => Ok(None),
                Some(Scripted::Fail) => bail!("données d'instruction illisibles"),
                Some(Scripted::ReadAccounts) => {
                    accounts.get_multiple_accounts_info(&[Pubkey::new_unique()]).await?;
                    Ok(None)
                }
                Some(Scripted::Swap { amm, out, exact, out_usd, exact_usd }) => Ok(Some(SwapResult {
                    swap_legs: vec![SwapLeg::new(*amm)],
                    out_amount: Some(*out),
                    exact_out_amount: Some(*exact),
                    out_amount_usd: *out_usd,
                    exact_out_amount_usd: *exact_usd,
                })),
            }
        }
    }

    struct NoAccounts;

    #[async_trait]
    impl AccountSource for NoAccounts {
        async fn get_accounts_info(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
            Ok(vec![None; keys.len()])
        }
    }

    struct DownAccounts;

    #[async_trait]
    impl AccountSource for DownAccounts {
        async fn get_accounts_info(&self, _keys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
            bail!("503 Service Unavailable")
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        snapshots: StdMutex<Vec<ProgressSnapshot>>,
        failures: StdMutex<Vec<Signature>>,
    }

    impl ProgressObserver for RecordingObserver {
        fn on_progress(&self, snapshot: &ProgressSnapshot) {
            self.snapshots.lock().unwrap().push(*snapshot);
        }

        fn on_decode_failure(&self, signature: &Signature, _error: &anyhow::Error) {
            self.failures.lock().unwrap().push(*signature);
        }
    }

    fn settings(page_count: usize, page_size: usize) -> AnalysisSettings {
        AnalysisSettings {
            venue: Venue::Obric,
            address: Venue::Obric.address(),
            page_count,
            page_size,
            inter_page_delay: Duration::ZERO,
            account_lookup_delay: Duration::ZERO,
        }
    }

    async fn run(
        settings: &AnalysisSettings,
        history: Arc<FakeHistory>,
        extractor: Arc<ScriptedExtractor>,
        observer: Arc<RecordingObserver>,
        accounts: Arc<dyn AccountSource>,
    ) -> Result<AnalysisReport> {
        let cache = Arc::new(AccountInfoCache::new(accounts, settings.account_lookup_delay));
        run_analysis(settings, history, cache, extractor, observer).await
    }

    #[tokio::test]
    async fn transactions_are_consumed_in_fetch_order_across_pages() {
        let history = Arc::new(FakeHistory::new(vec![
            vec![routed_tx(1), routed_tx(2), routed_tx(3)],
            vec![routed_tx(4), routed_tx(5)],
        ]));
        let extractor = Arc::new(ScriptedExtractor::default());
        let observer = Arc::new(RecordingObserver::default());

        let report = run(&settings(5, 3), history.clone(), extractor.clone(), observer.clone(), Arc::new(NoAccounts))
            .await
            .unwrap();

        assert_eq!(*extractor.seen.lock().unwrap(), (1..=5).map(sig).collect::<Vec<_>>());
        assert_eq!(report.consumer.examined, 5);
        assert_eq!(report.consumer.empty, 5);

        let snapshots = observer.snapshots.lock().unwrap();
        assert_eq!(snapshots.len(), 5);
        assert_eq!(snapshots.iter().map(|s| s.examined).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert!(snapshots.iter().all(|s| s.expected == 15 && s.fetched >= s.examined));
    }

    #[tokio::test]
    async fn empty_page_ends_pagination_early_without_error() {
        let history = Arc::new(FakeHistory::new(vec![
            vec![routed_tx(1), routed_tx(2)],
            vec![routed_tx(3), routed_tx(4)],
        ]));

        let report = run(
            &settings(5, 2),
            history.clone(),
            Arc::new(ScriptedExtractor::default()),
            Arc::new(RecordingObserver::default()),
            Arc::new(NoAccounts),
        )
        .await
        .unwrap();

        assert!(report.fetch.end_of_history);
        assert_eq!(report.fetch.pages, 2);
        assert_eq!(report.fetch.fetched, 4);
        assert_eq!(history.list_calls(), 3);
        assert_eq!(*history.cursors.lock().unwrap(), vec![None, Some(sig(2)), Some(sig(4))]);
    }

    #[tokio::test]
    async fn pagination_stops_at_the_configured_page_count() {
        let pages = (0..5u8)
            .map(|p| vec![routed_tx(p * 2 + 1), routed_tx(p * 2 + 2)])
            .collect();
        let history = Arc::new(FakeHistory::new(pages));

        let report = run(
            &settings(3, 2),
            history.clone(),
            Arc::new(ScriptedExtractor::default()),
            Arc::new(RecordingObserver::default()),
            Arc::new(NoAccounts),
        )
        .await
        .unwrap();

        assert_eq!(history.list_calls(), 3);
        assert!(!report.fetch.end_of_history);
        assert_eq!(report.fetch.fetched, 6);
        assert_eq!(report.consumer.examined, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn inter_page_delay_is_skipped_after_the_last_page() {
        let pages = (0..3u8)
            .map(|p| vec![routed_tx(p * 2 + 1), routed_tx(p * 2 + 2)])
            .collect();
        let history = Arc::new(FakeHistory::new(pages));
        let mut settings = settings(3, 2);
        settings.inter_page_delay = Duration::from_millis(100);

        let start = tokio::time::Instant::now();
        let report = run(
            &settings,
            history.clone(),
            Arc::new(ScriptedExtractor::default()),
            Arc::new(RecordingObserver::default()),
            Arc::new(NoAccounts),
        )
        .await
        .unwrap();

        assert_eq!(start.elapsed(), Duration::from_millis(200));
        assert_eq!(history.list_calls(), 3);
        assert_eq!(report.fetch.fetched, 6);
    }

    #[tokio::test]
    async fn failed_and_unrouted_transactions_never_reach_the_extractor() {
        let mut failed = routed_tx(1);
        failed.err = Some("InstructionError(2, Custom(6001))".to_string());
        let mut unrouted = routed_tx(2);
        unrouted.instructions[0].program_id = Venue::Obric.address();
        let mut history = FakeHistory::new(vec![vec![failed, unrouted, routed_tx(3), routed_tx(4)]]);
        history.unknown = vec![sig(4)];
        let extractor = Arc::new(ScriptedExtractor::default());

        let report = run(
            &settings(1, 10),
            Arc::new(history),
            extractor.clone(),
            Arc::new(RecordingObserver::default()),
            Arc::new(NoAccounts),
        )
        .await
        .unwrap();

        assert_eq!(*extractor.seen.lock().unwrap(), vec![sig(3)]);
        assert_eq!(report.fetch.missing, 1);
        assert_eq!(report.consumer.examined, 3);
        assert_eq!(report.consumer.skipped_failed, 1);
        assert_eq!(report.consumer.skipped_unrouted, 1);
    }

    #[tokio::test]
    async fn only_plausible_results_are_aggregated_and_decode_failures_are_counted() {
        let history = Arc::new(FakeHistory::new(vec![vec![routed_tx(1), routed_tx(2), routed_tx(3), routed_tx(4)]]));
        let extractor = Arc::new(ScriptedExtractor {
            script: HashMap::from([
                (sig(1), Scripted::Swap { amm: "Obric", out: 100, exact: 90, out_usd: 100.0, exact_usd: 90.0 }),
                (sig(2), Scripted::Swap { amm: "Obric", out: 200, exact: 10, out_usd: 200.0, exact_usd: 10.0 }),
                (sig(3), Scripted::Fail),
                (sig(4), Scripted::Swap { amm: "SolFi", out: 50, exact: 50, out_usd: 50.0, exact_usd: 50.0 }),
            ]),
            ..ScriptedExtractor::default()
        });
        let observer = Arc::new(RecordingObserver::default());

        let report = run(&settings(1, 10), history, extractor, observer.clone(), Arc::new(NoAccounts))
            .await
            .unwrap();

        let stats = report.stats();
        assert_eq!((stats.sum_out_usd, stats.sum_exact_out_usd), (100.0, 90.0));
        assert!((stats.ratio().unwrap() - 100.0 / 90.0).abs() < 1e-12);
        assert_eq!(report.consumer.decoded, 3);
        assert_eq!(report.consumer.decode_failures, 1);
        assert_eq!(report.consumer.aggregator.accepted(), 1);
        assert_eq!(report.consumer.aggregator.rejected(), 2);
        assert_eq!(*observer.failures.lock().unwrap(), vec![sig(3)]);
        assert!(report.to_string().ends_with("output-over-quote ratio:  100/90: 1.1111111111111112"));
    }

    #[tokio::test]
    async fn no_accepted_swap_reports_an_undefined_ratio() {
        let history = Arc::new(FakeHistory::new(vec![vec![routed_tx(1)]]));

        let report = run(
            &settings(1, 10),
            history,
            Arc::new(ScriptedExtractor::default()),
            Arc::new(RecordingObserver::default()),
            Arc::new(NoAccounts),
        )
        .await
        .unwrap();

        assert_eq!(report.stats().ratio(), None);
        assert!(report.to_string().starts_with("Result for target obric\n"));
        assert!(report.to_string().ends_with("0/0: undefined"));
    }

    #[tokio::test]
    async fn account_lookup_network_failure_aborts_the_run() {
        let history = Arc::new(FakeHistory::new(vec![vec![routed_tx(1), routed_tx(2)]]));
        let extractor = Arc::new(ScriptedExtractor {
            script: HashMap::from([(sig(1), Scripted::ReadAccounts)]),
            ..ScriptedExtractor::default()
        });

        let error = run(
            &settings(1, 10),
            history,
            extractor.clone(),
            Arc::new(RecordingObserver::default()),
            Arc::new(DownAccounts),
        )
        .await
        .unwrap_err();

        assert!(error.downcast_ref::<crate::state::AccountFetchError>().is_some());
        assert_eq!(*extractor.seen.lock().unwrap(), vec![sig(1)]);
    }
}
