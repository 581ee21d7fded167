// DANS : src/data_pipeline/progress.rs

use crate::filtering::aggregator::AggregateStats;
use solana_sdk::signature::Signature;
use std::io::Write;
use tracing::debug;

/// État courant de l'analyse, émis après chaque transaction dépilée.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub fetched: usize,
    pub expected: usize,
    pub examined: usize,
    pub decode_failures: usize,
    pub stats: AggregateStats,
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);

    fn on_decode_failure(&self, _signature: &Signature, _error: &anyhow::Error) {}
}

/// Ligne de progression réécrite en place sur stdout.
#[derive(Debug, Default)]
pub struct TerminalProgress;

impl TerminalProgress {
    pub fn render(snapshot: &ProgressSnapshot) -> String {
        format!(
            "Fetched {}/{} txs, on tx {}, decode failures {}, output-over-quote ratio:  {}",
            snapshot.fetched, snapshot.expected, snapshot.examined, snapshot.decode_failures, snapshot.stats
        )
    }
}

impl ProgressObserver for TerminalProgress {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        let mut stdout = std::io::stdout().lock();
        // Une ligne de progression perdue n'a pas d'importance.
        let _ = write!(stdout, "\r{}", Self::render(snapshot));
        let _ = stdout.flush();
    }

    fn on_decode_failure(&self, signature: &Signature, error: &anyhow::Error) {
        debug!(%signature, error = %format!("{:#}", error), "[Consumer] Échec du décodage.");
    }
}
