// DANS : src/filtering/aggregator.rs

use crate::decoders::SwapResult;
use crate::monitoring::metrics;
use crate::venues::Venue;
use std::fmt;

/// Au-delà de ce ratio output / quote, le swap est considéré comme une
/// anomalie de décodage et ignoré.
pub const MAX_OUTPUT_OVER_QUOTE: f64 = 10.0;

/// Sommes USD des swaps acceptés.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateStats {
    pub sum_out_usd: f64,
    pub sum_exact_out_usd: f64,
}

impl AggregateStats {
    /// `None` tant qu'aucun montant quoté n'a été accumulé.
    pub fn ratio(&self) -> Option<f64> {
        if self.sum_exact_out_usd == 0.0 {
            None
        } else {
            Some(self.sum_out_usd / self.sum_exact_out_usd)
        }
    }

    pub fn ratio_display(&self) -> String {
        match self.ratio() {
            Some(ratio) => ratio.to_string(),
            None => "undefined".to_string(),
        }
    }
}

impl fmt::Display for AggregateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.0}/{:.0}: {}",
            self.sum_out_usd,
            self.sum_exact_out_usd,
            self.ratio_display()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Zéro ou plusieurs swap legs.
    LegCount(usize),
    VenueMismatch,
    MissingAmounts,
    AnomalousRatio,
    NonFiniteValue,
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::LegCount(_) => "leg_count",
            RejectReason::VenueMismatch => "venue",
            RejectReason::MissingAmounts => "missing_amounts",
            RejectReason::AnomalousRatio => "anomalous_ratio",
            RejectReason::NonFiniteValue => "non_finite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

/// Filtre d'acceptation et accumulateur pour une venue cible.
#[derive(Debug)]
pub struct Aggregator {
    target: Venue,
    stats: AggregateStats,
    accepted: u64,
    rejected: u64,
}

impl Aggregator {
    pub fn new(target: Venue) -> Self {
        Self {
            target,
            stats: AggregateStats::default(),
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn stats(&self) -> AggregateStats {
        self.stats
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Prédicat pur, ne modifie rien.
    pub fn evaluate(&self, result: &SwapResult) -> Verdict {
        let [leg] = result.swap_legs.as_slice() else {
            return Verdict::Rejected(RejectReason::LegCount(result.swap_legs.len()));
        };
        if leg.amm != self.target.display_name() {
            return Verdict::Rejected(RejectReason::VenueMismatch);
        }

        // Un montant nul est traité comme absent.
        let (Some(out), Some(exact_out)) = (
            result.out_amount.filter(|a| *a > 0),
            result.exact_out_amount.filter(|a| *a > 0),
        ) else {
            return Verdict::Rejected(RejectReason::MissingAmounts);
        };

        if out as f64 / exact_out as f64 > MAX_OUTPUT_OVER_QUOTE {
            return Verdict::Rejected(RejectReason::AnomalousRatio);
        }
        if !result.out_amount_usd.is_finite() || !result.exact_out_amount_usd.is_finite() {
            return Verdict::Rejected(RejectReason::NonFiniteValue);
        }
        Verdict::Accepted
    }

    /// Compte le résultat s'il passe le filtre. Retourne `true` si accepté.
    pub fn accept(&mut self, result: &SwapResult) -> bool {
        match self.evaluate(result) {
            Verdict::Accepted => {
                self.stats.sum_out_usd += result.out_amount_usd;
                self.stats.sum_exact_out_usd += result.exact_out_amount_usd;
                self.accepted += 1;
                metrics::RESULTS.with_label_values(&["accepted"]).inc();
                true
            }
            Verdict::Rejected(reason) => {
                self.rejected += 1;
                metrics::RESULTS.with_label_values(&[reason.label()]).inc();
                false
            }
        }
    }
}
