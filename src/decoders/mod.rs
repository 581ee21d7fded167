// src/decoders/mod.rs

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::{account::Account, pubkey::Pubkey, signature::Signature};

use crate::rpc::HistoricalTransaction;

pub mod jupiter_route;
pub mod pricing;
pub mod spl_mint;

pub use jupiter_route::JupiterRouteExtractor;
pub use pricing::PriceSource;

/// La seule capacité que les décodeurs reçoivent pour lire l'état des comptes.
#[async_trait]
pub trait AccountInfoProvider: Send + Sync {
    async fn get_multiple_accounts_info(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>>;
}

/// Un échange élémentaire, attribué à une venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapLeg {
    pub amm: String,
}

impl SwapLeg {
    pub fn new(amm: impl Into<String>) -> Self {
        Self { amm: amm.into() }
    }
}

/// Résultat du décodage d'une transaction de swap.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapResult {
    pub swap_legs: Vec<SwapLeg>,
    /// Montant réellement reçu (unités de base du token de sortie).
    pub out_amount: Option<u64>,
    /// Montant promis par le quote.
    pub exact_out_amount: Option<u64>,
    pub out_amount_usd: f64,
    pub exact_out_amount_usd: f64,
}

/// Décode une transaction en swap. `Ok(None)` = rien à décoder (pas une erreur).
#[async_trait]
pub trait SwapExtractor: Send + Sync {
    async fn extract(
        &self,
        signature: &Signature,
        accounts: &dyn AccountInfoProvider,
        transaction: &HistoricalTransaction,
        block_time: Option<i64>,
    ) -> Result<Option<SwapResult>>;
}
