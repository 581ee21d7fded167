// DANS : src/rpc/mod.rs

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::{account::Account, pubkey::Pubkey, signature::Signature};

pub mod resilient_client;
pub mod transaction;

pub use resilient_client::ResilientRpcClient;
pub use transaction::{HistoricalTransaction, SignatureRecord};

/// L'historique d'une adresse, tel que le pipeline le consomme.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Signatures les plus récentes d'abord, au plus `limit`, strictement
    /// plus anciennes que `before` quand il est fourni.
    async fn list_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
        before: Option<Signature>,
    ) -> Result<Vec<SignatureRecord>>;

    /// Une entrée par signature, dans l'ordre d'entrée. `None` si le nœud ne
    /// connaît pas la transaction.
    async fn get_transactions(&self, signatures: &[Signature]) -> Result<Vec<Option<HistoricalTransaction>>>;
}

/// Lecture groupée de comptes (une entrée par clé, dans l'ordre d'entrée).
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn get_accounts_info(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>>;
}
