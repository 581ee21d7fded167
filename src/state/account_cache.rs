// DANS : src/state/account_cache.rs

use crate::decoders::AccountInfoProvider;
use crate::monitoring::metrics;
use crate::rpc::AccountSource;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_sdk::{account::Account, pubkey::Pubkey};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::Mutex, time::sleep};
use tracing::debug;

/// Contexte attaché aux échecs réseau du cache. Reste retrouvable par
/// `downcast_ref` même après d'autres couches de contexte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountFetchError {
    pub keys: usize,
}

impl std::fmt::Display for AccountFetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "échec de getMultipleAccounts pour {} clés", self.keys)
    }
}

impl std::error::Error for AccountFetchError {}

/// Cache de comptes en ajout seul : une clé lue une fois n'est jamais
/// relue ni invalidée pendant la durée du processus. `None` = compte absent.
pub struct AccountInfoCache {
    source: Arc<dyn AccountSource>,
    delay: Duration,
    cache: Mutex<HashMap<Pubkey, Option<Account>>>,
}

impl AccountInfoCache {
    /// `delay` est attendu après chaque appel réseau (jamais sur un HIT complet).
    pub fn new(source: Arc<dyn AccountSource>, delay: Duration) -> Self {
        Self {
            source,
            delay,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.lock().await.is_empty()
    }

    /// Une entrée par clé, dans l'ordre d'entrée. Au plus un appel réseau,
    /// uniquement pour les clés encore inconnues.
    pub async fn batch_get(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        // Le verrou couvre lecture + appel + écriture : deux appelants
        // concurrents ne peuvent pas demander la même clé manquante.
        let mut cache = self.cache.lock().await;

        let mut seen = HashSet::new();
        let missing: Vec<Pubkey> = keys
            .iter()
            .filter(|key| !cache.contains_key(*key))
            .filter(|key| seen.insert(**key))
            .copied()
            .collect();

        let hits = keys.len() - keys.iter().filter(|k| seen.contains(*k)).count();
        metrics::ACCOUNT_CACHE_LOOKUPS.with_label_values(&["hit"]).inc_by(hits as u64);

        if !missing.is_empty() {
            metrics::ACCOUNT_CACHE_LOOKUPS.with_label_values(&["miss"]).inc_by(missing.len() as u64);
            debug!(missing = missing.len(), requested = keys.len(), "[AccountCache] MISS, chargement via RPC.");

            let infos = self
                .source
                .get_accounts_info(&missing)
                .await
                .map_err(|e| e.context(AccountFetchError { keys: missing.len() }))?;
            if infos.len() != missing.len() {
                return Err(anyhow!(
                    "getMultipleAccounts a renvoyé {} comptes pour {} clés demandées",
                    infos.len(),
                    missing.len()
                )
                .context(AccountFetchError { keys: missing.len() }));
            }
            for (key, info) in missing.into_iter().zip(infos) {
                cache.insert(key, info);
            }

            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
        }

        Ok(keys
            .iter()
            .map(|key| cache.get(key).cloned().flatten())
            .collect())
    }
}

#[async_trait]
impl AccountInfoProvider for AccountInfoCache {
    async fn get_multiple_accounts_info(&self, keys: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        self.batch_get(keys).await
    }
}
