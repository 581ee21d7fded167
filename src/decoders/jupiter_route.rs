// src/decoders/jupiter_route.rs

use super::{spl_mint, AccountInfoProvider, PriceSource, SwapExtractor, SwapLeg, SwapResult};
use crate::rpc::{transaction::TransactionInstruction, HistoricalTransaction};
use crate::venues::{Venue, JUPITER_V6_PROGRAM_ID};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_sdk::{pubkey, pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use tracing::trace;

pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

const ROUTE: [u8; 8] = [229, 23, 203, 151, 122, 227, 173, 42];
const ROUTE_WITH_TOKEN_LEDGER: [u8; 8] = [150, 86, 71, 116, 167, 93, 14, 104];
const SHARED_ACCOUNTS_ROUTE: [u8; 8] = [193, 32, 155, 51, 65, 214, 156, 129];
const SHARED_ACCOUNTS_ROUTE_WITH_TOKEN_LEDGER: [u8; 8] = [230, 121, 143, 80, 119, 159, 106, 170];

/// Programmes appelés par le routeur qui ne sont pas des venues.
const NON_VENUE_PROGRAMS: [Pubkey; 6] = [
    spl_mint::SPL_TOKEN_PROGRAM_ID,
    pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb"),
    pubkey!("11111111111111111111111111111111"),
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"),
    pubkey!("ComputeBudget111111111111111111111111111111"),
    JUPITER_V6_PROGRAM_ID,
];

/// `quoted_out_amount: u64` précède toujours `slippage_bps: u16, platform_fee_bps: u8`
/// à la fin des arguments des routes exact-in.
const ARGS_TAIL_LEN: usize = 8 + 2 + 1;

/// Variante d'instruction exact-in reconnue, avec la position de ses comptes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Route,
    RouteWithTokenLedger,
    SharedAccountsRoute,
    SharedAccountsRouteWithTokenLedger,
}

impl RouteKind {
    pub fn from_data(data: &[u8]) -> Option<Self> {
        let discriminator: [u8; 8] = data.get(..8)?.try_into().ok()?;
        match discriminator {
            ROUTE => Some(RouteKind::Route),
            ROUTE_WITH_TOKEN_LEDGER => Some(RouteKind::RouteWithTokenLedger),
            SHARED_ACCOUNTS_ROUTE => Some(RouteKind::SharedAccountsRoute),
            SHARED_ACCOUNTS_ROUTE_WITH_TOKEN_LEDGER => Some(RouteKind::SharedAccountsRouteWithTokenLedger),
            _ => None,
        }
    }

    fn user_transfer_authority_index(&self) -> usize {
        match self {
            RouteKind::Route | RouteKind::RouteWithTokenLedger => 1,
            RouteKind::SharedAccountsRoute | RouteKind::SharedAccountsRouteWithTokenLedger => 2,
        }
    }

    fn destination_mint_index(&self) -> usize {
        match self {
            RouteKind::Route | RouteKind::RouteWithTokenLedger => 5,
            RouteKind::SharedAccountsRoute | RouteKind::SharedAccountsRouteWithTokenLedger => 8,
        }
    }
}

/// Lit `quoted_out_amount` à la fin des données d'instruction.
pub fn quoted_out_amount(data: &[u8]) -> Result<u64> {
    // discriminant + longueur du route_plan (u32) + fin des arguments
    if data.len() < 8 + 4 + ARGS_TAIL_LEN {
        return Err(anyhow!("Données de route trop courtes ({} octets)", data.len()));
    }
    let start = data.len() - ARGS_TAIL_LEN;
    let bytes: [u8; 8] = data[start..start + 8].try_into()?;
    Ok(u64::from_le_bytes(bytes))
}

/// Somme des variations (post - pre) des comptes de `owner` pour `mint`.
/// `None` si aucun compte ne correspond ou si la variation n'est pas positive.
pub fn token_balance_increase(tx: &HistoricalTransaction, owner: &Pubkey, mint: &Pubkey) -> Option<u64> {
    let mut matched = false;
    let mut delta: i128 = 0;
    for post in tx
        .post_token_balances
        .iter()
        .filter(|b| b.mint == *mint && b.owner.as_ref() == Some(owner))
    {
        matched = true;
        let pre = tx
            .pre_token_balances
            .iter()
            .find(|b| b.account_index == post.account_index)
            .map(|b| b.amount)
            .unwrap_or(0);
        delta += post.amount as i128 - pre as i128;
    }
    if !matched || delta <= 0 {
        return None;
    }
    u64::try_from(delta).ok()
}

/// Variation de lamports de `owner`, frais rendus s'il est le payeur.
pub fn lamport_increase(tx: &HistoricalTransaction, owner: &Pubkey) -> Option<u64> {
    let index = tx.account_index(owner)?;
    let pre = *tx.pre_balances.get(index)? as i128;
    let post = *tx.post_balances.get(index)? as i128;
    let fee = if index == 0 { tx.fee as i128 } else { 0 };
    let delta = post - pre + fee;
    if delta <= 0 {
        return None;
    }
    u64::try_from(delta).ok()
}

/// Les venues appelées directement par l'instruction de route.
pub fn swap_legs(route_ix: &TransactionInstruction) -> Vec<SwapLeg> {
    let has_stack_height = route_ix.inner.iter().any(|ix| ix.stack_height.is_some());
    route_ix
        .inner
        .iter()
        // Sans stack_height (anciennes transactions), on garde tous les appels.
        .filter(|ix| !has_stack_height || ix.stack_height == Some(2))
        .filter(|ix| !NON_VENUE_PROGRAMS.contains(&ix.program_id))
        .map(|ix| match Venue::from_program_id(&ix.program_id) {
            Some(venue) => SwapLeg::new(venue.display_name()),
            None => SwapLeg::new(ix.program_id.to_string()),
        })
        .collect()
}

/// Décodeur des routes exact-in de Jupiter v6 : quote lu dans les arguments,
/// montant réalisé lu dans les soldes de la transaction.
///
/// Les deux montants sont valorisés au prix USD courant du mint de sortie, pas
/// au prix à `block_time` : le ratio d'un swap n'en dépend pas, mais le poids
/// relatif des swaps de mints différents dans les sommes USD, si.
pub struct JupiterRouteExtractor {
    prices: Arc<dyn PriceSource>,
}

impl JupiterRouteExtractor {
    pub fn new(prices: Arc<dyn PriceSource>) -> Self {
        Self { prices }
    }

    async fn to_usd(&self, accounts: &dyn AccountInfoProvider, mint: &Pubkey, amount: u64) -> Result<Option<f64>> {
        let Some(price) = self.prices.usd_price(mint).await? else {
            return Ok(None);
        };
        let decoded = spl_mint::fetch_mint(accounts, mint).await?;
        Ok(Some(amount as f64 / 10f64.powi(decoded.decimals as i32) * price))
    }
}

#[async_trait]
impl SwapExtractor for JupiterRouteExtractor {
    async fn extract(
        &self,
        signature: &Signature,
        accounts: &dyn AccountInfoProvider,
        transaction: &HistoricalTransaction,
        _block_time: Option<i64>,
    ) -> Result<Option<SwapResult>> {
        let Some((route_ix, kind)) = transaction
            .instructions
            .iter()
            .filter(|ix| ix.program_id == JUPITER_V6_PROGRAM_ID)
            .find_map(|ix| RouteKind::from_data(&ix.data).map(|kind| (ix, kind)))
        else {
            trace!(%signature, "[Jupiter] Aucune route exact-in.");
            return Ok(None);
        };

        let user = route_ix
            .accounts
            .get(kind.user_transfer_authority_index())
            .ok_or_else(|| anyhow!("{:?} sans user_transfer_authority ({})", kind, signature))?;
        let destination_mint = route_ix
            .accounts
            .get(kind.destination_mint_index())
            .ok_or_else(|| anyhow!("{:?} sans destination_mint ({})", kind, signature))?;

        let exact_out_amount = quoted_out_amount(&route_ix.data)?;
        let out_amount = token_balance_increase(transaction, user, destination_mint).or_else(|| {
            (*destination_mint == WSOL_MINT)
                .then(|| lamport_increase(transaction, user))
                .flatten()
        });

        let mut result = SwapResult {
            swap_legs: swap_legs(route_ix),
            out_amount,
            exact_out_amount: Some(exact_out_amount),
            out_amount_usd: 0.0,
            exact_out_amount_usd: 0.0,
        };

        // Inutile de valoriser un swap que l'agrégateur rejettera.
        let Some(out_amount) = out_amount else {
            return Ok(Some(result));
        };
        let (Some(out_usd), Some(exact_usd)) = (
            self.to_usd(accounts, destination_mint, out_amount).await?,
            self.to_usd(accounts, destination_mint, exact_out_amount).await?,
        ) else {
            trace!(%signature, mint = %destination_mint, "[Jupiter] Prix inconnu, swap ignoré.");
            return Ok(None);
        };
        result.out_amount_usd = out_usd;
        result.exact_out_amount_usd = exact_usd;
        Ok(Some(result))
    }
}
