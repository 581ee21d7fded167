// DANS : src/rpc/transaction.rs

use crate::monitoring::metrics;
use anyhow::{anyhow, Context, Result};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, UiInnerInstructions, UiInstruction,
    UiLoadedAddresses, UiTransactionTokenBalance,
};
use std::{collections::HashMap, str::FromStr};
use tracing::warn;

/// Une entrée de getSignaturesForAddress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    pub signature: Signature,
    pub block_time: Option<i64>,
    pub failed: bool,
}

/// Une instruction appelée par une instruction de premier niveau.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerInstruction {
    pub program_id: Pubkey,
    /// 2 = appelée directement par l'instruction de premier niveau.
    pub stack_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<Pubkey>,
    pub data: Vec<u8>,
    pub inner: Vec<InnerInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub account_index: u8,
    pub mint: Pubkey,
    pub owner: Option<Pubkey>,
    pub amount: u64,
}

/// Transaction historique, déjà résolue (clés chargées via LUT incluses).
/// Immuable une fois récupérée.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoricalTransaction {
    pub signatures: Vec<Signature>,
    pub account_keys: Vec<Pubkey>,
    pub instructions: Vec<TransactionInstruction>,
    pub err: Option<String>,
    pub block_time: Option<i64>,
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

impl HistoricalTransaction {
    pub fn first_signature(&self) -> Option<&Signature> {
        self.signatures.first()
    }

    pub fn is_failed(&self) -> bool {
        self.err.is_some()
    }

    /// Vrai si au moins une instruction de premier niveau cible `program_id`.
    pub fn invokes_program(&self, program_id: &Pubkey) -> bool {
        self.instructions.iter().any(|ix| ix.program_id == *program_id)
    }

    pub fn account_index(&self, key: &Pubkey) -> Option<usize> {
        self.account_keys.iter().position(|k| k == key)
    }

    /// Comme `from_encoded`, mais une réponse inexploitable est ignorée (avec
    /// un warning) au lieu d'interrompre l'analyse.
    pub fn from_encoded_or_skip(signature: &Signature, encoded: EncodedConfirmedTransactionWithStatusMeta) -> Option<Self> {
        match Self::from_encoded(signature, encoded) {
            Ok(transaction) => Some(transaction),
            Err(e) => {
                metrics::TRANSACTIONS_UNDECODABLE.inc();
                warn!(%signature, error = %format!("{:#}", e), "[RPC] Transaction illisible, ignorée.");
                None
            }
        }
    }

    /// Convertit la réponse brute de getTransaction (encodage base64).
    pub fn from_encoded(signature: &Signature, encoded: EncodedConfirmedTransactionWithStatusMeta) -> Result<Self> {
        let versioned = encoded
            .transaction
            .transaction
            .decode()
            .ok_or_else(|| anyhow!("Transaction {} non décodable", signature))?;
        let meta = encoded
            .transaction
            .meta
            .ok_or_else(|| anyhow!("Meta absente pour la transaction {}", signature))?;

        let mut account_keys = versioned.message.static_account_keys().to_vec();
        let loaded: Option<UiLoadedAddresses> = meta.loaded_addresses.into();
        if let Some(loaded) = loaded {
            for key in loaded.writable.iter().chain(loaded.readonly.iter()) {
                account_keys.push(parse_pubkey(key)?);
            }
        }

        let inner_sets: Option<Vec<UiInnerInstructions>> = meta.inner_instructions.into();
        let mut inner_by_index: HashMap<u8, Vec<InnerInstruction>> = HashMap::new();
        for set in inner_sets.unwrap_or_default() {
            let mut inner = Vec::with_capacity(set.instructions.len());
            for ix in set.instructions {
                // En base64, les instructions internes arrivent toujours compilées.
                if let UiInstruction::Compiled(compiled) = ix {
                    inner.push(InnerInstruction {
                        program_id: key_at(&account_keys, compiled.program_id_index)?,
                        stack_height: compiled.stack_height,
                    });
                }
            }
            inner_by_index.insert(set.index, inner);
        }

        let mut instructions = Vec::with_capacity(versioned.message.instructions().len());
        for (i, ix) in versioned.message.instructions().iter().enumerate() {
            let accounts = ix
                .accounts
                .iter()
                .map(|index| key_at(&account_keys, *index))
                .collect::<Result<Vec<_>>>()?;
            instructions.push(TransactionInstruction {
                program_id: key_at(&account_keys, ix.program_id_index)?,
                accounts,
                data: ix.data.clone(),
                inner: u8::try_from(i)
                    .ok()
                    .and_then(|index| inner_by_index.remove(&index))
                    .unwrap_or_default(),
            });
        }

        let pre_token_balances: Option<Vec<UiTransactionTokenBalance>> = meta.pre_token_balances.into();
        let post_token_balances: Option<Vec<UiTransactionTokenBalance>> = meta.post_token_balances.into();

        Ok(Self {
            signatures: versioned.signatures,
            account_keys,
            instructions,
            err: meta.err.map(|e| format!("{:?}", e)),
            block_time: encoded.block_time,
            fee: meta.fee,
            pre_balances: meta.pre_balances,
            post_balances: meta.post_balances,
            pre_token_balances: convert_token_balances(pre_token_balances.unwrap_or_default())?,
            post_token_balances: convert_token_balances(post_token_balances.unwrap_or_default())?,
        })
    }
}

fn key_at(keys: &[Pubkey], index: u8) -> Result<Pubkey> {
    keys.get(index as usize)
        .copied()
        .ok_or_else(|| anyhow!("Index de compte {} hors limites ({} clés)", index, keys.len()))
}

fn parse_pubkey(raw: &str) -> Result<Pubkey> {
    Pubkey::from_str(raw).with_context(|| format!("Pubkey invalide : {}", raw))
}

fn convert_token_balances(balances: Vec<UiTransactionTokenBalance>) -> Result<Vec<TokenBalance>> {
    balances
        .into_iter()
        .map(|balance| {
            let owner: Option<String> = balance.owner.into();
            Ok(TokenBalance {
                account_index: balance.account_index,
                mint: parse_pubkey(&balance.mint)?,
                owner: owner.as_deref().map(parse_pubkey).transpose()?,
                amount: balance
                    .ui_token_amount
                    .amount
                    .parse()
                    .with_context(|| format!("Montant de token invalide : {}", balance.ui_token_amount.amount))?,
            })
        })
        .collect()
}
