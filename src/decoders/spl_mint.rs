// src/decoders/spl_mint.rs

use super::AccountInfoProvider;
use anyhow::{anyhow, bail, Context, Result};
use solana_sdk::{account::Account, pubkey, pubkey::Pubkey};
use spl_token_2022::{extension::StateWithExtensions, state::Mint};

pub const SPL_TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMint {
    pub address: Pubkey,
    pub token_program: Pubkey,
    pub decimals: u8,
}

/// Décode un compte de mint (SPL Token ou Token-2022).
pub fn decode_mint(address: &Pubkey, account: &Account) -> Result<DecodedMint> {
    if account.owner != SPL_TOKEN_PROGRAM_ID && account.owner != spl_token_2022::ID {
        bail!("Le compte {} n'appartient pas à un programme de token ({})", address, account.owner);
    }

    // StateWithExtensions lit aussi bien les anciens mints (82 octets) que
    // les mints Token-2022 avec extensions.
    let mint_state = StateWithExtensions::<Mint>::unpack(&account.data)
        .map_err(|e| anyhow!("Mint {} illisible : {}", address, e))?;

    Ok(DecodedMint {
        address: *address,
        token_program: account.owner,
        decimals: mint_state.base.decimals,
    })
}

/// Lit un mint via le provider de comptes (donc via le cache).
pub async fn fetch_mint(accounts: &dyn AccountInfoProvider, mint: &Pubkey) -> Result<DecodedMint> {
    let infos = accounts
        .get_multiple_accounts_info(std::slice::from_ref(mint))
        .await
        .with_context(|| format!("Échec de la lecture du mint {}", mint))?;
    let account = infos
        .into_iter()
        .next()
        .flatten()
        .ok_or_else(|| anyhow!("Mint {} introuvable", mint))?;
    decode_mint(mint, &account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::program_pack::Pack;
    use spl_token_2022::state::Mint as MintState;

    fn legacy_mint_account(decimals: u8) -> Account {
        let mut data = vec![0u8; MintState::LEN];
        let state = MintState {
            decimals,
            is_initialized: true,
            ..MintState::default()
        };
        MintState::pack(state, &mut data).unwrap();
        Account {
            lamports: 1,
            data,
            owner: SPL_TOKEN_PROGRAM_ID,
            ..Account::default()
        }
    }

    #[test]
    fn decodes_legacy_mint_decimals() {
        let address = Pubkey::new_unique();
        let mint = decode_mint(&address, &legacy_mint_account(6)).unwrap();
        assert_eq!(mint.decimals, 6);
        assert_eq!(mint.token_program, SPL_TOKEN_PROGRAM_ID);
    }

    #[test]
    fn rejects_accounts_not_owned_by_a_token_program() {
        let mut account = legacy_mint_account(9);
        account.owner = Pubkey::new_unique();
        assert!(decode_mint(&Pubkey::new_unique(), &account).is_err());
    }
}
