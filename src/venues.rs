// DANS : src/venues.rs

use anyhow::{anyhow, Result};
use solana_sdk::{pubkey, pubkey::Pubkey};
use std::{fmt, str::FromStr};

/// Programme routeur de Jupiter v6. Seules les transactions qui l'appellent
/// au premier niveau sont décodées.
pub const JUPITER_V6_PROGRAM_ID: Pubkey = pubkey!("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4");

/// Les venues (AMM) dont on mesure le ratio output / quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    Obric,
    LifinityV2,
    SolFi,
}

impl Venue {
    pub const ALL: [Venue; 3] = [Venue::Obric, Venue::LifinityV2, Venue::SolFi];

    /// Clé de sélection (argument du binaire / ANALYZE_TARGET).
    pub fn key(&self) -> &'static str {
        match self {
            Venue::Obric => "obric",
            Venue::LifinityV2 => "lifinity",
            Venue::SolFi => "solfi",
        }
    }

    /// Nom utilisé par le décodeur pour étiqueter un swap leg.
    pub fn display_name(&self) -> &'static str {
        match self {
            Venue::Obric => "Obric",
            Venue::LifinityV2 => "Lifinity v2",
            Venue::SolFi => "SolFi",
        }
    }

    pub fn address(&self) -> Pubkey {
        match self {
            Venue::Obric => pubkey!("AvBSC1KmFNceHpD6jyyXBV6gMXFxZ8BJJ3HVUN8kCurJ"),
            Venue::LifinityV2 => pubkey!("Gkt4BpMRFxhhrrVMQsewM74ggriAbxyN2yUYDD9qt1NV"),
            Venue::SolFi => pubkey!("3nQAMo837oPuGCGELcw2wo7C9hUUchsMWCneiPHFFdur"),
        }
    }

    pub fn from_program_id(program_id: &Pubkey) -> Option<Venue> {
        Self::ALL.into_iter().find(|v| v.address() == *program_id)
    }

    pub fn keys() -> Vec<&'static str> {
        Self::ALL.iter().map(|v| v.key()).collect()
    }
}

impl FromStr for Venue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.key() == s)
            .ok_or_else(|| anyhow!("{} n'est pas une cible valide. Cibles valides : {}", s, Self::keys().join(", ")))
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
