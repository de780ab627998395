use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Settlement rail a charge is paid through. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
    DebitCard,
    Boleto,
    Bitcoin,
    Ethereum,
    Usdt,
    Solana,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodFamily {
    InstantTransfer,
    Card,
    BankSlip,
    Crypto,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 8] = [
        PaymentMethod::Pix,
        PaymentMethod::CreditCard,
        PaymentMethod::DebitCard,
        PaymentMethod::Boleto,
        PaymentMethod::Bitcoin,
        PaymentMethod::Ethereum,
        PaymentMethod::Usdt,
        PaymentMethod::Solana,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::Boleto => "boleto",
            PaymentMethod::Bitcoin => "bitcoin",
            PaymentMethod::Ethereum => "ethereum",
            PaymentMethod::Usdt => "usdt",
            PaymentMethod::Solana => "solana",
        }
    }

    pub fn family(&self) -> MethodFamily {
        match self {
            PaymentMethod::Pix => MethodFamily::InstantTransfer,
            PaymentMethod::CreditCard | PaymentMethod::DebitCard => MethodFamily::Card,
            PaymentMethod::Boleto => MethodFamily::BankSlip,
            PaymentMethod::Bitcoin
            | PaymentMethod::Ethereum
            | PaymentMethod::Usdt
            | PaymentMethod::Solana => MethodFamily::Crypto,
        }
    }

    pub fn is_crypto(&self) -> bool {
        self.family() == MethodFamily::Crypto
    }

    pub fn is_card(&self) -> bool {
        self.family() == MethodFamily::Card
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AppError::UnsupportedMethod(s.to_string()))
    }
}
