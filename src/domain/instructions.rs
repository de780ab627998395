use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payer-facing view of how to settle a charge. Derived from the charge,
/// never edited independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInstructions {
    pub title: String,
    pub steps: Vec<String>,
    pub qr_payload: Option<String>,
    pub payment_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub details: Option<RailDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RailDetails {
    BankDetails(BankDetails),
    CryptoDetails(CryptoDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankDetails {
    pub beneficiary: String,
    pub pix_key: Option<String>,
    pub digitable_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoDetails {
    pub address: String,
    pub amount: Decimal,
    pub symbol: String,
    pub network: String,
    pub confirmations_needed: u32,
}
