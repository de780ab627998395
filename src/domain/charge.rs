use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{PaymentInstructions, PaymentMethod};
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Charge {
    pub id: Uuid,
    /// Minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: ChargeStatus,
    pub customer_name: String,
    pub customer_email: String,
    pub description: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub fee: i64,
    pub net_amount: i64,
    #[serde(default)]
    pub refunded_amount: i64,
    pub crypto: Option<CryptoPayment>,
    pub invoice_id: Option<String>,
    pub payment_url: Option<String>,
    pub instructions: Option<PaymentInstructions>,
    pub idempotency_key: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub captured_amount: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Charge {
    /// What can still be refunded, bounded by the merchant's net amount.
    pub fn refundable_amount(&self) -> i64 {
        (self.net_amount - self.refunded_amount).max(0)
    }
}

/// Crypto-rail fields attached to a charge at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoPayment {
    pub address: String,
    pub amount: Decimal,
    pub symbol: String,
    pub network: String,
    pub confirmations: u32,
    pub required_confirmations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "pending",
            ChargeStatus::Processing => "processing",
            ChargeStatus::Completed => "completed",
            ChargeStatus::Failed => "failed",
            ChargeStatus::Cancelled => "cancelled",
            ChargeStatus::Refunded => "refunded",
            ChargeStatus::PartiallyRefunded => "partially_refunded",
        }
    }

    /// Edges of the charge lifecycle. Anything not listed is illegal.
    pub fn can_transition_to(&self, next: ChargeStatus) -> bool {
        use ChargeStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Refunded)
                | (Completed, PartiallyRefunded)
                | (PartiallyRefunded, PartiallyRefunded)
                | (PartiallyRefunded, Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChargeStatus::Failed | ChargeStatus::Cancelled | ChargeStatus::Refunded
        )
    }

    /// Still waiting on settlement; these are what the background worker advances.
    pub fn is_open(&self) -> bool {
        matches!(self, ChargeStatus::Pending | ChargeStatus::Processing)
    }

    pub fn is_refundable(&self) -> bool {
        matches!(
            self,
            ChargeStatus::Completed | ChargeStatus::PartiallyRefunded
        )
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChargeStatus::Pending),
            "processing" => Ok(ChargeStatus::Processing),
            "completed" => Ok(ChargeStatus::Completed),
            "failed" => Ok(ChargeStatus::Failed),
            "cancelled" => Ok(ChargeStatus::Cancelled),
            "refunded" => Ok(ChargeStatus::Refunded),
            "partially_refunded" => Ok(ChargeStatus::PartiallyRefunded),
            _ => Err(AppError::BadRequest(format!("Invalid charge status: {}", s))),
        }
    }
}

/// Opaque caller-supplied key/value data. Always a JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Map<String, Value>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl TryFrom<Value> for Metadata {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::default()),
            _ => Err(AppError::Validation(
                "metadata must be a JSON object".to_string(),
            )),
        }
    }
}

/// Input for creating a charge or an invoice.
#[derive(Debug, Clone)]
pub struct CreateChargeRequest {
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub customer_name: String,
    pub customer_email: String,
    pub description: Option<String>,
    pub webhook_url: Option<String>,
    pub metadata: Metadata,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ChargeFilter {
    /// Case-insensitive substring of customer name or email.
    pub customer: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub status: Option<ChargeStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
