use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Charge, ChargeStatus};
use crate::error::AppError;

/// Event names delivered to subscribers, `charge.<status>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "charge.pending")]
    ChargePending,
    #[serde(rename = "charge.processing")]
    ChargeProcessing,
    #[serde(rename = "charge.completed")]
    ChargeCompleted,
    #[serde(rename = "charge.failed")]
    ChargeFailed,
    #[serde(rename = "charge.cancelled")]
    ChargeCancelled,
    /// Sent for partial and full refunds alike; `data.object.status` tells them apart.
    #[serde(rename = "charge.refunded")]
    ChargeRefunded,
}

impl EventType {
    /// Partial and full refunds share one event name.
    pub fn for_status(status: ChargeStatus) -> Self {
        match status {
            ChargeStatus::Pending => EventType::ChargePending,
            ChargeStatus::Processing => EventType::ChargeProcessing,
            ChargeStatus::Completed => EventType::ChargeCompleted,
            ChargeStatus::Failed => EventType::ChargeFailed,
            ChargeStatus::Cancelled => EventType::ChargeCancelled,
            ChargeStatus::Refunded | ChargeStatus::PartiallyRefunded => EventType::ChargeRefunded,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ChargePending => "charge.pending",
            EventType::ChargeProcessing => "charge.processing",
            EventType::ChargeCompleted => "charge.completed",
            EventType::ChargeFailed => "charge.failed",
            EventType::ChargeCancelled => "charge.cancelled",
            EventType::ChargeRefunded => "charge.refunded",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "charge.pending" => Ok(EventType::ChargePending),
            "charge.processing" => Ok(EventType::ChargeProcessing),
            "charge.completed" => Ok(EventType::ChargeCompleted),
            "charge.failed" => Ok(EventType::ChargeFailed),
            "charge.cancelled" => Ok(EventType::ChargeCancelled),
            "charge.refunded" => Ok(EventType::ChargeRefunded),
            _ => Err(AppError::Database(format!("Invalid event type: {}", s))),
        }
    }
}

/// Envelope POSTed to a charge's webhook URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: EventData,
    /// Unix seconds.
    pub created: i64,
    pub livemode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    pub object: Charge,
}

impl WebhookEvent {
    pub fn new(charge: Charge, event_type: EventType, created: DateTime<Utc>, livemode: bool) -> Self {
        Self {
            id: format!("evt_{}", Uuid::new_v4().simple()),
            event_type,
            data: EventData { object: charge },
            created: created.timestamp(),
            livemode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Failed => "failed",
        }
    }
}

impl FromStr for DeliveryOutcome {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivered" => Ok(DeliveryOutcome::Delivered),
            "failed" => Ok(DeliveryOutcome::Failed),
            _ => Err(AppError::Database(format!("Invalid delivery outcome: {}", s))),
        }
    }
}

/// One delivery attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDeliveryRecord {
    pub id: Uuid,
    pub event_id: String,
    pub charge_id: Uuid,
    pub url: String,
    pub event_type: EventType,
    pub payload: String,
    pub signature: String,
    pub attempt: u32,
    pub outcome: DeliveryOutcome,
    pub response_code: Option<u16>,
    pub error: Option<String>,
    /// Set on the last failed attempt once retries are exhausted.
    pub permanent: bool,
    pub attempted_at: DateTime<Utc>,
}
