use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::*;
use crate::error::{AppError, Result};

pub mod charge_repository;
pub mod refund_repository;
pub mod webhook_delivery_repository;

pub use charge_repository::SqliteChargeRepository;
pub use refund_repository::SqliteRefundRepository;
pub use webhook_delivery_repository::SqliteWebhookDeliveryRepository;

/// Keyed charge storage. Writes are last-write-wins per id; every read
/// returns a fresh copy.
#[async_trait]
pub trait ChargeRepository: Send + Sync {
    async fn put(&self, charge: &Charge) -> Result<()>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Charge>>;
    async fn find_by_invoice_id(&self, invoice_id: &str) -> Result<Option<Charge>>;
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Charge>>;
    /// Most recent first.
    async fn list(&self, filter: &ChargeFilter) -> Result<Vec<Charge>>;
    /// Stores the refund and the updated charge in one transaction.
    async fn put_with_refund(&self, charge: &Charge, refund: &Refund) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Charge> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Charge {} not found", id)))
    }
}

#[async_trait]
pub trait RefundRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>>;
    async fn list_by_charge(&self, charge_id: Uuid) -> Result<Vec<Refund>>;
}

/// Append-only log of webhook delivery attempts.
#[async_trait]
pub trait WebhookDeliveryRepository: Send + Sync {
    async fn append(&self, record: &WebhookDeliveryRecord) -> Result<()>;
    /// Oldest first.
    async fn list_by_charge(&self, charge_id: Uuid) -> Result<Vec<WebhookDeliveryRecord>>;
    async fn list_by_event(&self, event_id: &str) -> Result<Vec<WebhookDeliveryRecord>>;
}
