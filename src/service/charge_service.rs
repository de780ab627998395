use std::sync::Arc;
use uuid::Uuid;

use super::state_machine::ChargeStateMachine;
use crate::{
    domain::*,
    error::{AppError, Result},
    payments::qr,
    repository::{ChargeRepository, RefundRepository, WebhookDeliveryRepository},
};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// The operations exposed to API callers. Status changes are delegated to the
/// state machine; this layer adds idempotency, lookups and presentation.
pub struct ChargeService {
    machine: Arc<ChargeStateMachine>,
    charges: Arc<dyn ChargeRepository>,
    refunds: Arc<dyn RefundRepository>,
    deliveries: Arc<dyn WebhookDeliveryRepository>,
}

/// What an idempotent replay must match to return the stored charge.
struct RequestFingerprint {
    amount: i64,
    currency: String,
    payment_method: PaymentMethod,
    invoice: bool,
}

impl RequestFingerprint {
    fn matches(&self, charge: &Charge) -> bool {
        charge.amount == self.amount
            && charge.currency == self.currency
            && charge.payment_method == self.payment_method
            && charge.invoice_id.is_some() == self.invoice
    }
}

impl ChargeService {
    pub fn new(
        machine: Arc<ChargeStateMachine>,
        charges: Arc<dyn ChargeRepository>,
        refunds: Arc<dyn RefundRepository>,
        deliveries: Arc<dyn WebhookDeliveryRepository>,
    ) -> Self {
        Self {
            machine,
            charges,
            refunds,
            deliveries,
        }
    }

    pub async fn create_charge(&self, request: CreateChargeRequest) -> Result<Charge> {
        self.create(request, false).await
    }

    pub async fn create_invoice(&self, request: CreateChargeRequest) -> Result<Invoice> {
        self.create(request, true).await.map(Invoice::from)
    }

    async fn create(&self, request: CreateChargeRequest, invoice: bool) -> Result<Charge> {
        let Some(key) = request.idempotency_key.clone() else {
            return self.machine.create(request, invoice).await;
        };

        if key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(AppError::Validation(format!(
                "idempotency key must be 1-{} characters",
                MAX_IDEMPOTENCY_KEY_LEN
            )));
        }

        let fingerprint = RequestFingerprint {
            amount: request.amount,
            currency: request.currency.trim().to_uppercase(),
            payment_method: request.payment_method,
            invoice,
        };

        if let Some(existing) = self.charges.find_by_idempotency_key(&key).await? {
            return Self::replay(existing, &fingerprint, &key);
        }

        match self.machine.create(request, invoice).await {
            // Lost a race with a concurrent request carrying the same key.
            Err(AppError::Conflict(msg)) => match self.charges.find_by_idempotency_key(&key).await? {
                Some(existing) => Self::replay(existing, &fingerprint, &key),
                None => Err(AppError::Conflict(msg)),
            },
            other => other,
        }
    }

    fn replay(existing: Charge, fingerprint: &RequestFingerprint, key: &str) -> Result<Charge> {
        if fingerprint.matches(&existing) {
            tracing::debug!(charge_id = %existing.id, "idempotent replay");
            Ok(existing)
        } else {
            Err(AppError::Conflict(format!(
                "idempotency key '{}' was already used with different parameters",
                key
            )))
        }
    }

    pub async fn get_charge(&self, id: Uuid) -> Result<Charge> {
        self.charges.get(id).await
    }

    pub async fn get_invoice(&self, invoice_id: &str) -> Result<Invoice> {
        self.charges
            .find_by_invoice_id(invoice_id)
            .await?
            .map(Invoice::from)
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", invoice_id)))
    }

    pub async fn list_charges(&self, filter: ChargeFilter) -> Result<Vec<Charge>> {
        self.charges.list(&filter).await
    }

    /// Advances the charge if a transition is due and returns its current state.
    pub async fn poll_status(&self, id: Uuid) -> Result<Charge> {
        self.machine.advance(id).await
    }

    pub async fn cancel_charge(&self, id: Uuid) -> Result<Charge> {
        self.machine.cancel(id).await
    }

    pub async fn fail_charge(&self, id: Uuid, reason: &str) -> Result<Charge> {
        self.machine.fail(id, reason).await
    }

    pub async fn record_confirmations(
        &self,
        id: Uuid,
        depth: u32,
        allow_overflow: bool,
    ) -> Result<Charge> {
        self.machine
            .record_confirmations(id, depth, allow_overflow)
            .await
    }

    pub async fn create_refund(
        &self,
        id: Uuid,
        amount: i64,
        reason: RefundReason,
    ) -> Result<(Charge, Refund)> {
        self.machine.refund(id, amount, reason).await
    }

    pub async fn list_refunds(&self, id: Uuid) -> Result<Vec<Refund>> {
        self.charges.get(id).await?;
        self.refunds.list_by_charge(id).await
    }

    pub async fn list_deliveries(&self, id: Uuid) -> Result<Vec<WebhookDeliveryRecord>> {
        self.charges.get(id).await?;
        self.deliveries.list_by_charge(id).await
    }

    /// SVG rendering of the charge's QR payload, for Pix and crypto charges.
    pub async fn qr_svg(&self, id: Uuid) -> Result<String> {
        let charge = self.charges.get(id).await?;
        let payload = charge
            .instructions
            .and_then(|i| i.qr_payload)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "{} charges have no QR code",
                    charge.payment_method
                ))
            })?;
        qr::render_svg(&payload)
    }
}
