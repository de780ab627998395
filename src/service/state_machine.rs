use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{clock::Clock, watcher::ConfirmationWatcher};
use crate::{
    domain::*,
    error::{AppError, Result},
    payments::{crypto, FeeEngine, InstructionGenerator, RateTable},
    repository::ChargeRepository,
    webhooks::WebhookDispatcher,
};

/// Currency the Pix and boleto rails settle in.
const DOMESTIC_CURRENCY: &str = "BRL";

/// Per-charge write locks. Entries are dropped once nobody holds them.
#[derive(Default)]
struct ChargeLocks {
    locks: Mutex<HashMap<Uuid, Weak<AsyncMutex<()>>>>,
}

impl ChargeLocks {
    async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > 1024 {
                locks.retain(|_, weak| weak.strong_count() > 0);
            }
            match locks.get(&id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }
}

/// Owns every status change a charge goes through. Each mutation runs under the
/// charge's lock, is persisted, and only then announced to the dispatcher.
pub struct ChargeStateMachine {
    charges: Arc<dyn ChargeRepository>,
    fees: Arc<FeeEngine>,
    instructions: Arc<InstructionGenerator>,
    table: Arc<RateTable>,
    dispatcher: WebhookDispatcher,
    watcher: Arc<dyn ConfirmationWatcher>,
    clock: Arc<dyn Clock>,
    locks: ChargeLocks,
}

impl ChargeStateMachine {
    pub fn new(
        charges: Arc<dyn ChargeRepository>,
        fees: Arc<FeeEngine>,
        instructions: Arc<InstructionGenerator>,
        table: Arc<RateTable>,
        dispatcher: WebhookDispatcher,
        watcher: Arc<dyn ConfirmationWatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            charges,
            fees,
            instructions,
            table,
            dispatcher,
            watcher,
            clock,
            locks: ChargeLocks::default(),
        }
    }

    /// Creates and stores a pending charge. `invoice` additionally assigns an
    /// invoice id that the payment link is keyed on.
    pub async fn create(&self, request: CreateChargeRequest, invoice: bool) -> Result<Charge> {
        let currency = request.currency.trim().to_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(AppError::Validation(format!(
                "currency must be a 3-letter ISO code, got '{}'",
                request.currency
            )));
        }
        if matches!(
            request.payment_method.family(),
            MethodFamily::InstantTransfer | MethodFamily::BankSlip
        ) && currency != DOMESTIC_CURRENCY
        {
            return Err(AppError::UnsupportedMethod(format!(
                "{} only settles in {}",
                request.payment_method, DOMESTIC_CURRENCY
            )));
        }

        let breakdown = self.fees.breakdown(request.amount, request.payment_method)?;

        let id = Uuid::new_v4();
        let now = self.clock.now();

        let crypto = if request.payment_method.is_crypto() {
            let asset = self.table.asset(request.payment_method)?;
            let amount =
                self.fees
                    .to_crypto_amount(request.amount, &currency, request.payment_method)?;
            Some(CryptoPayment {
                address: crypto::derive_address(&self.table.wallet_seed, request.payment_method, id)?,
                amount,
                symbol: asset.symbol.clone(),
                network: asset.network.clone(),
                confirmations: 0,
                required_confirmations: asset.confirmations,
            })
        } else {
            None
        };

        let invoice_id = invoice.then(|| format!("inv_{}", Uuid::new_v4().simple()));
        let reference = invoice_id.clone().unwrap_or_else(|| id.to_string());

        let mut charge = Charge {
            id,
            amount: request.amount,
            currency,
            payment_method: request.payment_method,
            status: ChargeStatus::Pending,
            customer_name: request.customer_name,
            customer_email: request.customer_email,
            description: request.description,
            webhook_url: request.webhook_url,
            metadata: request.metadata,
            fee: breakdown.fee,
            net_amount: breakdown.net_amount,
            refunded_amount: 0,
            crypto,
            invoice_id,
            payment_url: Some(self.table.payment_url(&reference)),
            instructions: None,
            idempotency_key: request.idempotency_key,
            captured_at: None,
            captured_amount: None,
            created_at: now,
            updated_at: now,
        };
        charge.instructions = Some(self.instructions.build(&charge)?);

        self.charges.put(&charge).await?;

        tracing::info!(
            charge_id = %charge.id,
            method = %charge.payment_method,
            amount = charge.amount,
            fee = charge.fee,
            "charge created"
        );
        self.dispatcher.dispatch(&charge, EventType::ChargePending);

        Ok(charge)
    }

    /// Applies whatever time- or network-driven transition is due. Settled and
    /// terminal charges come back unchanged.
    pub async fn advance(&self, id: Uuid) -> Result<Charge> {
        let _guard = self.locks.acquire(id).await;
        let mut charge = self.charges.get(id).await?;
        if !charge.status.is_open() {
            return Ok(charge);
        }

        let now = self.clock.now();
        let timings = &self.table.settlement;

        match charge.payment_method.family() {
            MethodFamily::InstantTransfer => {
                if elapsed_at_least(&charge, now, timings.pix_settle_secs) {
                    self.transition(&mut charge, ChargeStatus::Completed).await?;
                }
            }
            MethodFamily::Card => {
                if charge.status == ChargeStatus::Pending
                    && elapsed_at_least(&charge, now, timings.card_processing_secs)
                {
                    self.transition(&mut charge, ChargeStatus::Processing).await?;
                }
                if charge.status == ChargeStatus::Processing
                    && elapsed_at_least(&charge, now, timings.card_settle_secs)
                {
                    self.transition(&mut charge, ChargeStatus::Completed).await?;
                }
            }
            MethodFamily::BankSlip => {
                if elapsed_at_least(&charge, now, timings.boleto_settle_secs) {
                    self.transition(&mut charge, ChargeStatus::Completed).await?;
                }
            }
            MethodFamily::Crypto => match self.watcher.confirmations(&charge).await {
                Ok(Some(depth)) => self.apply_confirmations(&mut charge, depth, false).await?,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(charge_id = %charge.id, "confirmation watcher failed: {}", e);
                }
            },
        }

        Ok(charge)
    }

    /// Records the deposit's confirmation depth as reported by a network
    /// watcher. Depth never decreases and is capped at the required count
    /// unless `allow_overflow` is set.
    pub async fn record_confirmations(
        &self,
        id: Uuid,
        depth: u32,
        allow_overflow: bool,
    ) -> Result<Charge> {
        let _guard = self.locks.acquire(id).await;
        let mut charge = self.charges.get(id).await?;
        if !charge.payment_method.is_crypto() {
            return Err(AppError::InvalidState(format!(
                "{} charges have no confirmations",
                charge.payment_method
            )));
        }
        if charge.status != ChargeStatus::Pending {
            tracing::debug!(charge_id = %id, status = %charge.status, "ignoring confirmations for settled charge");
            return Ok(charge);
        }

        self.apply_confirmations(&mut charge, depth, allow_overflow).await?;
        Ok(charge)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Charge> {
        let _guard = self.locks.acquire(id).await;
        let mut charge = self.charges.get(id).await?;
        if charge.status != ChargeStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "only pending charges can be cancelled; charge is {}",
                charge.status
            )));
        }
        self.transition(&mut charge, ChargeStatus::Cancelled).await?;
        Ok(charge)
    }

    /// Marks an open charge as failed, e.g. a declined card.
    pub async fn fail(&self, id: Uuid, reason: &str) -> Result<Charge> {
        let _guard = self.locks.acquire(id).await;
        let mut charge = self.charges.get(id).await?;
        if !charge.status.is_open() {
            return Err(AppError::InvalidState(format!(
                "only open charges can fail; charge is {}",
                charge.status
            )));
        }
        tracing::warn!(charge_id = %id, reason, "charge failed");
        self.transition(&mut charge, ChargeStatus::Failed).await?;
        Ok(charge)
    }

    pub async fn refund(
        &self,
        id: Uuid,
        amount: i64,
        reason: RefundReason,
    ) -> Result<(Charge, Refund)> {
        let _guard = self.locks.acquire(id).await;
        let mut charge = self.charges.get(id).await?;

        if !charge.status.is_refundable() {
            return Err(AppError::InvalidState(format!(
                "charge is {}; only completed charges can be refunded",
                charge.status
            )));
        }
        if amount <= 0 {
            return Err(AppError::InvalidAmount(
                "refund amount must be positive".to_string(),
            ));
        }
        let refundable = charge.refundable_amount();
        if amount > refundable {
            return Err(AppError::InvalidState(format!(
                "refund of {} exceeds refundable amount {}",
                amount, refundable
            )));
        }

        let refunded_amount = charge.refunded_amount + amount;
        let next = if refunded_amount >= charge.net_amount {
            ChargeStatus::Refunded
        } else {
            ChargeStatus::PartiallyRefunded
        };
        ensure_transition(&charge, next)?;

        let now = self.clock.now();
        charge.refunded_amount = refunded_amount;
        charge.status = next;
        charge.updated_at = now;

        let refund = Refund {
            id: Uuid::new_v4(),
            charge_id: charge.id,
            amount,
            reason,
            status: RefundStatus::Succeeded,
            created_at: now,
        };

        self.charges.put_with_refund(&charge, &refund).await?;

        tracing::info!(
            charge_id = %charge.id,
            refund_id = %refund.id,
            amount,
            status = %charge.status,
            "refund recorded"
        );
        self.dispatcher.dispatch(&charge, EventType::ChargeRefunded);

        Ok((charge, refund))
    }

    async fn apply_confirmations(
        &self,
        charge: &mut Charge,
        depth: u32,
        allow_overflow: bool,
    ) -> Result<()> {
        let id = charge.id;
        let Some(payment) = charge.crypto.as_mut() else {
            return Err(AppError::Internal(format!(
                "crypto charge {} has no payment details",
                id
            )));
        };

        let mut next = depth.max(payment.confirmations);
        if !allow_overflow {
            next = next.min(payment.required_confirmations);
        }
        let changed = next != payment.confirmations;
        payment.confirmations = next;
        let confirmed = next >= payment.required_confirmations;

        if confirmed {
            self.transition(charge, ChargeStatus::Completed).await?;
        } else if changed {
            charge.updated_at = self.clock.now();
            self.charges.put(charge).await?;
            tracing::debug!(charge_id = %id, confirmations = next, "confirmations updated");
        }
        Ok(())
    }

    async fn transition(&self, charge: &mut Charge, next: ChargeStatus) -> Result<()> {
        ensure_transition(charge, next)?;
        if next == ChargeStatus::Processing && !charge.payment_method.is_card() {
            return Err(AppError::InvalidState(format!(
                "{} charges never enter processing",
                charge.payment_method
            )));
        }

        let now = self.clock.now();
        let previous = charge.status;
        charge.status = next;
        charge.updated_at = now;
        if next == ChargeStatus::Completed {
            charge.captured_at = Some(now);
            charge.captured_amount = Some(charge.amount);
        }

        self.charges.put(charge).await?;

        tracing::info!(charge_id = %charge.id, from = %previous, to = %next, "charge transitioned");
        self.dispatcher.dispatch(charge, EventType::for_status(next));
        Ok(())
    }
}

fn ensure_transition(charge: &Charge, next: ChargeStatus) -> Result<()> {
    if charge.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::InvalidState(format!(
            "cannot move charge from {} to {}",
            charge.status, next
        )))
    }
}

fn elapsed_at_least(charge: &Charge, now: DateTime<Utc>, secs: u64) -> bool {
    let threshold = i64::try_from(secs).unwrap_or(i64::MAX);
    (now - charge.created_at).num_seconds() >= threshold
}
