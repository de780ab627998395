pub mod charge_service;
pub mod clock;
pub mod state_machine;
pub mod watcher;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;
use sqlx::SqlitePool;

use crate::{
    config::Settings,
    error::Result,
    payments::{FeeEngine, InstructionGenerator, RateSource, RateTable, StaticRateSource},
    repository::*,
    webhooks::{ReqwestTransport, RetryPolicy, WebhookDispatcher, WebhookSigner, WebhookTransport},
};
use clock::{Clock, SystemClock};
use watcher::{ConfirmationWatcher, PushOnlyWatcher, SimulatedWatcher};

pub use charge_service::ChargeService;
pub use state_machine::ChargeStateMachine;
pub use worker::SettlementWorker;

/// The engine's collaborators that differ between production and tests.
pub struct EngineOptions {
    pub table: Arc<RateTable>,
    pub rate_source: Arc<dyn RateSource>,
    pub transport: Arc<dyn WebhookTransport>,
    pub signer: WebhookSigner,
    pub retry: RetryPolicy,
    pub livemode: bool,
    pub watcher: Arc<dyn ConfirmationWatcher>,
    pub clock: Arc<dyn Clock>,
}

impl EngineOptions {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let table = Arc::new(settings.rates.clone());
        let rate_source = Arc::new(StaticRateSource::from_table(&table));
        let transport = Arc::new(ReqwestTransport::new(settings.webhooks.timeout())?);
        let watcher: Arc<dyn ConfirmationWatcher> = if settings.worker.simulate_confirmations {
            Arc::new(SimulatedWatcher)
        } else {
            Arc::new(PushOnlyWatcher)
        };

        Ok(Self {
            table,
            rate_source,
            transport,
            signer: WebhookSigner::new(settings.webhooks.secret.clone()),
            retry: RetryPolicy {
                max_attempts: settings.webhooks.max_attempts,
                backoff_base: settings.webhooks.backoff_base(),
            },
            livemode: settings.webhooks.livemode,
            watcher,
            clock: Arc::new(SystemClock),
        })
    }
}

pub struct ServiceContext {
    pub charge_repo: Arc<dyn ChargeRepository>,
    pub refund_repo: Arc<dyn RefundRepository>,
    pub delivery_repo: Arc<dyn WebhookDeliveryRepository>,
    pub state_machine: Arc<ChargeStateMachine>,
    pub charge_service: Arc<ChargeService>,
    pub dispatcher: WebhookDispatcher,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    /// Wires repositories, the dispatcher and the state machine. Must run
    /// inside a tokio runtime; the dispatcher spawns its delivery queue.
    pub fn new(db_pool: SqlitePool, options: EngineOptions) -> Self {
        let charge_repo: Arc<dyn ChargeRepository> =
            Arc::new(SqliteChargeRepository::new(db_pool.clone()));
        let refund_repo: Arc<dyn RefundRepository> =
            Arc::new(SqliteRefundRepository::new(db_pool.clone()));
        let delivery_repo: Arc<dyn WebhookDeliveryRepository> =
            Arc::new(SqliteWebhookDeliveryRepository::new(db_pool.clone()));

        let dispatcher = WebhookDispatcher::start(
            options.transport,
            delivery_repo.clone(),
            options.signer,
            options.clock.clone(),
            options.retry,
            options.livemode,
        );

        let fees = Arc::new(FeeEngine::new(options.table.clone(), options.rate_source));
        let instructions = Arc::new(InstructionGenerator::new(options.table.clone()));

        let state_machine = Arc::new(ChargeStateMachine::new(
            charge_repo.clone(),
            fees,
            instructions,
            options.table,
            dispatcher.clone(),
            options.watcher,
            options.clock,
        ));

        let charge_service = Arc::new(ChargeService::new(
            state_machine.clone(),
            charge_repo.clone(),
            refund_repo.clone(),
            delivery_repo.clone(),
        ));

        Self {
            charge_repo,
            refund_repo,
            delivery_repo,
            state_machine,
            charge_service,
            dispatcher,
            db_pool,
        }
    }

    pub fn settlement_worker(&self, interval: Duration, batch_size: i64) -> SettlementWorker {
        SettlementWorker::new(
            self.state_machine.clone(),
            self.charge_repo.clone(),
            interval,
            batch_size,
        )
    }
}
