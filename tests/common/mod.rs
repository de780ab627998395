#![allow(dead_code)]

use chargeflow::{
    domain::{CreateChargeRequest, Metadata, PaymentMethod, WebhookDeliveryRecord},
    payments::{RateTable, StaticRateSource},
    repository::WebhookDeliveryRepository,
    service::{clock::{Clock, SystemClock}, EngineOptions, ServiceContext},
    testing::{ManualClock, RecordingTransport, ScriptedWatcher},
    webhooks::{RetryPolicy, WebhookSigner},
};
use chrono::{TimeZone, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test";
pub const WEBHOOK_URL: &str = "https://merchant.test/hooks";

/// Single-connection in-memory database; every connection to `:memory:`
/// would otherwise see its own empty database.
pub async fn memory_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub struct Harness {
    pub context: Arc<ServiceContext>,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<RecordingTransport>,
    pub watcher: Arc<ScriptedWatcher>,
}

/// Engine on a manual clock with a webhook endpoint that accepts everything.
pub async fn harness() -> anyhow::Result<Harness> {
    harness_with(RecordingTransport::accepting()).await
}

pub async fn harness_with(transport: RecordingTransport) -> anyhow::Result<Harness> {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()));
    let transport = Arc::new(transport);
    let watcher = Arc::new(ScriptedWatcher::new());
    let context = build_context(transport.clone(), watcher.clone(), clock.clone(), fast_retry()).await?;

    Ok(Harness {
        context,
        clock,
        transport,
        watcher,
    })
}

/// Engine on the wall clock, for tests that look at delivery timing.
pub async fn system_clock_context(
    transport: Arc<RecordingTransport>,
    retry: RetryPolicy,
) -> anyhow::Result<Arc<ServiceContext>> {
    build_context(transport, Arc::new(ScriptedWatcher::new()), Arc::new(SystemClock), retry).await
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_base: Duration::from_millis(20),
    }
}

async fn build_context(
    transport: Arc<RecordingTransport>,
    watcher: Arc<ScriptedWatcher>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
) -> anyhow::Result<Arc<ServiceContext>> {
    let pool = memory_pool().await?;
    let table = Arc::new(RateTable::default());
    let options = EngineOptions {
        rate_source: Arc::new(StaticRateSource::from_table(&table)),
        table,
        transport,
        signer: WebhookSigner::new(WEBHOOK_SECRET),
        retry,
        livemode: false,
        watcher,
        clock,
    };
    Ok(Arc::new(ServiceContext::new(pool, options)))
}

pub fn charge_request(method: PaymentMethod, amount: i64) -> CreateChargeRequest {
    CreateChargeRequest {
        amount,
        currency: "BRL".to_string(),
        payment_method: method,
        customer_name: "Maria Silva".to_string(),
        customer_email: "maria@example.com".to_string(),
        description: Some("Order 1001".to_string()),
        webhook_url: Some(WEBHOOK_URL.to_string()),
        metadata: Metadata::new(),
        idempotency_key: None,
    }
}

/// Polls the delivery log until at least `count` attempts are recorded.
pub async fn wait_for_deliveries(
    context: &ServiceContext,
    charge_id: Uuid,
    count: usize,
) -> anyhow::Result<Vec<WebhookDeliveryRecord>> {
    for _ in 0..250 {
        let records = context.delivery_repo.list_by_charge(charge_id).await?;
        if records.len() >= count {
            return Ok(records);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("timed out waiting for {} webhook attempts", count)
}
