use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::{
    signer::WebhookSigner,
    transport::{OutgoingWebhook, WebhookTransport},
};
use crate::{
    domain::{Charge, DeliveryOutcome, EventType, WebhookDeliveryRecord, WebhookEvent},
    error::AppError,
    repository::WebhookDeliveryRepository,
    service::clock::Clock,
};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from the base.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(1u32 << exp)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

struct DispatchJob {
    charge_id: Uuid,
    webhook: OutgoingWebhook,
    event_type: EventType,
}

/// Builds signed envelopes for charge transitions and delivers them in the
/// background. `dispatch` only enqueues, so callers never wait on the network
/// and delivery failures never reach them.
#[derive(Clone)]
pub struct WebhookDispatcher {
    queue: mpsc::UnboundedSender<DispatchJob>,
    signer: WebhookSigner,
    clock: Arc<dyn Clock>,
    livemode: bool,
}

struct DeliveryWorker {
    transport: Arc<dyn WebhookTransport>,
    deliveries: Arc<dyn WebhookDeliveryRepository>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl WebhookDispatcher {
    /// Spawns the delivery queue on the current tokio runtime.
    pub fn start(
        transport: Arc<dyn WebhookTransport>,
        deliveries: Arc<dyn WebhookDeliveryRepository>,
        signer: WebhookSigner,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        livemode: bool,
    ) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let worker = Arc::new(DeliveryWorker {
            transport,
            deliveries,
            clock: clock.clone(),
            policy,
        });
        tokio::spawn(run_queue(worker, rx));

        Self {
            queue,
            signer,
            clock,
            livemode,
        }
    }

    pub fn dispatch(&self, charge: &Charge, event_type: EventType) {
        let Some(url) = charge.webhook_url.clone() else {
            tracing::debug!(charge_id = %charge.id, event = %event_type, "no webhook url, skipping");
            return;
        };

        let now = self.clock.now();
        let event = WebhookEvent::new(charge.clone(), event_type, now, self.livemode);
        let body = match serde_json::to_string(&event) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(charge_id = %charge.id, "failed to serialize webhook event: {}", e);
                return;
            }
        };
        let signature = self.signer.sign(&body, now.timestamp());

        let job = DispatchJob {
            charge_id: charge.id,
            webhook: OutgoingWebhook {
                url,
                event_id: event.id,
                event_type: event_type.as_str().to_string(),
                body,
                signature,
            },
            event_type,
        };

        if self.queue.send(job).is_err() {
            tracing::error!(charge_id = %charge.id, "webhook queue closed; event dropped");
        }
    }
}

/// Events for one charge start their first attempt in dispatch order: each job
/// waits for the previous job of the same charge to finish its first attempt.
/// Retries run independently, so confirmations may still arrive out of order.
async fn run_queue(worker: Arc<DeliveryWorker>, mut rx: mpsc::UnboundedReceiver<DispatchJob>) {
    let mut lanes: HashMap<Uuid, oneshot::Receiver<()>> = HashMap::new();

    while let Some(job) = rx.recv().await {
        let previous = lanes.remove(&job.charge_id).and_then(|mut prev| {
            match prev.try_recv() {
                Err(oneshot::error::TryRecvError::Empty) => Some(prev),
                _ => None,
            }
        });
        let (first_done, first_done_rx) = oneshot::channel();
        lanes.insert(job.charge_id, first_done_rx);

        if lanes.len() > 1024 {
            lanes.retain(|_, rx| matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)));
        }

        let worker = worker.clone();
        tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            worker.deliver(job, Some(first_done)).await;
        });
    }

    tracing::debug!("webhook queue closed");
}

impl DeliveryWorker {
    async fn deliver(&self, job: DispatchJob, mut first_done: Option<oneshot::Sender<()>>) {
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let result = self.transport.send(&job.webhook).await;
            let attempted_at = self.clock.now();

            let (outcome, response_code, error) = match result {
                Ok(code) if (200..300).contains(&code) => (DeliveryOutcome::Delivered, Some(code), None),
                Ok(code) => (
                    DeliveryOutcome::Failed,
                    Some(code),
                    Some(format!("endpoint responded with HTTP {}", code)),
                ),
                Err(AppError::DeliveryFailed(msg)) => (DeliveryOutcome::Failed, None, Some(msg)),
                Err(other) => (DeliveryOutcome::Failed, None, Some(other.to_string())),
            };
            let permanent = outcome == DeliveryOutcome::Failed && attempt == max_attempts;

            let record = WebhookDeliveryRecord {
                id: Uuid::new_v4(),
                event_id: job.webhook.event_id.clone(),
                charge_id: job.charge_id,
                url: job.webhook.url.clone(),
                event_type: job.event_type,
                payload: job.webhook.body.clone(),
                signature: job.webhook.signature.clone(),
                attempt,
                outcome,
                response_code,
                error: error.clone(),
                permanent,
                attempted_at,
            };
            if let Err(e) = self.deliveries.append(&record).await {
                tracing::error!(event_id = %record.event_id, "failed to record webhook attempt: {}", e);
            }

            if let Some(done) = first_done.take() {
                let _ = done.send(());
            }

            match outcome {
                DeliveryOutcome::Delivered => {
                    tracing::info!(
                        charge_id = %job.charge_id,
                        event = %job.event_type,
                        attempt,
                        "webhook delivered"
                    );
                    return;
                }
                DeliveryOutcome::Failed if permanent => {
                    tracing::error!(
                        charge_id = %job.charge_id,
                        event = %job.event_type,
                        attempt,
                        "webhook permanently failed: {}",
                        error.unwrap_or_default()
                    );
                    return;
                }
                DeliveryOutcome::Failed => {
                    let delay = self.policy.backoff_after(attempt);
                    tracing::warn!(
                        charge_id = %job.charge_id,
                        event = %job.event_type,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        "webhook delivery failed: {}",
                        error.unwrap_or_default()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
