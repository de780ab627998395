//! Test doubles for the engine's seams. Compiled for unit tests and for
//! integration tests through the `test-utils` feature.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    domain::Charge,
    error::{AppError, Result},
    service::{clock::Clock, watcher::ConfirmationWatcher},
    webhooks::{OutgoingWebhook, WebhookTransport},
};

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ScriptedResponse {
    Status(u16),
    Unreachable,
}

/// Webhook transport that records every request and answers from a script.
/// Once the script runs out, `fallback` answers.
pub struct RecordingTransport {
    script: Mutex<VecDeque<ScriptedResponse>>,
    fallback: ScriptedResponse,
    sent: Mutex<Vec<(OutgoingWebhook, std::time::Instant)>>,
}

impl RecordingTransport {
    pub fn new(fallback: ScriptedResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting() -> Self {
        Self::new(ScriptedResponse::Status(200))
    }

    pub fn unreachable() -> Self {
        Self::new(ScriptedResponse::Unreachable)
    }

    pub fn with_script(self, responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        self.script.lock().unwrap().extend(responses);
        self
    }

    pub fn sent(&self) -> Vec<OutgoingWebhook> {
        self.sent.lock().unwrap().iter().map(|(w, _)| w.clone()).collect()
    }

    pub fn sent_at(&self) -> Vec<std::time::Instant> {
        self.sent.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl WebhookTransport for RecordingTransport {
    async fn send(&self, webhook: &OutgoingWebhook) -> Result<u16> {
        self.sent
            .lock()
            .unwrap()
            .push((webhook.clone(), std::time::Instant::now()));

        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        match response {
            ScriptedResponse::Status(code) => Ok(code),
            ScriptedResponse::Unreachable => Err(AppError::DeliveryFailed(format!(
                "connection refused: {}",
                webhook.url
            ))),
        }
    }
}

/// Confirmation watcher whose observed depths are set by the test.
#[derive(Default)]
pub struct ScriptedWatcher {
    depths: Mutex<HashMap<Uuid, u32>>,
    broken: Mutex<bool>,
}

impl ScriptedWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_depth(&self, charge_id: Uuid, depth: u32) {
        self.depths.lock().unwrap().insert(charge_id, depth);
    }

    pub fn set_broken(&self, broken: bool) {
        *self.broken.lock().unwrap() = broken;
    }
}

#[async_trait]
impl ConfirmationWatcher for ScriptedWatcher {
    async fn confirmations(&self, charge: &Charge) -> Result<Option<u32>> {
        if *self.broken.lock().unwrap() {
            return Err(AppError::Internal("node unavailable".to_string()));
        }
        Ok(self.depths.lock().unwrap().get(&charge.id).copied())
    }
}
