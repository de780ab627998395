mod common;

use chargeflow::{
    domain::{ChargeStatus, DeliveryOutcome, EventType, PaymentMethod},
    testing::{RecordingTransport, ScriptedResponse},
    webhooks::WebhookSigner,
};
use std::sync::Arc;
use std::time::Duration;

use common::{
    charge_request, fast_retry, harness, harness_with, system_clock_context, wait_for_deliveries,
    WEBHOOK_SECRET, WEBHOOK_URL,
};

#[tokio::test]
async fn unreachable_endpoint_is_retried_then_marked_permanent() -> anyhow::Result<()> {
    let transport = Arc::new(RecordingTransport::unreachable());
    let context = system_clock_context(transport.clone(), fast_retry()).await?;

    let charge = context
        .charge_service
        .create_charge(charge_request(PaymentMethod::Pix, 15000))
        .await?;

    let records = wait_for_deliveries(&context, charge.id, 3).await?;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.outcome == DeliveryOutcome::Failed));
    assert_eq!(records.iter().map(|r| r.attempt).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(
        records.iter().map(|r| r.permanent).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    assert!(records.windows(2).all(|w| w[0].attempted_at < w[1].attempted_at));
    assert!(records.iter().all(|r| r.event_id == records[0].event_id));
    assert!(records.iter().all(|r| r.error.is_some() && r.response_code.is_none()));

    // Backoff doubles: ~20ms then ~40ms between attempts.
    let sent_at = transport.sent_at();
    assert!(sent_at[1] - sent_at[0] >= Duration::from_millis(20));
    assert!(sent_at[2] - sent_at[1] >= Duration::from_millis(40));

    // No fourth attempt, and the charge never noticed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.sent().len(), 3);
    let stored = context.charge_service.get_charge(charge.id).await?;
    assert_eq!(stored.status, ChargeStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn server_error_then_success_stops_retrying() -> anyhow::Result<()> {
    let h = harness_with(
        RecordingTransport::accepting()
            .with_script([ScriptedResponse::Status(503)]),
    )
    .await?;

    let charge = h
        .context
        .charge_service
        .create_charge(charge_request(PaymentMethod::CreditCard, 10000))
        .await?;

    let records = wait_for_deliveries(&h.context, charge.id, 2).await?;
    assert_eq!(records[0].outcome, DeliveryOutcome::Failed);
    assert_eq!(records[0].response_code, Some(503));
    assert!(!records[0].permanent);
    assert_eq!(records[1].outcome, DeliveryOutcome::Delivered);
    assert_eq!(records[1].response_code, Some(200));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(h.transport.sent().len(), 2);

    Ok(())
}

#[tokio::test]
async fn envelope_is_signed_and_shaped() -> anyhow::Result<()> {
    let h = harness().await?;

    let charge = h
        .context
        .charge_service
        .create_charge(charge_request(PaymentMethod::Pix, 15000))
        .await?;
    wait_for_deliveries(&h.context, charge.id, 1).await?;

    let sent = h.transport.sent();
    let webhook = &sent[0];
    assert_eq!(webhook.url, WEBHOOK_URL);
    assert_eq!(webhook.event_type, "charge.pending");

    let envelope: serde_json::Value = serde_json::from_str(&webhook.body)?;
    assert_eq!(envelope["type"], "charge.pending");
    assert_eq!(envelope["livemode"], false);
    assert_eq!(envelope["data"]["object"]["id"], charge.id.to_string());
    assert_eq!(envelope["data"]["object"]["fee"], 148);
    assert!(envelope["id"].as_str().is_some_and(|id| id.starts_with("evt_")));
    assert_eq!(envelope["id"], webhook.event_id.as_str());

    let created = envelope["created"].as_i64().expect("created timestamp");
    let signer = WebhookSigner::new(WEBHOOK_SECRET);
    assert!(signer.verify(&webhook.body, &webhook.signature, created, 300));
    assert!(!WebhookSigner::new("other").verify(&webhook.body, &webhook.signature, created, 300));

    Ok(())
}

#[tokio::test]
async fn charges_without_webhook_url_are_skipped() -> anyhow::Result<()> {
    let h = harness().await?;

    let mut request = charge_request(PaymentMethod::Pix, 5000);
    request.webhook_url = None;
    let charge = h.context.charge_service.create_charge(request).await?;

    h.clock.advance_secs(10);
    h.context.charge_service.poll_status(charge.id).await?;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.transport.sent().is_empty());
    assert!(h.context.charge_service.list_deliveries(charge.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn refund_emits_refunded_event() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service.create_charge(charge_request(PaymentMethod::Pix, 10000)).await?;
    h.clock.advance_secs(10);
    service.poll_status(charge.id).await?;
    service
        .create_refund(charge.id, 1000, chargeflow::domain::RefundReason::Other)
        .await?;

    let records = wait_for_deliveries(&h.context, charge.id, 3).await?;
    let events: Vec<EventType> = records.iter().map(|r| r.event_type).collect();
    assert_eq!(
        events,
        vec![
            EventType::ChargePending,
            EventType::ChargeCompleted,
            EventType::ChargeRefunded
        ]
    );

    let envelope: serde_json::Value = serde_json::from_str(&records[2].payload)?;
    assert_eq!(envelope["data"]["object"]["status"], "partially_refunded");
    assert_eq!(envelope["data"]["object"]["refunded_amount"], 1000);

    Ok(())
}
