mod common;

use chargeflow::{
    domain::{ChargeFilter, ChargeStatus, EventType, PaymentMethod, RefundReason},
    error::AppError,
    service::clock::Clock,
};
use chrono::Duration;
use rust_decimal_macros::dec;

use common::{charge_request, harness, wait_for_deliveries};

#[tokio::test]
async fn pix_charge_settles_after_delay() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service.create_charge(charge_request(PaymentMethod::Pix, 15000)).await?;
    assert_eq!(charge.status, ChargeStatus::Pending);
    assert_eq!(charge.fee, 148);
    assert_eq!(charge.net_amount, 14852);

    let instructions = charge.instructions.clone().expect("pix instructions");
    let qr = instructions.qr_payload.expect("pix qr payload");
    assert!(qr.starts_with("000201"));
    assert!(qr.contains("br.gov.bcb.pix"));
    assert_eq!(instructions.expires_at, Some(charge.created_at + Duration::minutes(5)));

    let polled = service.poll_status(charge.id).await?;
    assert_eq!(polled.status, ChargeStatus::Pending);

    h.clock.advance_secs(10);
    let settled = service.poll_status(charge.id).await?;
    assert_eq!(settled.status, ChargeStatus::Completed);
    assert_eq!(settled.captured_amount, Some(15000));
    assert_eq!(settled.captured_at, Some(h.clock.now()));

    // Settled charges are left alone.
    h.clock.advance_secs(3600);
    assert_eq!(service.poll_status(charge.id).await?, settled);

    Ok(())
}

#[tokio::test]
async fn card_charge_moves_through_processing() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service
        .create_charge(charge_request(PaymentMethod::CreditCard, 10000))
        .await?;
    assert_eq!(charge.fee, 388);
    assert_eq!(charge.net_amount, 9612);
    assert!(charge.crypto.is_none());

    h.clock.advance_secs(3);
    assert_eq!(service.poll_status(charge.id).await?.status, ChargeStatus::Processing);

    h.clock.advance_secs(12);
    let completed = service.poll_status(charge.id).await?;
    assert_eq!(completed.status, ChargeStatus::Completed);
    assert_eq!(completed.captured_amount, Some(10000));

    let deliveries = wait_for_deliveries(&h.context, charge.id, 3).await?;
    let events: Vec<EventType> = deliveries.iter().map(|d| d.event_type).collect();
    assert_eq!(
        events,
        vec![
            EventType::ChargePending,
            EventType::ChargeProcessing,
            EventType::ChargeCompleted
        ]
    );

    Ok(())
}

#[tokio::test]
async fn late_poll_applies_both_card_transitions() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service
        .create_charge(charge_request(PaymentMethod::DebitCard, 5000))
        .await?;
    h.clock.advance_secs(60);

    let completed = service.poll_status(charge.id).await?;
    assert_eq!(completed.status, ChargeStatus::Completed);

    let deliveries = wait_for_deliveries(&h.context, charge.id, 3).await?;
    assert_eq!(deliveries[1].event_type, EventType::ChargeProcessing);
    assert_eq!(deliveries[2].event_type, EventType::ChargeCompleted);

    Ok(())
}

#[tokio::test]
async fn solana_charge_completes_on_first_confirmation() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service
        .create_charge(charge_request(PaymentMethod::Solana, 5000))
        .await?;
    let crypto = charge.crypto.clone().expect("crypto details");
    assert_eq!(crypto.amount, dec!(0.055556));
    assert_eq!(crypto.symbol, "SOL");
    assert_eq!(crypto.required_confirmations, 1);
    assert_eq!(crypto.confirmations, 0);
    assert!(!crypto.address.is_empty());

    // Nothing observed yet.
    assert_eq!(service.poll_status(charge.id).await?.status, ChargeStatus::Pending);

    h.watcher.set_depth(charge.id, 1);
    let completed = service.poll_status(charge.id).await?;
    assert_eq!(completed.status, ChargeStatus::Completed);
    assert_eq!(completed.crypto.map(|c| c.confirmations), Some(1));

    Ok(())
}

#[tokio::test]
async fn confirmations_never_decrease_and_are_capped() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service
        .create_charge(charge_request(PaymentMethod::Bitcoin, 350000))
        .await?;
    assert_eq!(charge.crypto.as_ref().map(|c| c.amount), Some(dec!(0.01)));

    h.watcher.set_depth(charge.id, 2);
    let seen = service.poll_status(charge.id).await?;
    assert_eq!(seen.status, ChargeStatus::Pending);
    assert_eq!(seen.crypto.as_ref().map(|c| c.confirmations), Some(2));

    h.watcher.set_depth(charge.id, 1);
    let reorg = service.poll_status(charge.id).await?;
    assert_eq!(reorg.crypto.as_ref().map(|c| c.confirmations), Some(2));

    h.watcher.set_depth(charge.id, 10);
    let completed = service.poll_status(charge.id).await?;
    assert_eq!(completed.status, ChargeStatus::Completed);
    assert_eq!(completed.crypto.as_ref().map(|c| c.confirmations), Some(3));

    Ok(())
}

#[tokio::test]
async fn pushed_confirmations_may_overflow_when_allowed() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let eth = service
        .create_charge(charge_request(PaymentMethod::Ethereum, 36000))
        .await?;
    let partial = service.record_confirmations(eth.id, 5, false).await?;
    assert_eq!(partial.status, ChargeStatus::Pending);

    let done = service.record_confirmations(eth.id, 20, true).await?;
    assert_eq!(done.status, ChargeStatus::Completed);
    assert_eq!(done.crypto.as_ref().map(|c| c.confirmations), Some(20));

    // Late reports for a settled charge are ignored.
    let again = service.record_confirmations(eth.id, 25, true).await?;
    assert_eq!(again, done);

    let pix = service.create_charge(charge_request(PaymentMethod::Pix, 1000)).await?;
    let err = service.record_confirmations(pix.id, 1, false).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    Ok(())
}

#[tokio::test]
async fn watcher_outage_leaves_charge_untouched() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service
        .create_charge(charge_request(PaymentMethod::Usdt, 5500))
        .await?;
    h.watcher.set_depth(charge.id, 15);
    h.watcher.set_broken(true);

    let polled = service.poll_status(charge.id).await?;
    assert_eq!(polled, charge);

    Ok(())
}

#[tokio::test]
async fn refunds_are_bounded_by_net_amount() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service
        .create_charge(charge_request(PaymentMethod::CreditCard, 10000))
        .await?;

    let err = service
        .create_refund(charge.id, 1000, RefundReason::RequestedByCustomer)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)), "pending charge refunded: {err}");

    h.clock.advance_secs(20);
    service.poll_status(charge.id).await?;

    let (partial, refund) = service
        .create_refund(charge.id, 3000, RefundReason::RequestedByCustomer)
        .await?;
    assert_eq!(partial.status, ChargeStatus::PartiallyRefunded);
    assert_eq!(partial.refunded_amount, 3000);
    assert_eq!(refund.amount, 3000);

    let err = service
        .create_refund(charge.id, 8000, RefundReason::Duplicate)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert_eq!(service.get_charge(charge.id).await?.refunded_amount, 3000);

    let err = service
        .create_refund(charge.id, 0, RefundReason::Other)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let (full, _) = service
        .create_refund(charge.id, 6612, RefundReason::Other)
        .await?;
    assert_eq!(full.status, ChargeStatus::Refunded);
    assert_eq!(full.refunded_amount, full.net_amount);

    let err = service
        .create_refund(charge.id, 1, RefundReason::Other)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let refunds = service.list_refunds(charge.id).await?;
    assert_eq!(refunds.len(), 2);
    assert_eq!(refunds.iter().map(|r| r.amount).sum::<i64>(), full.refunded_amount);

    Ok(())
}

#[tokio::test]
async fn cancel_and_fail_only_apply_to_open_charges() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let boleto = service
        .create_charge(charge_request(PaymentMethod::Boleto, 20000))
        .await?;
    let cancelled = service.cancel_charge(boleto.id).await?;
    assert_eq!(cancelled.status, ChargeStatus::Cancelled);
    assert!(matches!(
        service.cancel_charge(boleto.id).await.unwrap_err(),
        AppError::InvalidState(_)
    ));

    // Terminal charges stay put no matter how much time passes.
    h.clock.advance(Duration::days(5));
    assert_eq!(service.poll_status(boleto.id).await?.status, ChargeStatus::Cancelled);

    let card = service
        .create_charge(charge_request(PaymentMethod::CreditCard, 5000))
        .await?;
    h.clock.advance_secs(3);
    let processing = service.poll_status(card.id).await?;
    assert_eq!(processing.status, ChargeStatus::Processing);
    assert!(matches!(
        service.cancel_charge(card.id).await.unwrap_err(),
        AppError::InvalidState(_)
    ));

    let failed = service.fail_charge(card.id, "issuer declined").await?;
    assert_eq!(failed.status, ChargeStatus::Failed);
    assert!(failed.captured_at.is_none());

    Ok(())
}

#[tokio::test]
async fn boleto_clears_after_a_day() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let charge = service
        .create_charge(charge_request(PaymentMethod::Boleto, 20000))
        .await?;
    assert_eq!(charge.fee, 349);
    let line = charge
        .instructions
        .as_ref()
        .and_then(|i| i.details.clone());
    assert!(line.is_some());

    h.clock.advance(Duration::hours(23));
    assert_eq!(service.poll_status(charge.id).await?.status, ChargeStatus::Pending);
    h.clock.advance(Duration::hours(1));
    assert_eq!(service.poll_status(charge.id).await?.status, ChargeStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn invalid_requests_persist_nothing() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let err = service
        .create_charge(charge_request(PaymentMethod::Pix, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let err = service
        .create_charge(charge_request(PaymentMethod::Boleto, 349))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let mut usd_pix = charge_request(PaymentMethod::Pix, 5000);
    usd_pix.currency = "USD".to_string();
    let err = service.create_charge(usd_pix).await.unwrap_err();
    assert!(matches!(err, AppError::UnsupportedMethod(_)));

    let mut usd_sol = charge_request(PaymentMethod::Solana, 5000);
    usd_sol.currency = "USD".to_string();
    let err = service.create_charge(usd_sol).await.unwrap_err();
    assert!(matches!(err, AppError::UnsupportedMethod(_)));

    let err = service
        .create_charge(charge_request(PaymentMethod::Boleto, 10_000_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    let err = service
        .create_charge(charge_request(PaymentMethod::Pix, 1_000_000_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidAmount(_)));

    assert!(service.list_charges(ChargeFilter::default()).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn idempotency_key_replays_original_charge() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let mut request = charge_request(PaymentMethod::Pix, 15000);
    request.idempotency_key = Some("order-1001".to_string());

    let first = service.create_charge(request.clone()).await?;
    let second = service.create_charge(request.clone()).await?;
    assert_eq!(first, second);
    assert_eq!(service.list_charges(ChargeFilter::default()).await?.len(), 1);

    request.amount = 16000;
    let err = service.create_charge(request).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    Ok(())
}

#[tokio::test]
async fn invoices_carry_payment_link_and_qr_codes() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let invoice = service
        .create_invoice(charge_request(PaymentMethod::Pix, 15000))
        .await?;
    let invoice_id = invoice.charge.invoice_id.clone().expect("invoice id");
    assert!(invoice_id.starts_with("inv_"));
    assert!(invoice
        .charge
        .payment_url
        .as_deref()
        .is_some_and(|url| url.ends_with(&invoice_id)));
    assert!(invoice.qr_codes.contains_key("pix"));

    let fetched = service.get_invoice(&invoice_id).await?;
    assert_eq!(fetched, invoice);

    let crypto = service
        .create_invoice(charge_request(PaymentMethod::Solana, 5000))
        .await?;
    let uri = crypto.qr_codes.get("crypto").expect("crypto qr");
    assert!(uri.starts_with("solana:"));

    assert!(matches!(
        service.get_invoice("inv_missing").await.unwrap_err(),
        AppError::NotFound(_)
    ));

    let svg = service.qr_svg(invoice.charge.id).await?;
    assert!(svg.contains("<svg"));

    Ok(())
}

#[tokio::test]
async fn settlement_worker_advances_open_charges() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let pix = service.create_charge(charge_request(PaymentMethod::Pix, 1000)).await?;
    let card = service
        .create_charge(charge_request(PaymentMethod::CreditCard, 1000))
        .await?;
    let boleto = service
        .create_charge(charge_request(PaymentMethod::Boleto, 1000))
        .await?;

    h.clock.advance_secs(20);
    let worker = h
        .context
        .settlement_worker(std::time::Duration::from_secs(1), 100);
    assert_eq!(worker.run_once().await?, 2);

    assert_eq!(service.get_charge(pix.id).await?.status, ChargeStatus::Completed);
    assert_eq!(service.get_charge(card.id).await?.status, ChargeStatus::Completed);
    assert_eq!(service.get_charge(boleto.id).await?.status, ChargeStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn stuck_charges_do_not_starve_older_ones() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let pix = service.create_charge(charge_request(PaymentMethod::Pix, 1000)).await?;
    h.clock.advance_secs(1);
    // The watcher never reports a depth for these.
    for _ in 0..3 {
        service
            .create_charge(charge_request(PaymentMethod::Bitcoin, 50000))
            .await?;
        h.clock.advance_secs(1);
    }

    h.clock.advance(Duration::hours(1));
    let worker = h
        .context
        .settlement_worker(std::time::Duration::from_secs(1), 1);
    assert_eq!(worker.run_once().await?, 1);
    assert_eq!(service.get_charge(pix.id).await?.status, ChargeStatus::Completed);

    Ok(())
}

#[tokio::test]
async fn reads_without_writes_are_identical() -> anyhow::Result<()> {
    let h = harness().await?;
    let service = &h.context.charge_service;

    let card = service
        .create_charge(charge_request(PaymentMethod::CreditCard, 10000))
        .await?;
    let btc = service
        .create_charge(charge_request(PaymentMethod::Bitcoin, 50000))
        .await?;
    h.watcher.set_depth(btc.id, 1);
    service.poll_status(btc.id).await?;

    for id in [card.id, btc.id] {
        let first = service.get_charge(id).await?;
        h.clock.advance_secs(60);
        let second = service.get_charge(id).await?;
        assert_eq!(first, second);
    }
    assert_eq!(service.get_charge(btc.id).await?.crypto.map(|c| c.confirmations), Some(1));

    Ok(())
}

#[tokio::test]
async fn unknown_charge_is_not_found() -> anyhow::Result<()> {
    let h = harness().await?;
    let err = h
        .context
        .charge_service
        .poll_status(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    Ok(())
}
