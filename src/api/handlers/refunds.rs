use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    api::state::AppState,
    domain::{Charge, Refund, RefundReason},
    error::Result,
};

#[derive(Debug, Deserialize)]
pub struct CreateRefundDto {
    amount: i64,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    refund: Refund,
    charge: Charge,
}

pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(dto): Json<CreateRefundDto>,
) -> Result<(StatusCode, Json<RefundResponse>)> {
    let reason = match dto.reason.as_deref() {
        Some(reason) => RefundReason::from_str(reason)?,
        None => RefundReason::RequestedByCustomer,
    };

    let (charge, refund) = state.service_context.charge_service
        .create_refund(id, dto.amount, reason)
        .await?;

    Ok((StatusCode::CREATED, Json(RefundResponse { refund, charge })))
}

pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Refund>>> {
    let refunds = state.service_context.charge_service.list_refunds(id).await?;
    Ok(Json(refunds))
}
