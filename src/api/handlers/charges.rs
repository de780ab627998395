use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::state::AppState,
    domain::{
        Charge, ChargeFilter, ChargeStatus, CreateChargeRequest, Metadata, PaymentMethod,
        WebhookDeliveryRecord,
    },
    error::{AppError, Result},
};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateChargeDto {
    pub amount: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub payment_method: String,
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(url)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub idempotency_key: Option<String>,
}

fn default_currency() -> String {
    "BRL".to_string()
}

impl CreateChargeDto {
    /// Validates the payload. The idempotency key may come from the header or
    /// the body; when both are sent they must match.
    pub fn into_request(self, headers: &HeaderMap) -> Result<CreateChargeRequest> {
        self.validate()?;

        let header_key = headers
            .get(IDEMPOTENCY_HEADER)
            .map(|v| {
                v.to_str()
                    .map(str::to_string)
                    .map_err(|_| AppError::BadRequest("Idempotency-Key must be ASCII".to_string()))
            })
            .transpose()?;
        let idempotency_key = match (header_key, self.idempotency_key) {
            (Some(h), Some(b)) if h != b => {
                return Err(AppError::BadRequest(
                    "Idempotency-Key header and body field disagree".to_string(),
                ))
            }
            (Some(h), _) => Some(h),
            (None, b) => b,
        };

        Ok(CreateChargeRequest {
            amount: self.amount,
            currency: self.currency,
            payment_method: PaymentMethod::from_str(&self.payment_method)?,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            description: self.description,
            webhook_url: self.webhook_url,
            metadata: Metadata::try_from(self.metadata)?,
            idempotency_key,
        })
    }
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dto): Json<CreateChargeDto>,
) -> Result<(StatusCode, Json<Charge>)> {
    let request = dto.into_request(&headers)?;
    let charge = state.service_context.charge_service
        .create_charge(request)
        .await?;

    Ok((StatusCode::CREATED, Json(charge)))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    customer: Option<String>,
    payment_method: Option<String>,
    status: Option<String>,
    created_from: Option<DateTime<Utc>>,
    created_to: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    charges: Vec<Charge>,
    total: usize,
}

pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>> {
    let filter = ChargeFilter {
        customer: params.customer,
        payment_method: params
            .payment_method
            .as_deref()
            .map(PaymentMethod::from_str)
            .transpose()?,
        status: params.status.as_deref().map(ChargeStatus::from_str).transpose()?,
        created_from: params.created_from,
        created_to: params.created_to,
        limit: Some(params.limit),
        offset: Some(params.offset),
    };

    let charges = state.service_context.charge_service
        .list_charges(filter)
        .await?;
    let total = charges.len();

    Ok(Json(ListResponse { charges, total }))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Charge>> {
    let charge = state.service_context.charge_service.get_charge(id).await?;
    Ok(Json(charge))
}

pub async fn poll(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Charge>> {
    let charge = state.service_context.charge_service.poll_status(id).await?;
    Ok(Json(charge))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Charge>> {
    let charge = state.service_context.charge_service.cancel_charge(id).await?;
    Ok(Json(charge))
}

#[derive(Debug, Deserialize, Validate)]
pub struct FailChargeDto {
    #[validate(length(min = 1, max = 500))]
    reason: String,
}

pub async fn fail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(dto): Json<FailChargeDto>,
) -> Result<Json<Charge>> {
    dto.validate()?;
    let charge = state.service_context.charge_service
        .fail_charge(id, &dto.reason)
        .await?;
    Ok(Json(charge))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationsDto {
    /// Confirmation depth observed on-chain.
    confirmations: u32,
    #[serde(default)]
    allow_overflow: bool,
}

pub async fn confirmations(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(dto): Json<ConfirmationsDto>,
) -> Result<Json<Charge>> {
    let charge = state.service_context.charge_service
        .record_confirmations(id, dto.confirmations, dto.allow_overflow)
        .await?;
    Ok(Json(charge))
}

pub async fn webhooks(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<WebhookDeliveryRecord>>> {
    let deliveries = state.service_context.charge_service
        .list_deliveries(id)
        .await?;
    Ok(Json(deliveries))
}

pub async fn qr_svg(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let svg = state.service_context.charge_service.qr_svg(id).await?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}
