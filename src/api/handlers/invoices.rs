use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};

use super::charges::CreateChargeDto;
use crate::{
    api::state::AppState,
    domain::Invoice,
    error::Result,
};

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(dto): Json<CreateChargeDto>,
) -> Result<(StatusCode, Json<Invoice>)> {
    let request = dto.into_request(&headers)?;
    let invoice = state.service_context.charge_service
        .create_invoice(request)
        .await?;

    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Json<Invoice>> {
    let invoice = state.service_context.charge_service
        .get_invoice(&invoice_id)
        .await?;
    Ok(Json(invoice))
}
