use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    domain::{DeliveryOutcome, EventType, WebhookDeliveryRecord},
    error::{AppError, Result},
    repository::WebhookDeliveryRepository,
};

#[derive(FromRow)]
struct DeliveryRow {
    id: String,
    event_id: String,
    charge_id: String,
    url: String,
    event_type: String,
    payload: String,
    signature: String,
    attempt: i64,
    outcome: String,
    response_code: Option<i64>,
    error: Option<String>,
    permanent: i32,
    attempted_at: NaiveDateTime,
}

pub struct SqliteWebhookDeliveryRepository {
    pool: SqlitePool,
}

impl SqliteWebhookDeliveryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: DeliveryRow) -> Result<WebhookDeliveryRecord> {
        Ok(WebhookDeliveryRecord {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            event_id: row.event_id,
            charge_id: Uuid::parse_str(&row.charge_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            url: row.url,
            event_type: EventType::from_str(&row.event_type)?,
            payload: row.payload,
            signature: row.signature,
            attempt: row.attempt as u32,
            outcome: DeliveryOutcome::from_str(&row.outcome)?,
            response_code: row.response_code.map(|c| c as u16),
            error: row.error,
            permanent: row.permanent != 0,
            attempted_at: DateTime::from_naive_utc_and_offset(row.attempted_at, Utc),
        })
    }
}

#[async_trait]
impl WebhookDeliveryRepository for SqliteWebhookDeliveryRepository {
    async fn append(&self, record: &WebhookDeliveryRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (
                id, event_id, charge_id, url, event_type, payload, signature,
                attempt, outcome, response_code, error, permanent, attempted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.event_id)
        .bind(record.charge_id.to_string())
        .bind(&record.url)
        .bind(record.event_type.as_str())
        .bind(&record.payload)
        .bind(&record.signature)
        .bind(record.attempt as i64)
        .bind(record.outcome.as_str())
        .bind(record.response_code.map(|c| c as i64))
        .bind(&record.error)
        .bind(record.permanent as i32)
        .bind(record.attempted_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list_by_charge(&self, charge_id: Uuid) -> Result<Vec<WebhookDeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT id, event_id, charge_id, url, event_type, payload, signature,
                   attempt, outcome, response_code, error, permanent, attempted_at
            FROM webhook_deliveries
            WHERE charge_id = ?
            ORDER BY attempted_at ASC, rowid ASC
            "#,
        )
        .bind(charge_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn list_by_event(&self, event_id: &str) -> Result<Vec<WebhookDeliveryRecord>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT id, event_id, charge_id, url, event_type, payload, signature,
                   attempt, outcome, response_code, error, permanent, attempted_at
            FROM webhook_deliveries
            WHERE event_id = ?
            ORDER BY attempt ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}
