use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    domain::{Refund, RefundReason, RefundStatus},
    error::{AppError, Result},
    repository::RefundRepository,
};

#[derive(FromRow)]
struct RefundRow {
    id: String,
    charge_id: String,
    amount: i64,
    reason: String,
    status: String,
    created_at: NaiveDateTime,
}

/// Refunds are written through [`ChargeRepository::put_with_refund`] so the
/// charge and its refund land together; this side only reads.
///
/// [`ChargeRepository::put_with_refund`]: crate::repository::ChargeRepository::put_with_refund
pub struct SqliteRefundRepository {
    pool: SqlitePool,
}

impl SqliteRefundRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_refund(row: RefundRow) -> Result<Refund> {
        Ok(Refund {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            charge_id: Uuid::parse_str(&row.charge_id)
                .map_err(|e| AppError::Database(e.to_string()))?,
            amount: row.amount,
            reason: RefundReason::from_str(&row.reason)
                .map_err(|_| AppError::Database(format!("Invalid refund reason: {}", row.reason)))?,
            status: RefundStatus::from_str(&row.status)?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

#[async_trait]
impl RefundRepository for SqliteRefundRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Refund>> {
        let row = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT id, charge_id, amount, reason, status, created_at
            FROM refunds
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_refund).transpose()
    }

    async fn list_by_charge(&self, charge_id: Uuid) -> Result<Vec<Refund>> {
        let rows = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT id, charge_id, amount, reason, status, created_at
            FROM refunds
            WHERE charge_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(charge_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_refund).collect()
    }
}
