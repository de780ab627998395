use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    domain::{
        Charge, ChargeFilter, ChargeStatus, CryptoPayment, Metadata, PaymentInstructions,
        PaymentMethod, Refund,
    },
    error::{AppError, Result},
    repository::ChargeRepository,
};

const CHARGE_COLUMNS: &str = r#"
    id, amount, currency, payment_method, status, customer_name, customer_email,
    description, webhook_url, metadata, fee, net_amount, refunded_amount,
    crypto_address, crypto_amount, crypto_symbol, crypto_network,
    confirmations, required_confirmations, invoice_id, payment_url, instructions,
    idempotency_key, captured_at, captured_amount, created_at, updated_at
"#;

const DEFAULT_LIST_LIMIT: i64 = 100;
const MAX_LIST_LIMIT: i64 = 500;

#[derive(FromRow)]
struct ChargeRow {
    id: String,
    amount: i64,
    currency: String,
    payment_method: String,
    status: String,
    customer_name: String,
    customer_email: String,
    description: Option<String>,
    webhook_url: Option<String>,
    metadata: String,
    fee: i64,
    net_amount: i64,
    refunded_amount: i64,
    crypto_address: Option<String>,
    crypto_amount: Option<String>,
    crypto_symbol: Option<String>,
    crypto_network: Option<String>,
    confirmations: Option<i64>,
    required_confirmations: Option<i64>,
    invoice_id: Option<String>,
    payment_url: Option<String>,
    instructions: Option<String>,
    idempotency_key: Option<String>,
    captured_at: Option<NaiveDateTime>,
    captured_amount: Option<i64>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteChargeRepository {
    pool: SqlitePool,
}

impl SqliteChargeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_charge(row: ChargeRow) -> Result<Charge> {
        let crypto = match (
            row.crypto_address,
            row.crypto_amount,
            row.crypto_symbol,
            row.crypto_network,
        ) {
            (Some(address), Some(amount), Some(symbol), Some(network)) => Some(CryptoPayment {
                address,
                amount: Decimal::from_str(&amount)
                    .map_err(|e| AppError::Database(format!("crypto_amount: {}", e)))?,
                symbol,
                network,
                confirmations: row.confirmations.unwrap_or(0) as u32,
                required_confirmations: row.required_confirmations.unwrap_or(0) as u32,
            }),
            _ => None,
        };

        let metadata: serde_json::Value = serde_json::from_str(&row.metadata)
            .map_err(|e| AppError::Database(format!("metadata: {}", e)))?;
        let instructions = row
            .instructions
            .as_deref()
            .map(serde_json::from_str::<PaymentInstructions>)
            .transpose()
            .map_err(|e| AppError::Database(format!("instructions: {}", e)))?;

        Ok(Charge {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            amount: row.amount,
            currency: row.currency,
            payment_method: PaymentMethod::from_str(&row.payment_method)
                .map_err(|_| AppError::Database(format!("Invalid payment method: {}", row.payment_method)))?,
            status: ChargeStatus::from_str(&row.status)
                .map_err(|_| AppError::Database(format!("Invalid charge status: {}", row.status)))?,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            description: row.description,
            webhook_url: row.webhook_url,
            metadata: Metadata::try_from(metadata)?,
            fee: row.fee,
            net_amount: row.net_amount,
            refunded_amount: row.refunded_amount,
            crypto,
            invoice_id: row.invoice_id,
            payment_url: row.payment_url,
            instructions,
            idempotency_key: row.idempotency_key,
            captured_at: row.captured_at.map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc)),
            captured_amount: row.captured_amount,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<Charge>> {
        let sql = format!("SELECT {} FROM charges WHERE {} = ?", CHARGE_COLUMNS, column);
        let row = sqlx::query_as::<_, ChargeRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_charge).transpose()
    }
}

async fn upsert_charge(conn: &mut SqliteConnection, charge: &Charge) -> Result<()> {
    let metadata = serde_json::to_string(&charge.metadata)?;
    let instructions = charge
        .instructions
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let crypto = charge.crypto.as_ref();

    sqlx::query(
        r#"
        INSERT INTO charges (
            id, amount, currency, payment_method, status, customer_name, customer_email,
            description, webhook_url, metadata, fee, net_amount, refunded_amount,
            crypto_address, crypto_amount, crypto_symbol, crypto_network,
            confirmations, required_confirmations, invoice_id, payment_url, instructions,
            idempotency_key, captured_at, captured_amount, created_at, updated_at,
            customer_search
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            amount = excluded.amount,
            currency = excluded.currency,
            payment_method = excluded.payment_method,
            status = excluded.status,
            customer_name = excluded.customer_name,
            customer_email = excluded.customer_email,
            description = excluded.description,
            webhook_url = excluded.webhook_url,
            metadata = excluded.metadata,
            fee = excluded.fee,
            net_amount = excluded.net_amount,
            refunded_amount = excluded.refunded_amount,
            crypto_address = excluded.crypto_address,
            crypto_amount = excluded.crypto_amount,
            crypto_symbol = excluded.crypto_symbol,
            crypto_network = excluded.crypto_network,
            confirmations = excluded.confirmations,
            required_confirmations = excluded.required_confirmations,
            invoice_id = excluded.invoice_id,
            payment_url = excluded.payment_url,
            instructions = excluded.instructions,
            idempotency_key = excluded.idempotency_key,
            captured_at = excluded.captured_at,
            captured_amount = excluded.captured_amount,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            customer_search = excluded.customer_search
        "#,
    )
    .bind(charge.id.to_string())
    .bind(charge.amount)
    .bind(&charge.currency)
    .bind(charge.payment_method.as_str())
    .bind(charge.status.as_str())
    .bind(&charge.customer_name)
    .bind(&charge.customer_email)
    .bind(&charge.description)
    .bind(&charge.webhook_url)
    .bind(metadata)
    .bind(charge.fee)
    .bind(charge.net_amount)
    .bind(charge.refunded_amount)
    .bind(crypto.map(|c| c.address.clone()))
    .bind(crypto.map(|c| c.amount.to_string()))
    .bind(crypto.map(|c| c.symbol.clone()))
    .bind(crypto.map(|c| c.network.clone()))
    .bind(crypto.map(|c| c.confirmations as i64))
    .bind(crypto.map(|c| c.required_confirmations as i64))
    .bind(&charge.invoice_id)
    .bind(&charge.payment_url)
    .bind(instructions)
    .bind(&charge.idempotency_key)
    .bind(charge.captured_at.map(|dt| dt.naive_utc()))
    .bind(charge.captured_amount)
    .bind(charge.created_at.naive_utc())
    .bind(charge.updated_at.naive_utc())
    .bind(customer_search(&charge.customer_name, &charge.customer_email))
    .execute(&mut *conn)
    .await
    .map_err(map_write_error)?;

    Ok(())
}

/// SQLite's `LOWER()` only folds ASCII, so the searchable form is built here.
fn customer_search(name: &str, email: &str) -> String {
    format!("{}\n{}", name.to_lowercase(), email.to_lowercase())
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn map_write_error(err: sqlx::Error) -> AppError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            AppError::Conflict(format!("duplicate key: {}", db.message()))
        }
        _ => AppError::Database(err.to_string()),
    }
}

#[async_trait]
impl ChargeRepository for SqliteChargeRepository {
    async fn put(&self, charge: &Charge) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_charge(&mut conn, charge).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Charge>> {
        self.find_one("id", &id.to_string()).await
    }

    async fn find_by_invoice_id(&self, invoice_id: &str) -> Result<Option<Charge>> {
        self.find_one("invoice_id", invoice_id).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Charge>> {
        self.find_one("idempotency_key", key).await
    }

    async fn list(&self, filter: &ChargeFilter) -> Result<Vec<Charge>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM charges WHERE 1 = 1", CHARGE_COLUMNS));

        if let Some(customer) = filter.customer.as_deref().filter(|c| !c.trim().is_empty()) {
            let pattern = format!("%{}%", escape_like(&customer.trim().to_lowercase()));
            qb.push(" AND customer_search LIKE ")
                .push_bind(pattern)
                .push(" ESCAPE '\\'");
        }
        if let Some(method) = filter.payment_method {
            qb.push(" AND payment_method = ").push_bind(method.as_str());
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.created_from {
            qb.push(" AND created_at >= ").push_bind(from.naive_utc());
        }
        if let Some(to) = filter.created_to {
            qb.push(" AND created_at <= ").push_bind(to.naive_utc());
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let offset = filter.offset.unwrap_or(0).max(0);
        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = qb
            .build_query_as::<ChargeRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter().map(Self::row_to_charge).collect()
    }

    async fn put_with_refund(&self, charge: &Charge, refund: &Refund) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO refunds (id, charge_id, amount, reason, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(refund.id.to_string())
        .bind(refund.charge_id.to_string())
        .bind(refund.amount)
        .bind(refund.reason.as_str())
        .bind(refund.status.as_str())
        .bind(refund.created_at.naive_utc())
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        upsert_charge(&mut tx, charge).await?;

        tx.commit().await?;
        Ok(())
    }
}
