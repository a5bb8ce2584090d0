use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use tracing::{debug, warn};

use crate::error::LedgerError;
use crate::store::{CheckoutSessionStore, CustomerStore, new_customer_id, new_session_id};
use crate::types::{Customer, Metadata, NewCheckoutSession, PaymentRecord, PaymentStatus};

/// Postgres mirror of the provider's customers and checkout sessions.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Converts a stored total to unsigned minor units.
pub(crate) fn amount_from_minor_units(amount: Option<i64>) -> Result<Option<u64>, LedgerError> {
    amount
        .map(|amount| u64::try_from(amount).map_err(|_| LedgerError::NegativeAmount(amount)))
        .transpose()
}

/// Keeps the string entries of a JSONB metadata object. Anything else is
/// dropped, since nothing enforces a schema on the column.
pub(crate) fn metadata_from_json(value: Value) -> Metadata {
    let Value::Object(map) = value else {
        debug!("ignoring non-object metadata");
        return Metadata::new();
    };
    map.into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            _ => {
                debug!(key = %key, "ignoring non-string metadata value");
                None
            }
        })
        .collect()
}

/// Drops sessions that failed to decode, logging which ones.
fn readable_sessions<I>(decoded: I) -> Vec<PaymentRecord>
where
    I: IntoIterator<Item = (Option<String>, Result<PaymentRecord>)>,
{
    decoded
        .into_iter()
        .filter_map(|(id, decoded)| match decoded {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(id = ?id, error = %error, "skipping unreadable checkout session");
                None
            }
        })
        .collect()
}

fn customer_from_row(row: &PgRow) -> Result<Customer> {
    let Json(metadata): Json<Value> = row.try_get("metadata")?;
    Ok(Customer {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        metadata: metadata_from_json(metadata),
    })
}

fn record_from_row(row: &PgRow) -> Result<PaymentRecord> {
    let amount_total = amount_from_minor_units(row.try_get("amount_total")?)?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let payment_status: String = row.try_get("payment_status")?;
    let Json(metadata): Json<Value> = row.try_get("metadata")?;
    let metadata = metadata_from_json(metadata);

    Ok(PaymentRecord {
        id: row.try_get("id")?,
        created_at,
        amount_total,
        currency: row.try_get("currency")?,
        payment_status: PaymentStatus::from(payment_status),
        metadata,
    })
}

#[async_trait]
impl CustomerStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT id, email, name, metadata FROM customers WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(customer_from_row).transpose()
    }

    async fn find_or_create(&self, email: &str, name: Option<&str>) -> Result<Customer> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(
            r#"INSERT INTO customers (id, email, name, metadata) VALUES ($1, $2, $3, '{}'::jsonb)
         ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
         RETURNING id, email, name, metadata"#,
        )
        .bind(new_customer_id())
        .bind(email)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert customer")?;
        customer_from_row(&row)
    }

    async fn update_metadata(&self, customer_id: &str, metadata: &Metadata) -> Result<()> {
        let res = sqlx::query("UPDATE customers SET metadata = $2 WHERE id = $1")
            .bind(customer_id)
            .bind(Json(metadata))
            .execute(&self.pool)
            .await?;
        if res.rows_affected() != 1 {
            bail!("customer {customer_id} not found");
        }
        Ok(())
    }
}

#[async_trait]
impl CheckoutSessionStore for PgStore {
    async fn list_recent(&self, limit: u32) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            r#"SELECT id, created_at, amount_total, currency, payment_status, metadata
         FROM checkout_sessions ORDER BY created_at DESC LIMIT $1"#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        // One unreadable row must not hide every other session from the report.
        Ok(readable_sessions(rows.iter().map(|row| {
            (row.try_get::<String, _>("id").ok(), record_from_row(row))
        })))
    }

    async fn create(&self, session: NewCheckoutSession) -> Result<PaymentRecord> {
        let amount = i64::try_from(session.amount_total).context("amount out of range")?;
        let row = sqlx::query(
            r#"INSERT INTO checkout_sessions (id, customer_id, amount_total, currency, payment_status, metadata)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, created_at, amount_total, currency, payment_status, metadata"#,
        )
        .bind(new_session_id())
        .bind(&session.customer_id)
        .bind(amount)
        .bind(&session.currency)
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(Json(&session.metadata))
        .fetch_one(&self.pool)
        .await
        .context("failed to create checkout session")?;
        record_from_row(&row)
    }

    async fn mark_paid(&self, id: &str) -> Result<bool> {
        let res = sqlx::query("UPDATE checkout_sessions SET payment_status = $2 WHERE id = $1")
            .bind(id)
            .bind(PaymentStatus::Paid.as_str())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn converts_stored_amounts() {
        assert_eq!(amount_from_minor_units(Some(780_000)), Ok(Some(780_000)));
        assert_eq!(amount_from_minor_units(None), Ok(None));
        assert_eq!(amount_from_minor_units(Some(0)), Ok(Some(0)));
    }

    #[test]
    fn rejects_negative_amounts() {
        assert_eq!(
            amount_from_minor_units(Some(-1)),
            Err(LedgerError::NegativeAmount(-1))
        );
    }

    #[test]
    fn unreadable_sessions_are_skipped() {
        let good = PaymentRecord {
            id: "cs_good".to_string(),
            created_at: Utc::now(),
            amount_total: Some(780_000),
            currency: "usd".to_string(),
            payment_status: PaymentStatus::Paid,
            metadata: Metadata::from([("affiliateRef".to_string(), "abc-123".to_string())]),
        };
        let bad = amount_from_minor_units(Some(-1))
            .map_err(anyhow::Error::from)
            .map(|_| good.clone());

        let kept = readable_sessions([
            (Some("cs_bad".to_string()), bad),
            (Some("cs_good".to_string()), Ok(good.clone())),
        ]);
        assert_eq!(kept, vec![good]);
    }

    #[test]
    fn keeps_only_string_metadata() {
        let metadata = metadata_from_json(json!({
            "affiliateRef": "abc-123",
            "packageKey": "single",
            "quantity": 2,
            "flags": ["a"],
            "note": null,
        }));
        assert_eq!(
            metadata,
            Metadata::from([
                ("affiliateRef".to_string(), "abc-123".to_string()),
                ("packageKey".to_string(), "single".to_string()),
            ])
        );
    }

    #[test]
    fn non_object_metadata_is_empty() {
        assert!(metadata_from_json(json!("affiliateRef=abc")).is_empty());
        assert!(metadata_from_json(json!([1, 2])).is_empty());
    }
}
