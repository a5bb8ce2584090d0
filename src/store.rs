//! Access to the payment provider's customer and checkout-session records.
//!
//! The ledger only needs a handful of operations from the provider, so they
//! are expressed as two traits. [`PgStore`](crate::postgres::PgStore) keeps a
//! mirror of those records in Postgres; [`MemoryStore`] holds them in process
//! for local runs and tests.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::{Customer, Metadata, NewCheckoutSession, PaymentRecord, PaymentStatus};

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>>;

    /// Returns the customer for `email`, creating it if needed.
    async fn find_or_create(&self, email: &str, name: Option<&str>) -> Result<Customer>;

    /// Replaces the metadata of an existing customer.
    async fn update_metadata(&self, customer_id: &str, metadata: &Metadata) -> Result<()>;
}

#[async_trait]
pub trait CheckoutSessionStore: Send + Sync {
    /// Newest sessions first, at most `limit` of them.
    async fn list_recent(&self, limit: u32) -> Result<Vec<PaymentRecord>>;

    /// Opens an unpaid session.
    async fn create(&self, session: NewCheckoutSession) -> Result<PaymentRecord>;

    /// Marks a session paid. Returns false if it does not exist.
    async fn mark_paid(&self, id: &str) -> Result<bool>;
}

pub(crate) fn new_customer_id() -> String {
    format!("cus_{}", Uuid::new_v4().simple())
}

pub(crate) fn new_session_id() -> String {
    format!("cs_{}", Uuid::new_v4().simple())
}

#[derive(Default)]
struct MemoryState {
    customers: Vec<Customer>,
    sessions: Vec<PaymentRecord>,
}

/// In-process store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session as the provider would have recorded it.
    pub async fn insert_session(&self, record: PaymentRecord) {
        self.state.write().await.sessions.push(record);
    }
}

#[async_trait]
impl CustomerStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let state = self.state.read().await;
        Ok(state.customers.iter().find(|c| c.email == email).cloned())
    }

    async fn find_or_create(&self, email: &str, name: Option<&str>) -> Result<Customer> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.customers.iter().find(|c| c.email == email) {
            return Ok(existing.clone());
        }
        let customer = Customer {
            id: new_customer_id(),
            email: email.to_string(),
            name: name.map(str::to_string),
            metadata: Metadata::new(),
        };
        state.customers.push(customer.clone());
        Ok(customer)
    }

    async fn update_metadata(&self, customer_id: &str, metadata: &Metadata) -> Result<()> {
        let mut state = self.state.write().await;
        match state.customers.iter_mut().find(|c| c.id == customer_id) {
            Some(customer) => {
                customer.metadata = metadata.clone();
                Ok(())
            }
            None => bail!("customer {customer_id} not found"),
        }
    }
}

#[async_trait]
impl CheckoutSessionStore for MemoryStore {
    async fn list_recent(&self, limit: u32) -> Result<Vec<PaymentRecord>> {
        let state = self.state.read().await;
        let mut sessions = state.sessions.clone();
        // Reverse first so equal timestamps list the latest insert first.
        sessions.reverse();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(limit as usize);
        Ok(sessions)
    }

    async fn create(&self, session: NewCheckoutSession) -> Result<PaymentRecord> {
        let record = PaymentRecord {
            id: new_session_id(),
            created_at: Utc::now(),
            amount_total: Some(session.amount_total),
            currency: session.currency,
            payment_status: PaymentStatus::Unpaid,
            metadata: session.metadata,
        };
        self.state.write().await.sessions.push(record.clone());
        Ok(record)
    }

    async fn mark_paid(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        Ok(match state.sessions.iter_mut().find(|s| s.id == id) {
            Some(session) => {
                session.payment_status = PaymentStatus::Paid;
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn session_at(id: &str, minutes: i64) -> PaymentRecord {
        PaymentRecord {
            id: id.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes),
            amount_total: Some(100),
            currency: "usd".to_string(),
            payment_status: PaymentStatus::Unpaid,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn find_or_create_is_idempotent() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let first = store.find_or_create("a@b.com", Some("A")).await.unwrap();
            let second = store.find_or_create("a@b.com", None).await.unwrap();
            assert_eq!(first, second);
            assert_eq!(store.find_by_email("a@b.com").await.unwrap(), Some(first));
            assert_eq!(store.find_by_email("c@d.com").await.unwrap(), None);
        });
    }

    #[test]
    fn updating_unknown_customer_fails() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            assert!(store.update_metadata("cus_missing", &Metadata::new()).await.is_err());
        });
    }

    #[test]
    fn lists_newest_sessions_first_up_to_limit() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            for (id, minutes) in [("cs_a", 1), ("cs_b", 3), ("cs_c", 2)] {
                store.insert_session(session_at(id, minutes)).await;
            }
            let ids: Vec<_> = store
                .list_recent(2)
                .await
                .unwrap()
                .into_iter()
                .map(|s| s.id)
                .collect();
            assert_eq!(ids, vec!["cs_b", "cs_c"]);
        });
    }

    #[test]
    fn marks_sessions_paid() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let created = store
                .create(NewCheckoutSession {
                    customer_id: "cus_1".to_string(),
                    amount_total: 780_000,
                    currency: "usd".to_string(),
                    metadata: Metadata::new(),
                })
                .await
                .unwrap();
            assert_eq!(created.payment_status, PaymentStatus::Unpaid);
            assert!(store.mark_paid(&created.id).await.unwrap());
            assert!(!store.mark_paid("cs_missing").await.unwrap());
            let listed = store.list_recent(10).await.unwrap();
            assert!(listed[0].is_paid());
        });
    }
}
