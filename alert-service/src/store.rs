use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncPgConnection, RunQueryDsl};
use shared::AlertRecord;
use tokio::time;

use crate::error::StoreError;
use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

/// Typed access to tracked products, always scoped by shop.
#[async_trait]
pub trait AlertRecordStore: Send + Sync {
    async fn find_alert_record(
        &self,
        shop: &str,
        inventory_item_ref: &str,
    ) -> Result<Option<AlertRecord>, StoreError>;

    /// Flips `is_triggered` from `false` to `true`.
    ///
    /// Returns `false` when the record was already latched or no longer exists.
    async fn try_set_triggered(&self, record_id: i32) -> Result<bool, StoreError>;

    /// Flips `is_triggered` from `true` back to `false`.
    async fn release_triggered(&self, record_id: i32) -> Result<bool, StoreError>;

    async fn create_alert_record(&self, record: NewAlertRecord) -> Result<AlertRecord, StoreError>;
}

/// Runs a store operation, failing it once `limit` elapses.
pub async fn with_store_timeout<T, F>(limit: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

pub struct PgAlertStore {
    pool: DbPool,
}

impl PgAlertStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn set_triggered(&self, record_id: i32, from: bool, to: bool) -> Result<bool, StoreError> {
        let mut conn = self.pool.get().await?;

        let updated = diesel::update(
            alert_products::table
                .filter(alert_products::id.eq(record_id))
                .filter(alert_products::is_triggered.eq(from)),
        )
        .set((
            alert_products::is_triggered.eq(to),
            alert_products::updated_at.eq(Some(Utc::now())),
        ))
        .execute(&mut conn)
        .await?;

        Ok(updated == 1)
    }
}

#[async_trait]
impl AlertRecordStore for PgAlertStore {
    async fn find_alert_record(
        &self,
        shop: &str,
        inventory_item_ref: &str,
    ) -> Result<Option<AlertRecord>, StoreError> {
        let mut conn = self.pool.get().await?;

        let row = alert_products::table
            .filter(alert_products::shop.eq(shop))
            .filter(alert_products::inventory_item.eq(inventory_item_ref))
            .first::<DbAlertProduct>(&mut conn)
            .await
            .optional()?;

        row.map(AlertRecord::try_from).transpose()
    }

    async fn try_set_triggered(&self, record_id: i32) -> Result<bool, StoreError> {
        self.set_triggered(record_id, false, true).await
    }

    async fn release_triggered(&self, record_id: i32) -> Result<bool, StoreError> {
        self.set_triggered(record_id, true, false).await
    }

    async fn create_alert_record(&self, record: NewAlertRecord) -> Result<AlertRecord, StoreError> {
        let mut conn = self.pool.get().await?;

        let row = diesel::insert_into(alert_products::table)
            .values(&NewAlertProduct::from(record))
            .get_result::<DbAlertProduct>(&mut conn)
            .await?;

        AlertRecord::try_from(row)
    }
}
