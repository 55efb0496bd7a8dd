//! In-memory store and queue for tests and local runs.
//!
//! Kept apart from the diesel-backed adapter: `diesel_async::RunQueryDsl` is
//! implemented for every type and would shadow the atomics' own `load`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use shared::{AlertRecord, NotificationJob};

use crate::error::{DispatchError, StoreError};
use crate::models::NewAlertRecord;
use crate::queue::{JobHandle, NotificationQueue};
use crate::store::AlertRecordStore;

#[derive(Debug, Default)]
pub struct InMemoryAlertStore {
    records: RwLock<HashMap<i32, AlertRecord>>,
    next_id: AtomicUsize,
    mutations: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = AlertRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write().unwrap_or_else(PoisonError::into_inner);
            for record in records {
                store.next_id.fetch_max(record.id.max(0) as usize, Ordering::SeqCst);
                map.insert(record.id, record);
            }
        }
        store
    }

    pub fn get(&self, record_id: i32) -> Option<AlertRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&record_id)
            .cloned()
    }

    pub fn remove(&self, record_id: i32) -> Option<AlertRecord> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&record_id)
    }

    /// Number of successful writes since creation.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Simulates an outage: every call fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn compare_and_set(&self, record_id: i32, from: bool, to: bool) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(&record_id) {
            Some(record) if record.is_triggered == from => {
                record.is_triggered = to;
                self.mutations.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AlertRecordStore for InMemoryAlertStore {
    async fn find_alert_record(
        &self,
        shop: &str,
        inventory_item_ref: &str,
    ) -> Result<Option<AlertRecord>, StoreError> {
        self.check_available()?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .values()
            .find(|r| r.shop == shop && r.inventory_item_ref == inventory_item_ref)
            .cloned())
    }

    async fn try_set_triggered(&self, record_id: i32) -> Result<bool, StoreError> {
        self.compare_and_set(record_id, false, true)
    }

    async fn release_triggered(&self, record_id: i32) -> Result<bool, StoreError> {
        self.compare_and_set(record_id, true, false)
    }

    async fn create_alert_record(&self, record: NewAlertRecord) -> Result<AlertRecord, StoreError> {
        self.check_available()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);

        if records
            .values()
            .any(|r| r.shop == record.shop && r.inventory_item_ref == record.inventory_item_ref)
        {
            return Err(StoreError::Conflict(format!(
                "{} already tracks {}",
                record.shop, record.inventory_item_ref
            )));
        }

        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1) as i32;
        let created = AlertRecord {
            id,
            shop: record.shop,
            inventory_item_ref: record.inventory_item_ref,
            threshold: record.threshold,
            frequency_policy: record.frequency_policy,
            is_triggered: false,
        };
        records.insert(id, created.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }
}

/// Keeps published jobs in memory; can be switched into a failing mode.
#[derive(Debug, Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<NotificationJob>>,
    failing: AtomicBool,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<NotificationJob> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationQueue for RecordingQueue {
    async fn enqueue(&self, job: &NotificationJob) -> Result<JobHandle, DispatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Unavailable("broker unreachable".to_string()));
        }
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        jobs.push(job.clone());
        Ok(JobHandle(format!("memory/{}", jobs.len() - 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{DeliveryPolicy, FrequencyPolicy};

    fn new_record(shop: &str, item: &str) -> NewAlertRecord {
        NewAlertRecord {
            shop: shop.to_string(),
            product_id: "gid://shopify/Product/1".to_string(),
            variant_id: String::new(),
            inventory_item_ref: item.to_string(),
            threshold: 3,
            frequency_policy: FrequencyPolicy::FireOnce,
        }
    }

    #[tokio::test]
    async fn lookups_are_scoped_by_shop() {
        let store = InMemoryAlertStore::new();
        let record = store
            .create_alert_record(new_record("a.myshopify.com", "gid://shopify/InventoryItem/1"))
            .await
            .unwrap();

        let found = store
            .find_alert_record("a.myshopify.com", "gid://shopify/InventoryItem/1")
            .await
            .unwrap();
        assert_eq!(found, Some(record));

        let other_shop = store
            .find_alert_record("b.myshopify.com", "gid://shopify/InventoryItem/1")
            .await
            .unwrap();
        assert_eq!(other_shop, None);
    }

    #[tokio::test]
    async fn duplicate_item_in_same_shop_conflicts() {
        let store = InMemoryAlertStore::new();
        let item = "gid://shopify/InventoryItem/1";
        store.create_alert_record(new_record("a.myshopify.com", item)).await.unwrap();

        let err = store
            .create_alert_record(new_record("a.myshopify.com", item))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store.create_alert_record(new_record("b.myshopify.com", item)).await.unwrap();
    }

    #[tokio::test]
    async fn latch_is_compare_and_set() {
        let store = InMemoryAlertStore::new();
        let record = store
            .create_alert_record(new_record("a.myshopify.com", "gid://shopify/InventoryItem/1"))
            .await
            .unwrap();

        assert!(store.try_set_triggered(record.id).await.unwrap());
        assert!(!store.try_set_triggered(record.id).await.unwrap());
        assert!(store.release_triggered(record.id).await.unwrap());
        assert!(!store.release_triggered(record.id).await.unwrap());
        assert_eq!(store.mutations(), 3);
    }

    #[tokio::test]
    async fn latching_a_deleted_record_reports_false() {
        let store = InMemoryAlertStore::new();
        let record = store
            .create_alert_record(new_record("a.myshopify.com", "gid://shopify/InventoryItem/1"))
            .await
            .unwrap();
        store.remove(record.id);

        assert!(!store.try_set_triggered(record.id).await.unwrap());
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = InMemoryAlertStore::new();
        store.set_unavailable(true);

        assert!(matches!(
            store.find_alert_record("a.myshopify.com", "x").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.try_set_triggered(1).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn recording_queue_fails_on_demand() {
        let queue = RecordingQueue::new();
        let record = AlertRecord {
            id: 4,
            shop: "demo.myshopify.com".to_string(),
            inventory_item_ref: "gid://shopify/InventoryItem/1".to_string(),
            threshold: 1,
            frequency_policy: FrequencyPolicy::FireAlways,
            is_triggered: false,
        };
        let job = NotificationJob::new(&record, 0, DeliveryPolicy::default());

        queue.enqueue(&job).await.unwrap();
        queue.set_failing(true);
        assert!(matches!(
            queue.enqueue(&job).await,
            Err(DispatchError::Unavailable(_))
        ));
        assert_eq!(queue.len(), 1);
    }
}
