use std::fmt;
use std::sync::Arc;

use shared::{AlertRecord, DeliveryPolicy, NotificationJob};
use tracing::{error, info, warn};

use crate::config::{LatchRecovery, Timeouts};
use crate::error::{DispatchError, GuardError, StoreError};
use crate::evaluator::Decision;
use crate::queue::{with_publish_timeout, JobHandle, NotificationQueue};
use crate::store::{with_store_timeout, AlertRecordStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    None,
    Latched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    NoOp,
    Enqueued { handle: JobHandle, mutation: Mutation },
}

/// Turns a firing decision into at most one queued job per latch.
///
/// Under `FireOnce` the conditional latch update must succeed before anything
/// is published, so racing events for one record enqueue exactly once.
pub struct DispatchGuard {
    store: Arc<dyn AlertRecordStore>,
    queue: Arc<dyn NotificationQueue>,
    delivery: DeliveryPolicy,
    recovery: LatchRecovery,
    timeouts: Timeouts,
}

impl DispatchGuard {
    pub fn new(
        store: Arc<dyn AlertRecordStore>,
        queue: Arc<dyn NotificationQueue>,
        delivery: DeliveryPolicy,
        recovery: LatchRecovery,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            queue,
            delivery,
            recovery,
            timeouts,
        }
    }

    pub async fn apply(
        &self,
        record: &AlertRecord,
        decision: Decision,
        available_quantity: i64,
    ) -> Result<GuardOutcome, GuardError> {
        match decision {
            Decision::NoFire => Ok(GuardOutcome::NoOp),
            Decision::FireNoLatch => {
                let handle = self.publish(record, available_quantity).await?;
                Ok(GuardOutcome::Enqueued {
                    handle,
                    mutation: Mutation::None,
                })
            }
            Decision::FireAndLatch => {
                let latched = match with_store_timeout(
                    self.timeouts.store,
                    self.store.try_set_triggered(record.id),
                )
                .await
                {
                    Ok(latched) => latched,
                    // The update may have committed after we stopped waiting.
                    Err(err @ StoreError::Timeout(_)) => {
                        self.recover_latch(record, &err).await;
                        return Err(err.into());
                    }
                    Err(err) => return Err(err.into()),
                };

                if !latched {
                    return Err(GuardError::StaleRecord(record.id));
                }

                match self.publish(record, available_quantity).await {
                    Ok(handle) => Ok(GuardOutcome::Enqueued {
                        handle,
                        mutation: Mutation::Latched,
                    }),
                    Err(err) => {
                        self.recover_latch(record, &err).await;
                        Err(err.into())
                    }
                }
            }
        }
    }

    async fn publish(
        &self,
        record: &AlertRecord,
        available_quantity: i64,
    ) -> Result<JobHandle, DispatchError> {
        let job = NotificationJob::new(record, available_quantity, self.delivery);
        with_publish_timeout(self.timeouts.publish, self.queue.enqueue(&job)).await
    }

    async fn recover_latch(&self, record: &AlertRecord, cause: &(dyn fmt::Display + Sync)) {
        match self.recovery {
            LatchRecovery::AcceptGap => {
                warn!(
                    record_id = record.id,
                    shop = %record.shop,
                    error = %cause,
                    "Record may be latched but notification was not queued"
                );
            }
            LatchRecovery::ReleaseLatch => {
                let released = with_store_timeout(
                    self.timeouts.store,
                    self.store.release_triggered(record.id),
                )
                .await;

                match released {
                    Ok(true) => info!(
                        record_id = record.id,
                        error = %cause,
                        "Released latch after failed dispatch"
                    ),
                    Ok(false) => warn!(record_id = record.id, "Latch was already cleared"),
                    Err(e) => error!(
                        record_id = record.id,
                        error = %e,
                        "Failed to release latch after failed dispatch"
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryAlertStore, RecordingQueue};
    use shared::FrequencyPolicy;

    fn record(frequency_policy: FrequencyPolicy) -> AlertRecord {
        AlertRecord {
            id: 7,
            shop: "demo.myshopify.com".to_string(),
            inventory_item_ref: "gid://shopify/InventoryItem/7".to_string(),
            threshold: 5,
            frequency_policy,
            is_triggered: false,
        }
    }

    fn guard(
        store: &Arc<InMemoryAlertStore>,
        queue: &Arc<RecordingQueue>,
        recovery: LatchRecovery,
    ) -> DispatchGuard {
        DispatchGuard::new(
            store.clone(),
            queue.clone(),
            DeliveryPolicy::default(),
            recovery,
            Timeouts::default(),
        )
    }

    #[tokio::test]
    async fn no_fire_touches_nothing() {
        let r = record(FrequencyPolicy::FireOnce);
        let store = Arc::new(InMemoryAlertStore::with_records([r.clone()]));
        let queue = Arc::new(RecordingQueue::new());

        let outcome = guard(&store, &queue, LatchRecovery::AcceptGap)
            .apply(&r, Decision::NoFire, 9)
            .await
            .unwrap();

        assert_eq!(outcome, GuardOutcome::NoOp);
        assert_eq!(store.mutations(), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn latch_precedes_enqueue() {
        let r = record(FrequencyPolicy::FireOnce);
        let store = Arc::new(InMemoryAlertStore::with_records([r.clone()]));
        let queue = Arc::new(RecordingQueue::new());

        let outcome = guard(&store, &queue, LatchRecovery::AcceptGap)
            .apply(&r, Decision::FireAndLatch, 5)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            GuardOutcome::Enqueued { mutation: Mutation::Latched, .. }
        ));
        assert!(store.get(r.id).unwrap().is_triggered);

        let jobs = queue.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].alert_record_id, r.id);
        assert_eq!(jobs[0].shop, r.shop);
        assert_eq!(jobs[0].delivery, DeliveryPolicy::default());
    }

    #[tokio::test]
    async fn lost_latch_race_is_stale_and_enqueues_nothing() {
        let r = record(FrequencyPolicy::FireOnce);
        let mut already = r.clone();
        already.is_triggered = true;
        let store = Arc::new(InMemoryAlertStore::with_records([already]));
        let queue = Arc::new(RecordingQueue::new());

        let err = guard(&store, &queue, LatchRecovery::AcceptGap)
            .apply(&r, Decision::FireAndLatch, 5)
            .await
            .unwrap_err();

        assert!(matches!(err, GuardError::StaleRecord(7)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn store_failure_on_latch_enqueues_nothing() {
        let r = record(FrequencyPolicy::FireOnce);
        let store = Arc::new(InMemoryAlertStore::with_records([r.clone()]));
        store.set_unavailable(true);
        let queue = Arc::new(RecordingQueue::new());

        let err = guard(&store, &queue, LatchRecovery::AcceptGap)
            .apply(&r, Decision::FireAndLatch, 5)
            .await
            .unwrap_err();

        assert!(matches!(err, GuardError::Store(_)));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn fire_always_never_mutates() {
        let r = record(FrequencyPolicy::FireAlways);
        let store = Arc::new(InMemoryAlertStore::with_records([r.clone()]));
        let queue = Arc::new(RecordingQueue::new());
        let guard = guard(&store, &queue, LatchRecovery::AcceptGap);

        for quantity in [2, 1] {
            let outcome = guard.apply(&r, Decision::FireNoLatch, quantity).await.unwrap();
            assert!(matches!(
                outcome,
                GuardOutcome::Enqueued { mutation: Mutation::None, .. }
            ));
        }

        assert_eq!(queue.len(), 2);
        assert_eq!(store.mutations(), 0);
    }

    #[tokio::test]
    async fn failed_publish_keeps_latch_when_accepting_gap() {
        let r = record(FrequencyPolicy::FireOnce);
        let store = Arc::new(InMemoryAlertStore::with_records([r.clone()]));
        let queue = Arc::new(RecordingQueue::new());
        queue.set_failing(true);

        let err = guard(&store, &queue, LatchRecovery::AcceptGap)
            .apply(&r, Decision::FireAndLatch, 5)
            .await
            .unwrap_err();

        assert!(matches!(err, GuardError::Dispatch(DispatchError::Unavailable(_))));
        assert!(store.get(r.id).unwrap().is_triggered);
    }

    #[tokio::test]
    async fn failed_publish_releases_latch_when_configured() {
        let r = record(FrequencyPolicy::FireOnce);
        let store = Arc::new(InMemoryAlertStore::with_records([r.clone()]));
        let queue = Arc::new(RecordingQueue::new());
        queue.set_failing(true);

        let err = guard(&store, &queue, LatchRecovery::ReleaseLatch)
            .apply(&r, Decision::FireAndLatch, 5)
            .await
            .unwrap_err();

        assert!(matches!(err, GuardError::Dispatch(_)));
        assert!(!store.get(r.id).unwrap().is_triggered);
        assert_eq!(store.mutations(), 2);
    }
}
