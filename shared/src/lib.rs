use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Durable queue consumed by the notification worker pool.
pub const ALERT_QUEUE: &str = "inventory-alerts";

/// Job name the worker routes on.
pub const ALERT_JOB_NAME: &str = "send-inventory-alert";

pub const INVENTORY_ITEM_GID_PREFIX: &str = "gid://shopify/InventoryItem/";

/// Failed jobs kept around for inspection unless configured otherwise.
pub const DEFAULT_FAILED_JOB_RETENTION: u32 = 100;

/// Maps an upstream inventory item id onto the reference stored with alert records.
///
/// Ids already in global-id form are returned unchanged.
pub fn inventory_item_ref(external_id: &str) -> String {
    let external_id = external_id.trim();
    if external_id.starts_with(INVENTORY_ITEM_GID_PREFIX) {
        external_id.to_string()
    } else {
        format!("{}{}", INVENTORY_ITEM_GID_PREFIX, external_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyPolicy {
    #[serde(rename = "ONCE")]
    FireOnce,
    #[serde(rename = "ALWAYS")]
    FireAlways,
}

impl FrequencyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyPolicy::FireOnce => "ONCE",
            FrequencyPolicy::FireAlways => "ALWAYS",
        }
    }
}

impl fmt::Display for FrequencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrequencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ONCE" => Ok(FrequencyPolicy::FireOnce),
            "ALWAYS" => Ok(FrequencyPolicy::FireAlways),
            other => Err(format!("unknown alert frequency: {}", other)),
        }
    }
}

/// A tracked product variant and its low-stock policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i32,
    pub shop: String,
    pub inventory_item_ref: String,
    /// Inclusive: the alert fires once available stock is at or below this.
    pub threshold: i32,
    pub frequency_policy: FrequencyPolicy,
    /// Latch for `FireOnce`; ignored under `FireAlways`.
    pub is_triggered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEvent {
    pub shop: String,
    pub inventory_item_ref: String,
    /// Can go negative when an item is oversold.
    pub available_quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    Discard,
    KeepLast { count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Exponential,
}

impl BackoffStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffStrategy::Exponential => "exponential",
        }
    }
}

/// Retry schedule applied by the worker; carried on every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 1000,
        }
    }
}

/// Delivery policy attached to a job at publish time.
///
/// Always sent explicitly: broker and worker defaults differ on whether failed
/// jobs are retried at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPolicy {
    pub retain_on_success: Retention,
    pub retain_on_failure: Retention,
    pub retry: RetryPolicy,
}

impl DeliveryPolicy {
    pub fn alerting(failed_retention: u32, retry: RetryPolicy) -> Self {
        Self {
            retain_on_success: Retention::Discard,
            retain_on_failure: Retention::KeepLast {
                count: failed_retention,
            },
            retry,
        }
    }
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::alerting(DEFAULT_FAILED_JOB_RETENTION, RetryPolicy::default())
    }
}

/// Unit of work handed to the notification worker.
///
/// The worker re-reads the alert record by id, so the payload stays small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: Uuid,
    pub name: String,
    pub shop: String,
    pub alert_record_id: i32,
    pub available_quantity: i64,
    pub delivery: DeliveryPolicy,
    pub created_at: DateTime<Utc>,
}

impl NotificationJob {
    pub fn new(record: &AlertRecord, available_quantity: i64, delivery: DeliveryPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: ALERT_JOB_NAME.to_string(),
            shop: record.shop.clone(),
            alert_record_id: record.id,
            available_quantity,
            delivery,
            created_at: Utc::now(),
        }
    }
}
