use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use shared::{DeliveryPolicy, NotificationJob, Retention};
use tokio::time;
use tracing::debug;

use crate::error::DispatchError;

/// Broker-assigned position of a published job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Publishes notification jobs for the external delivery workers.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: &NotificationJob) -> Result<JobHandle, DispatchError>;
}

pub async fn with_publish_timeout<F>(limit: Duration, op: F) -> Result<JobHandle, DispatchError>
where
    F: Future<Output = Result<JobHandle, DispatchError>>,
{
    match time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout(limit)),
    }
}

pub struct KafkaNotificationQueue {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl KafkaNotificationQueue {
    pub fn new(producer: FutureProducer, topic: String, send_timeout: Duration) -> Self {
        Self {
            producer,
            topic,
            send_timeout,
        }
    }
}

#[async_trait]
impl NotificationQueue for KafkaNotificationQueue {
    async fn enqueue(&self, job: &NotificationJob) -> Result<JobHandle, DispatchError> {
        let json = serde_json::to_string(job)?;
        let key = job.alert_record_id.to_string();
        let record = FutureRecord::to(&self.topic)
            .payload(&json)
            .key(&key)
            .headers(delivery_headers(&job.name, &job.delivery));

        let (partition, offset) = self
            .producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| DispatchError::Unavailable(e.to_string()))?;

        debug!(job_id = %job.id, partition, offset, "Notification job published");
        Ok(JobHandle(format!("{}/{}/{}", self.topic, partition, offset)))
    }
}

/// Delivery policy as `(header, value)` pairs, mirroring what the payload carries.
pub fn delivery_header_values(job_name: &str, policy: &DeliveryPolicy) -> Vec<(&'static str, String)> {
    vec![
        ("job-name", job_name.to_string()),
        ("retain-on-success", retention_value(&policy.retain_on_success)),
        ("retain-on-failure", retention_value(&policy.retain_on_failure)),
        ("retry-attempts", policy.retry.max_attempts.to_string()),
        ("retry-backoff", policy.retry.strategy.as_str().to_string()),
        ("retry-delay-ms", policy.retry.base_delay_ms.to_string()),
    ]
}

fn delivery_headers(job_name: &str, policy: &DeliveryPolicy) -> OwnedHeaders {
    delivery_header_values(job_name, policy)
        .into_iter()
        .fold(OwnedHeaders::new(), |headers, (key, value)| {
            headers.insert(Header {
                key,
                value: Some(value.as_str()),
            })
        })
}

fn retention_value(retention: &Retention) -> String {
    match retention {
        Retention::Discard => "discard".to_string(),
        Retention::KeepLast { count } => format!("keep-last:{}", count),
    }
}
