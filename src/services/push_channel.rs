//! H5 push channel: best-effort fan-out of `{new_run, regression_detected,
//! baseline_updated}` events to WebSocket subscribers.
//!
//! Grounded on the `DashMap`-backed registry shape of `MySQLPoolManager`,
//! generalized from "one pool per cluster id" to "one bounded queue per
//! subscriber id". No replay: a subscriber only sees events emitted after
//! it registers.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{Regression, Run};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    NewRun { run_id: String, test_name: String },
    RegressionDetected { run_id: String, regression_id: String, severity: crate::models::Severity },
    BaselineUpdated { baseline_name: String, test_name: String },
}

impl PushEvent {
    pub fn new_run(run: &Run) -> Self {
        Self::NewRun { run_id: run.id.clone(), test_name: run.test_name.clone() }
    }

    pub fn regression_detected(regression: &Regression) -> Self {
        Self::RegressionDetected {
            run_id: regression.run_id.clone(),
            regression_id: regression.id.clone(),
            severity: regression.severity,
        }
    }

    pub fn baseline_updated(baseline_name: &str, test_name: &str) -> Self {
        Self::BaselineUpdated { baseline_name: baseline_name.to_string(), test_name: test_name.to_string() }
    }
}

pub type SubscriberId = Uuid;

/// Registry of subscriber queues. Producers never block: a full queue
/// means a slow subscriber, and the subscriber is disconnected rather
/// than the producer stalling.
pub struct PushChannel {
    subscribers: Arc<DashMap<SubscriberId, mpsc::Sender<PushEvent>>>,
    queue_capacity: usize,
}

impl PushChannel {
    pub fn new(queue_capacity: usize) -> Self {
        Self { subscribers: Arc::new(DashMap::new()), queue_capacity }
    }

    /// Registers a new subscriber and returns its id plus the receiving
    /// half of its bounded queue.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<PushEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.subscribers.insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.remove(&id);
    }

    /// Fans `event` out to every subscriber. A subscriber whose queue is
    /// full or whose receiver has dropped is removed; this call never
    /// blocks waiting on a slow consumer.
    pub fn publish(&self, event: PushEvent) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(event.clone()) {
                Ok(()) => {},
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = %entry.key(), "push channel overflow, disconnecting slow subscriber");
                    dead.push(*entry.key());
                },
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(*entry.key());
                },
            }
        }
        for id in dead {
            self.subscribers.remove(&id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for PushChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_run() -> Run {
        Run {
            id: "r1".to_string(),
            test_name: "T".to_string(),
            timestamp: Utc::now(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration_secs: 1.0,
            git_commit: None,
            git_branch: None,
            tags: vec![],
            target_rps: None,
            client_list: vec![],
            method_list: vec![],
            total_requests: 0,
            total_errors: 0,
            overall_error_rate: 0.0,
            avg_latency_ms: 0.0,
            min_latency_ms: None,
            p50_latency_ms: None,
            p95_latency_ms: None,
            p99_latency_ms: None,
            max_latency_ms: None,
            client_metrics: std::collections::HashMap::new(),
            environment: None,
            is_baseline: false,
            notes: None,
            artifact_path: None,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let channel = PushChannel::new(4);
        let (_id, mut rx) = channel.subscribe();
        channel.publish(PushEvent::new_run(&sample_run()));
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, PushEvent::NewRun { .. }));
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_disconnected() {
        let channel = PushChannel::new(1);
        let (id, _rx) = channel.subscribe();
        channel.publish(PushEvent::new_run(&sample_run()));
        channel.publish(PushEvent::new_run(&sample_run()));
        assert!(!channel.subscribers.contains_key(&id));
    }

    #[tokio::test]
    async fn unsubscribe_removes_entry() {
        let channel = PushChannel::new(4);
        let (id, _rx) = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);
        channel.unsubscribe(id);
        assert_eq!(channel.subscriber_count(), 0);
    }
}
