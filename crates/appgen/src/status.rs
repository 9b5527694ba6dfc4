//! Status publication for artifacts in flight.
//!
//! Uses a Tokio broadcast channel for live subscribers and keeps a history
//! so late observers (and tests) can inspect the full status sequence of
//! every artifact.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use scaffold::ArtifactStatus;

const CHANNEL_CAPACITY: usize = 256;

/// Receives every status change the retry controller produces.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, label: &str, status: ArtifactStatus);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub label: String,
    pub status: ArtifactStatus,
    pub at: DateTime<Utc>,
}

pub type SharedStatusBus = Arc<StatusBus>;

pub struct StatusBus {
    sender: broadcast::Sender<StatusUpdate>,
    history: Mutex<Vec<StatusUpdate>>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn shared(self) -> SharedStatusBus {
        Arc::new(self)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.sender.subscribe()
    }

    pub fn history(&self) -> Vec<StatusUpdate> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Status sequence published for one label, oldest first.
    pub fn statuses_for(&self, label: &str) -> Vec<ArtifactStatus> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|u| u.label == label)
            .map(|u| u.status)
            .collect()
    }

    fn record(&self, update: StatusUpdate) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update.clone());
        // No receivers is fine; the history keeps the update.
        if let Ok(count) = self.sender.send(update) {
            debug!(receivers = count, "status published");
        }
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusSink for StatusBus {
    async fn publish(&self, label: &str, status: ArtifactStatus) {
        info!(label, %status, "artifact status");
        self.record(StatusUpdate {
            label: label.to_string(),
            status,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_is_kept_per_label() {
        let bus = StatusBus::new();
        bus.publish("component Hero", ArtifactStatus::Generating).await;
        bus.publish("schema", ArtifactStatus::Generating).await;
        bus.publish("component Hero", ArtifactStatus::Success).await;

        assert_eq!(
            bus.statuses_for("component Hero"),
            vec![ArtifactStatus::Generating, ArtifactStatus::Success]
        );
        assert_eq!(bus.history().len(), 3);
    }

    #[tokio::test]
    async fn subscribers_receive_updates() {
        let bus = StatusBus::new();
        let mut rx = bus.subscribe();
        bus.publish("sql", ArtifactStatus::Retrying(1)).await;
        let update = rx.recv().await.unwrap();
        assert_eq!(update.label, "sql");
        assert_eq!(update.status, ArtifactStatus::Retrying(1));
    }
}
