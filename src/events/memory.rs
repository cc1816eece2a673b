// src/events/memory.rs
//! Publisher for development mode and tests: logs every event and keeps it

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::info;

use super::{Destination, EventPublisher, PublishError};

#[derive(Default)]
pub struct InMemoryPublisher {
    sent: Mutex<Vec<(Destination, Value)>>,
    failing: AtomicBool,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail, to exercise broker outages
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<(Destination, Value)> {
        self.sent.lock().await.clone()
    }

    pub async fn published_to(&self, name: &str) -> Vec<Value> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(d, _)| d.name() == name)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(
        &self,
        destination: Destination,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PublishError::Broker("publisher is offline".to_string()));
        }

        let event: Value = serde_json::from_slice(&payload)?;
        info!(destination = %destination, "📨 Event published (in-process)");
        self.sent.lock().await.push((destination, event));
        Ok(())
    }
}
