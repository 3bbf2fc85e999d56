use super::messages::ProgressMessage;
use std::{collections::HashMap, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("subscriber channel closed")]
    Closed,
    #[error("subscriber did not accept the frame within {0:?}")]
    Timeout(Duration),
}

/// Sending half of one live progress connection.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: Uuid,
    tx: mpsc::Sender<ProgressMessage>,
}

impl Subscriber {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn send(&self, message: ProgressMessage, timeout: Duration) -> Result<(), BroadcastError> {
        self.tx
            .send_timeout(message, timeout)
            .await
            .map_err(|err| match err {
                mpsc::error::SendTimeoutError::Timeout(_) => BroadcastError::Timeout(timeout),
                mpsc::error::SendTimeoutError::Closed(_) => BroadcastError::Closed,
            })
    }
}

/// Registry of progress subscribers keyed by processing id.
///
/// Cloning shares the registry. Sends never happen while the lock is held.
#[derive(Clone)]
pub struct ProgressBroadcaster {
    registry: Arc<Mutex<HashMap<Uuid, Vec<Subscriber>>>>,
    send_timeout: Duration,
}

impl ProgressBroadcaster {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            send_timeout,
        }
    }

    /// Registers `subscriber` and greets it. A subscriber that cannot take the
    /// greeting is unregistered again before returning the error.
    pub async fn connect(
        &self,
        subscriber: Subscriber,
        processing_id: Uuid,
    ) -> Result<(), BroadcastError> {
        let handle = subscriber.clone();
        self.registry
            .lock()
            .await
            .entry(processing_id)
            .or_default()
            .push(subscriber);

        match handle
            .send(ProgressMessage::connected(processing_id), self.send_timeout)
            .await
        {
            Ok(()) => {
                info!(target = "hermes.progress", %processing_id, subscriber = %handle.id, "subscriber_connected");
                Ok(())
            }
            Err(err) => {
                self.disconnect(handle.id, processing_id).await;
                Err(err)
            }
        }
    }

    /// Returns whether the subscriber was registered.
    pub async fn disconnect(&self, subscriber_id: Uuid, processing_id: Uuid) -> bool {
        let mut registry = self.registry.lock().await;
        let Some(subscribers) = registry.get_mut(&processing_id) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| s.id != subscriber_id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            registry.remove(&processing_id);
        }
        if removed {
            debug!(target = "hermes.progress", %processing_id, subscriber = %subscriber_id, "subscriber_disconnected");
        }
        removed
    }

    /// Best-effort fan-out. Subscribers whose send fails are dropped from the
    /// registry before this returns. Returns the number of successful sends.
    pub async fn broadcast(&self, processing_id: Uuid, message: ProgressMessage) -> usize {
        let snapshot: Vec<Subscriber> = match self.registry.lock().await.get(&processing_id) {
            Some(subscribers) => subscribers.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for subscriber in &snapshot {
            match subscriber.send(message.clone(), self.send_timeout).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    debug!(
                        target = "hermes.progress",
                        %processing_id,
                        subscriber = %subscriber.id,
                        kind = message.kind(),
                        error = %err,
                        "subscriber_send_failed"
                    );
                    failed.push(subscriber.id);
                }
            }
        }

        if !failed.is_empty() {
            let mut registry = self.registry.lock().await;
            if let Some(subscribers) = registry.get_mut(&processing_id) {
                subscribers.retain(|s| !failed.contains(&s.id));
                if subscribers.is_empty() {
                    registry.remove(&processing_id);
                }
            }
        }
        delivered
    }

    /// Echoes a heartbeat to one subscriber. The registry is left untouched.
    pub async fn heartbeat(
        &self,
        subscriber: &Subscriber,
        processing_id: Uuid,
    ) -> Result<(), BroadcastError> {
        subscriber
            .send(ProgressMessage::heartbeat(processing_id), self.send_timeout)
            .await
    }

    /// Sends one frame to a single subscriber, e.g. the latest snapshot for a
    /// late joiner.
    pub async fn replay(
        &self,
        subscriber: &Subscriber,
        message: ProgressMessage,
    ) -> Result<(), BroadcastError> {
        subscriber.send(message, self.send_timeout).await
    }

    pub async fn subscriber_count(&self, processing_id: Uuid) -> usize {
        self.registry
            .lock()
            .await
            .get(&processing_id)
            .map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub async fn active_ids(&self) -> Vec<Uuid> {
        self.registry.lock().await.keys().copied().collect()
    }
}
