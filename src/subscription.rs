use crate::entity::EntityId;
use crate::error::{NuvoError, Result};
use crate::protocol::{MessageType, Notification};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Identifies one registered callback
pub type SubscriptionId = Uuid;

/// Callback invoked for every push message of the subscribed type
pub type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Registry multiplexing one push stream to many subscribers per message type
#[derive(Default)]
pub struct SubscriberHub {
    subscribers: Mutex<HashMap<MessageType, Vec<(SubscriptionId, Callback)>>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for one message type
    pub fn add(&self, message_type: MessageType, callback: Callback) -> SubscriptionId {
        let id = Uuid::new_v4();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(message_type)
            .or_default()
            .push((id, callback));
        tracing::debug!("Subscriber {} added for {:?}", id, message_type);
        id
    }

    /// Remove a callback; returns whether it was registered
    pub fn remove(&self, message_type: MessageType, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(&message_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub_id, _)| *sub_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(&message_type);
        }
        if removed {
            tracing::debug!("Subscriber {} removed for {:?}", id, message_type);
        }
        removed
    }

    /// Deliver a notification to every subscriber of its type, in registration order
    ///
    /// Callbacks run outside the registry lock, so they may subscribe or
    /// unsubscribe freely. Returns the number of callbacks invoked.
    pub fn publish(&self, notification: &Notification) -> usize {
        let callbacks: Vec<Callback> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&notification.message_type)
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();

        for callback in &callbacks {
            callback(notification);
        }
        callbacks.len()
    }

    /// Number of subscribers for a message type
    pub fn count(&self, message_type: MessageType) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&message_type)
            .map_or(0, Vec::len)
    }
}

/// Receiver for host refresh signals
///
/// Yields the id of every entity whose state changed and should be re-rendered.
pub struct RefreshReceiver {
    rx: broadcast::Receiver<EntityId>,
}

impl RefreshReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<EntityId>) -> Self {
        Self { rx }
    }

    /// Receive the next refresh signal
    pub async fn recv(&mut self) -> Result<EntityId> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => NuvoError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                NuvoError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive a refresh signal without blocking
    ///
    /// Returns `None` if no signal is pending.
    pub fn try_recv(&mut self) -> Result<Option<EntityId>> {
        match self.rx.try_recv() {
            Ok(id) => Ok(Some(id)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(NuvoError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(NuvoError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }
}
