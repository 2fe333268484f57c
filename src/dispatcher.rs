//! Routing of asynchronous push messages to the entity they concern
//!
//! The amplifier delivers one message stream to every subscriber of a message
//! type, so each entity filters for its own zone or source. Per entity the
//! lifecycle is `Uninitialized → Subscribed → Live`, and detaching returns it
//! to `Uninitialized` for good: the connection reference is released and no
//! later delivery mutates state.

use crate::amplifier::Amplifier;
use crate::entity::EntityId;
use crate::error::{NuvoError, Result};
use crate::protocol::{DeviceEvent, MessageType, Notification};
use crate::subscription::{Callback, RefreshReceiver, SubscriptionId};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Attachment state of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Subscribed,
    Live,
}

/// What happened to one push message handed to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// State was updated and a refresh signalled
    Applied,
    /// Message concerns another zone or source
    Foreign,
    /// Payload could not be parsed or applied; dropped
    Malformed,
    /// Entity is not attached; ignored
    Inactive,
}

/// Entity-side state that device events are applied to
pub trait Tracker: Send + 'static {
    /// Apply an event whose origin matches the entity
    ///
    /// An error leaves the entity as it was; the message is dropped.
    fn apply(&mut self, event: &DeviceEvent) -> Result<()>;
}

struct Link {
    amplifier: Option<Arc<dyn Amplifier>>,
    lifecycle: Lifecycle,
    subscriptions: Vec<(MessageType, SubscriptionId)>,
}

struct Tracked<T> {
    state: T,
    available: bool,
}

struct Inner<T> {
    id: EntityId,
    message_types: Vec<MessageType>,
    link: Mutex<Link>,
    tracked: Mutex<Tracked<T>>,
    refresh: broadcast::Sender<EntityId>,
}

impl<T: Tracker> Inner<T> {
    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tracked(&self) -> MutexGuard<'_, Tracked<T>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, notification: &Notification) -> Delivery {
        // Held for the whole delivery so a concurrent detach cannot interleave
        let mut link = self.lock_link();
        if link.amplifier.is_none() || link.lifecycle == Lifecycle::Uninitialized {
            tracing::debug!("{}: {:?} message ignored, not attached", self.id, notification.message_type);
            return Delivery::Inactive;
        }

        let event = match notification.event() {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(
                    "{} {} {}: invalid {} message received: {}",
                    self.id.target.kind,
                    self.id.target.id,
                    self.id,
                    self.id.control,
                    e
                );
                return Delivery::Malformed;
            }
        };

        if event.origin() != self.id.target {
            tracing::trace!("{}: skipping message for {}", self.id, event.origin());
            return Delivery::Foreign;
        }

        {
            let mut tracked = self.lock_tracked();
            if let Err(e) = tracked.state.apply(&event) {
                tracing::debug!("{}: dropping {:?} message: {}", self.id, event.message_type(), e);
                return Delivery::Malformed;
            }
            tracked.available = true;
        }

        link.lifecycle = Lifecycle::Live;
        drop(link);

        // No receivers just means no host is listening yet
        let _ = self.refresh.send(self.id.clone());
        Delivery::Applied
    }
}

/// Binds one entity's state to the amplifier's push stream
pub struct Dispatcher<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Tracker> Dispatcher<T> {
    pub fn new(
        id: EntityId,
        message_types: &[MessageType],
        amplifier: Arc<dyn Amplifier>,
        state: T,
        refresh: broadcast::Sender<EntityId>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                message_types: message_types.to_vec(),
                link: Mutex::new(Link {
                    amplifier: Some(amplifier),
                    lifecycle: Lifecycle::Uninitialized,
                    subscriptions: Vec::new(),
                }),
                tracked: Mutex::new(Tracked {
                    state,
                    available: false,
                }),
                refresh,
            }),
        }
    }

    pub fn id(&self) -> &EntityId {
        &self.inner.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lock_link().lifecycle
    }

    pub fn available(&self) -> bool {
        self.inner.lock_tracked().available
    }

    /// Read the cached state
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.lock_tracked().state)
    }

    /// Subscribe to refresh signals from this entity's channel
    pub fn subscribe_refresh(&self) -> RefreshReceiver {
        RefreshReceiver::new(self.inner.refresh.subscribe())
    }

    /// Connection for the command path
    pub fn amplifier(&self) -> Result<Arc<dyn Amplifier>> {
        self.inner
            .lock_link()
            .amplifier
            .clone()
            .ok_or(NuvoError::ConnectionUnavailable)
    }

    /// Register one callback per message type
    ///
    /// Returns the connection so the caller can issue its initial query.
    /// Attaching twice keeps the existing subscriptions.
    pub fn attach(&self) -> Result<Arc<dyn Amplifier>> {
        let mut link = self.inner.lock_link();
        let amplifier = link
            .amplifier
            .clone()
            .ok_or(NuvoError::ConnectionUnavailable)?;

        if link.lifecycle != Lifecycle::Uninitialized {
            tracing::warn!("{}: already attached", self.inner.id);
            return Ok(amplifier);
        }

        for &message_type in &self.inner.message_types {
            let weak = Arc::downgrade(&self.inner);
            let callback: Callback = Arc::new(move |notification: &Notification| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle(notification);
                }
            });
            let id = amplifier.add_subscriber(message_type, callback);
            link.subscriptions.push((message_type, id));
        }

        link.lifecycle = Lifecycle::Subscribed;
        tracing::info!("{}: attached", self.inner.id);
        Ok(amplifier)
    }

    /// Hand one push message to this entity
    pub fn handle(&self, notification: &Notification) -> Delivery {
        self.inner.handle(notification)
    }

    /// Remove every subscription and release the connection
    pub fn detach(&self) {
        let mut link = self.inner.lock_link();
        let subscriptions: Vec<_> = link.subscriptions.drain(..).collect();
        if let Some(amplifier) = link.amplifier.take() {
            for (message_type, id) in subscriptions {
                if !amplifier.remove_subscriber(message_type, id) {
                    tracing::warn!("{}: subscription {} was already gone", self.inner.id, id);
                }
            }
        }
        link.lifecycle = Lifecycle::Uninitialized;
        tracing::info!("{}: detached", self.inner.id);
    }
}
