use crate::amplifier::Amplifier;
use crate::error::{NuvoError, Result};
use crate::protocol::{Command, DeviceEvent, MessageType, Notification, Query, Request};
use crate::subscription::{Callback, SubscriberHub, SubscriptionId};
use crate::types::Target;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use uuid::Uuid;

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A query waiting for the push message that answers it
struct PendingQuery {
    message_type: MessageType,
    target: Target,
    tx: oneshot::Sender<DeviceEvent>,
}

/// Connection state shared between senders and the delivery path
struct ConnectionState {
    pending_queries: HashMap<Uuid, PendingQuery>,
    /// Outbound queue drained by the serial library; `None` once closed
    outbox: Option<mpsc::UnboundedSender<Request>>,
}

/// In-process [`Amplifier`] bridging the serial library to entities
///
/// Outbound commands and queries are queued on an unbounded channel whose
/// receiving end belongs to the serial library. Inbound push messages are
/// handed to [`Connection::deliver`], which answers pending queries and fans
/// the message out to every subscriber of its type.
pub struct Connection {
    state: Mutex<ConnectionState>,
    hub: SubscriberHub,
}

impl Connection {
    /// Create a connection and the receiving end of its outbound queue
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (outbox, rx) = mpsc::unbounded_channel();
        let connection = Self {
            state: Mutex::new(ConnectionState {
                pending_queries: HashMap::new(),
                outbox: Some(outbox),
            }),
            hub: SubscriberHub::new(),
        };
        (connection, rx)
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a request without waiting for any answer
    fn enqueue(&self, request: Request) -> Result<()> {
        let state = self.lock();
        tracing::debug!("Sending: {:?}", request);

        state
            .outbox
            .as_ref()
            .ok_or(NuvoError::ConnectionUnavailable)?
            .send(request)
            .map_err(|_| NuvoError::ConnectionUnavailable)
    }

    /// Handle an inbound push message
    ///
    /// Returns the number of subscribers the message was delivered to.
    pub fn deliver(&self, notification: Notification) -> usize {
        tracing::debug!("Received: {:?}", notification);

        match notification.event() {
            Ok(event) => self.resolve_pending(&event),
            Err(e) => tracing::debug!("Push message cannot answer a query: {}", e),
        }

        self.hub.publish(&notification)
    }

    /// Parse a serialized push message and deliver it
    pub fn deliver_json(&self, text: &str) -> Result<usize> {
        let notification: Notification = serde_json::from_str(text)?;
        Ok(self.deliver(notification))
    }

    fn resolve_pending(&self, event: &DeviceEvent) {
        let message_type = event.message_type();
        let origin = event.origin();

        let mut state = self.lock();
        let answered: Vec<Uuid> = state
            .pending_queries
            .iter()
            .filter(|(_, p)| p.message_type == message_type && p.target == origin)
            .map(|(id, _)| *id)
            .collect();

        for id in answered {
            if let Some(pending) = state.pending_queries.remove(&id) {
                let _ = pending.tx.send(event.clone());
            }
        }
    }

    /// Close the outbound queue and fail every pending query
    pub fn close(&self) {
        let mut state = self.lock();
        state.outbox = None;
        state.pending_queries.clear();
        tracing::info!("Amplifier connection closed");
    }

    pub fn is_closed(&self) -> bool {
        self.lock().outbox.is_none()
    }

    /// Number of callbacks registered for a message type
    pub fn subscriber_count(&self, message_type: MessageType) -> usize {
        self.hub.count(message_type)
    }
}

#[async_trait]
impl Amplifier for Connection {
    fn add_subscriber(&self, message_type: MessageType, callback: Callback) -> SubscriptionId {
        self.hub.add(message_type, callback)
    }

    fn remove_subscriber(&self, message_type: MessageType, id: SubscriptionId) -> bool {
        self.hub.remove(message_type, id)
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.enqueue(Request::Command(command))
    }

    async fn request(&self, query: Query) -> Result<()> {
        self.enqueue(Request::Query(query))
    }

    async fn query(&self, query: Query) -> Result<DeviceEvent> {
        let query_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        // Register the pending query before the request can be answered
        {
            let mut state = self.lock();
            let outbox = state
                .outbox
                .clone()
                .ok_or(NuvoError::ConnectionUnavailable)?;

            state.pending_queries.insert(
                query_id,
                PendingQuery {
                    message_type: query.message_type(),
                    target: query.target(),
                    tx,
                },
            );

            tracing::debug!("Sending query: {:?}", query);
            if outbox.send(Request::Query(query)).is_err() {
                state.pending_queries.remove(&query_id);
                return Err(NuvoError::ConnectionUnavailable);
            }
        }

        match timeout(QUERY_TIMEOUT, rx).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(NuvoError::ConnectionClosed),
            Err(_) => {
                self.lock().pending_queries.remove(&query_id);
                Err(NuvoError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ZoneEqStatus, ZoneStatus, BalancePosition};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn eq_status(zone: u8) -> ZoneEqStatus {
        ZoneEqStatus {
            zone,
            bass: 4,
            treble: -2,
            loudcmp: false,
            balance_position: BalancePosition::Center,
            balance: 0,
        }
    }

    #[tokio::test]
    async fn query_resolves_from_push_stream() {
        let (connection, mut outbox) = Connection::new();
        let connection = Arc::new(connection);

        let device = connection.clone();
        tokio::spawn(async move {
            while let Some(request) = outbox.recv().await {
                if let Request::Query(Query::ZoneEqStatus { zone }) = request {
                    // An unrelated zone's answer must not resolve the query
                    let other = DeviceEvent::ZoneEqStatus(eq_status(zone + 1));
                    device.deliver(Notification::from_event(&other).unwrap());
                    let answer = DeviceEvent::ZoneEqStatus(eq_status(zone));
                    device.deliver(Notification::from_event(&answer).unwrap());
                }
            }
        });

        let eq = connection.zone_eq_status(3).await.unwrap();
        assert_eq!(eq.zone, 3);
        assert_eq!(eq.bass, 4);
    }

    #[tokio::test]
    async fn commands_are_queued_in_order() {
        let (connection, mut outbox) = Connection::new();
        connection.set_power(2, true).await.unwrap();
        connection.set_volume(2, 40).await.unwrap();

        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Command(Command::SetPower { zone: 2, on: true })
        );
        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Command(Command::SetVolume { zone: 2, volume: 40 })
        );
    }

    #[tokio::test]
    async fn close_fails_pending_queries_and_later_sends() {
        let (connection, _outbox) = Connection::new();
        let connection = Arc::new(connection);

        let waiter = connection.clone();
        let pending = tokio::spawn(async move { waiter.zone_status(1).await });

        // Let the query register before closing
        while connection.lock().pending_queries.is_empty() {
            tokio::task::yield_now().await;
        }
        connection.close();

        assert!(matches!(pending.await.unwrap(), Err(NuvoError::ConnectionClosed)));
        assert!(connection.is_closed());
        assert!(matches!(
            connection.set_mute(1, true).await,
            Err(NuvoError::ConnectionUnavailable)
        ));
    }

    #[tokio::test]
    async fn dropped_outbox_makes_connection_unavailable() {
        let (connection, outbox) = Connection::new();
        drop(outbox);
        assert!(matches!(
            connection.request(Query::ZoneStatus { zone: 1 }).await,
            Err(NuvoError::ConnectionUnavailable)
        ));
    }

    #[test]
    fn deliver_json_fans_out_to_subscribers() {
        let (connection, _outbox) = Connection::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let counter = hits.clone();
            connection.add_subscriber(
                MessageType::ZoneStatus,
                Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }

        let status = ZoneStatus {
            zone: 1,
            power: true,
            source: Some(2),
            volume: Some(30),
            mute: false,
        };
        let text =
            serde_json::to_string(&Notification::new(MessageType::ZoneStatus, &status).unwrap()).unwrap();
        assert_eq!(connection.deliver_json(&text).unwrap(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(connection.deliver_json("not json").is_err());
    }
}
