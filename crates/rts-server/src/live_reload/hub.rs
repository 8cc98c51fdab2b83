//! Broadcast hub.
//!
//! Owns the set of connected WebSocket clients and fans messages out to
//! them. Each client is represented by the sending half of a bounded
//! in-order queue that its connection task drains into the socket. A
//! client whose queue is full is skipped for that message.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::coalescer::ChangeSink;

/// Envelopes a client may have queued before further messages skip it.
pub const CLIENT_QUEUE_CAPACITY: usize = 64;

/// Identifier of a connected client.
pub type ClientId = Uuid;

/// Payload wrapper sent to every client: `{"content": ...}`.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct Envelope<'a> {
    content: &'a str,
}

/// A newly registered client: its id and the queue of envelopes for it.
#[derive(Debug)]
pub struct ClientConnection {
    /// Id used to disconnect and to attribute relayed messages.
    pub id: ClientId,
    /// Serialized envelopes, in broadcast order.
    pub receiver: mpsc::Receiver<Arc<str>>,
}

/// Connected client set with fan-out.
#[derive(Debug)]
pub struct BroadcastHub {
    clients: Mutex<HashMap<ClientId, mpsc::Sender<Arc<str>>>>,
    closed: AtomicBool,
    echo_to_sender: bool,
}

impl BroadcastHub {
    /// Create an empty hub.
    ///
    /// `echo_to_sender` controls whether a message relayed from a client is
    /// also delivered back to that client.
    #[must_use]
    pub fn new(echo_to_sender: bool) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            echo_to_sender,
        }
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<ClientId, mpsc::Sender<Arc<str>>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new client.
    ///
    /// After [`close_all`](Self::close_all) the returned queue is already
    /// closed, so the connection ends immediately.
    pub fn connect(&self) -> ClientConnection {
        let (tx, receiver) = mpsc::channel(CLIENT_QUEUE_CAPACITY);
        let id = Uuid::new_v4();

        let count = {
            let mut clients = self.clients();
            if self.closed.load(Ordering::Acquire) {
                tracing::debug!(client = %id, "Hub closed, rejecting client");
                return ClientConnection { id, receiver };
            }
            clients.insert(id, tx);
            clients.len()
        };
        tracing::info!(client = %id, clients = count, "Client connected");

        ClientConnection { id, receiver }
    }

    /// Remove a client. Unknown ids are ignored.
    pub fn disconnect(&self, id: ClientId) {
        let (removed, count) = {
            let mut clients = self.clients();
            let removed = clients.remove(&id).is_some();
            (removed, clients.len())
        };
        if removed {
            tracing::info!(client = %id, clients = count, "Client disconnected");
        }
    }

    /// Drop every client queue, ending all connection tasks. Clients
    /// connecting afterwards are closed on arrival.
    pub fn close_all(&self) {
        let closed = {
            let mut clients = self.clients();
            self.closed.store(true, Ordering::Release);
            std::mem::take(&mut *clients).len()
        };
        if closed > 0 {
            tracing::info!(clients = closed, "Closed all client connections");
        }
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients().len()
    }

    /// Send `message` wrapped in an envelope to every writable client.
    ///
    /// Returns the number of clients the envelope was queued for.
    pub fn broadcast(&self, message: &str) -> usize {
        self.fan_out(message, None)
    }

    /// Relay a message received from `sender` to the connected clients.
    ///
    /// The sender is included unless the hub was created without echo.
    pub fn on_client_message(&self, sender: ClientId, message: &str) -> usize {
        tracing::debug!(client = %sender, bytes = message.len(), "Received client message");
        let skip = (!self.echo_to_sender).then_some(sender);
        self.fan_out(message, skip)
    }

    fn fan_out(&self, message: &str, skip: Option<ClientId>) -> usize {
        let envelope: Arc<str> = match serde_json::to_string(&Envelope { content: message }) {
            Ok(json) => json.into(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize envelope");
                return 0;
            }
        };

        // Snapshot under the lock; send outside it so a concurrent
        // disconnect never observes a half-iterated map.
        let targets: Vec<_> = self
            .clients()
            .iter()
            .filter(|(id, _)| Some(**id) != skip)
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(&envelope)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::trace!(client = %id, "Skipping slow client");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!(client = %id, "Skipping closed client");
                }
            }
        }

        tracing::debug!(clients = delivered, "Broadcast message");
        delivered
    }
}

impl ChangeSink for BroadcastHub {
    fn emit(&self, content: String) {
        self.broadcast(&content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drain(connection: &mut ClientConnection) -> Vec<String> {
        let mut messages = Vec::new();
        while let Ok(message) = connection.receiver.try_recv() {
            messages.push(message.to_string());
        }
        messages
    }

    #[test]
    fn test_envelope_serialization() {
        let json = serde_json::to_value(Envelope { content: "<p>x</p>" }).unwrap();
        assert_eq!(json, serde_json::json!({ "content": "<p>x</p>" }));
    }

    #[test]
    fn test_connect_and_disconnect() {
        let hub = BroadcastHub::new(true);
        let a = hub.connect();
        let b = hub.connect();
        assert_ne!(a.id, b.id);
        assert_eq!(hub.client_count(), 2);

        hub.disconnect(a.id);
        assert_eq!(hub.client_count(), 1);

        // Second disconnect is a no-op
        hub.disconnect(a.id);
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_client_once() {
        let hub = BroadcastHub::new(true);
        let mut a = hub.connect();
        let mut b = hub.connect();
        let mut c = hub.connect();

        assert_eq!(hub.broadcast("m"), 3);

        let expected = vec![r#"{"content":"m"}"#.to_owned()];
        assert_eq!(drain(&mut a), expected);
        assert_eq!(drain(&mut b), expected);
        assert_eq!(drain(&mut c), expected);
    }

    #[test]
    fn test_broadcast_skips_closed_client() {
        let hub = BroadcastHub::new(true);
        let mut a = hub.connect();
        let b = hub.connect();
        let mut c = hub.connect();

        // B's connection task went away without disconnecting yet
        drop(b.receiver);

        assert_eq!(hub.broadcast("m"), 2);
        assert_eq!(drain(&mut a).len(), 1);
        assert_eq!(drain(&mut c).len(), 1);
        // Skipping does not remove the client
        assert_eq!(hub.client_count(), 3);
    }

    #[test]
    fn test_broadcast_with_no_clients() {
        let hub = BroadcastHub::new(true);
        assert_eq!(hub.broadcast("m"), 0);
    }

    #[test]
    fn test_per_client_order_preserved() {
        let hub = BroadcastHub::new(true);
        let mut a = hub.connect();

        hub.broadcast("1");
        hub.broadcast("2");
        hub.broadcast("3");

        assert_eq!(
            drain(&mut a),
            vec![
                r#"{"content":"1"}"#.to_owned(),
                r#"{"content":"2"}"#.to_owned(),
                r#"{"content":"3"}"#.to_owned(),
            ]
        );
    }

    #[test]
    fn test_client_message_relayed_to_all_including_sender() {
        let hub = BroadcastHub::new(true);
        let mut sender = hub.connect();
        let mut other = hub.connect();

        assert_eq!(hub.on_client_message(sender.id, "edit"), 2);
        assert_eq!(drain(&mut sender), vec![r#"{"content":"edit"}"#.to_owned()]);
        assert_eq!(drain(&mut other), vec![r#"{"content":"edit"}"#.to_owned()]);
    }

    #[test]
    fn test_client_message_without_echo_skips_sender() {
        let hub = BroadcastHub::new(false);
        let mut sender = hub.connect();
        let mut other = hub.connect();

        assert_eq!(hub.on_client_message(sender.id, "edit"), 1);
        assert!(drain(&mut sender).is_empty());
        assert_eq!(drain(&mut other).len(), 1);
    }

    #[test]
    fn test_close_all_ends_client_queues() {
        let hub = BroadcastHub::new(true);
        let mut a = hub.connect();

        hub.close_all();

        assert_eq!(hub.client_count(), 0);
        assert!(matches!(
            a.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_broadcast_skips_stalled_client() {
        let hub = BroadcastHub::new(true);
        let stalled = hub.connect();
        let mut active = hub.connect();

        for _ in 0..CLIENT_QUEUE_CAPACITY {
            assert_eq!(hub.broadcast("m"), 2);
            drain(&mut active);
        }

        // The stalled queue is full: later messages skip it without
        // disconnecting it, and the active client still receives them
        for _ in 0..100 {
            assert_eq!(hub.broadcast("m"), 1);
            assert_eq!(drain(&mut active).len(), 1);
        }
        assert_eq!(stalled.receiver.len(), CLIENT_QUEUE_CAPACITY);
        assert_eq!(hub.client_count(), 2);
    }

    #[test]
    fn test_connect_after_close_all_is_closed() {
        let hub = BroadcastHub::new(true);
        hub.close_all();

        let mut late = hub.connect();

        assert_eq!(hub.client_count(), 0);
        assert_eq!(hub.broadcast("m"), 0);
        assert!(matches!(
            late.receiver.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_content_is_escaped() {
        let hub = BroadcastHub::new(true);
        let mut a = hub.connect();

        hub.broadcast("say \"hi\"\n");

        let message = drain(&mut a).remove(0);
        let json: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(json["content"], "say \"hi\"\n");
    }

    #[test]
    fn test_hub_is_change_sink() {
        let hub = BroadcastHub::new(true);
        let mut a = hub.connect();

        hub.emit("abc".to_owned());

        assert_eq!(drain(&mut a), vec![r#"{"content":"abc"}"#.to_owned()]);
    }
}
