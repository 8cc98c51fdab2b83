//! Live reload: editor change coalescing and WebSocket fan-out.

mod coalescer;
mod document;
mod hub;
mod websocket;

pub use coalescer::{ChangeCoalescer, ChangeSink, DEFAULT_WINDOW};
pub use document::DocumentKind;
pub use hub::{BroadcastHub, CLIENT_QUEUE_CAPACITY, ClientConnection, ClientId};
pub(crate) use websocket::ws_handler;
