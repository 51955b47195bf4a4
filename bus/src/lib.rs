//! # switchboard-bus
//!
//! Session contracts for a streaming message bus (publish with asynchronous
//! acknowledgement, durable queue subscriptions) plus [StreamingConn], a
//! wrapper that keeps a session alive across disconnects: it reconnects
//! automatically and replays every durable subscription onto the new
//! session.
//!
//! Concrete bus bindings implement [BusDialer] / [BusSession]; everything
//! above them (the outbox connector, application subscribers) works against
//! these traits.

#[macro_use]
extern crate captains_log;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

mod conn;
pub use conn::StreamingConn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("not yet connected to streaming bus")]
    NotConnected,
    #[error("bus connection closed")]
    Closed,
    #[error("empty group name")]
    EmptyGroupName,
    #[error("subject {subject:?} group {group:?} has already subscribed")]
    DupSubscription { subject: String, group: String },
    #[error("publish not acknowledged in time")]
    AckTimeout,
    #[error("bus: {0}")]
    Other(String),
}

/// A message delivered to a subscription.
#[derive(Debug, Clone)]
pub struct BusMsg {
    pub subject: String,
    pub data: Vec<u8>,
    /// Position in the subject's stream, assigned by the bus.
    pub sequence: u64,
}

/// Callback invoked once per [BusSession::publish_async] with the publish id
/// and the ack outcome (`None` = acknowledged).
pub type AckHandler = Box<dyn FnOnce(&str, Option<BusError>) + Send + 'static>;

/// Callback invoked for each message delivered to a subscription.
pub type BusMsgHandler = Arc<dyn Fn(BusMsg) + Send + Sync>;

/// Callback invoked once when a session loses contact with the bus.
pub type LostHandler = Box<dyn FnOnce(BusError) + Send + 'static>;

/// Per-subscription options.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    /// How long to wait between subscribe attempts while a session is live.
    pub resubscribe_wait: Duration,
    /// How long the bus waits for the subscriber to ack a delivery.
    pub ack_wait: Option<Duration>,
    /// How many deliveries the bus may leave unacknowledged.
    pub max_inflight: Option<u32>,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self { resubscribe_wait: Duration::from_secs(5), ack_wait: None, max_inflight: None }
    }
}

/// Options for [StreamingConn].
#[derive(Debug, Clone)]
pub struct ConnOptions {
    /// Pause between reconnect attempts.
    pub reconnect_wait: Duration,
    /// How long a publish waits for its ack before the bus reports failure.
    pub pub_ack_wait: Duration,
}

impl Default for ConnOptions {
    fn default() -> Self {
        Self { reconnect_wait: Duration::from_secs(5), pub_ack_wait: Duration::from_secs(30) }
    }
}

/// One live session on a streaming bus.
#[async_trait]
pub trait BusSession: Send + Sync + 'static {
    /// Publish and wait for the ack.
    async fn publish(&self, subject: &str, data: &[u8]) -> Result<(), BusError>;

    /// Publish without waiting; `ack` fires later with the outcome. Returns
    /// the publish id the ack will carry.
    fn publish_async(
        &self,
        subject: &str,
        data: &[u8],
        ack: AckHandler,
    ) -> Result<String, BusError>;

    /// Subscribe `handler` to `subject` as part of the durable queue group
    /// `group`.
    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
        handler: BusMsgHandler,
        options: &SubscriptionOptions,
    ) -> Result<(), BusError>;

    fn close(&self);
}

/// Establishes sessions. `lost` must be invoked (once) when the session dies
/// after a successful dial.
#[async_trait]
pub trait BusDialer: Send + Sync + 'static {
    type Session: BusSession;

    async fn dial(&self, client_id: &str, lost: LostHandler) -> Result<Self::Session, BusError>;
}

/// The narrow publishing surface consumers like the outbox connector need;
/// every [BusSession] (including [StreamingConn]) provides it.
pub trait BusPublisher: Send + Sync + 'static {
    fn publish_async(
        &self,
        subject: &str,
        data: &[u8],
        ack: AckHandler,
    ) -> Result<String, BusError>;
}

impl<T: BusSession> BusPublisher for T {
    #[inline]
    fn publish_async(
        &self,
        subject: &str,
        data: &[u8],
        ack: AckHandler,
    ) -> Result<String, BusError> {
        BusSession::publish_async(self, subject, data, ack)
    }
}
