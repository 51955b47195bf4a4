//! # switchboard-outbox
//!
//! A transactional-outbox publisher. Business transactions append messages
//! to a durable store; the [Connector] asynchronously drains the store into
//! a streaming message bus with at-least-once delivery (receivers must be
//! idempotent, duplicates are possible).
//!
//! The store is abstract ([MsgStore]); [MemStore] is the in-memory reference
//! implementation. The bus side only needs
//! [BusPublisher](switchboard_bus::BusPublisher), which both raw sessions
//! and the auto-reconnecting wrapper provide.

#[macro_use]
extern crate captains_log;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

mod connector;
pub use connector::Connector;
mod mem_store;
pub use mem_store::{MemEntry, MemStore, MemStoreTx};

/// Default max entries per published batch.
pub const DEFAULT_BATCH: usize = 500;
/// Default safety-net fetch interval.
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(30);

/// One message waiting to be published.
pub trait MsgEntry: Send + Sync + 'static {
    /// Subject to publish under.
    fn subject(&self) -> &str;

    /// Message body.
    fn data(&self) -> &[u8];
}

/// The durable message store the connector drains.
#[async_trait]
pub trait MsgStore: Send + Sync + 'static {
    type Entry: MsgEntry;

    /// The pending entries in insertion order. Each call re-queries the
    /// store; the stream is finite and the consumer may drop it early.
    /// Entries committed by the time of the call must be visible,
    /// uncommitted ones must not.
    fn fetch(&self) -> BoxStream<'static, Self::Entry>;

    /// Report publish outcomes, `results[i]` belonging to `entries[i]`.
    /// Entries flagged `true` are removed durably. Removal is best effort: a
    /// failed removal only means the entry is published again later, which
    /// at-least-once delivery tolerates.
    ///
    /// `entries` never exceeds the connector's batch size.
    async fn process_result(&self, entries: &[Self::Entry], results: &[bool]);
}

/// Options for [Connector].
#[derive(Debug, Clone)]
pub struct ConnectorOptions {
    /// Max entries published per batch.
    pub batch: usize,
    /// How often to fetch even without a kick, as a safety net for missed
    /// kicks.
    pub fetch_interval: Duration,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self { batch: DEFAULT_BATCH, fetch_interval: DEFAULT_FETCH_INTERVAL }
    }
}
