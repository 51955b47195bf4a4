use crate::{ConnectorOptions, MsgEntry, MsgStore};
use crossfire::mpsc;
use futures::StreamExt;
use std::collections::HashMap;
use switchboard_bus::{AckHandler, BusPublisher};
use tokio::sync::{mpsc as tokio_mpsc, watch};

/// Drains a [MsgStore] into a streaming bus, one batch at a time.
///
/// The loop fetches pending entries, publishes them in batches of at most
/// `batch`, waits for every acknowledgement of a batch, reports the outcome
/// mask to the store, and repeats until the store is drained. It then sleeps
/// until a kick, the periodic fetch interval, or stop.
///
/// One outstanding batch at a time bounds memory and keeps the store-result
/// accounting simple; within a batch, publishes are fully asynchronous.
pub struct Connector {
    kick_tx: tokio_mpsc::Sender<()>,
    stop_tx: watch::Sender<bool>,
}

impl Connector {
    /// Start the connector loop in the background.
    pub fn new<B, S>(bus: B, store: S, options: ConnectorOptions) -> Self
    where
        B: BusPublisher,
        S: MsgStore,
    {
        let (kick_tx, kick_rx) = tokio_mpsc::channel(1);
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(run_loop(bus, store, options, kick_rx, stop_rx));
        Self { kick_tx, stop_tx }
    }

    /// Make the connector fetch immediately. Non-blocking; at most one
    /// wakeup stays pending, excess kicks coalesce. Call after committing a
    /// transaction that wrote entries.
    pub fn kick(&self) {
        let _ = self.kick_tx.try_send(());
    }

    /// Stop the loop. A batch in flight is finished first, including
    /// waiting out its outstanding acknowledgements. Idempotent.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

async fn run_loop<B, S>(
    bus: B,
    store: S,
    options: ConnectorOptions,
    mut kick_rx: tokio_mpsc::Receiver<()>,
    mut stop_rx: watch::Receiver<bool>,
) where
    B: BusPublisher,
    S: MsgStore,
{
    loop {
        let mut stream = store.fetch();
        loop {
            let mut batch = Vec::new();
            while batch.len() < options.batch {
                match stream.next().await {
                    Some(entry) => batch.push(entry),
                    None => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            publish_batch(&bus, &store, batch).await;
        }
        drop(stream);

        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = tokio::time::sleep(options.fetch_interval) => {}
            kicked = kick_rx.recv() => {
                // the kick sender only goes away when the handle is
                // dropped, which means nobody can stop us later
                if kicked.is_none() {
                    break;
                }
            }
        }
    }
    debug!("outbox connector exit");
}

async fn publish_batch<B, S>(bus: &B, store: &S, batch: Vec<S::Entry>)
where
    B: BusPublisher,
    S: MsgStore,
{
    let n = batch.len();
    let mut results = vec![false; n];

    // acks arrive on foreign tasks and out of order; collect them over a
    // channel and map publish ids back to batch positions
    let (ack_tx, ack_rx) = mpsc::unbounded_async::<(String, bool)>();
    let mut id2idx: HashMap<String, usize> = HashMap::with_capacity(n);
    let mut outstanding = 0usize;

    for (i, entry) in batch.iter().enumerate() {
        // ack handlers run in sync context, hand them a blocking sender
        let tx: crossfire::MTx<(String, bool)> = ack_tx.clone().into();
        let ack: AckHandler = Box::new(move |id: &str, err| {
            let _ = tx.send((id.to_string(), err.is_none()));
        });
        match bus.publish_async(entry.subject(), entry.data(), ack) {
            Ok(id) => {
                id2idx.insert(id, i);
                outstanding += 1;
            }
            Err(e) => {
                // a synchronous failure never gets an ack; its result slot
                // simply stays false and the entry is re-drawn next fetch
                warn!("outbox: publish {:?} failed: {}", entry.subject(), e);
            }
        }
    }
    drop(ack_tx);

    // every issued publish must be awaited, even when stopping
    for _ in 0..outstanding {
        match ack_rx.recv().await {
            Ok((id, ok)) => {
                if ok {
                    if let Some(&i) = id2idx.get(&id) {
                        results[i] = true;
                    }
                }
            }
            // all ack handlers are gone; the missing ones count as failed
            Err(_) => break,
        }
    }

    store.process_result(&batch, &results).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemEntry, MemStore};
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use switchboard_bus::BusError;

    #[derive(Clone, Default)]
    struct ScriptedBus(Arc<ScriptedBusInner>);

    #[derive(Default)]
    struct ScriptedBusInner {
        next_id: AtomicU64,
        // subjects whose publish fails synchronously
        fail_sync: Mutex<HashSet<String>>,
        // subjects whose ack reports failure
        fail_ack: Mutex<HashSet<String>>,
        published: Mutex<Vec<String>>,
    }

    impl ScriptedBus {
        fn published(&self) -> Vec<String> {
            self.0.published.lock().unwrap().clone()
        }

        fn fail_ack(&self, subject: &str) {
            self.0.fail_ack.lock().unwrap().insert(subject.to_string());
        }

        fn fail_sync(&self, subject: &str) {
            self.0.fail_sync.lock().unwrap().insert(subject.to_string());
        }

        fn heal(&self) {
            self.0.fail_ack.lock().unwrap().clear();
            self.0.fail_sync.lock().unwrap().clear();
        }
    }

    impl BusPublisher for ScriptedBus {
        fn publish_async(
            &self,
            subject: &str,
            _data: &[u8],
            ack: AckHandler,
        ) -> Result<String, BusError> {
            if self.0.fail_sync.lock().unwrap().contains(subject) {
                return Err(BusError::NotConnected);
            }
            let id = self.0.next_id.fetch_add(1, Relaxed).to_string();
            self.0.published.lock().unwrap().push(subject.to_string());
            let nack = self.0.fail_ack.lock().unwrap().contains(subject);
            let ack_id = id.clone();
            // deliver the ack from a foreign task, like a real bus would
            tokio::spawn(async move {
                let outcome = if nack { Some(BusError::AckTimeout) } else { None };
                ack(&ack_id, outcome);
            });
            Ok(id)
        }
    }

    /// Records every mask handed to process_result, delegating to a
    /// [MemStore].
    #[derive(Clone)]
    struct RecordingStore {
        inner: MemStore,
        masks: Arc<Mutex<Vec<Vec<bool>>>>,
    }

    impl RecordingStore {
        fn new(inner: MemStore) -> Self {
            Self { inner, masks: Default::default() }
        }

        fn masks(&self) -> Vec<Vec<bool>> {
            self.masks.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MsgStore for RecordingStore {
        type Entry = MemEntry;

        fn fetch(&self) -> BoxStream<'static, MemEntry> {
            self.inner.fetch()
        }

        async fn process_result(&self, entries: &[MemEntry], results: &[bool]) {
            self.masks.lock().unwrap().push(results.to_vec());
            self.inner.process_result(entries, results).await;
        }
    }

    fn fast_options(batch: usize) -> ConnectorOptions {
        ConnectorOptions { batch, fetch_interval: Duration::from_secs(60) }
    }

    async fn eventually(what: &str, f: impl Fn() -> bool) {
        for _ in 0..400 {
            if f() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {}", what);
    }

    fn seed(store: &MemStore, subjects: &[&str]) {
        let mut tx = store.begin();
        for s in subjects {
            tx.publish(s, s.as_bytes());
        }
        tx.commit();
    }

    #[tokio::test]
    async fn test_kick_publishes_all() {
        let store = MemStore::new();
        let bus = ScriptedBus::default();
        let connector = Connector::new(bus.clone(), store.clone(), fast_options(500));

        seed(&store, &["s.1", "s.2", "s.3"]);
        connector.kick();

        eventually("store drained", || store.pending() == 0).await;
        assert_eq!(bus.published(), vec!["s.1", "s.2", "s.3"]);
        connector.stop();
    }

    #[tokio::test]
    async fn test_failed_ack_is_retried_in_position() {
        let store = MemStore::new();
        let recording = RecordingStore::new(store.clone());
        let bus = ScriptedBus::default();
        bus.fail_ack("s.2");
        let connector = Connector::new(bus.clone(), recording.clone(), fast_options(500));

        seed(&store, &["s.1", "s.2", "s.3"]);
        connector.kick();

        eventually("first mask reported", || !recording.masks().is_empty()).await;
        assert_eq!(recording.masks()[0], vec![true, false, true]);
        // the failed entry is still pending, in its original position
        assert_eq!(store.pending(), 1);

        bus.heal();
        connector.kick();
        eventually("retried entry drained", || store.pending() == 0).await;
        // s.2 went out again on the next batch
        assert_eq!(bus.published().iter().filter(|s| *s == "s.2").count(), 2);
        connector.stop();
    }

    #[tokio::test]
    async fn test_sync_publish_failure_stays_pending() {
        let store = MemStore::new();
        let recording = RecordingStore::new(store.clone());
        let bus = ScriptedBus::default();
        bus.fail_sync("s.2");
        let connector = Connector::new(bus.clone(), recording.clone(), fast_options(500));

        seed(&store, &["s.1", "s.2", "s.3"]);
        connector.kick();

        eventually("mask reported", || !recording.masks().is_empty()).await;
        assert_eq!(recording.masks()[0], vec![true, false, true]);
        // the sync failure never reached the bus
        assert_eq!(bus.published(), vec!["s.1", "s.3"]);
        assert_eq!(store.pending(), 1);
        connector.stop();
    }

    #[tokio::test]
    async fn test_batches_are_bounded() {
        let store = MemStore::new();
        let recording = RecordingStore::new(store.clone());
        let bus = ScriptedBus::default();
        let connector = Connector::new(bus.clone(), recording.clone(), fast_options(2));

        seed(&store, &["s.1", "s.2", "s.3", "s.4", "s.5"]);
        connector.kick();

        eventually("store drained", || store.pending() == 0).await;
        let masks = recording.masks();
        assert!(masks.iter().all(|m| m.len() <= 2), "masks: {:?}", masks);
        assert_eq!(masks.iter().map(|m| m.len()).sum::<usize>(), 5);
        connector.stop();
    }

    #[tokio::test]
    async fn test_tick_fetches_without_kick() {
        let store = MemStore::new();
        let bus = ScriptedBus::default();
        let options =
            ConnectorOptions { batch: 500, fetch_interval: Duration::from_millis(10) };
        let connector = Connector::new(bus.clone(), store.clone(), options);

        // no kick: the periodic tick is the safety net
        seed(&store, &["s.1"]);
        eventually("tick drained the store", || store.pending() == 0).await;
        connector.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_final() {
        let store = MemStore::new();
        let bus = ScriptedBus::default();
        let connector = Connector::new(bus.clone(), store.clone(), fast_options(500));

        seed(&store, &["s.1"]);
        connector.kick();
        eventually("drained before stop", || store.pending() == 0).await;

        connector.stop();
        connector.stop();

        // give the loop time to exit, then verify nothing moves anymore
        tokio::time::sleep(Duration::from_millis(20)).await;
        seed(&store, &["s.2"]);
        connector.kick();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.pending(), 1);
    }
}
