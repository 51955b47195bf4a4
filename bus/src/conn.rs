use crate::{
    AckHandler, BusDialer, BusError, BusMsgHandler, BusSession, ConnOptions, SubscriptionOptions,
};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{
    AtomicBool, AtomicU64,
    Ordering::{AcqRel, Acquire, Relaxed},
};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// An auto-reconnecting wrapper around a [BusSession].
///
/// Reconnection runs on a dedicated task fed by a coalescing channel:
/// lost-session callbacks and failed attempts only post an event, so at most
/// one connect is ever in flight and callbacks never reenter the connect
/// path. Each successful connect installs a fresh session and replays every
/// recorded durable subscription onto it.
///
/// Subscriptions are durable only: they are keyed by `(subject, group)`,
/// duplicates fail, and entries are never removed. A subscribe that fails
/// retries until it lands or its session goes stale (a new session will
/// replay it).
///
/// Publish operations fail fast with [BusError::NotConnected] while no
/// session is live.
pub struct StreamingConn<D: BusDialer> {
    inner: Arc<ConnInner<D>>,
}

impl<D: BusDialer> Clone for StreamingConn<D> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct SessionState<S> {
    session: Arc<S>,
    stale_rx: watch::Receiver<()>,
    // dropped together with the state, closing every stale receiver
    _stale_tx: watch::Sender<()>,
}

struct SubEntry {
    subject: String,
    group: String,
    handler: BusMsgHandler,
    options: SubscriptionOptions,
}

struct ConnInner<D: BusDialer> {
    id: String,
    dialer: D,
    options: ConnOptions,
    state: ArcSwapOption<SessionState<D::Session>>,
    subs: Mutex<HashMap<(String, String), Arc<SubEntry>>>,
    closed: AtomicBool,
    attempts: AtomicU64,
    reconnect_tx: mpsc::Sender<()>,
}

impl<D: BusDialer> StreamingConn<D> {
    /// Start connecting in the background and return immediately.
    pub fn new(dialer: D, options: ConnOptions) -> Self {
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        let inner = Arc::new(ConnInner {
            id: Uuid::new_v4().to_string(),
            dialer,
            options,
            state: ArcSwapOption::new(None),
            subs: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            reconnect_tx,
        });
        let _ = inner.reconnect_tx.try_send(());
        tokio::spawn(ConnInner::reconnect_loop(Arc::downgrade(&inner), reconnect_rx));
        Self { inner }
    }

    /// The client id this wrapper dials with; stable across reconnects so
    /// durable state on the bus survives.
    pub fn client_id(&self) -> &str {
        &self.inner.id
    }

    fn current(&self) -> Result<Arc<D::Session>, BusError> {
        if self.inner.closed.load(Acquire) {
            return Err(BusError::Closed);
        }
        match self.inner.state.load_full() {
            Some(state) => Ok(state.session.clone()),
            None => Err(BusError::NotConnected),
        }
    }
}

impl<D: BusDialer> ConnInner<D> {
    async fn reconnect_loop(weak: Weak<Self>, mut rx: mpsc::Receiver<()>) {
        // the constructor posts the first event; later ones come from lost
        // sessions, failed attempts and close
        while rx.recv().await.is_some() {
            let Some(inner) = weak.upgrade() else { break };
            if inner.closed.load(Acquire) {
                break;
            }
            inner.connect_once().await;
        }
    }

    async fn connect_once(self: &Arc<Self>) {
        // tear the previous session down first; dropping its state closes
        // the stale channel and releases the subscribe-retry tasks
        if let Some(old) = self.state.swap(None) {
            old.session.close();
        }

        // reconnects pause; the very first attempt does not
        if self.attempts.fetch_add(1, Relaxed) > 0 {
            tokio::time::sleep(self.options.reconnect_wait).await;
        }
        if self.closed.load(Acquire) {
            return;
        }

        let lost: crate::LostHandler = {
            let tx = self.reconnect_tx.clone();
            Box::new(move |e: BusError| {
                warn!("streaming bus: session lost: {}", e);
                let _ = tx.try_send(());
            })
        };

        match self.dialer.dial(&self.id, lost).await {
            Err(e) => {
                warn!(
                    "streaming bus: connect failed: {}, retry in {:?}",
                    e, self.options.reconnect_wait
                );
                let _ = self.reconnect_tx.try_send(());
            }
            Ok(session) => {
                let session = Arc::new(session);
                let (stale_tx, stale_rx) = watch::channel(());
                self.state.store(Some(Arc::new(SessionState {
                    session: session.clone(),
                    stale_rx: stale_rx.clone(),
                    _stale_tx: stale_tx,
                })));
                // close() may have won the race against the dial; tear the
                // fresh session down again instead of leaking it
                if self.closed.load(Acquire) {
                    if let Some(state) = self.state.swap(None) {
                        state.session.close();
                    }
                    return;
                }
                debug!("streaming bus: connected, client_id={}", self.id);

                let subs: Vec<Arc<SubEntry>> =
                    self.subs.lock().unwrap().values().cloned().collect();
                for sub in subs {
                    tokio::spawn(subscribe_retry(session.clone(), sub, stale_rx.clone()));
                }
            }
        }
    }
}

/// Retry a queue subscribe until it lands or the session it targets goes
/// stale, meaning a new session will replay it.
async fn subscribe_retry<S: BusSession>(
    session: Arc<S>,
    sub: Arc<SubEntry>,
    mut stale_rx: watch::Receiver<()>,
) {
    loop {
        match session
            .queue_subscribe(&sub.subject, &sub.group, sub.handler.clone(), &sub.options)
            .await
        {
            Ok(()) => return,
            Err(e) => {
                warn!(
                    "streaming bus: subscribe {:?} group {:?} failed: {}, retry in {:?}",
                    sub.subject, sub.group, e, sub.options.resubscribe_wait
                );
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(sub.options.resubscribe_wait) => {}
            changed = stale_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl<D: BusDialer> BusSession for StreamingConn<D> {
    async fn publish(&self, subject: &str, data: &[u8]) -> Result<(), BusError> {
        self.current()?.publish(subject, data).await
    }

    fn publish_async(
        &self,
        subject: &str,
        data: &[u8],
        ack: AckHandler,
    ) -> Result<String, BusError> {
        self.current()?.publish_async(subject, data, ack)
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
        handler: BusMsgHandler,
        options: &SubscriptionOptions,
    ) -> Result<(), BusError> {
        if group.is_empty() {
            return Err(BusError::EmptyGroupName);
        }
        if self.inner.closed.load(Acquire) {
            return Err(BusError::Closed);
        }

        let key = (subject.to_string(), group.to_string());
        let sub = Arc::new(SubEntry {
            subject: subject.to_string(),
            group: group.to_string(),
            handler,
            options: options.clone(),
        });

        let live = {
            let mut subs = self.inner.subs.lock().unwrap();
            if subs.contains_key(&key) {
                return Err(BusError::DupSubscription {
                    subject: subject.to_string(),
                    group: group.to_string(),
                });
            }
            subs.insert(key, sub.clone());
            self.inner.state.load_full()
        };

        // with a live session, subscribe right away; otherwise the next
        // connect replays the recorded entry
        if let Some(state) = live {
            tokio::spawn(subscribe_retry(state.session.clone(), sub, state.stale_rx.clone()));
        }
        Ok(())
    }

    fn close(&self) {
        if self.inner.closed.swap(true, AcqRel) {
            return;
        }
        if let Some(old) = self.inner.state.swap(None) {
            old.session.close();
        }
        // wake the reconnect loop so it can exit
        let _ = self.inner.reconnect_tx.try_send(());
    }
}
