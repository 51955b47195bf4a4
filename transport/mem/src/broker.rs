use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering::Relaxed};
use std::sync::{Arc, Mutex};
use switchboard_core::error::CallError;
use tokio::sync::oneshot;

/// A reply slot shared between the queue groups a request was delivered to;
/// the first responder wins.
pub(crate) struct ReplyOnce(Mutex<Option<oneshot::Sender<Vec<u8>>>>);

impl ReplyOnce {
    pub(crate) fn send(&self, data: Vec<u8>) {
        if let Some(tx) = self.0.lock().unwrap().take() {
            let _ = tx.send(data);
        }
    }
}

/// One inbound request handed to a subscriber.
pub(crate) struct Delivery {
    pub data: Vec<u8>,
    pub reply: Arc<ReplyOnce>,
}

pub(crate) type Deliver = Arc<dyn Fn(Delivery) + Send + Sync>;

struct Subscription {
    id: u64,
    group: String,
    deliver: Deliver,
}

struct BrokerInner {
    subjects: Mutex<HashMap<String, Vec<Subscription>>>,
    next_sub_id: AtomicU64,
    rr: AtomicUsize,
}

/// A process-local message broker with request/reply and queue-group
/// semantics.
#[derive(Clone)]
pub struct MemBroker {
    inner: Arc<BrokerInner>,
}

/// A connection handle onto a [MemBroker]. Handles are equivalent
/// endpoints: servers subscribe through each of theirs, clients pick one
/// per call.
#[derive(Clone)]
pub struct MemConn {
    inner: Arc<BrokerInner>,
}

impl Default for MemBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                subjects: Mutex::new(HashMap::new()),
                next_sub_id: AtomicU64::new(1),
                rr: AtomicUsize::new(0),
            }),
        }
    }

    pub fn connect(&self) -> MemConn {
        MemConn { inner: self.inner.clone() }
    }
}

impl MemConn {
    pub(crate) fn queue_subscribe(&self, subject: &str, group: &str, deliver: Deliver) -> u64 {
        let id = self.inner.next_sub_id.fetch_add(1, Relaxed);
        let mut subjects = self.inner.subjects.lock().unwrap();
        subjects
            .entry(subject.to_string())
            .or_default()
            .push(Subscription { id, group: group.to_string(), deliver });
        id
    }

    pub(crate) fn unsubscribe(&self, subject: &str, id: u64) {
        let mut subjects = self.inner.subjects.lock().unwrap();
        if let Some(subs) = subjects.get_mut(subject) {
            subs.retain(|s| s.id != id);
            if subs.is_empty() {
                subjects.remove(subject);
            }
        }
    }

    /// Deliver a request to one member of every queue group subscribed on
    /// `subject` and return the reply slot. The deliver callbacks run on the
    /// caller's task and are expected to spawn.
    pub(crate) fn request(
        &self,
        subject: &str,
        data: Vec<u8>,
    ) -> Result<oneshot::Receiver<Vec<u8>>, CallError> {
        let subjects = self.inner.subjects.lock().unwrap();
        let Some(subs) = subjects.get(subject).filter(|v| !v.is_empty()) else {
            return Err(CallError::Transport(format!("no responders on {:?}", subject)));
        };

        let (tx, rx) = oneshot::channel();
        let reply = Arc::new(ReplyOnce(Mutex::new(Some(tx))));
        let seed = self.inner.rr.fetch_add(1, Relaxed);

        let mut groups: Vec<&str> = subs.iter().map(|s| s.group.as_str()).collect();
        groups.sort_unstable();
        groups.dedup();
        for group in groups {
            let members: Vec<&Subscription> =
                subs.iter().filter(|s| s.group == group).collect();
            let picked = &members[seed % members.len()];
            (picked.deliver)(Delivery { data: data.clone(), reply: reply.clone() });
        }
        Ok(rx)
    }
}
