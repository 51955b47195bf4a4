use crate::{MsgEntry, MsgStore};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::{Arc, Mutex};

/// In-memory reference [MsgStore] with explicit transactions.
///
/// The durable equivalent is a single table
/// `(id INT AUTO_INCREMENT PRIMARY KEY, subject VARCHAR, data BLOB)`:
/// fetch is `SELECT id, subject, data ... ORDER BY id`, publish is an
/// `INSERT` inside the caller's transaction, and process_result is
/// `DELETE ... WHERE id IN (...)` for the acknowledged ids.
#[derive(Clone)]
pub struct MemStore {
    inner: Arc<MemStoreInner>,
}

struct MemStoreInner {
    // kept in id order; ids are assigned at commit
    rows: Mutex<Vec<MemEntry>>,
    next_id: AtomicU64,
}

/// One stored entry; the id is store-private and used to remove the entry
/// once its publish is acknowledged.
#[derive(Debug, Clone)]
pub struct MemEntry {
    id: u64,
    subject: String,
    data: Vec<u8>,
}

impl MsgEntry for MemEntry {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemStoreInner {
                rows: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Begin a transaction. Entries published into it become visible to
    /// [MsgStore::fetch] only at commit; dropping the transaction without
    /// committing discards them.
    pub fn begin(&self) -> MemStoreTx {
        MemStoreTx { store: self.inner.clone(), staged: Vec::new() }
    }

    /// Number of entries currently pending.
    pub fn pending(&self) -> usize {
        self.inner.rows.lock().unwrap().len()
    }
}

/// A pending transaction on a [MemStore].
pub struct MemStoreTx {
    store: Arc<MemStoreInner>,
    staged: Vec<(String, Vec<u8>)>,
}

impl MemStoreTx {
    /// Append a message to be published after commit. Kick the connector
    /// once the transaction commits.
    pub fn publish(&mut self, subject: &str, data: &[u8]) {
        self.staged.push((subject.to_string(), data.to_vec()));
    }

    /// Make the staged entries visible, in insertion order.
    pub fn commit(self) {
        let mut rows = self.store.rows.lock().unwrap();
        for (subject, data) in self.staged {
            let id = self.store.next_id.fetch_add(1, Relaxed);
            rows.push(MemEntry { id, subject, data });
        }
    }
}

#[async_trait]
impl MsgStore for MemStore {
    type Entry = MemEntry;

    fn fetch(&self) -> BoxStream<'static, MemEntry> {
        // re-query per call: snapshot the committed rows in id order
        let rows: Vec<MemEntry> = self.inner.rows.lock().unwrap().clone();
        futures::stream::iter(rows).boxed()
    }

    async fn process_result(&self, entries: &[MemEntry], results: &[bool]) {
        let remove: HashSet<u64> = entries
            .iter()
            .zip(results)
            .filter(|(_, ok)| **ok)
            .map(|(e, _)| e.id)
            .collect();
        if remove.is_empty() {
            return;
        }
        self.inner.rows.lock().unwrap().retain(|r| !remove.contains(&r.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(store: &MemStore) -> Vec<(String, Vec<u8>)> {
        store
            .fetch()
            .map(|e| (e.subject().to_string(), e.data().to_vec()))
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_commit_visibility() {
        let store = MemStore::new();

        let mut tx = store.begin();
        tx.publish("s.1", b"one");
        tx.publish("s.2", b"two");
        // not committed yet: invisible
        assert_eq!(store.pending(), 0);
        assert!(collect(&store).await.is_empty());
        tx.commit();

        let rows = collect(&store).await;
        assert_eq!(
            rows,
            vec![
                ("s.1".to_string(), b"one".to_vec()),
                ("s.2".to_string(), b"two".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_drop_discards() {
        let store = MemStore::new();
        let mut tx = store.begin();
        tx.publish("s.1", b"one");
        drop(tx);
        assert_eq!(store.pending(), 0);
    }

    #[tokio::test]
    async fn test_fetch_order_and_removal() {
        let store = MemStore::new();
        let mut tx = store.begin();
        for s in ["s.1", "s.2", "s.3"] {
            tx.publish(s, s.as_bytes());
        }
        tx.commit();

        let entries: Vec<MemEntry> = store.fetch().collect().await;
        // remove first and third only
        store.process_result(&entries, &[true, false, true]).await;

        let left = collect(&store).await;
        assert_eq!(left, vec![("s.2".to_string(), b"s.2".to_vec())]);

        // later inserts keep global insertion order
        let mut tx = store.begin();
        tx.publish("s.4", b"s.4");
        tx.commit();
        let subjects: Vec<String> =
            store.fetch().map(|e| e.subject().to_string()).collect().await;
        assert_eq!(subjects, vec!["s.2", "s.4"]);
    }
}
