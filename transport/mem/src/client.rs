use crate::broker::MemConn;
use crate::subj;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};
use std::sync::{Arc, RwLock};
use switchboard::transport::{TransportClient, TransportRequestor};
use switchboard_core::error::CallError;
use switchboard_core::CallCtx;

/// A [TransportClient] over one or more broker connections; each call picks
/// one of them.
pub struct MemTransportClient {
    conns: RwLock<Option<Vec<MemConn>>>,
    rr: AtomicUsize,
}

/// Create a transport client over `conns`. Panics when `conns` is empty.
pub fn new_client(conns: Vec<MemConn>) -> Arc<MemTransportClient> {
    assert!(!conns.is_empty(), "no broker connections");
    Arc::new(MemTransportClient { conns: RwLock::new(Some(conns)), rr: AtomicUsize::new(0) })
}

#[async_trait]
impl TransportClient for MemTransportClient {
    async fn discover(
        &self,
        _ctx: &CallCtx,
        svc_name: &str,
    ) -> Result<Box<dyn TransportRequestor>, CallError> {
        let conn = {
            let guard = self.conns.read().unwrap();
            let Some(conns) = guard.as_ref() else {
                return Err(CallError::Closed);
            };
            let n = self.rr.fetch_add(1, Relaxed);
            conns[n % conns.len()].clone()
        };
        Ok(Box::new(MemRequestor { conn, svc_name: svc_name.to_string() }))
    }

    fn close(&self) {
        *self.conns.write().unwrap() = None;
    }
}

struct MemRequestor {
    conn: MemConn,
    svc_name: String,
}

#[async_trait]
impl TransportRequestor for MemRequestor {
    async fn invoke(
        &self,
        ctx: &CallCtx,
        write_req: &mut (dyn for<'r> FnMut(&'r mut Vec<u8>) -> Result<(), CallError> + Send),
    ) -> Result<Vec<u8>, CallError> {
        let mut req = Vec::new();
        write_req(&mut req)?;
        let rx = self.conn.request(&subj(&self.svc_name), req)?;
        let dropped = || CallError::Transport("reply channel dropped".to_string());
        match ctx.remaining() {
            Some(left) => match tokio::time::timeout(left, rx).await {
                Err(_) => Err(CallError::Timeout),
                Ok(reply) => reply.map_err(|_| dropped()),
            },
            None => rx.await.map_err(|_| dropped()),
        }
    }
}
