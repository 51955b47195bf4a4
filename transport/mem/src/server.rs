use crate::broker::{Delivery, MemConn};
use crate::{subj, QUEUE_GROUP};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use switchboard::transport::{TransportHandler, TransportServer};
use switchboard_core::error::CallError;
use switchboard_core::CallCtx;

/// A [TransportServer] over one or more broker connections. Registrations
/// subscribe on every connection in the shared queue group, so equivalent
/// servers load-balance automatically.
pub struct MemTransportServer {
    conns: Vec<MemConn>,
    // svc name -> per-connection subscription ids; None once closed
    subs: Mutex<Option<HashMap<String, Vec<(usize, u64)>>>>,
}

/// Create a transport server over `conns`. Panics when `conns` is empty.
pub fn new_server(conns: Vec<MemConn>) -> Arc<MemTransportServer> {
    assert!(!conns.is_empty(), "no broker connections");
    Arc::new(MemTransportServer { conns, subs: Mutex::new(Some(HashMap::new())) })
}

impl TransportServer for MemTransportServer {
    fn register(
        &self,
        svc_name: &str,
        handler: Arc<dyn TransportHandler>,
    ) -> Result<(), CallError> {
        let mut guard = self.subs.lock().unwrap();
        let Some(subs) = guard.as_mut() else {
            return Err(CallError::Closed);
        };
        if subs.contains_key(svc_name) {
            return Err(CallError::SvcNameConflict);
        }

        let subject = subj(svc_name);
        let mut ids = Vec::with_capacity(self.conns.len());
        for (i, conn) in self.conns.iter().enumerate() {
            let handler = handler.clone();
            let name = svc_name.to_string();
            // one task per inbound message; whatever the handler wrote goes
            // back even when it reports an internal error, which is only
            // logged here
            let deliver = Arc::new(move |delivery: Delivery| {
                let handler = handler.clone();
                let name = name.clone();
                tokio::spawn(async move {
                    let mut resp = Vec::new();
                    if let Err(e) = handler.handle(CallCtx::new(), &delivery.data, &mut resp).await
                    {
                        error!("mem transport: service {:?} handler: {}", name, e);
                    }
                    delivery.reply.send(resp);
                });
            });
            let id = conn.queue_subscribe(&subject, QUEUE_GROUP, deliver);
            ids.push((i, id));
        }
        subs.insert(svc_name.to_string(), ids);
        Ok(())
    }

    fn deregister(&self, svc_name: &str) -> Result<(), CallError> {
        let mut guard = self.subs.lock().unwrap();
        let Some(subs) = guard.as_mut() else {
            return Err(CallError::Closed);
        };
        let Some(ids) = subs.remove(svc_name) else {
            return Ok(());
        };
        let subject = subj(svc_name);
        for (i, id) in ids {
            self.conns[i].unsubscribe(&subject, id);
        }
        Ok(())
    }

    fn close(&self) {
        let mut guard = self.subs.lock().unwrap();
        let Some(subs) = guard.take() else {
            return;
        };
        for (svc_name, ids) in subs {
            let subject = subj(&svc_name);
            for (i, id) in ids {
                self.conns[i].unsubscribe(&subject, id);
            }
        }
    }
}
