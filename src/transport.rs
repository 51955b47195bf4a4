//! RPC transport contracts: moving opaque request/reply bytes between a named
//! service endpoint and a caller.
//!
//! Implementations must load-balance across equivalent endpoints (pick-one
//! semantics) and support a graceful close that rejects subsequent
//! operations with [CallError::Closed].

use async_trait::async_trait;
use std::sync::Arc;
use switchboard_core::error::CallError;
use switchboard_core::CallCtx;

/// Handles one inbound message: reads the request from `req`, writes the
/// response into `resp`. Whatever is in `resp` afterwards goes back to the
/// caller, even when an error is returned; the returned error is internal
/// and only logged by the transport.
///
/// Handlers run concurrently, one task per inbound message.
#[async_trait]
pub trait TransportHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: CallCtx, req: &[u8], resp: &mut Vec<u8>) -> Result<(), CallError>;
}

/// Transport-level server: service registration plus request dispatch.
pub trait TransportServer: Send + Sync + 'static {
    /// Register `handler` under `svc_name`. Duplicate names fail with
    /// [CallError::SvcNameConflict].
    fn register(&self, svc_name: &str, handler: Arc<dyn TransportHandler>)
        -> Result<(), CallError>;

    /// Remove a registration; unknown names are not an error.
    fn deregister(&self, svc_name: &str) -> Result<(), CallError>;

    /// Release resources including live registrations. Idempotent.
    fn close(&self);
}

/// Issues one request and waits for the response or the context deadline.
#[async_trait]
pub trait TransportRequestor: Send {
    /// `write_req` serialises the request body into the buffer handed to it.
    async fn invoke(
        &self,
        ctx: &CallCtx,
        write_req: &mut (dyn for<'r> FnMut(&'r mut Vec<u8>) -> Result<(), CallError> + Send),
    ) -> Result<Vec<u8>, CallError>;
}

/// Transport-level client: service discovery plus request submission.
#[async_trait]
pub trait TransportClient: Send + Sync + 'static {
    /// Discover an endpoint serving `svc_name`; the returned requestor issues
    /// requests against that endpoint.
    async fn discover(
        &self,
        ctx: &CallCtx,
        svc_name: &str,
    ) -> Result<Box<dyn TransportRequestor>, CallError>;

    /// Release resources. Idempotent.
    fn close(&self);
}
