//! # switchboard-jsonrpc
//!
//! A [JSON-RPC 2.0](https://www.jsonrpc.org/specification) protocol
//! implementation for the [switchboard](https://docs.rs/switchboard) service
//! framework.
//!
//! Requests carry one extension field `ctx` (an object of strings) holding
//! the call's passthrough metadata. Notifications are not supported: `id` is
//! required and must be a JSON string or number. Responses to the client are
//! matched against the request id; error responses bypass the id check.

mod msg;
mod protocol;
pub use protocol::{ClientFactory, ServerFactory};
