//! # switchboard
//!
//! A transport-agnostic service framework. A caller holds a uniform handle (a
//! [Service]) and invokes typed methods on it; the same handle may be backed
//! by an in-process registry or by a remote endpoint reached through a
//! pluggable wire protocol over a pluggable transport.
//!
//! The main types and constructors relate as follows:
//!
//! ```text
//!                                                           +-- inproc_client()
//!                    make()                                 |
//!     +------------------------------------- ServiceClient <+-- new_rpc_client(ClientProtocolFactory, TransportClient)
//!     |                                          * ^        |
//!     v         bind_interface()                 * *        +-- new_inproc_first_client(alt)
//!  Service --------------------> ServiceWith-  (req) (resp)
//!                                Interface       * *
//!                                   ^  |         * *        +-- inproc_server()
//!                                   |  |         v *        |
//!  LocalService::new() -------------+  +---> ServiceServer <+-- new_rpc_server(ServerProtocolFactory, TransportServer)
//!                                      register()
//! ```
//!
//! The central abstraction is the [Service] (and [ServiceWithInterface]):
//! a named entity whose methods can be invoked with type-erased payload
//! carriers checked against the [Method](switchboard_core::Method) descriptor
//! at runtime.
//!
//! ## Components
//!
//! `switchboard` is built from a collection of crates, each owning one layer:
//!
//! - [`switchboard-core`](https://docs.rs/switchboard-core): methods,
//!   interfaces, payload carriers, call context, errors
//! - [`switchboard-jsonrpc`](https://docs.rs/switchboard-jsonrpc): the
//!   reference JSON-RPC 2.0 protocol
//! - [`switchboard-mem`](https://docs.rs/switchboard-mem): an in-memory
//!   brokered request/reply transport
//! - [`switchboard-bus`](https://docs.rs/switchboard-bus): streaming-bus
//!   session contracts and the auto-reconnecting connection wrapper
//! - [`switchboard-outbox`](https://docs.rs/switchboard-outbox): the
//!   transactional-outbox store contract and publishing connector

#[macro_use]
extern crate captains_log;

mod service;
pub use service::{
    bind_interface, narrow_interface, HandlerFn, LocalService, MethodHandler, Service,
    ServiceClient, ServiceServer, ServiceWithInterface,
};
mod middleware;
pub use middleware::{
    decorate_client, decorate_server, decorate_service, decorate_service_with_interface,
    InvokeHandler, Middleware, ServiceHandler,
};
mod inproc;
pub use inproc::{
    inproc_client, inproc_server, new_inproc_first_client, InprocClient, InprocFirstClient,
    InprocServer, Registry,
};
pub mod protocol;
pub mod transport;
mod rpc;
pub use rpc::{new_rpc_client, new_rpc_server, RpcClient, RpcServer};

// re-export the core types, so that users don't need to use multiple crates
pub use switchboard_core::error::{AppError, CallError, MisuseError};
pub use switchboard_core::{
    is_valid_method_name, is_valid_service_name, CallCtx, Interface, Method, PassthruMap, Payload,
};
