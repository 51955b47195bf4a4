//! # switchboard-core
//!
//! Core building blocks for the `switchboard` service framework:
//!
//! - [`Method`] / [`Interface`]: typed method descriptors and sets of them
//! - [`Payload`]: type-erased payload carriers moved across call boundaries
//! - [`CallCtx`]: per-call context (deadline + passthrough map)
//! - [`error`]: the error taxonomy shared by every layer
//!
//! Higher layers (service abstraction, RPC glue, transports) live in the
//! [switchboard](https://docs.rs/switchboard) crate.

pub mod error;
mod name;
pub use name::{is_valid_method_name, is_valid_service_name};
mod method;
pub use method::{Interface, Method, Payload};
mod ctx;
pub use ctx::{CallCtx, PassthruMap};
