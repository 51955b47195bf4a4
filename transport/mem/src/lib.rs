//! # switchboard-mem
//!
//! An in-memory brokered request/reply transport for
//! [switchboard](https://docs.rs/switchboard): the reference transport used
//! for single-process wiring and tests.
//!
//! Services are advertised under `svc.<name>` subjects; server-side
//! subscribers join the shared `svc` queue group, so a request is delivered
//! to exactly one of the registered endpoints (pick-one load balancing).
//! Both the server and the client are built over one or more [MemConn]
//! handles, each standing in for a connection to the broker.

#[macro_use]
extern crate captains_log;

mod broker;
pub use broker::{MemBroker, MemConn};
mod server;
pub use server::{new_server, MemTransportServer};
mod client;
pub use client::{new_client, MemTransportClient};

pub(crate) fn subj(svc_name: &str) -> String {
    format!("svc.{}", svc_name)
}

pub(crate) const QUEUE_GROUP: &str = "svc";
