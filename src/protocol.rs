//! RPC protocol contracts: conversion between in-memory call values and wire
//! bytes, split into a server side (four phases) and a client side (two
//! phases).
//!
//! A factory yields a fresh protocol instance per call; instances may hold
//! per-call state (a request id, lazily-parsed fields) and are never shared
//! across concurrent calls.
//!
//! Phase semantics, common to the server-side steps:
//!
//! 1. A returned `Err` is an *internal* server error: it is handled by the
//!    server side (logged), never sent to the client, and ends the flow.
//!    Business errors and client mistakes belong *inside* the response,
//!    written by the phase itself.
//! 2. An `Ok(Done)` outcome means the protocol has already produced a
//!    complete response; the flow stops without error.
//! 3. Failures writing to `resp` are internal errors.

use switchboard_core::error::CallError;
use switchboard_core::{PassthruMap, Payload};

/// Outcome of [ServerProtocol::process_request].
#[derive(Debug)]
pub enum ReqPhase {
    /// A complete response (usually an error frame) has been written; stop.
    Done,
    /// The envelope parsed; continue with method lookup.
    Call { method: String, passthru: Option<PassthruMap> },
}

/// Outcome of [ServerProtocol::process_input].
#[derive(Debug, PartialEq, Eq)]
pub enum InputPhase {
    /// A complete response (a decode-error frame) has been written; stop.
    Done,
    /// The input carrier is filled; continue with the invocation.
    Ready,
}

/// Server-side protocol for one call.
pub trait ServerProtocol: Send {
    /// Parse the request envelope from `req`, extracting the method name and
    /// any passthrough metadata. On a malformed envelope, write an error
    /// frame into `resp` and return [ReqPhase::Done].
    fn process_request(&mut self, resp: &mut Vec<u8>, req: &[u8]) -> Result<ReqPhase, CallError>;

    /// Called when the parsed method name is not in the service's interface;
    /// writes a not-found error frame. Terminal.
    fn process_method_not_found(
        &mut self,
        resp: &mut Vec<u8>,
        method_name: &str,
    ) -> Result<(), CallError>;

    /// Decode the request payload into `input`. On a decode error, write an
    /// error frame and return [InputPhase::Done].
    fn process_input(
        &mut self,
        resp: &mut Vec<u8>,
        input: &mut dyn Payload,
    ) -> Result<InputPhase, CallError>;

    /// Serialise the invocation result: `output` on success, or the business
    /// error carried in `invoke_err`. Terminal.
    fn process_output(
        &mut self,
        resp: &mut Vec<u8>,
        output: &dyn Payload,
        invoke_err: Option<&CallError>,
    ) -> Result<(), CallError>;
}

/// Yields a fresh [ServerProtocol] per inbound call.
pub trait ServerProtocolFactory: Send + Sync + 'static {
    fn protocol(&self) -> Box<dyn ServerProtocol>;
}

/// Client-side protocol for one call.
pub trait ClientProtocol: Send {
    /// Serialise the request into `req`. `passthru`, when present, must reach
    /// the server untouched.
    fn process_input(
        &mut self,
        req: &mut Vec<u8>,
        method_name: &str,
        input: &dyn Payload,
        passthru: Option<&PassthruMap>,
    ) -> Result<(), CallError>;

    /// Deserialise the response into `output`, or return the error the
    /// response carries. Application errors decoded from the frame come back
    /// as [CallError::App].
    fn process_output(&mut self, resp: &[u8], output: &mut dyn Payload) -> Result<(), CallError>;
}

/// Yields a fresh [ClientProtocol] per outbound call.
pub trait ClientProtocolFactory: Send + Sync + 'static {
    fn protocol(&self) -> Box<dyn ClientProtocol>;
}
