#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Vela-Integration
//! Low-level transport plumbing shared by the Vela venue adapters: channel
//! sender abstractions, WebSocket connect/parse helpers, and the exponential
//! reconnect backoff policy.

use crate::error::SocketError;

/// Channel sender abstractions used to decouple producers from consumers.
pub mod channel;

/// All socket IO related errors.
pub mod error;

/// Exponential reconnect backoff policy with jitter.
pub mod reconnect;

/// WebSocket connect and frame-parsing helpers.
pub mod websocket;

/// [`Validator`]s are capable of determining if their internal state is valid.
pub trait Validator {
    /// Check if `Self` is valid for some use case.
    fn validate(self) -> Result<Self, SocketError>
    where
        Self: Sized;
}

/// [`Terminal`] types signal whether they represent the end of an event feed.
pub trait Terminal {
    /// Returns true if this value terminates the feed it arrived on.
    fn is_terminal(&self) -> bool;
}
