//! # labgate-mobile
//!
//! The mobile peer: parses the pairing deep link, registers into the
//! session, runs the biometric credential ceremony, and — only when the
//! relay explicitly asks — captures and reports the device location.
//!
//! Layout:
//! - `application` – the pure state machine ([`application::state`]), the
//!   credential challenge handler ([`application::credential`]), the bounded
//!   location capture ([`application::location`]), and the channel-driven
//!   flow ([`application::flow`]).
//! - `infrastructure` – the relay WebSocket client and the device
//!   geolocation stand-in.

pub mod application;
pub mod infrastructure;

pub use application::credential::{ChallengeHandler, CredentialDirectory, InMemoryCredentialDirectory};
pub use application::flow::{run_mobile_flow, MobileOutcome};
pub use application::state::{
    transition, FailureReason, MobileEffect, MobileEvent, MobileState, Transition,
};
