//! # labgate-desktop
//!
//! The desktop peer: opens a pairing session against the relay, renders the
//! pairing deep link for the mobile device, drives the login flow state
//! machine to a decision, and — once admitted — runs the continuous
//! post-login re-verification loop.
//!
//! Layout:
//! - `domain` – desktop configuration.
//! - `application` – the pure state machine ([`application::state`]), the
//!   channel-driven login flow ([`application::flow`]), and the
//!   re-verification loop ([`application::reverify`]).
//! - `infrastructure` – the WebSocket relay client with its supervised
//!   reconnect policy.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::flow::{run_login_flow, FlowOutcome};
pub use application::reverify::{ReverifyConfig, ReverifyEvent, ReverifyLoop};
pub use application::state::{transition, DesktopEffect, DesktopEvent, DesktopState, Transition};
pub use domain::config::DesktopConfig;
