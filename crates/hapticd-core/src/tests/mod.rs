//! Scenario tests for hapticd-core
//!
//! These drive a [`crate::HapticServer`] through wire text the way a client
//! would:
//! - Handshake gating and version negotiation
//! - Device routing, capability checks and legacy command upgrade
//! - Scanning across several backends
//! - Ping supervision and teardown
//! - Event forwarding at the negotiated schema

// Scenario tests compare exact replies and reach into fixtures freely
#![allow(clippy::float_cmp)]

mod fixtures;
mod handshake_tests;
