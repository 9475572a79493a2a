//! Unit tests module
//!
//! Component-level tests against the public API:
//! - Session state machine and signing
//! - Chain wallet transaction population

pub mod chain_wallet_test;
