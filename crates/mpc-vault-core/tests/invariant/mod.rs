//! Invariant tests module
//!
//! Guarantees that must hold regardless of call order:
//! - A wallet never exists for a share its session was not opened for
//! - Nothing is broadcast without an established SIGN session
//! - Addresses depend only on the public key and network

pub mod wallet_invariant;
