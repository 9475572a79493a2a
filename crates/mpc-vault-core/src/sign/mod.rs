//! Distributed Signature Generation (DSG)
//!
//! Two-round co-signing for an N-of-N group:
//!
//! 1. Every party commits to a fresh nonce k_i by broadcasting K_i = k_i * G
//! 2. Every party opens k_i and reveals its Lagrange-weighted share, which is
//!    checked against the commitment and the sender's public key share
//!
//! Each party then combines the openings into a standard ECDSA signature and
//! verifies it against the group key before returning it. The combination
//! step reconstructs the nonce and key inside the run, so this engine models a
//! trusted co-signer rather than a hardened threshold-ECDSA protocol.

mod dsg;
mod messages;

pub use dsg::{lagrange_coefficient, run_dsg};
pub use messages::{DsgRound1Message, DsgRound2Message};
