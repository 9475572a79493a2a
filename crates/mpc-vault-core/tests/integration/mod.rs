//! Integration tests module
//!
//! End-to-end flows through the vault facade:
//! - Key generation, SIGN session and wallet construction
//! - Policy-driven sends on both chain families
//! - Key share replacement and shutdown

pub mod bitcoin_flow_test;
pub mod ethereum_flow_test;
pub mod vault_flow_test;
