//! Fuzz tests module
//!
//! Property-based testing using proptest to find edge cases:
//! - Coin selection and amount policies
//! - Address derivation

pub mod address_fuzz;
