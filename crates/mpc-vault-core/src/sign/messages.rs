//! DSG protocol messages

use crate::PartyId;
use serde::{Deserialize, Serialize};

/// Round 1: commitment to the sender's signing nonce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsgRound1Message {
    /// Sender's party ID
    pub party_id: PartyId,
    /// Digest being signed, so parties can detect a request mismatch
    pub digest: [u8; 32],
    /// Commitment K_i = k_i * G (compressed EC point)
    pub k_commitment: Vec<u8>,
}

/// Round 2: opening of the nonce plus the sender's weighted key share
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsgRound2Message {
    /// Sender's party ID
    pub party_id: PartyId,
    /// The nonce k_i (32 bytes)
    pub nonce: Vec<u8>,
    /// Lagrange-weighted secret share lambda_i * x_i (32 bytes)
    pub weighted_share: Vec<u8>,
}
