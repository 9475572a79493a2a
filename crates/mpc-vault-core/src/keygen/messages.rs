//! DKG protocol messages

use serde::{Deserialize, Serialize};

use crate::PartyId;

/// Round 1: Feldman commitments to the sender's secret polynomial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgRound1Message {
    /// Sender's party ID
    pub party_id: PartyId,
    /// Group the run generates a key for
    pub group_id: String,
    /// Commitments to polynomial coefficients (compressed EC points)
    pub commitments: Vec<Vec<u8>>,
}

/// Round 2: the sender's polynomial evaluated at the recipient's index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgRound2Message {
    /// Sender's party ID
    pub from: PartyId,
    /// Recipient's party ID
    pub to: PartyId,
    /// The secret share (32 bytes)
    pub share: Vec<u8>,
}
