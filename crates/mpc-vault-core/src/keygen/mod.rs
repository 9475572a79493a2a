//! Distributed key generation
//!
//! Feldman-VSS key generation for an N-of-N group. Every party deals a
//! random polynomial of degree N-1, so the joint secret is recoverable only
//! when all N shares take part. The local party of a vault is one of the
//! participants; the others are run by the signing service (or, in tests,
//! by [`crate::mpc::LocalMpcRuntime`]).

mod dkg;
mod messages;

pub use dkg::run_dkg;
pub use messages::{DkgRound1Message, DkgRound2Message};

use crate::{KeyShare, Result};

/// Result of distributed key generation
#[derive(Debug)]
pub struct KeygenResult {
    /// The generated key share for this party
    pub share: KeyShare,
    /// The aggregated public key (same for all parties)
    pub public_key: Vec<u8>,
}

impl KeygenResult {
    /// Create a new keygen result
    pub fn new(share: KeyShare) -> Result<Self> {
        // Reject shares whose public key does not decode
        share.public_key_point()?;
        let public_key = share.public_key.clone();
        Ok(Self { share, public_key })
    }
}
