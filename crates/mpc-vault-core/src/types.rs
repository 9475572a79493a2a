//! Core types for the MPC vault
//!
//! This module defines the fundamental types used throughout the vault,
//! including key shares with their party-set parameters, protocol session
//! configuration, and ECDSA signatures.

use crate::{Error, Result};
use k256::{
    AffinePoint, ProjectivePoint, Scalar, ecdsa,
    elliptic_curve::{
        bigint::U256,
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
    },
};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Index of a party in an MPC group (the local party is always 0)
pub type PartyId = usize;

/// Unique identifier for a protocol run on the relay
pub type SessionId = [u8; 32];

/// Party ID of the local signer
pub const LOCAL_PARTY: PartyId = 0;

/// Key generation scheme requested from the signing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeygenScheme {
    /// Local party plus one remote co-signer, both required
    Pairwise2of2,
    /// N parties, all required to sign
    ThresholdNofN(usize),
}

impl KeygenScheme {
    /// Number of parties holding a share
    pub fn n_parties(&self) -> usize {
        match self {
            KeygenScheme::Pairwise2of2 => 2,
            KeygenScheme::ThresholdNofN(n) => *n,
        }
    }

    /// Validate the scheme and produce fresh parties parameters for it
    pub fn parameters(&self) -> Result<PartiesParameters> {
        let n = self.n_parties();
        if n < 2 {
            return Err(Error::InvalidConfig(format!(
                "Threshold scheme needs at least 2 parties, got {}",
                n
            )));
        }
        Ok(PartiesParameters {
            group_id: uuid::Uuid::new_v4().to_string(),
            parties: (0..n).collect(),
            threshold: n,
            local_party: LOCAL_PARTY,
        })
    }
}

impl fmt::Display for KeygenScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeygenScheme::Pairwise2of2 => write!(f, "2-of-2"),
            KeygenScheme::ThresholdNofN(n) => write!(f, "{n}-of-{n}"),
        }
    }
}

/// Descriptor of the party set and threshold a key share belongs to
///
/// A signing session built for one parameter set cannot be used with a key
/// share from another; wallets check this at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartiesParameters {
    /// Identifier of the key group assigned at generation
    pub group_id: String,
    /// All participating party IDs, ascending
    pub parties: Vec<PartyId>,
    /// Signatures required
    pub threshold: usize,
    /// The local party's ID within `parties`
    pub local_party: PartyId,
}

impl PartiesParameters {
    /// Parties other than the local one
    pub fn remote_parties(&self) -> impl Iterator<Item = PartyId> + '_ {
        self.parties
            .iter()
            .copied()
            .filter(move |p| *p != self.local_party)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.parties.len() < 2 {
            return Err(Error::InvalidConfig("At least two parties required".into()));
        }
        if self.threshold != self.parties.len() {
            return Err(Error::InvalidConfig(format!(
                "Only N-of-N groups are supported, got {}-of-{}",
                self.threshold,
                self.parties.len()
            )));
        }
        if !self.parties.contains(&self.local_party) {
            return Err(Error::InvalidPartyId(self.local_party));
        }
        Ok(())
    }
}

/// Kind of session opened with the counter-party signer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Distributed key generation
    Keygen,
    /// Co-signing with an existing key share
    Sign,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Keygen => write!(f, "KEYGEN"),
            SessionKind::Sign => write!(f, "SIGN"),
        }
    }
}

/// Supported blockchain families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Ethereum and EVM-compatible chains
    Evm,
    /// Bitcoin
    Bitcoin,
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainType::Evm => write!(f, "EVM"),
            ChainType::Bitcoin => write!(f, "Bitcoin"),
        }
    }
}

/// ECDSA signature (r, s, v)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component (32 bytes)
    pub r: [u8; 32],
    /// S component (32 bytes, low-s normalized)
    pub s: [u8; 32],
    /// Recovery ID (0 or 1)
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    /// Convert to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        let sig = ecdsa::Signature::from_scalars(
            *k256::FieldBytes::from_slice(&self.r),
            *k256::FieldBytes::from_slice(&self.s),
        )
        .map_err(|e| Error::Crypto(format!("Invalid signature scalars: {}", e)))?;
        Ok(sig.to_der().as_bytes().to_vec())
    }

    /// Convert to bytes (r || s)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    /// Verify against a SEC1-encoded public key and a 32-byte prehash
    pub fn verify(&self, public_key: &[u8], digest: &[u8; 32]) -> Result<()> {
        use k256::ecdsa::signature::hazmat::PrehashVerifier;

        let key = ecdsa::VerifyingKey::from_sec1_bytes(public_key)
            .map_err(|e| Error::Crypto(format!("Invalid public key: {}", e)))?;
        let sig = ecdsa::Signature::from_scalars(
            *k256::FieldBytes::from_slice(&self.r),
            *k256::FieldBytes::from_slice(&self.s),
        )
        .map_err(|e| Error::Crypto(format!("Invalid signature scalars: {}", e)))?;
        key.verify_prehash(digest, &sig)
            .map_err(|e| Error::VerificationFailed(e.to_string()))
    }
}

/// Metadata associated with a key share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShareMetadata {
    /// Unique identifier for this key share
    pub share_id: String,
    /// Scheme the share was generated with
    pub scheme: KeygenScheme,
    /// Creation timestamp (Unix seconds)
    pub created_at: i64,
}

/// The local party's share of a threshold secp256k1 key
///
/// The secret share only leaves this struct as the Lagrange-weighted
/// contribution broadcast in the co-signing round.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare {
    /// This party's ID
    #[zeroize(skip)]
    pub party_id: PartyId,

    /// This party's secret share (x_i), big-endian scalar bytes
    secret_share: [u8; 32],

    /// Aggregated public key (compressed, 33 bytes)
    #[zeroize(skip)]
    pub public_key: Vec<u8>,

    /// Public key shares of all parties (for verification)
    #[zeroize(skip)]
    pub public_shares: Vec<Vec<u8>>,

    /// Party set this share belongs to
    #[zeroize(skip)]
    pub parameters: PartiesParameters,

    /// Metadata about this share
    #[zeroize(skip)]
    pub metadata: KeyShareMetadata,
}

impl KeyShare {
    /// Assemble a key share from protocol output
    pub fn new(
        party_id: PartyId,
        secret_share: Scalar,
        public_key: Vec<u8>,
        public_shares: Vec<Vec<u8>>,
        parameters: PartiesParameters,
        scheme: KeygenScheme,
    ) -> Self {
        let mut secret = [0u8; 32];
        secret.copy_from_slice(&secret_share.to_bytes());
        Self {
            party_id,
            secret_share: secret,
            public_key,
            public_shares,
            parameters,
            metadata: KeyShareMetadata {
                share_id: uuid::Uuid::new_v4().to_string(),
                scheme,
                created_at: chrono::Utc::now().timestamp(),
            },
        }
    }

    /// The secret share as a scalar
    pub(crate) fn secret_scalar(&self) -> Scalar {
        <Scalar as Reduce<U256>>::reduce_bytes(&self.secret_share.into())
    }

    /// Get the public key as a ProjectivePoint
    pub fn public_key_point(&self) -> Result<ProjectivePoint> {
        decode_point(&self.public_key)
    }

    /// Uncompressed public key (65 bytes, 0x04 prefix)
    pub fn uncompressed_public_key(&self) -> Result<Vec<u8>> {
        let point = self.public_key_point()?;
        Ok(point.to_affine().to_encoded_point(false).as_bytes().to_vec())
    }

    /// Hex encoding of the compressed public key
    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("party_id", &self.party_id)
            .field("secret_share", &"[REDACTED]")
            .field("public_key", &hex::encode(&self.public_key))
            .field("parameters", &self.parameters)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Configuration for a DKG/co-signing protocol run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Relay session identifier shared by all parties of the run
    pub session_id: SessionId,

    /// This party's ID
    pub party_id: PartyId,

    /// Party set of the run
    pub parameters: PartiesParameters,

    /// Protocol timeout in seconds
    pub timeout_secs: u64,
}

impl SessionConfig {
    /// Configuration for one party of a protocol run
    pub fn new(session_id: SessionId, party_id: PartyId, parameters: PartiesParameters) -> Result<Self> {
        parameters.validate()?;
        if !parameters.parties.contains(&party_id) {
            return Err(Error::InvalidPartyId(party_id));
        }
        Ok(Self {
            session_id,
            party_id,
            parameters,
            timeout_secs: 60,
        })
    }

    /// Number of parties in the run
    pub fn n_parties(&self) -> usize {
        self.parameters.parties.len()
    }
}

/// Credentials for the signing service
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Account e-mail
    pub email: String,
    /// Account password
    pub password: String,
}

impl Credentials {
    /// Create password credentials
    pub fn password(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Decode a SEC1 point into projective form
pub(crate) fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded = k256::EncodedPoint::from_bytes(bytes).map_err(|e| Error::Crypto(e.to_string()))?;
    let affine_opt = AffinePoint::from_encoded_point(&encoded);
    let affine: AffinePoint =
        Option::<AffinePoint>::from(affine_opt).ok_or(Error::Crypto("Invalid point".into()))?;
    Ok(ProjectivePoint::from(affine))
}

/// Decode a 32-byte big-endian scalar
pub(crate) fn decode_scalar(bytes: &[u8]) -> Result<Scalar> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Deserialization("Invalid scalar length".into()))?;
    Ok(<Scalar as Reduce<U256>>::reduce_bytes(&array.into()))
}

/// Compute Keccak256 hash of data
pub fn keccak256_hash(data: &[u8]) -> [u8; 32] {
    use tiny_keccak::{Hasher, Keccak};
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}
