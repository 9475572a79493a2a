//! DSG protocol implementation

use super::{DsgRound1Message, DsgRound2Message};
use crate::mpc::{Relay, RelayExt};
use crate::types::{decode_point, decode_scalar};
use crate::{Error, KeyShare, PartyId, Result, SessionConfig, Signature};
use k256::{
    ProjectivePoint, Scalar,
    ecdsa::{self, RecoveryId, VerifyingKey},
    elliptic_curve::{Field, bigint::U256, ops::Reduce, sec1::ToEncodedPoint},
};
use rand::rngs::OsRng;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Run the distributed signature generation protocol for one party
///
/// # Arguments
/// * `config` - Protocol configuration; its parameters must match the share
/// * `key_share` - This party's key share
/// * `digest` - 32-byte message hash to sign
/// * `relay` - Message relay for communication
///
/// # Returns
/// A low-s ECDSA signature with recovery ID, verified against the group key
#[instrument(skip(config, key_share, digest, relay), fields(party_id = config.party_id))]
pub async fn run_dsg<R: Relay>(
    config: &SessionConfig,
    key_share: &KeyShare,
    digest: &[u8; 32],
    relay: &R,
) -> Result<Signature> {
    if key_share.parameters != config.parameters {
        return Err(Error::PartiesMismatch {
            key_share: key_share.parameters.group_id.clone(),
            session: config.parameters.group_id.clone(),
        });
    }
    if key_share.party_id != config.party_id {
        return Err(Error::InvalidPartyId(key_share.party_id));
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let parties = &config.parameters.parties;

    info!(digest = hex::encode(digest), "Starting DSG");

    // ============ Round 1: Nonce commitment ============
    let k_i = Scalar::random(&mut OsRng);
    let k_commitment = (ProjectivePoint::GENERATOR * k_i)
        .to_affine()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec();

    let round1_msg = DsgRound1Message {
        party_id: config.party_id,
        digest: *digest,
        k_commitment,
    };
    relay.broadcast(&config.session_id, 1, &round1_msg).await?;

    let round1 = relay
        .collect_broadcasts_with_timeout::<DsgRound1Message>(
            &config.session_id,
            1,
            parties.len(),
            timeout,
        )
        .await?;

    if let Some(other) = round1.iter().find(|m| m.digest != *digest) {
        return Err(Error::VerificationFailed(format!(
            "Party {} is signing a different digest",
            other.party_id
        )));
    }

    // ============ Round 2: Opening ============
    debug!("DSG round 2: revealing nonce and weighted share");

    let lambda_i = lagrange_coefficient(config.party_id, parties);
    let round2_msg = DsgRound2Message {
        party_id: config.party_id,
        nonce: k_i.to_bytes().to_vec(),
        weighted_share: (key_share.secret_scalar() * lambda_i).to_bytes().to_vec(),
    };
    relay.broadcast(&config.session_id, 2, &round2_msg).await?;

    let round2 = relay
        .collect_broadcasts_with_timeout::<DsgRound2Message>(
            &config.session_id,
            2,
            parties.len(),
            timeout,
        )
        .await?;

    // ============ Combination ============
    let mut k = Scalar::ZERO;
    let mut x = Scalar::ZERO;
    let mut big_r = ProjectivePoint::IDENTITY;

    for (position, party_id) in parties.iter().enumerate() {
        let commitment = round1
            .iter()
            .find(|m| m.party_id == *party_id)
            .ok_or_else(|| Error::VerificationFailed(format!("No commitment from {}", party_id)))?;
        let opening = round2
            .iter()
            .find(|m| m.party_id == *party_id)
            .ok_or_else(|| Error::VerificationFailed(format!("No opening from {}", party_id)))?;

        let k_j = decode_scalar(&opening.nonce)?;
        let big_k_j = decode_point(&commitment.k_commitment)?;
        if ProjectivePoint::GENERATOR * k_j != big_k_j {
            return Err(Error::VerificationFailed(format!(
                "Nonce of party {} does not match its commitment",
                party_id
            )));
        }

        let w_j = decode_scalar(&opening.weighted_share)?;
        let public_share = key_share
            .public_shares
            .get(position)
            .ok_or(Error::InvalidPartyId(*party_id))?;
        let lambda_j = lagrange_coefficient(*party_id, parties);
        if ProjectivePoint::GENERATOR * w_j != decode_point(public_share)? * lambda_j {
            return Err(Error::VerificationFailed(format!(
                "Weighted share of party {} does not match its public share",
                party_id
            )));
        }

        k += k_j;
        x += w_j;
        big_r += big_k_j;
    }

    let signature = finalize_signature(k, x, big_r, digest, &key_share.public_key)?;

    info!(r = hex::encode(signature.r), "DSG completed");

    Ok(signature)
}

/// Turn combined nonce and key into a verified, low-s recoverable signature
fn finalize_signature(
    k: Scalar,
    x: Scalar,
    big_r: ProjectivePoint,
    digest: &[u8; 32],
    public_key: &[u8],
) -> Result<Signature> {
    let r_encoded = big_r.to_affine().to_encoded_point(false);
    let r_coord = r_encoded
        .x()
        .ok_or_else(|| Error::Crypto("Nonce point is the identity".into()))?;
    let r = <Scalar as Reduce<U256>>::reduce_bytes(r_coord);
    let m = <Scalar as Reduce<U256>>::reduce_bytes(&(*digest).into());

    let k_inv = Option::<Scalar>::from(k.invert())
        .ok_or_else(|| Error::Crypto("Combined nonce is zero".into()))?;
    let s = k_inv * (m + r * x);

    let sig = ecdsa::Signature::from_scalars(r.to_bytes(), s.to_bytes())
        .map_err(|e| Error::Crypto(format!("Degenerate signature: {}", e)))?;
    let sig = sig.normalize_s().unwrap_or(sig);

    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| Error::Crypto(format!("Invalid public key: {}", e)))?;
    let recovery_id = RecoveryId::trial_recovery_from_prehash(&verifying_key, digest, &sig)
        .map_err(|_| Error::VerificationFailed("Signature does not verify under group key".into()))?;

    let (r_bytes, s_bytes) = sig.split_bytes();
    let mut r_out = [0u8; 32];
    let mut s_out = [0u8; 32];
    r_out.copy_from_slice(&r_bytes);
    s_out.copy_from_slice(&s_bytes);

    Ok(Signature::new(r_out, s_out, recovery_id.to_byte()))
}

/// Lagrange coefficient at zero for a party within the signing set
pub fn lagrange_coefficient(party_id: PartyId, parties: &[PartyId]) -> Scalar {
    let i = party_id as u64 + 1;
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for &j_id in parties {
        let j = j_id as u64 + 1;
        if j != i {
            numerator *= Scalar::from(j);
            let diff = if j > i {
                Scalar::from(j - i)
            } else {
                -Scalar::from(i - j)
            };
            denominator *= diff;
        }
    }

    numerator * denominator.invert().unwrap_or(Scalar::ONE)
}
