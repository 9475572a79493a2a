//! DKG protocol implementation for N-of-N groups

use super::{DkgRound1Message, DkgRound2Message, KeygenResult};
use crate::mpc::{Relay, RelayExt};
use crate::types::{decode_point, decode_scalar};
use crate::{Error, KeyShare, KeygenScheme, PartyId, Result, SessionConfig};
use k256::{ProjectivePoint, Scalar, elliptic_curve::Field, elliptic_curve::sec1::ToEncodedPoint};
use rand::rngs::OsRng;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Run the distributed key generation protocol for one party
///
/// Each party:
/// 1. Generates a random polynomial of degree t-1 and broadcasts Feldman
///    commitments to its coefficients
/// 2. Sends each other party its polynomial evaluated at that party's index
/// 3. Verifies received shares against the sender's commitments
/// 4. Sums the shares into its final secret share
///
/// # Arguments
/// * `config` - Protocol configuration with party ID and party set
/// * `scheme` - Scheme recorded in the share metadata
/// * `relay` - Message relay for communication
#[instrument(skip(config, relay), fields(party_id = config.party_id, group = %config.parameters.group_id))]
pub async fn run_dkg<R: Relay>(
    config: &SessionConfig,
    scheme: KeygenScheme,
    relay: &R,
) -> Result<KeygenResult> {
    config.parameters.validate()?;
    if config.n_parties() != scheme.n_parties() {
        return Err(Error::InvalidConfig(format!(
            "Scheme {} does not match a group of {} parties",
            scheme,
            config.n_parties()
        )));
    }

    let timeout = Duration::from_secs(config.timeout_secs);
    let threshold = config.parameters.threshold;

    info!(n_parties = config.n_parties(), %scheme, "Starting DKG");

    // ============ Round 1: Commitment ============
    debug!("DKG round 1: generating secret polynomial and commitments");

    let (secret_poly, commitments) = generate_secret_polynomial(threshold);

    let commitment_msg = DkgRound1Message {
        party_id: config.party_id,
        group_id: config.parameters.group_id.clone(),
        commitments,
    };
    relay
        .broadcast(&config.session_id, 1, &commitment_msg)
        .await?;

    let mut all_commitments = relay
        .collect_broadcasts_with_timeout::<DkgRound1Message>(
            &config.session_id,
            1,
            config.n_parties(),
            timeout,
        )
        .await?;
    all_commitments.sort_by_key(|m| m.party_id);

    for msg in &all_commitments {
        if msg.group_id != config.parameters.group_id {
            return Err(Error::VerificationFailed(format!(
                "Party {} committed for group {}",
                msg.party_id, msg.group_id
            )));
        }
        if msg.commitments.len() != threshold {
            return Err(Error::VerificationFailed(format!(
                "Party {} sent {} commitments, expected {}",
                msg.party_id,
                msg.commitments.len(),
                threshold
            )));
        }
    }

    // ============ Round 2: Secret Sharing ============
    debug!("DKG round 2: sending secret shares");

    let others = config.parameters.parties.iter().copied();
    for party_id in others.filter(|p| *p != config.party_id) {
        let share = evaluate_polynomial(&secret_poly, party_index(party_id));
        let share_msg = DkgRound2Message {
            from: config.party_id,
            to: party_id,
            share: share.to_bytes().to_vec(),
        };
        relay
            .send_direct(&config.session_id, 2, party_id, &share_msg)
            .await?;
    }

    let received_shares = relay
        .collect_direct_with_timeout::<DkgRound2Message>(
            &config.session_id,
            2,
            config.party_id,
            config.n_parties() - 1,
            timeout,
        )
        .await?;

    // ============ Round 3: Verification and Combination ============
    debug!("DKG round 3: verifying shares");

    let mut final_secret = evaluate_polynomial(&secret_poly, party_index(config.party_id));

    for share_msg in &received_shares {
        let sender = all_commitments
            .iter()
            .find(|c| c.party_id == share_msg.from)
            .ok_or_else(|| {
                Error::VerificationFailed(format!("Missing commitment from {}", share_msg.from))
            })?;

        let share = decode_scalar(&share_msg.share)?;
        verify_share(share, &sender.commitments, config.party_id).map_err(|_| {
            Error::VerificationFailed(format!(
                "Share from party {} does not match commitment",
                share_msg.from
            ))
        })?;

        final_secret += share;
    }

    let public_key = compute_public_key(&all_commitments)?;
    let public_shares = compute_public_shares(&all_commitments, &config.parameters.parties)?;

    let own_public = (ProjectivePoint::GENERATOR * final_secret)
        .to_affine()
        .to_encoded_point(true);
    let position = config
        .parameters
        .parties
        .iter()
        .position(|p| *p == config.party_id)
        .ok_or(Error::InvalidPartyId(config.party_id))?;
    if public_shares[position] != own_public.as_bytes() {
        return Err(Error::VerificationFailed(
            "Final share does not match its public share".into(),
        ));
    }

    let key_share = KeyShare::new(
        config.party_id,
        final_secret,
        public_key.clone(),
        public_shares,
        config.parameters.clone(),
        scheme,
    );

    info!(public_key = hex::encode(&public_key), "DKG completed");

    KeygenResult::new(key_share)
}

/// Evaluation point of a party (never zero)
fn party_index(party_id: PartyId) -> u64 {
    party_id as u64 + 1
}

/// Generate a random secret polynomial of degree t-1 and its commitments
fn generate_secret_polynomial(threshold: usize) -> (Vec<Scalar>, Vec<Vec<u8>>) {
    let mut rng = OsRng;
    let mut coefficients = Vec::with_capacity(threshold);
    let mut commitments = Vec::with_capacity(threshold);

    for _ in 0..threshold {
        let coef = Scalar::random(&mut rng);
        let commitment = (ProjectivePoint::GENERATOR * coef).to_affine();

        coefficients.push(coef);
        commitments.push(commitment.to_encoded_point(true).as_bytes().to_vec());
    }

    (coefficients, commitments)
}

/// Evaluate polynomial at a point using Horner's method
fn evaluate_polynomial(coefficients: &[Scalar], x: u64) -> Scalar {
    let x = Scalar::from(x);
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, coef| acc * x + coef)
}

/// Evaluate committed polynomial in the exponent: sum of C_j * x^j
fn evaluate_commitments(commitments: &[Vec<u8>], x: u64) -> Result<ProjectivePoint> {
    let x = Scalar::from(x);
    let mut result = ProjectivePoint::IDENTITY;
    let mut x_power = Scalar::ONE;

    for bytes in commitments {
        result += decode_point(bytes)? * x_power;
        x_power *= x;
    }

    Ok(result)
}

/// Verify a received share against the sender's commitments
fn verify_share(share: Scalar, commitments: &[Vec<u8>], my_id: PartyId) -> Result<()> {
    let expected = ProjectivePoint::GENERATOR * share;
    let actual = evaluate_commitments(commitments, party_index(my_id))?;

    if expected != actual {
        return Err(Error::VerificationFailed("share mismatch".into()));
    }
    Ok(())
}

/// Aggregate public key: sum of every party's free-term commitment
fn compute_public_key(all_commitments: &[DkgRound1Message]) -> Result<Vec<u8>> {
    let mut public_key = ProjectivePoint::IDENTITY;

    for msg in all_commitments {
        let free_term = msg
            .commitments
            .first()
            .ok_or_else(|| Error::VerificationFailed("Empty commitments".into()))?;
        public_key += decode_point(free_term)?;
    }

    if public_key == ProjectivePoint::IDENTITY {
        return Err(Error::VerificationFailed("Public key is the identity".into()));
    }

    Ok(public_key
        .to_affine()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec())
}

/// Public key share of every party, in party order
fn compute_public_shares(
    all_commitments: &[DkgRound1Message],
    parties: &[PartyId],
) -> Result<Vec<Vec<u8>>> {
    parties
        .iter()
        .map(|party_id| {
            let mut public_share = ProjectivePoint::IDENTITY;
            for msg in all_commitments {
                public_share += evaluate_commitments(&msg.commitments, party_index(*party_id))?;
            }
            Ok(public_share
                .to_affine()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec())
        })
        .collect()
}
