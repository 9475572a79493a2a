//! Segwit scripts, BIP-143 sighashes and transaction assembly

use super::Utxo;
use crate::error::TxBuildError;
use crate::{Error, Result};
use bitcoin::absolute::LockTime;
use bitcoin::address::NetworkUnchecked;
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::Hash;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, AddressType, Amount, CompressedPublicKey, Network, OutPoint, Script, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use std::str::FromStr;

/// Largest amount that can exist, in satoshi
pub const MAX_MONEY: u64 = 21_000_000 * 100_000_000;

/// Virtual size of a P2WPKH input: 41 base bytes plus 108 witness bytes / 4
const P2WPKH_INPUT_VSIZE: u64 = 68;

/// Version, locktime, counts and the segwit marker, rounded up
const TX_OVERHEAD_VSIZE: u64 = 11;

// ============================================================================
// Scripts
// ============================================================================

/// Parse a compressed SEC1 public key
pub fn wallet_key(compressed: &[u8]) -> Result<CompressedPublicKey> {
    CompressedPublicKey::from_slice(compressed).map_err(|e| Error::Crypto(e.to_string()))
}

/// scriptPubKey of a native segwit recipient on `network`
///
/// Accepts P2WPKH, P2WSH and P2TR addresses.
pub fn recipient_script(
    address: &str,
    network: Network,
) -> std::result::Result<ScriptBuf, TxBuildError> {
    let invalid = |reason: String| TxBuildError::InvalidRecipient {
        address: address.to_string(),
        reason,
    };

    if address.is_empty() {
        return Err(invalid("empty recipient".into()));
    }

    let address = Address::<NetworkUnchecked>::from_str(address)
        .map_err(|e| invalid(e.to_string()))?
        .require_network(network)
        .map_err(|e| invalid(e.to_string()))?;

    match address.address_type() {
        Some(AddressType::P2wpkh | AddressType::P2wsh | AddressType::P2tr) => {
            Ok(address.script_pubkey())
        }
        other => Err(invalid(format!("unsupported address type {:?}", other))),
    }
}

/// Smallest output value relayed by default policy
pub fn dust_limit(script_pubkey: &Script) -> u64 {
    script_pubkey.minimal_non_dust().to_sat()
}

/// Estimated virtual size of a transaction spending P2WPKH inputs
pub fn estimate_vsize(n_inputs: usize, outputs: &[TxOut]) -> u64 {
    TX_OVERHEAD_VSIZE
        + P2WPKH_INPUT_VSIZE * n_inputs as u64
        + outputs.iter().map(|o| serialize(o).len() as u64).sum::<u64>()
}

// ============================================================================
// Transaction
// ============================================================================

/// Version 2 transaction spending `inputs`, with empty witnesses
pub fn unsigned_transaction(inputs: &[Utxo], output: Vec<TxOut>) -> Result<Transaction> {
    let input = inputs
        .iter()
        .map(|utxo| {
            let txid = Txid::from_str(&utxo.txid).map_err(|e| {
                Error::Deserialization(format!("invalid txid {}: {}", utxo.txid, e))
            })?;
            Ok(TxIn {
                previous_output: OutPoint::new(txid, utxo.vout),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    })
}

/// BIP-143 SIGHASH_ALL digests, one per input
///
/// `values[i]` is the amount spent by input `i`; every input pays to
/// `wallet_script`.
pub fn p2wpkh_sighashes(
    tx: &Transaction,
    values: &[u64],
    wallet_script: &Script,
) -> Result<Vec<[u8; 32]>> {
    if values.len() != tx.input.len() {
        return Err(Error::InvalidConfig(format!(
            "{} input values for {} inputs",
            values.len(),
            tx.input.len()
        )));
    }

    let mut cache = SighashCache::new(tx);
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            cache
                .p2wpkh_signature_hash(
                    index,
                    wallet_script,
                    Amount::from_sat(*value),
                    EcdsaSighashType::All,
                )
                .map(|sighash| sighash.to_byte_array())
                .map_err(|e| Error::Crypto(e.to_string()))
        })
        .collect()
}

/// Witness stack `<DER signature || SIGHASH_ALL> <public key>`
pub fn p2wpkh_witness(mut der_signature: Vec<u8>, public_key: &CompressedPublicKey) -> Witness {
    der_signature.push(EcdsaSighashType::All.to_u32() as u8);
    Witness::from_slice(&[der_signature, public_key.to_bytes().to_vec()])
}
