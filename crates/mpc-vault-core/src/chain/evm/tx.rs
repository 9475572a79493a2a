//! EVM transaction encoding

use crate::{Signature, keccak256_hash};
use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_rlp::{Encodable, RlpEncodable};

// ============================================================================
// EIP-1559 Transaction Type
// ============================================================================

/// EIP-1559 transaction structure
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub access_list: Vec<AccessListItem>,
}

/// Access list item for EIP-2930
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable)]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<B256>,
}

impl Eip1559Transaction {
    /// Get the signing hash for EIP-1559 transaction
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut encoded = vec![0x02]; // EIP-1559 type
        self.encode(&mut encoded);
        keccak256_hash(&encoded)
    }

    /// Encode the transaction with signature
    pub fn encode_signed(&self, signature: &Signature) -> Vec<u8> {
        // 0x02 || rlp([chainId, nonce, maxPriorityFeePerGas, maxFeePerGas, gasLimit, to, value, data, accessList, yParity, r, s])
        let mut stream = alloy_rlp::BytesMut::new();

        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length() + signature_rlp_length(signature),
        }
        .encode(&mut stream);

        self.chain_id.encode(&mut stream);
        self.nonce.encode(&mut stream);
        self.max_priority_fee_per_gas.encode(&mut stream);
        self.max_fee_per_gas.encode(&mut stream);
        self.gas_limit.encode(&mut stream);
        self.to.encode(&mut stream);
        self.value.encode(&mut stream);
        self.data.encode(&mut stream);
        self.access_list.encode(&mut stream);

        signature.recovery_id.encode(&mut stream);
        U256::from_be_slice(&signature.r).encode(&mut stream);
        U256::from_be_slice(&signature.s).encode(&mut stream);

        let mut result = vec![0x02];
        result.extend_from_slice(&stream);
        result
    }

    fn rlp_payload_length(&self) -> usize {
        self.chain_id.length()
            + self.nonce.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
            + self.access_list.length()
    }
}

fn signature_rlp_length(sig: &Signature) -> usize {
    let r = U256::from_be_slice(&sig.r);
    let s = U256::from_be_slice(&sig.s);
    sig.recovery_id.length() + r.length() + s.length()
}

// ============================================================================
// Legacy Transaction Type
// ============================================================================

/// Legacy transaction for non-EIP-1559 chains
#[derive(Debug, Clone, PartialEq, Eq, RlpEncodable)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl LegacyTransaction {
    /// Get the signing hash for legacy transaction (EIP-155)
    pub fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        // rlp([nonce, gasprice, gas, to, value, data, chainId, 0, 0])
        let mut stream = alloy_rlp::BytesMut::new();

        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length()
                + chain_id.length()
                + 0u8.length()
                + 0u8.length(),
        }
        .encode(&mut stream);

        self.encode_fields(&mut stream);
        chain_id.encode(&mut stream);
        0u8.encode(&mut stream);
        0u8.encode(&mut stream);

        keccak256_hash(&stream)
    }

    /// Encode the transaction with signature (EIP-155)
    pub fn encode_signed(&self, signature: &Signature, chain_id: u64) -> Vec<u8> {
        // v = recovery_id + 35 + chain_id * 2
        let v = signature.recovery_id as u64 + 35 + chain_id * 2;
        let r = U256::from_be_slice(&signature.r);
        let s = U256::from_be_slice(&signature.s);

        let mut stream = alloy_rlp::BytesMut::new();

        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length() + v.length() + r.length() + s.length(),
        }
        .encode(&mut stream);

        self.encode_fields(&mut stream);
        v.encode(&mut stream);
        r.encode(&mut stream);
        s.encode(&mut stream);

        stream.to_vec()
    }

    fn encode_fields(&self, stream: &mut alloy_rlp::BytesMut) {
        self.nonce.encode(stream);
        self.gas_price.encode(stream);
        self.gas_limit.encode(stream);
        self.to.encode(stream);
        self.value.encode(stream);
        self.data.encode(stream);
    }

    fn rlp_payload_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
    }
}

/// Either transaction type, ready to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvmTransaction {
    Eip1559(Eip1559Transaction),
    Legacy {
        tx: LegacyTransaction,
        chain_id: u64,
    },
}

impl EvmTransaction {
    /// Digest the signers co-sign
    pub fn signing_hash(&self) -> [u8; 32] {
        match self {
            EvmTransaction::Eip1559(tx) => tx.signing_hash(),
            EvmTransaction::Legacy { tx, chain_id } => tx.signing_hash(*chain_id),
        }
    }

    /// Network encoding of the signed transaction
    pub fn encode_signed(&self, signature: &Signature) -> Vec<u8> {
        match self {
            EvmTransaction::Eip1559(tx) => tx.encode_signed(signature),
            EvmTransaction::Legacy { tx, chain_id } => tx.encode_signed(signature, *chain_id),
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            EvmTransaction::Eip1559(tx) => tx.nonce,
            EvmTransaction::Legacy { tx, .. } => tx.nonce,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            EvmTransaction::Eip1559(tx) => tx.gas_limit,
            EvmTransaction::Legacy { tx, .. } => tx.gas_limit,
        }
    }

    pub fn to(&self) -> Address {
        match self {
            EvmTransaction::Eip1559(tx) => tx.to,
            EvmTransaction::Legacy { tx, .. } => tx.to,
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            EvmTransaction::Eip1559(tx) => tx.value,
            EvmTransaction::Legacy { tx, .. } => tx.value,
        }
    }

    /// Highest price per gas the sender may pay
    pub fn max_fee_per_gas(&self) -> u128 {
        match self {
            EvmTransaction::Eip1559(tx) => tx.max_fee_per_gas,
            EvmTransaction::Legacy { tx, .. } => tx.gas_price,
        }
    }
}

/// Hash of a signed transaction as reported by nodes
pub fn transaction_hash(raw: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256_hash(raw)))
}
