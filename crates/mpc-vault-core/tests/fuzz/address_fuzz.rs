//! Fuzz tests for address derivation

use k256::SecretKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use mpc_vault_core::chain::BitcoinNetwork;
use mpc_vault_core::chain::bitcoin::{self, bitcoin_address};
use mpc_vault_core::chain::evm::{self, ethereum_address};
use proptest::prelude::*;

/// SEC1 public keys (compressed, uncompressed) of random secret keys
fn public_key_strategy() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    any::<[u8; 32]>().prop_filter_map("scalar out of range", |bytes| {
        let secret = SecretKey::from_slice(&bytes).ok()?;
        let public = secret.public_key();
        Some((
            public.to_encoded_point(true).as_bytes().to_vec(),
            public.to_encoded_point(false).as_bytes().to_vec(),
        ))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Same key, same network, same address, whatever the encoding
    #[test]
    fn fuzz_addresses_are_deterministic((compressed, uncompressed) in public_key_strategy()) {
        let eth = ethereum_address(&compressed).unwrap();
        prop_assert_eq!(&eth, &ethereum_address(&compressed).unwrap());
        prop_assert_eq!(&eth, &ethereum_address(&uncompressed).unwrap());
        prop_assert!(evm::is_valid_address(&eth));

        for network in [BitcoinNetwork::Mainnet, BitcoinNetwork::Testnet, BitcoinNetwork::Regtest] {
            let btc = bitcoin_address(&compressed, network).unwrap();
            prop_assert_eq!(&btc, &bitcoin_address(&uncompressed, network).unwrap());
            prop_assert!(bitcoin::is_valid_address(&btc, network));
        }
    }

    /// The network changes the address, and each address belongs to one network
    #[test]
    fn fuzz_addresses_depend_on_network((compressed, _) in public_key_strategy()) {
        let mainnet = bitcoin_address(&compressed, BitcoinNetwork::Mainnet).unwrap();
        let testnet = bitcoin_address(&compressed, BitcoinNetwork::Testnet).unwrap();

        prop_assert!(mainnet.starts_with("bc1q"));
        prop_assert!(testnet.starts_with("tb1q"));
        prop_assert_ne!(&mainnet, &testnet);
        prop_assert!(!bitcoin::is_valid_address(&mainnet, BitcoinNetwork::Testnet));
        prop_assert!(!bitcoin::is_valid_address(&testnet, BitcoinNetwork::Mainnet));
    }

    /// Distinct keys give distinct addresses
    #[test]
    fn fuzz_distinct_keys_distinct_addresses(
        (a, _) in public_key_strategy(),
        (b, _) in public_key_strategy(),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(ethereum_address(&a).unwrap(), ethereum_address(&b).unwrap());
        prop_assert_ne!(
            bitcoin_address(&a, BitcoinNetwork::Testnet).unwrap(),
            bitcoin_address(&b, BitcoinNetwork::Testnet).unwrap()
        );
    }
}
