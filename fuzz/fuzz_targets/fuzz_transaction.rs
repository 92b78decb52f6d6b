#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tessera_core::{Address, Bytes, TransactionRequest, TransactionType, B256, U256};

#[derive(Debug, Arbitrary)]
struct FuzzTransaction {
    tx_type: Option<u8>,
    chain_id: Option<u64>,
    nonce: Option<u64>,
    gas: Option<u64>,
    gas_price: Option<[u8; 32]>,
    max_fee_per_gas: Option<[u8; 32]>,
    max_priority_fee_per_gas: Option<[u8; 32]>,
    max_fee_per_blob_gas: Option<[u8; 32]>,
    to: Option<[u8; 20]>,
    value: Option<[u8; 32]>,
    data: Vec<u8>,
    blob_versioned_hashes: Option<Vec<[u8; 32]>>,
}

fn word(bytes: Option<[u8; 32]>) -> Option<U256> {
    bytes.map(U256::from_be_bytes::<32>)
}

fuzz_target!(|input: FuzzTransaction| {
    let tx = TransactionRequest {
        tx_type: input.tx_type.map(|t| format!("0x{:x}", t)),
        chain_id: input.chain_id,
        nonce: input.nonce,
        gas: input.gas,
        gas_price: word(input.gas_price),
        max_fee_per_gas: word(input.max_fee_per_gas),
        max_priority_fee_per_gas: word(input.max_priority_fee_per_gas),
        max_fee_per_blob_gas: word(input.max_fee_per_blob_gas),
        to: input.to.map(Address),
        value: word(input.value),
        data: Some(Bytes(input.data)),
        blob_versioned_hashes: input
            .blob_versioned_hashes
            .map(|hashes| hashes.into_iter().map(B256).collect()),
        ..Default::default()
    };

    // Any request that resolves to a type either encodes or fails cleanly
    if let Ok(payload) = tx.signing_payload() {
        match tx.transaction_type().unwrap() {
            // Legacy payloads are a bare RLP list
            TransactionType::Legacy => assert!(payload[0] >= 0xc0),
            other => assert_eq!(payload[0], other.type_byte()),
        }
    }
});
