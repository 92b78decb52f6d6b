#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::{hash_typed_data, TypedData};

fuzz_target!(|data: &[u8]| {
    // Any JSON that deserializes must hash or fail cleanly
    if let Ok(typed) = serde_json::from_slice::<TypedData>(data) {
        if let Ok(first) = hash_typed_data(&typed) {
            assert_eq!(hash_typed_data(&typed).unwrap(), first);
        }
    }
});
