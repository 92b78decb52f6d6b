#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::{DerivationPath, PathComponent};

fuzz_target!(|data: &[u8]| {
    // Arbitrary text through the parser
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(path) = text.parse::<DerivationPath>() {
            // Canonical rendering must parse back to the same path
            let rendered = path.to_string();
            let reparsed: DerivationPath = rendered.parse().unwrap();
            assert_eq!(path, reparsed);
            assert!(path.components().iter().all(|c| c.index < 0x8000_0000));
        }
    }

    // Paths built from raw child numbers
    if !data.is_empty() {
        let num_components = (data[0] % 6) as usize;
        if data.len() >= 1 + num_components * 4 {
            let components: Vec<PathComponent> = (0..num_components)
                .map(|i| {
                    let offset = 1 + i * 4;
                    PathComponent::from_value(u32::from_le_bytes([
                        data[offset],
                        data[offset + 1],
                        data[offset + 2],
                        data[offset + 3],
                    ]))
                })
                .collect();

            let path = DerivationPath::new(components);
            assert_eq!(path.len(), num_components);
            let reparsed: DerivationPath = path.to_string().parse().unwrap();
            assert_eq!(path, reparsed);
        }
    }
});
