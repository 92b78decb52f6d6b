#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_core::KeyTreeNode;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(node) = KeyTreeNode::from_extended_key(text) {
        // Whatever imports must re-export identically
        if node.has_private_key() {
            assert_eq!(node.to_xpriv().unwrap(), text);
        } else {
            assert!(node.to_xpriv().is_err());
            assert_eq!(node.to_xpub(), text);
        }

        // Normal derivation never panics, hardened only fails for public-only nodes
        let _ = node.derive_child(0);
        let hardened = node.derive_child(0x8000_0000);
        if !node.has_private_key() {
            assert!(hardened.is_err());
        }
    }
});
