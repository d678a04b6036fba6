#![no_main]

use libfuzzer_sys::fuzz_target;
use maxwire_core::crypto::{encode_public_key_pem, parse_public_key_pem};

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(key) = parse_public_key_pem(text) {
            // Anything accepted must re-encode and parse back to the same key
            let pem = encode_public_key_pem(&key).unwrap();
            assert_eq!(parse_public_key_pem(&pem).unwrap(), key);
        }
    }
});
