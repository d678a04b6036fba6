#![no_main]

use std::sync::OnceLock;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use maxwire_core::{open, Envelope, KeyPair, OpenOutcome};

#[derive(Arbitrary, Debug)]
struct Input {
    ciphertext: String,
    signature: Vec<u8>,
    use_real_sender_key: bool,
    sender_public_key: String,
}

fn receiver() -> &'static KeyPair {
    static RECEIVER: OnceLock<KeyPair> = OnceLock::new();
    RECEIVER.get_or_init(|| KeyPair::generate(1024).unwrap())
}

fn sender_pem() -> &'static str {
    static SENDER: OnceLock<String> = OnceLock::new();
    SENDER.get_or_init(|| KeyPair::generate(1024).unwrap().public_key_pem().unwrap())
}

fuzz_target!(|input: Input| {
    let sender_public_key = if input.use_real_sender_key {
        sender_pem().to_string()
    } else {
        input.sender_public_key
    };
    let envelope = Envelope::from_parts(input.ciphertext, input.signature, sender_public_key);

    // Random bytes must never authenticate
    if let Ok(outcome) = open(&envelope, receiver().private_key()) {
        assert_eq!(outcome, OpenOutcome::SignatureInvalid);
    }
});
