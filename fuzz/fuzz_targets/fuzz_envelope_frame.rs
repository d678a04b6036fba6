#![no_main]

use libfuzzer_sys::fuzz_target;
use maxwire_core::Envelope;
use maxwire_daemon::stream::{EnvelopeFrame, MaxUpdateFrame};
use prost::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = EnvelopeFrame::decode(data) {
        // Re-encoding a decoded frame is lossless
        let bytes = frame.encode_to_vec();
        let again = EnvelopeFrame::decode(bytes.as_slice()).unwrap();
        assert_eq!(again, frame);

        let _ = Envelope::from(frame);
    }

    if let Ok(update) = MaxUpdateFrame::decode(data) {
        let again = MaxUpdateFrame::decode(update.encode_to_vec().as_slice()).unwrap();
        assert_eq!(again, update);
    }
});
