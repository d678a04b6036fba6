//! Wire frames

use maxwire_core::Envelope;

/// Sender to receiver: one sealed value
#[derive(Clone, PartialEq, prost::Message)]
pub struct EnvelopeFrame {
    /// Never set by this implementation; ignored on receipt
    #[prost(int32, optional, tag = "1")]
    pub num_hint: Option<i32>,

    /// Base64 ciphertext
    #[prost(string, tag = "2")]
    pub code_str: String,

    #[prost(bytes = "vec", tag = "3")]
    pub signature: Vec<u8>,

    /// Sender public key, PEM
    #[prost(string, tag = "4")]
    pub client_pub_key: String,
}

/// Receiver to sender: a new running maximum
#[derive(Clone, PartialEq, prost::Message)]
pub struct MaxUpdateFrame {
    #[prost(int32, tag = "1")]
    pub num: i32,
}

impl From<Envelope> for EnvelopeFrame {
    fn from(envelope: Envelope) -> Self {
        let (code_str, signature, client_pub_key) = envelope.into_parts();
        Self {
            num_hint: None,
            code_str,
            signature,
            client_pub_key,
        }
    }
}

impl From<EnvelopeFrame> for Envelope {
    fn from(frame: EnvelopeFrame) -> Self {
        Envelope::from_parts(frame.code_str, frame.signature, frame.client_pub_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_envelope_frame_conversion() {
        let envelope = Envelope::from_parts(
            "Y2lwaGVy".to_string(),
            vec![1, 2, 3],
            "-----BEGIN PUBLIC KEY-----".to_string(),
        );

        let frame = EnvelopeFrame::from(envelope.clone());
        assert_eq!(frame.num_hint, None);
        assert_eq!(frame.code_str, "Y2lwaGVy");

        let decoded = EnvelopeFrame::decode(frame.encode_to_vec().as_slice()).unwrap();
        assert_eq!(Envelope::from(decoded), envelope);
    }

    #[test]
    fn test_num_hint_is_ignored() {
        let frame = EnvelopeFrame {
            num_hint: Some(99),
            code_str: "abc".to_string(),
            signature: vec![9],
            client_pub_key: "key".to_string(),
        };
        let envelope = Envelope::from(frame);
        assert_eq!(envelope.ciphertext(), "abc");
    }

    #[test]
    fn test_field_tags() {
        // tag 1, varint 20
        assert_eq!(MaxUpdateFrame { num: 20 }.encode_to_vec(), vec![0x08, 20]);

        let frame = EnvelopeFrame {
            num_hint: None,
            code_str: "a".to_string(),
            signature: vec![0xff],
            client_pub_key: "k".to_string(),
        };
        assert_eq!(
            frame.encode_to_vec(),
            vec![0x12, 1, b'a', 0x1a, 1, 0xff, 0x22, 1, b'k']
        );
    }
}
