//! NIP-19 bech32 encoding for keys (`npub1...`, `nsec1...`).
//!
//! Plain Bech32 (not Bech32m), 32-byte payloads only. The entity types with
//! TLV payloads (`nprofile`, `nevent`, ...) are not needed by the ledger.

use bech32::{Bech32, Hrp};
use thiserror::Error;

use crate::config::KEY_LENGTH;

#[derive(Debug, Error)]
pub enum Nip19Error {
    #[error("bech32 decode error: {0}")]
    Decode(String),

    #[error("invalid prefix: expected '{expected}', got '{got}'")]
    InvalidPrefix { expected: String, got: String },

    #[error("invalid payload length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

/// Encode a 32-byte key under the given HRP.
pub fn encode(hrp: &str, data: &[u8; KEY_LENGTH]) -> String {
    let hrp = Hrp::parse_unchecked(hrp);
    // A 32-byte payload under a 4-char HRP is far below the bech32 length
    // limit, so the encoder has nothing to fail on.
    bech32::encode::<Bech32>(hrp, data).unwrap_or_default()
}

/// Decode a bech32 string, checking both its prefix and payload length.
pub fn decode(expected_hrp: &str, s: &str) -> Result<[u8; KEY_LENGTH], Nip19Error> {
    let (hrp, data) = bech32::decode(s.trim()).map_err(|e| Nip19Error::Decode(e.to_string()))?;

    if hrp.as_str() != expected_hrp {
        return Err(Nip19Error::InvalidPrefix {
            expected: expected_hrp.to_string(),
            got: hrp.to_string(),
        });
    }

    if data.len() != KEY_LENGTH {
        return Err(Nip19Error::InvalidLength {
            expected: KEY_LENGTH,
            got: data.len(),
        });
    }

    let mut out = [0u8; KEY_LENGTH];
    out.copy_from_slice(&data);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NPUB_HRP, NSEC_HRP};

    #[test]
    fn decodes_nip19_nsec_vector() {
        let bytes = decode(
            NSEC_HRP,
            "nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5",
        )
        .unwrap();
        assert_eq!(
            hex::encode(bytes),
            "67dea2ed018072d675f5415ecfaed7d2597555e202d85b3d65ea4e58d2d92ffa"
        );
    }

    #[test]
    fn roundtrip_preserves_bytes() {
        let data = [7u8; KEY_LENGTH];
        let encoded = encode(NPUB_HRP, &data);
        assert!(encoded.starts_with("npub1"));
        assert_eq!(decode(NPUB_HRP, &encoded).unwrap(), data);
    }

    #[test]
    fn wrong_prefix_is_rejected() {
        let encoded = encode(NSEC_HRP, &[1u8; KEY_LENGTH]);
        match decode(NPUB_HRP, &encoded) {
            Err(Nip19Error::InvalidPrefix { expected, got }) => {
                assert_eq!(expected, "npub");
                assert_eq!(got, "nsec");
            }
            other => panic!("expected InvalidPrefix, got {:?}", other),
        }
    }

    #[test]
    fn wrong_length_is_rejected() {
        let hrp = Hrp::parse_unchecked(NPUB_HRP);
        let short = bech32::encode::<Bech32>(hrp, &[1u8; 20]).unwrap();
        assert!(matches!(
            decode(NPUB_HRP, &short),
            Err(Nip19Error::InvalidLength { got: 20, .. })
        ));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut encoded = encode(NPUB_HRP, &[9u8; KEY_LENGTH]);
        let last = encoded.pop().unwrap();
        encoded.push(if last == 'q' { 'p' } else { 'q' });
        assert!(matches!(
            decode(NPUB_HRP, &encoded),
            Err(Nip19Error::Decode(_))
        ));
    }
}
