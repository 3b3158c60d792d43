// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base64 text encoding for binary fields crossing storage and wire boundaries.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::KeyholdError;

/// Encode bytes as standard padded base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64, naming the field in the error.
pub fn decode(field: &str, text: &str) -> Result<Vec<u8>, KeyholdError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| KeyholdError::Storage {
            source: format!("field `{field}` is not valid base64: {e}").into(),
        })
}

/// `#[serde(with = "keyhold_core::encoding::base64_bytes")]` for `Vec<u8>` fields.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Same as [`base64_bytes`] for fixed 12-byte nonces.
pub mod base64_nonce {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(nonce: &[u8; 12], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(nonce))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 12], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("nonce must be 12 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_garbage() {
        let err = decode("ciphertext", "not base64!!").unwrap_err();
        assert!(err.to_string().contains("ciphertext"));
    }

    #[test]
    fn decode_tolerates_surrounding_whitespace() {
        assert_eq!(decode("nonce", " AQID\n").unwrap(), vec![1, 2, 3]);
    }
}
