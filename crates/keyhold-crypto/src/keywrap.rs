// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AES-256 key wrapping (RFC 3394) of the data key.
//!
//! The integrity check built into AES-KW is the only password verification
//! in the system: a wrong wrapping key fails to unwrap.

use aes_kw::KekAes256;
use keyhold_core::KeyholdError;
use zeroize::Zeroizing;

use crate::keys::{DataKey, WrappingKey, KEY_LEN};

/// A wrapped 32-byte key is 8 bytes longer than the key itself.
pub const WRAPPED_KEY_LEN: usize = KEY_LEN + 8;

/// Wrap the data key under the wrapping key.
pub fn wrap(wrapping: &WrappingKey, data_key: &DataKey) -> Result<Vec<u8>, KeyholdError> {
    let kek = KekAes256::from(*wrapping.bytes());
    let mut output = [0u8; WRAPPED_KEY_LEN];
    kek.wrap(data_key.bytes(), &mut output)
        .map_err(|e| KeyholdError::Crypto(format!("key wrap failed: {e:?}")))?;
    Ok(output.to_vec())
}

/// Unwrap a data key. Any failure, including a malformed length, reads as a
/// wrong password.
pub fn unwrap(wrapping: &WrappingKey, wrapped: &[u8]) -> Result<DataKey, KeyholdError> {
    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(KeyholdError::InvalidMasterPassword);
    }
    let kek = KekAes256::from(*wrapping.bytes());
    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    kek.unwrap(wrapped, output.as_mut())
        .map_err(|_| KeyholdError::InvalidMasterPassword)?;
    Ok(DataKey::from_bytes(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::derive;
    use keyhold_config::model::KdfConfig;

    fn test_config() -> KdfConfig {
        KdfConfig {
            memory_cost_kib: 8192,
            iterations: 1,
            parallelism: 1,
            fallback_iterations: 310_000,
        }
    }

    #[test]
    fn wrap_then_unwrap_recovers_key() {
        let wrapping = derive(b"Tr0ub4dor&3", &[9u8; 16], &test_config()).unwrap();
        let data_key = DataKey::generate().unwrap();

        let wrapped = wrap(&wrapping, &data_key).unwrap();
        assert_eq!(wrapped.len(), WRAPPED_KEY_LEN);

        let unwrapped = unwrap(&wrapping, &wrapped).unwrap();
        assert_eq!(*unwrapped.export(), *data_key.export());
    }

    #[test]
    fn wrong_password_is_reported_as_invalid_master_password() {
        let salt = [9u8; 16];
        let right = derive(b"Tr0ub4dor&3", &salt, &test_config()).unwrap();
        let wrong = derive(b"Tr0ub4dor&4", &salt, &test_config()).unwrap();
        let wrapped = wrap(&right, &DataKey::generate().unwrap()).unwrap();

        let err = unwrap(&wrong, &wrapped).unwrap_err();
        assert!(matches!(err, KeyholdError::InvalidMasterPassword));
    }

    #[test]
    fn truncated_blob_is_invalid_master_password() {
        let wrapping = derive(b"pw", &[1u8; 16], &test_config()).unwrap();
        let wrapped = wrap(&wrapping, &DataKey::generate().unwrap()).unwrap();

        let err = unwrap(&wrapping, &wrapped[..24]).unwrap_err();
        assert!(matches!(err, KeyholdError::InvalidMasterPassword));
    }
}
