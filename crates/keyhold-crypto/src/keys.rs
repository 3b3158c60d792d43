// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key newtypes. Debug output is always redacted and bytes are zeroized on drop.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use keyhold_core::KeyholdError;
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::SecretString;
use zeroize::Zeroizing;

/// Length in bytes of every symmetric key in the system.
pub const KEY_LEN: usize = 32;

/// The vault's long-lived AES-256 data key, in its unwrapped form.
pub struct DataKey(Zeroizing<[u8; KEY_LEN]>);

impl DataKey {
    /// Generate a fresh random data key.
    pub fn generate() -> Result<Self, KeyholdError> {
        let rng = SystemRandom::new();
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        rng.fill(key.as_mut())
            .map_err(|_| KeyholdError::Crypto("failed to generate random key".to_string()))?;
        Ok(Self(key))
    }

    /// Raw key bytes for the volatile store. The only way key material leaves
    /// this crate.
    pub fn export(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_vec())
    }

    /// Rebuild a key previously produced by [`DataKey::export`].
    pub fn from_exported(bytes: &[u8]) -> Result<Self, KeyholdError> {
        let array: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| KeyholdError::Crypto("exported key has the wrong length".to_string()))?;
        Ok(Self(Zeroizing::new(array)))
    }

    pub(crate) fn from_bytes(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self(bytes)
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// Key derived from the master password. Can only wrap and unwrap data keys.
pub struct WrappingKey(Zeroizing<[u8; KEY_LEN]>);

impl WrappingKey {
    pub(crate) fn new(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self(bytes)
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for WrappingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WrappingKey([REDACTED])")
    }
}

/// Key derived alongside the wrapping key, sent to the server as login proof.
pub struct AuthKey(Zeroizing<[u8; KEY_LEN]>);

impl AuthKey {
    pub(crate) fn new(bytes: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self(bytes)
    }

    /// Base64 form used in authentication requests.
    pub fn to_proof(&self) -> SecretString {
        SecretString::from(STANDARD.encode(self.0.as_ref()))
    }
}

impl std::fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthKey([REDACTED])")
    }
}

/// Both keys produced by one derivation.
#[derive(Debug)]
pub struct DerivedKeys {
    pub wrapping: WrappingKey,
    pub auth: AuthKey,
}
