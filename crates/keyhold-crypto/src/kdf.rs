// SPDX-FileCopyrightText: 2026 Keyhold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Master password key derivation.
//!
//! 1. Argon2id (Version::V0x13) turns (password, salt) into a 32-byte master
//!    secret. If Argon2id fails, PBKDF2-HMAC-SHA256 with at least 310,000
//!    iterations is used instead.
//! 2. HKDF-SHA256 (salt = account salt) expands the master secret into
//!    independent keys, one per context string.
//!
//! Output is deterministic for a given (password, salt, parameters).

use std::num::NonZeroU32;

use keyhold_config::model::KdfConfig;
use keyhold_config::validation::MIN_FALLBACK_ITERATIONS;
use keyhold_core::KeyholdError;
use ring::rand::{SecureRandom, SystemRandom};
use ring::{hkdf, pbkdf2};
use tracing::warn;
use zeroize::Zeroizing;

use crate::keys::{AuthKey, DerivedKeys, WrappingKey, KEY_LEN};

/// Length of a freshly generated account salt.
pub const SALT_LEN: usize = 16;

/// HKDF context for the key that wraps the data key.
const WRAPPING_KEY_CONTEXT: &[u8] = b"keyhold-wrapping-key";

/// HKDF context for the server authentication proof.
const AUTH_KEY_CONTEXT: &[u8] = b"keyhold-auth-key";

/// Derive the wrapping key for (password, salt).
pub fn derive(
    password: &[u8],
    salt: &[u8],
    config: &KdfConfig,
) -> Result<WrappingKey, KeyholdError> {
    Ok(derive_keys(password, salt, config)?.wrapping)
}

/// Derive the wrapping key and the auth key from one master secret.
pub fn derive_keys(
    password: &[u8],
    salt: &[u8],
    config: &KdfConfig,
) -> Result<DerivedKeys, KeyholdError> {
    let master = master_secret(password, salt, config)?;
    Ok(DerivedKeys {
        wrapping: WrappingKey::new(expand(&master, salt, WRAPPING_KEY_CONTEXT)?),
        auth: AuthKey::new(expand(&master, salt, AUTH_KEY_CONTEXT)?),
    })
}

/// Generate a random account salt.
pub fn generate_salt() -> Result<[u8; SALT_LEN], KeyholdError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt)
        .map_err(|_| KeyholdError::Crypto("failed to generate random salt".to_string()))?;
    Ok(salt)
}

fn master_secret(
    password: &[u8],
    salt: &[u8],
    config: &KdfConfig,
) -> Result<Zeroizing<[u8; KEY_LEN]>, KeyholdError> {
    match argon2id(password, salt, config) {
        Ok(secret) => Ok(secret),
        Err(reason) => {
            warn!(%reason, "Argon2id unavailable, falling back to PBKDF2-HMAC-SHA256");
            pbkdf2_sha256(password, salt, config.fallback_iterations)
                .ok_or(KeyholdError::CriticalSecurityFailure)
        }
    }
}

fn argon2id(
    password: &[u8],
    salt: &[u8],
    config: &KdfConfig,
) -> Result<Zeroizing<[u8; KEY_LEN]>, argon2::Error> {
    let params = argon2::Params::new(
        config.memory_cost_kib,
        config.iterations,
        config.parallelism,
        Some(KEY_LEN),
    )?;
    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    argon2.hash_password_into(password, salt, output.as_mut())?;
    Ok(output)
}

/// Returns `None` when the iteration count is below the fallback floor, so a
/// misconfigured fallback can never produce a weaker key.
fn pbkdf2_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Option<Zeroizing<[u8; KEY_LEN]>> {
    if iterations < MIN_FALLBACK_ITERATIONS {
        return None;
    }
    let iterations = NonZeroU32::new(iterations)?;
    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password,
        output.as_mut(),
    );
    Some(output)
}

fn expand(
    master: &[u8; KEY_LEN],
    salt: &[u8],
    context: &[u8],
) -> Result<Zeroizing<[u8; KEY_LEN]>, KeyholdError> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(master);
    let info = [context];
    let okm = prk
        .expand(&info, hkdf::HKDF_SHA256)
        .map_err(|_| KeyholdError::CriticalSecurityFailure)?;
    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    okm.fill(output.as_mut())
        .map_err(|_| KeyholdError::CriticalSecurityFailure)?;
    Ok(output)
}
