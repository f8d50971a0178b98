//! Vault key derivation (Argon2id).
//!
//! The local store encrypts secret key material under a key derived from a
//! user passphrase and a per-database salt kept in the store's meta table.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

pub const SALT_LEN: usize = 16;

/// 32-byte vault key. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

// 64 MiB, 3 passes, 1 lane.
fn argon2_params() -> Result<Params, CryptoError> {
    Params::new(64 * 1024, 3, 1, Some(32)).map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

pub fn vault_key_from_passphrase(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<VaultKey, CryptoError> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params()?);
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(VaultKey(output))
}

/// Fresh random salt. Generated once per database.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_key() {
        let salt = [3u8; SALT_LEN];
        let a = vault_key_from_passphrase(b"correct horse", &salt).unwrap();
        let b = vault_key_from_passphrase(b"correct horse", &salt).unwrap();
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn salt_changes_key() {
        let a = vault_key_from_passphrase(b"pw", &[1u8; SALT_LEN]).unwrap();
        let b = vault_key_from_passphrase(b"pw", &[2u8; SALT_LEN]).unwrap();
        assert_ne!(a.0, b.0);
        assert_ne!(generate_salt(), generate_salt());
    }
}
