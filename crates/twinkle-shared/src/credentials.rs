use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::constants::{
    KDF_CONTEXT_PASSWORD, PASSWORD_HASH_ROUNDS, PASSWORD_SALT_SIZE, SESSION_TOKEN_SIZE,
};
use crate::error::CredentialError;

/// A salted, stretched password digest as persisted by the account store.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash {
    salt: [u8; PASSWORD_SALT_SIZE],
    digest: [u8; 32],
}

impl PasswordHash {
    /// Hash a password under a fresh random salt
    pub fn derive(password: &str) -> Self {
        let mut salt = [0u8; PASSWORD_SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        Self::with_salt(password, salt)
    }

    pub fn with_salt(password: &str, salt: [u8; PASSWORD_SALT_SIZE]) -> Self {
        Self {
            salt,
            digest: stretch(&salt, password),
        }
    }

    /// Constant-time check of a candidate password
    pub fn verify(&self, password: &str) -> bool {
        let candidate = stretch(&self.salt, password);
        candidate[..].ct_eq(&self.digest[..]).into()
    }

    pub fn salt_hex(&self) -> String {
        hex::encode(self.salt)
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Rebuild from the two hex columns stored alongside an account
    pub fn from_hex(salt_hex: &str, digest_hex: &str) -> Result<Self, CredentialError> {
        let salt_bytes = hex::decode(salt_hex)?;
        let digest_bytes = hex::decode(digest_hex)?;

        let salt: [u8; PASSWORD_SALT_SIZE] =
            salt_bytes
                .as_slice()
                .try_into()
                .map_err(|_| CredentialError::InvalidLength {
                    field: "salt",
                    expected: PASSWORD_SALT_SIZE,
                    actual: salt_bytes.len(),
                })?;
        let digest: [u8; 32] =
            digest_bytes
                .as_slice()
                .try_into()
                .map_err(|_| CredentialError::InvalidLength {
                    field: "digest",
                    expected: 32,
                    actual: digest_bytes.len(),
                })?;

        Ok(Self { salt, digest })
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash").finish_non_exhaustive()
    }
}

fn stretch(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_PASSWORD);
    hasher.update(salt);
    hasher.update(password.as_bytes());
    let mut state = *hasher.finalize().as_bytes();

    for _ in 1..PASSWORD_HASH_ROUNDS {
        let mut round = blake3::Hasher::new_derive_key(KDF_CONTEXT_PASSWORD);
        round.update(&state);
        round.update(salt);
        state = *round.finalize().as_bytes();
    }
    state
}

/// Generate an opaque, unguessable session token (hex encoded)
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_SIZE];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Compare two secrets without leaking the mismatch position
pub fn secrets_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    a.len() == b.len() && a.ct_eq(b).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_only_original_password() {
        let hash = PasswordHash::derive("hunter22");
        assert!(hash.verify("hunter22"));
        assert!(!hash.verify("hunter23"));
        assert!(!hash.verify(""));
    }

    #[test]
    fn test_salt_changes_digest() {
        let a = PasswordHash::derive("same-password");
        let b = PasswordHash::derive("same-password");
        assert_ne!(a.digest_hex(), b.digest_hex());
    }

    #[test]
    fn test_hex_columns_restore_hash() {
        let hash = PasswordHash::with_salt("secret!", [7u8; PASSWORD_SALT_SIZE]);
        let restored = PasswordHash::from_hex(&hash.salt_hex(), &hash.digest_hex()).unwrap();
        assert!(restored.verify("secret!"));
    }

    #[test]
    fn test_from_hex_rejects_short_salt() {
        let err = PasswordHash::from_hex("abcd", &"00".repeat(32)).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidLength { field: "salt", .. }));
    }

    #[test]
    fn test_session_tokens_are_unique() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_eq!(a.len(), SESSION_TOKEN_SIZE * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("token", "token"));
        assert!(!secrets_match("token", "tokem"));
        assert!(!secrets_match("token", "token2"));
    }
}
