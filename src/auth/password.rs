//! Password hashing and verification.
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::AuthError;

/// Minimum password length accepted by registration and recovery.
pub const MIN_PASSWORD_LENGTH: usize = 4;

/// Hasher
///
/// Argon2id with the default cost. Hashes are PHC strings, so verification reads the cost
/// back from the stored hash and keeps working after the parameters change.
#[derive(Clone, Debug, Default)]
pub struct Hasher {
    params: Params,
}

impl Hasher {
    /// The cheapest parameters argon2 accepts. Meant for tests and local seeding only.
    pub fn low_cost() -> Self {
        let params = Params::new(
            Params::MIN_M_COST,
            Params::MIN_T_COST,
            Params::MIN_P_COST,
            None,
        )
        .unwrap_or_default();
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a password with a fresh salt
    pub fn hash(&self, plain: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| AuthError::Hash(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    /// Verify a password against a stored hash
    pub fn verify(&self, hash: &str, plain: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        self.argon2()
            .verify_password(plain.as_bytes(), &parsed_hash)
            .is_ok()
    }
}
