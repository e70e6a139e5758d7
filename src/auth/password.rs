use crate::core::{FieldValue, Result, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Password column content.
///
/// A password enters the system as `Plain` and is replaced by `Hashed`
/// before it is written unless the save opts out of hashing. The store keeps
/// the variant next to the text, so a loaded value is what was written.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Password {
    Plain(String),
    Hashed(String),
}

impl Password {
    pub fn plain(plaintext: impl Into<String>) -> Self {
        Self::Plain(plaintext.into())
    }

    pub fn hashed(hash: impl Into<String>) -> Self {
        Self::Hashed(hash.into())
    }

    pub fn is_hashed(&self) -> bool {
        matches!(self, Self::Hashed(_))
    }

    /// The stored hash, if this password has been hashed.
    pub fn hash(&self) -> Option<&str> {
        match self {
            Self::Hashed(hash) => Some(hash),
            Self::Plain(_) => None,
        }
    }

    /// Hashes a plaintext password in place. Already hashed values are left
    /// alone so a hash is never hashed twice.
    pub fn hash_with(&mut self, hasher: &dyn PasswordHasher) -> Result<bool> {
        if let Self::Plain(plaintext) = self {
            *self = Self::Hashed(hasher.hash(plaintext)?);
            return Ok(true);
        }
        Ok(false)
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::Plain(String::new())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("Password::Plain(***)"),
            Self::Hashed(_) => f.write_str("Password::Hashed(***)"),
        }
    }
}

impl FieldValue for Password {
    const TYPE_NAME: &'static str = "PASSWORD";

    fn to_value(&self) -> Value {
        match self {
            Self::Plain(text) | Self::Hashed(text) => Value::Text(text.clone()),
        }
    }

    // A bare value carries no hash marker, so it is treated as plaintext.
    // Stored rows restore the variant through `entity::read_password`.
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(Password::plain)
    }
}

/// One-way password hash primitive.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Returns true if the plaintext matches the hash. Malformed hashes never match.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

/// bcrypt with a configurable cost factor.
///
/// Each hash includes a random salt, so the same password produces
/// different hashes.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }

    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        bcrypt::verify(plaintext, hash).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> BcryptHasher {
        BcryptHasher::new(4)
    }

    #[test]
    fn hash_with_only_hashes_plaintext_once() {
        let hasher = hasher();
        let mut password = Password::plain("s3cret");

        assert!(password.hash_with(&hasher).unwrap());
        let first = password.hash().unwrap().to_string();

        assert!(!password.hash_with(&hasher).unwrap());
        assert_eq!(password.hash(), Some(first.as_str()));
        assert!(hasher.verify("s3cret", &first));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!hasher().verify("s3cret", "s3cret"));
    }

    #[test]
    fn debug_output_is_redacted() {
        let rendered = format!("{:?}", Password::plain("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
