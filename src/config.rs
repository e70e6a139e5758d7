use crate::core::{ModelError, Result};
use serde::{Deserialize, Serialize};

/// Smallest token entropy accepted, in bytes.
pub const MIN_TOKEN_BYTES: usize = 15;
/// Largest token entropy accepted; two hex chars per byte must fit the 32-char column.
pub const MAX_TOKEN_BYTES: usize = 16;

const MIN_PASSWORD_COST: u32 = 4;
const MAX_PASSWORD_COST: u32 = 31;

/// Entity layer configuration
///
/// Every field has a default, so partial JSON documents are accepted:
///
/// ```
/// # use modelkit::ModelConfig;
/// let config = ModelConfig::from_json(r#"{ "max_token_attempts": 3 }"#).unwrap();
/// assert_eq!(config.max_token_attempts, 3);
/// assert_eq!(config.token_bytes, 15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Random bytes per generated token (hex encoded, so twice as many chars)
    pub token_bytes: usize,

    /// Token draws before giving up with `TokenSpaceExhausted`
    pub max_token_attempts: u32,

    /// bcrypt cost factor for password hashing
    pub password_cost: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            token_bytes: MIN_TOKEN_BYTES,
            max_token_attempts: 8,
            password_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl ModelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set token entropy in bytes
    pub fn token_bytes(mut self, bytes: usize) -> Self {
        self.token_bytes = bytes;
        self
    }

    /// Set the token retry bound
    pub fn max_token_attempts(mut self, attempts: u32) -> Self {
        self.max_token_attempts = attempts;
        self
    }

    /// Set the bcrypt cost factor
    pub fn password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    /// Parse from a JSON document and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES).contains(&self.token_bytes) {
            return Err(ModelError::Configuration(format!(
                "token_bytes must be between {} and {}, got {}",
                MIN_TOKEN_BYTES, MAX_TOKEN_BYTES, self.token_bytes
            )));
        }

        if self.max_token_attempts == 0 {
            return Err(ModelError::Configuration(
                "max_token_attempts must be at least 1".into(),
            ));
        }

        if !(MIN_PASSWORD_COST..=MAX_PASSWORD_COST).contains(&self.password_cost) {
            return Err(ModelError::Configuration(format!(
                "password_cost must be between {} and {}, got {}",
                MIN_PASSWORD_COST, MAX_PASSWORD_COST, self.password_cost
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ModelConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_tokens_that_overflow_the_column() {
        let err = ModelConfig::new().token_bytes(17).validate().unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }

    #[test]
    fn rejects_low_entropy_tokens() {
        assert!(ModelConfig::new().token_bytes(8).validate().is_err());
    }

    #[test]
    fn rejects_zero_attempts() {
        assert!(ModelConfig::new().max_token_attempts(0).validate().is_err());
    }

    #[test]
    fn from_json_reports_bad_documents() {
        let err = ModelConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));

        let err = ModelConfig::from_json(r#"{ "password_cost": 2 }"#).unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }
}
