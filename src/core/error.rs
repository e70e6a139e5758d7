use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Token space exhausted for {entity} after {attempts} attempts")]
    TokenSpaceExhausted { entity: &'static str, attempts: u32 },

    #[error("Unknown field '{column}' on {entity}")]
    UnknownField { entity: &'static str, column: String },

    #[error("Field '{column}' on {entity} is read-only")]
    ReadOnlyField { entity: &'static str, column: String },

    #[error("Type mismatch for {entity}.{column}: expected {expected}, found {found}")]
    TypeMismatch {
        entity: &'static str,
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} has not been persisted yet")]
    Detached(&'static str),

    #[error("Entity table '{0}' is not registered")]
    Unregistered(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl ModelError {
    /// True for uniqueness violations detected by the store.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for errors caused by the caller's input rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownField { .. }
                | Self::ReadOnlyField { .. }
                | Self::TypeMismatch { .. }
                | Self::Validation(_)
                | Self::Detached(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;

impl<T> From<std::sync::PoisonError<T>> for ModelError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for ModelError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::PasswordHash(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}
