use super::{CREATED_AT, ID, IS_ACTIVE, Record, TOKEN, TOKEN_MAX_LEN, UPDATED_AT, decode_field};
use crate::core::{FieldValue, ModelError, Result, Value};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Columns shared by every entity: identity, token, audit timestamps and
/// the soft-delete flag.
///
/// Embed it in an entity struct and mark it `#[entity(base)]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityBase {
    id: Option<i64>,
    token: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    is_active: bool,
}

impl Default for EntityBase {
    fn default() -> Self {
        Self {
            id: None,
            token: String::new(),
            created_at: None,
            updated_at: None,
            is_active: true,
        }
    }
}

impl EntityBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with a caller-chosen token instead of a generated one.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub(crate) fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    /// Stamps `updated_at` (and `created_at` on first use). `updated_at`
    /// always moves forward, even if the clock does not.
    /// Stamps a write: `updated_at` moves forward, `created_at` is set once.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        let next = self.bump_updated(now);
        if self.created_at.is_none() {
            self.created_at = Some(next);
        }
    }

    /// Moves `updated_at` to `now`, or one microsecond past its previous
    /// value when the clock has not advanced.
    pub(crate) fn bump_updated(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next = match self.updated_at {
            Some(previous) if now <= previous => previous + Duration::microseconds(1),
            _ => now,
        };
        self.updated_at = Some(next);
        next
    }

    pub(crate) fn check_token(&self, entity: &'static str) -> Result<()> {
        if self.token.is_empty() {
            return Err(ModelError::Validation(format!("{entity} token is required")));
        }
        if self.token.len() > TOKEN_MAX_LEN {
            return Err(ModelError::Validation(format!(
                "{entity} token exceeds {TOKEN_MAX_LEN} characters"
            )));
        }
        Ok(())
    }

    pub fn is_base_column(column: &str) -> bool {
        matches!(column, ID | TOKEN | CREATED_AT | UPDATED_AT | IS_ACTIVE)
    }

    /// Setter for the base columns an update may touch.
    pub(crate) fn set_column(&mut self, entity: &'static str, column: &str, value: &Value) -> Result<()> {
        match column {
            TOKEN => {
                self.token = decode_field(entity, TOKEN, Some(value))?;
                Ok(())
            }
            IS_ACTIVE => {
                self.is_active = decode_field(entity, IS_ACTIVE, Some(value))?;
                Ok(())
            }
            ID | CREATED_AT | UPDATED_AT => Err(ModelError::ReadOnlyField {
                entity,
                column: column.to_string(),
            }),
            other => Err(ModelError::UnknownField {
                entity,
                column: other.to_string(),
            }),
        }
    }

    pub fn write_columns(&self, record: &mut Record) {
        record.insert(ID.to_string(), self.id.to_value());
        record.insert(TOKEN.to_string(), self.token.to_value());
        record.insert(CREATED_AT.to_string(), self.created_at.to_value());
        record.insert(UPDATED_AT.to_string(), self.updated_at.to_value());
        record.insert(IS_ACTIVE.to_string(), self.is_active.to_value());
    }

    pub fn from_record(entity: &'static str, record: &Record) -> Result<Self> {
        Ok(Self {
            id: decode_field(entity, ID, record.get(ID))?,
            token: decode_field(entity, TOKEN, record.get(TOKEN))?,
            created_at: decode_field(entity, CREATED_AT, record.get(CREATED_AT))?,
            updated_at: decode_field(entity, UPDATED_AT, record.get(UPDATED_AT))?,
            is_active: decode_field(entity, IS_ACTIVE, record.get(IS_ACTIVE))?,
        })
    }
}
