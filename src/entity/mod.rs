//! Entity definitions: the shared [`EntityBase`] columns and the [`Entity`]
//! trait that `#[derive(Entity)]` implements for application structs.

mod base;

pub use base::EntityBase;

use crate::auth::Password;
use crate::core::{FieldValue, ModelError, Result, Value};
use std::collections::BTreeMap;

pub const ID: &str = "id";
pub const TOKEN: &str = "token";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const IS_ACTIVE: &str = "is_active";

pub const TOKEN_MAX_LEN: usize = 32;

/// Suffix of the hidden column that records whether a password column holds
/// a hash or plaintext.
pub const PASSWORD_STATE_SUFFIX: &str = "__hashed";

/// A stored row: column name to value.
pub type Record = BTreeMap<String, Value>;

/// Declared (non-base) column of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub type_name: &'static str,
    pub nullable: bool,
    pub unique: bool,
    pub updatable: bool,
}

impl Column {
    pub const fn new(name: &'static str, type_name: &'static str) -> Self {
        Self {
            name,
            type_name,
            nullable: false,
            unique: false,
            updatable: true,
        }
    }

    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub const fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub const fn updatable(mut self, updatable: bool) -> Self {
        self.updatable = updatable;
        self
    }
}

/// A database-backed record type.
///
/// Normally derived:
///
/// ```
/// use modelkit::{Entity, EntityBase, Password};
///
/// #[derive(Debug, Clone, Entity)]
/// #[entity(table = "users")]
/// struct User {
///     #[entity(base)]
///     base: EntityBase,
///     #[entity(unique)]
///     email: String,
///     #[entity(password)]
///     password: Password,
/// }
///
/// assert_eq!(<User as modelkit::entity::Entity>::table_name(), "users");
/// ```
pub trait Entity: Clone + Send + Sync + 'static {
    fn entity_name() -> &'static str;

    fn table_name() -> &'static str;

    /// Declared columns, excluding the base columns.
    fn columns() -> &'static [Column];

    fn base(&self) -> &EntityBase;

    fn base_mut(&mut self) -> &mut EntityBase;

    fn write_fields(&self, record: &mut Record);

    fn from_record(record: &Record) -> Result<Self>;

    /// Generated setter table for declared columns.
    fn set_field(&mut self, column: &str, value: &Value) -> Result<()>;

    fn password(&self) -> Option<&Password> {
        None
    }

    fn password_mut(&mut self) -> Option<&mut Password> {
        None
    }

    /// Column backing [`password`](Self::password), if any.
    fn password_column() -> Option<&'static str> {
        None
    }

    /// Column holding the owning user's id, if the entity is user-owned.
    fn owner_column() -> Option<&'static str> {
        None
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        self.base().write_columns(&mut record);
        self.write_fields(&mut record);
        record
    }

    fn has_column(column: &str) -> bool {
        EntityBase::is_base_column(column) || Self::columns().iter().any(|c| c.name == column)
    }

    /// Validates and applies a change set. Either every change applies or
    /// none does.
    fn apply_changes(&mut self, changes: &Changes) -> Result<()> {
        let mut next = self.clone();
        for (column, value) in changes.iter() {
            if EntityBase::is_base_column(column) {
                next.base_mut().set_column(Self::entity_name(), column, value)?;
                continue;
            }

            match Self::columns().iter().find(|c| c.name == column) {
                Some(declared) if !declared.updatable => {
                    return Err(ModelError::ReadOnlyField {
                        entity: Self::entity_name(),
                        column: column.to_string(),
                    });
                }
                Some(_) => next.set_field(column, value)?,
                None => {
                    return Err(ModelError::UnknownField {
                        entity: Self::entity_name(),
                        column: column.to_string(),
                    });
                }
            }
        }
        *self = next;
        Ok(())
    }
}

/// Column updates for [`Crud::update`](crate::Crud::update).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    values: BTreeMap<String, Value>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Builds a change set from a JSON object, e.g. a PATCH body.
    pub fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        let mut changes = Self::new();
        for (column, json) in object {
            let value = Value::from_json(json).ok_or_else(|| {
                ModelError::Validation(format!("field '{}' must be a scalar", column))
            })?;
            changes.insert(column.clone(), value);
        }
        Ok(changes)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Changes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut changes = Self::new();
        for (column, value) in iter {
            changes.insert(column, value);
        }
        changes
    }
}

#[doc(hidden)]
pub fn decode_field<T: FieldValue>(entity: &'static str, column: &str, value: Option<&Value>) -> Result<T> {
    let value = value.unwrap_or(&Value::Null);
    T::from_value(value).ok_or_else(|| ModelError::TypeMismatch {
        entity,
        column: column.to_string(),
        expected: T::TYPE_NAME,
        found: value.type_name(),
    })
}

/// Setter for password columns: text assigned through an update is a new
/// plaintext, not a stored hash.
#[doc(hidden)]
pub fn decode_password(entity: &'static str, column: &str, value: &Value) -> Result<Password> {
    value
        .as_str()
        .map(Password::plain)
        .ok_or_else(|| ModelError::TypeMismatch {
            entity,
            column: column.to_string(),
            expected: <Password as FieldValue>::TYPE_NAME,
            found: value.type_name(),
        })
}

#[doc(hidden)]
pub fn password_state_column(column: &str) -> String {
    format!("{column}{PASSWORD_STATE_SUFFIX}")
}

#[doc(hidden)]
pub fn write_password(record: &mut Record, column: &str, password: &Password) {
    record.insert(column.to_string(), password.to_value());
    record.insert(
        password_state_column(column),
        Value::Boolean(password.is_hashed()),
    );
}

/// Restores a stored password with the variant it was written with. Rows
/// without a state column hold plaintext.
#[doc(hidden)]
pub fn read_password(entity: &'static str, column: &str, record: &Record) -> Result<Password> {
    let password = decode_password(entity, column, record.get(column).unwrap_or(&Value::Null))?;
    let hashed = record
        .get(&password_state_column(column))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(match password {
        Password::Plain(text) if hashed => Password::Hashed(text),
        other => other,
    })
}
