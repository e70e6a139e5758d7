//! CRUD operations shared by every entity.
//!
//! [`Crud`] is implemented for every [`Entity`], so a derived struct gets
//! `save`, `update`, `delete`, the lookups and listing helpers for free.
//!
//! Every write runs inside its own nested checkpoint. A failed write rolls
//! its checkpoint back, restores the in-memory entity to its state before
//! the call and returns the error; nothing is swallowed.

use crate::auth::{AuthCheck, Caller};
use crate::core::{ModelError, Result, Value};
use crate::entity::{Changes, Entity, IS_ACTIVE, Record, TOKEN, UPDATED_AT, password_state_column};
use crate::query::Query;
use crate::session::Session;
use crate::token::assign_unique_token;
use async_trait::async_trait;
use chrono::Utc;

/// Result of a write that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum WriteOutcome {
    /// The write is durable (or staged in the session's explicit transaction).
    Committed,
    /// The caller failed the auth check; nothing changed.
    Skipped,
    /// The entity was never saved, so the change exists in memory only.
    InMemory,
}

impl WriteOutcome {
    pub fn is_committed(self) -> bool {
        self == WriteOutcome::Committed
    }
}

/// Options for [`Crud::save`] and [`Crud::save_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub auth: AuthCheck,
    pub generate_token: bool,
    pub hash_password: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            auth: AuthCheck::Required,
            generate_token: true,
            hash_password: true,
        }
    }
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth(mut self, auth: AuthCheck) -> Self {
        self.auth = auth;
        self
    }

    pub fn generate_token(mut self, generate: bool) -> Self {
        self.generate_token = generate;
        self
    }

    pub fn hash_password(mut self, hash: bool) -> Self {
        self.hash_password = hash;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Flip `is_active` to false and keep the row.
    #[default]
    Soft,
    /// Remove the row.
    Hard,
}

#[async_trait]
pub trait Crud: Entity {
    /// Persists the entity: inserts it on first save, rewrites its row after.
    async fn save(
        &mut self,
        session: &Session,
        caller: &dyn Caller,
        options: SaveOptions,
    ) -> Result<WriteOutcome>;

    /// Applies `changes` and writes them. Unknown, read-only or mistyped
    /// columns reject the whole change set before anything is modified.
    async fn update(
        &mut self,
        session: &Session,
        caller: &dyn Caller,
        changes: Changes,
        auth: AuthCheck,
    ) -> Result<WriteOutcome>;

    async fn delete(
        &mut self,
        session: &Session,
        caller: &dyn Caller,
        mode: DeleteMode,
        auth: AuthCheck,
    ) -> Result<WriteOutcome>;

    /// Ensures the entity holds a token no other row of its table uses.
    async fn generate_token(&mut self, session: &Session) -> Result<String>;

    /// True if `plaintext` matches the stored password hash.
    fn check_password(&self, session: &Session, plaintext: &str) -> bool;

    /// Saves a batch in one checkpoint: all rows land or none do.
    async fn save_all(
        entities: &mut [Self],
        session: &Session,
        caller: &dyn Caller,
        options: SaveOptions,
    ) -> Result<WriteOutcome>;

    async fn get_by_id(session: &Session, id: i64) -> Result<Option<Self>>;

    async fn get_by_id_or_404(session: &Session, id: i64) -> Result<Self>;

    async fn get_by_token(session: &Session, token: &str) -> Result<Option<Self>>;

    async fn get_by_token_or_404(session: &Session, token: &str) -> Result<Self>;

    /// Up to `limit` rows in id order.
    async fn get_all(session: &Session, limit: Option<usize>) -> Result<Vec<Self>>;

    /// Like [`get_all`](Self::get_all), restricted to rows the caller owns.
    async fn get_all_owned(
        session: &Session,
        caller: &dyn Caller,
        limit: Option<usize>,
    ) -> Result<Vec<Self>>;

    /// Lazy handle for further composition.
    fn query(session: &Session) -> Query<'_, Self>;
}

#[async_trait]
impl<E: Entity> Crud for E {
    async fn save(
        &mut self,
        session: &Session,
        caller: &dyn Caller,
        options: SaveOptions,
    ) -> Result<WriteOutcome> {
        if !options.auth.permits(caller) {
            tracing::debug!(entity = E::entity_name(), "save skipped: caller not authenticated");
            return Ok(WriteOutcome::Skipped);
        }

        let before = self.clone();
        let checkpoint = session.begin_nested().await?;
        let result = match stage_save(self, session, options).await {
            Ok(()) => checkpoint.commit().await,
            Err(err) => {
                checkpoint.rollback();
                Err(err)
            }
        };

        settle(self, before, result, "save")
    }

    async fn update(
        &mut self,
        session: &Session,
        caller: &dyn Caller,
        changes: Changes,
        auth: AuthCheck,
    ) -> Result<WriteOutcome> {
        if !auth.permits(caller) {
            tracing::debug!(entity = E::entity_name(), "update skipped: caller not authenticated");
            return Ok(WriteOutcome::Skipped);
        }

        let before = self.clone();
        self.apply_changes(&changes)?;
        self.base_mut().bump_updated(Utc::now());

        let Some(id) = self.base().id() else {
            return Ok(WriteOutcome::InMemory);
        };

        let checkpoint = session.begin_nested().await?;
        let result = match stage_update(self, session, id, &changes) {
            Ok(()) => checkpoint.commit().await,
            Err(err) => {
                checkpoint.rollback();
                Err(err)
            }
        };

        settle(self, before, result, "update")
    }

    async fn delete(
        &mut self,
        session: &Session,
        caller: &dyn Caller,
        mode: DeleteMode,
        auth: AuthCheck,
    ) -> Result<WriteOutcome> {
        if mode == DeleteMode::Soft {
            let changes = Changes::new().set(IS_ACTIVE, false);
            return self.update(session, caller, changes, auth).await;
        }

        if !auth.permits(caller) {
            tracing::debug!(entity = E::entity_name(), "delete skipped: caller not authenticated");
            return Ok(WriteOutcome::Skipped);
        }

        let id = self
            .base()
            .id()
            .ok_or(ModelError::Detached(E::entity_name()))?;

        let before = self.clone();
        let checkpoint = session.begin_nested().await?;
        let result = match session.stage_delete(E::table_name(), id) {
            Ok(()) => checkpoint.commit().await,
            Err(err) => {
                checkpoint.rollback();
                Err(err)
            }
        };

        settle(self, before, result, "delete")
    }

    async fn generate_token(&mut self, session: &Session) -> Result<String> {
        assign_unique_token(session, self).await
    }

    fn check_password(&self, session: &Session, plaintext: &str) -> bool {
        let Some(hash) = self.password().and_then(|password| password.hash()) else {
            return false;
        };
        session.database().password_hasher().verify(plaintext, hash)
    }

    async fn save_all(
        entities: &mut [Self],
        session: &Session,
        caller: &dyn Caller,
        options: SaveOptions,
    ) -> Result<WriteOutcome> {
        if !options.auth.permits(caller) {
            tracing::debug!(entity = E::entity_name(), "bulk save skipped: caller not authenticated");
            return Ok(WriteOutcome::Skipped);
        }

        let before = entities.to_vec();
        let checkpoint = session.begin_nested().await?;
        let mut staged = Ok(());
        for entity in entities.iter_mut() {
            staged = stage_save(entity, session, options).await;
            if staged.is_err() {
                break;
            }
        }

        let result = match staged {
            Ok(()) => checkpoint.commit().await,
            Err(err) => {
                checkpoint.rollback();
                Err(err)
            }
        };

        match result {
            Ok(()) => {
                tracing::debug!(entity = E::entity_name(), rows = entities.len(), "bulk save committed");
                Ok(WriteOutcome::Committed)
            }
            Err(err) => {
                log::warn!(
                    "{}: bulk save of {} rows rolled back: {}",
                    E::entity_name(),
                    before.len(),
                    err
                );
                entities.clone_from_slice(&before);
                Err(err)
            }
        }
    }

    async fn get_by_id(session: &Session, id: i64) -> Result<Option<Self>> {
        session
            .fetch(E::table_name(), id)
            .await?
            .map(|record| E::from_record(&record))
            .transpose()
    }

    async fn get_by_id_or_404(session: &Session, id: i64) -> Result<Self> {
        Self::get_by_id(session, id)
            .await?
            .ok_or_else(|| ModelError::NotFound {
                entity: E::entity_name(),
                key: id.to_string(),
            })
    }

    async fn get_by_token(session: &Session, token: &str) -> Result<Option<Self>> {
        session
            .find_by(E::table_name(), TOKEN, &Value::from(token))
            .await?
            .map(|(_, record)| E::from_record(&record))
            .transpose()
    }

    async fn get_by_token_or_404(session: &Session, token: &str) -> Result<Self> {
        Self::get_by_token(session, token)
            .await?
            .ok_or_else(|| ModelError::NotFound {
                entity: E::entity_name(),
                key: token.to_string(),
            })
    }

    async fn get_all(session: &Session, limit: Option<usize>) -> Result<Vec<Self>> {
        let query = Query::<E>::new(session);
        match limit {
            Some(limit) => query.limit(limit).all().await,
            None => query.all().await,
        }
    }

    async fn get_all_owned(
        session: &Session,
        caller: &dyn Caller,
        limit: Option<usize>,
    ) -> Result<Vec<Self>> {
        let query = Query::<E>::new(session).owned_by(caller);
        match limit {
            Some(limit) => query.limit(limit).all().await,
            None => query.all().await,
        }
    }

    fn query(session: &Session) -> Query<'_, Self> {
        Query::new(session)
    }
}

/// Token, password and timestamps, then the insert or update itself.
async fn stage_save<E: Entity>(entity: &mut E, session: &Session, options: SaveOptions) -> Result<()> {
    if options.generate_token {
        assign_unique_token(session, entity).await?;
    }
    entity.base().check_token(E::entity_name())?;

    if options.hash_password
        && let Some(password) = entity.password_mut()
    {
        password.hash_with(session.database().password_hasher())?;
    }

    entity.base_mut().touch(Utc::now());

    match entity.base().id() {
        Some(id) => session.stage_update(E::table_name(), id, entity.to_record()),
        None => {
            let id = session.stage_insert(E::table_name(), entity.to_record())?;
            entity.base_mut().assign_id(id);
            Ok(())
        }
    }
}

/// Writes only the changed columns plus `updated_at`, so concurrent updates
/// of other columns survive. A password is hashed here only when the change
/// set assigns it; a stored plaintext stays as it was.
fn stage_update<E: Entity>(entity: &mut E, session: &Session, id: i64, changes: &Changes) -> Result<()> {
    entity.base().check_token(E::entity_name())?;

    let password_column = E::password_column().filter(|column| changes.get(column).is_some());
    if password_column.is_some()
        && let Some(password) = entity.password_mut()
    {
        password.hash_with(session.database().password_hasher())?;
    }

    let mut full = entity.to_record();
    let mut patch = Record::new();
    let mut keep = |column: &str| {
        if let Some(value) = full.remove(column) {
            patch.insert(column.to_string(), value);
        }
    };
    for (column, _) in changes.iter() {
        keep(column);
    }
    if let Some(column) = password_column {
        keep(&password_state_column(column));
    }
    keep(UPDATED_AT);

    session.stage_update(E::table_name(), id, patch)
}

fn settle<E: Entity>(entity: &mut E, before: E, result: Result<()>, operation: &str) -> Result<WriteOutcome> {
    match result {
        Ok(()) => {
            tracing::debug!(entity = E::entity_name(), id = ?entity.base().id(), operation, "write committed");
            Ok(WriteOutcome::Committed)
        }
        Err(err) => {
            log::warn!(
                "{} {} rolled back: {}",
                E::entity_name(),
                operation,
                err
            );
            *entity = before;
            Err(err)
        }
    }
}
