// ============================================================================
// Database handle and per-request sessions
// ============================================================================
//
// A Session is the unit of work handed to every CRUD call. Writes are staged
// in a transaction-private working copy (cheap to clone, see storage::Table)
// and published to the shared MemoryStore when the outermost scope commits.
//
// Nesting:
// - begin()          explicit outer transaction, published by commit()
// - begin_nested()   savepoint; opens an implicit transaction when none is
//                    active, and that transaction publishes when the
//                    checkpoint commits
//
// ============================================================================

mod checkpoint;

pub use checkpoint::Checkpoint;

use crate::auth::{BcryptHasher, PasswordHasher};
use crate::config::ModelConfig;
use crate::core::{ModelError, Result};
use crate::entity::{Entity, Record};
use crate::storage::memory::apply_op;
use crate::storage::{MemoryStore, Selection, Table, TableSchema, Tables, WriteOp};
use crate::token::{RandomTokens, TokenSource};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Shared handle to the store and the entity layer's collaborators.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    store: MemoryStore,
    config: ModelConfig,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenSource>,
}

impl Database {
    /// Database with the given configuration, bcrypt hashing and random tokens.
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Creates the entity's table. Safe to call more than once.
    pub async fn register<E: Entity>(&self) -> Result<()> {
        self.inner.store.create_table(TableSchema::for_entity::<E>()).await
    }

    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    pub fn password_hasher(&self) -> &dyn PasswordHasher {
        self.inner.hasher.as_ref()
    }

    pub fn token_source(&self) -> &dyn TokenSource {
        self.inner.tokens.as_ref()
    }

    pub fn store(&self) -> &MemoryStore {
        &self.inner.store
    }
}

pub struct DatabaseBuilder {
    config: ModelConfig,
    hasher: Option<Arc<dyn PasswordHasher>>,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl Default for DatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatabaseBuilder {
    pub fn new() -> Self {
        Self {
            config: ModelConfig::default(),
            hasher: None,
            tokens: None,
        }
    }

    pub fn config(mut self, config: ModelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn password_hasher(mut self, hasher: impl PasswordHasher + 'static) -> Self {
        self.hasher = Some(Arc::new(hasher));
        self
    }

    pub fn token_source(mut self, tokens: impl TokenSource + 'static) -> Self {
        self.tokens = Some(Arc::new(tokens));
        self
    }

    pub fn build(self) -> Result<Database> {
        self.config.validate()?;

        let hasher = self
            .hasher
            .unwrap_or_else(|| Arc::new(BcryptHasher::new(self.config.password_cost)));
        let tokens = self.tokens.unwrap_or_else(|| Arc::new(RandomTokens));

        Ok(Database {
            inner: Arc::new(DatabaseInner {
                store: MemoryStore::new(),
                config: self.config,
                hasher,
                tokens,
            }),
        })
    }
}

struct Transaction {
    working: Tables,
    ops: Vec<WriteOp>,
    savepoints: Vec<Savepoint>,
    explicit: bool,
}

struct Savepoint {
    working: Tables,
    ops_len: usize,
}

impl Transaction {
    fn new(working: Tables, explicit: bool) -> Self {
        Self {
            working,
            ops: Vec::new(),
            savepoints: Vec::new(),
            explicit,
        }
    }

    fn push_savepoint(&mut self) -> usize {
        self.savepoints.push(Savepoint {
            working: self.working.clone(),
            ops_len: self.ops.len(),
        });
        self.savepoints.len()
    }

    fn stage(&mut self, op: WriteOp) -> Result<()> {
        apply_op(&mut self.working, &op)?;
        self.ops.push(op);
        Ok(())
    }
}

/// Per-request unit of work.
///
/// Not meant to be shared by concurrently running tasks; open one session
/// per request from the shared [`Database`].
pub struct Session {
    db: Database,
    id: Uuid,
    state: Mutex<Option<Transaction>>,
}

impl Session {
    fn new(db: Database) -> Self {
        Self {
            db,
            id: Uuid::new_v4(),
            state: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().map(|state| state.is_some()).unwrap_or(false)
    }

    /// Number of checkpoints currently open.
    pub fn checkpoint_depth(&self) -> usize {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.as_ref().map(|tx| tx.savepoints.len()))
            .unwrap_or(0)
    }

    /// Opens an explicit outer transaction. CRUD calls made inside it stay
    /// private to this session until [`commit`](Self::commit).
    pub async fn begin(&self) -> Result<()> {
        let snapshot = self.db.store().snapshot().await;
        let mut state = self.state.lock()?;
        if state.is_some() {
            return Err(ModelError::Transaction("transaction already active".into()));
        }
        *state = Some(Transaction::new(snapshot, true));
        tracing::debug!(session = %self.id, "transaction started");
        Ok(())
    }

    /// Publishes the explicit outer transaction.
    pub async fn commit(&self) -> Result<()> {
        let ops = {
            let mut state = self.state.lock()?;
            match state.as_ref() {
                None => return Err(ModelError::Transaction("no active transaction".into())),
                Some(tx) if !tx.explicit => {
                    return Err(ModelError::Transaction(
                        "commit requires a transaction opened with begin()".into(),
                    ));
                }
                Some(tx) if !tx.savepoints.is_empty() => {
                    return Err(ModelError::Transaction(format!(
                        "{} checkpoint(s) still open",
                        tx.savepoints.len()
                    )));
                }
                Some(_) => {}
            }
            state.take().map(|tx| tx.ops).unwrap_or_default()
        };
        self.publish(ops).await
    }

    /// Discards the active transaction and everything staged in it.
    pub fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock()?;
        if let Some(tx) = state.take() {
            tracing::debug!(session = %self.id, discarded = tx.ops.len(), "transaction rolled back");
        }
        Ok(())
    }

    /// Opens a savepoint scoped to one unit of work.
    pub async fn begin_nested(&self) -> Result<Checkpoint<'_>> {
        let needs_transaction = self.state.lock()?.is_none();
        let snapshot = if needs_transaction {
            Some(self.db.store().snapshot().await)
        } else {
            None
        };

        let mut state = self.state.lock()?;
        let depth = match (state.as_mut(), snapshot) {
            (Some(tx), _) => tx.push_savepoint(),
            (None, Some(working)) => {
                let mut tx = Transaction::new(working, false);
                let depth = tx.push_savepoint();
                *state = Some(tx);
                depth
            }
            (None, None) => {
                return Err(ModelError::Transaction(
                    "transaction ended while opening a checkpoint".into(),
                ));
            }
        };
        Ok(Checkpoint::new(self, depth))
    }

    /// Pops the savepoint at `depth`. Returns the staged writes when this
    /// closes an implicit transaction and they must be published.
    fn release(&self, depth: usize) -> Result<Option<Vec<WriteOp>>> {
        let mut state = self.state.lock()?;
        let tx = state
            .as_mut()
            .ok_or_else(|| ModelError::Transaction("no active transaction".into()))?;

        if tx.savepoints.len() != depth {
            return Err(ModelError::Transaction(format!(
                "checkpoint {} released while {} are open",
                depth,
                tx.savepoints.len()
            )));
        }
        tx.savepoints.pop();

        if tx.savepoints.is_empty() && !tx.explicit {
            return Ok(state.take().map(|tx| tx.ops));
        }
        Ok(None)
    }

    /// Restores the state captured by the savepoint at `depth` and closes it
    /// together with any checkpoint opened after it.
    fn rollback_to(&self, depth: usize) {
        let Ok(mut state) = self.state.lock() else {
            log::warn!("session {}: lock poisoned during checkpoint rollback", self.id);
            return;
        };
        let Some(tx) = state.as_mut() else {
            return;
        };
        if depth == 0 || tx.savepoints.len() < depth {
            return;
        }

        tx.savepoints.truncate(depth);
        if let Some(savepoint) = tx.savepoints.pop() {
            tx.working = savepoint.working;
            tx.ops.truncate(savepoint.ops_len);
        }

        if tx.savepoints.is_empty() && !tx.explicit {
            *state = None;
        }
    }

    async fn publish(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        match self.db.store().apply(&ops).await {
            Ok(()) => {
                tracing::debug!(session = %self.id, ops = ops.len(), "transaction published");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(session = %self.id, error = %err, "transaction rejected by store");
                Err(err)
            }
        }
    }

    fn with_transaction<R>(&self, f: impl FnOnce(&mut Transaction) -> Result<R>) -> Result<R> {
        let mut state = self.state.lock()?;
        match state.as_mut() {
            Some(tx) if !tx.savepoints.is_empty() || tx.explicit => f(tx),
            _ => Err(ModelError::Transaction(
                "writes must be staged inside a checkpoint".into(),
            )),
        }
    }

    /// Stages an insert and returns the id assigned to the new row.
    pub fn stage_insert(&self, table: &str, record: Record) -> Result<i64> {
        let id = self.db.store().next_id(table)?;
        self.with_transaction(|tx| {
            tx.stage(WriteOp::Insert {
                table: table.to_string(),
                id,
                record,
            })
        })?;
        Ok(id)
    }

    pub fn stage_update(&self, table: &str, id: i64, record: Record) -> Result<()> {
        self.with_transaction(|tx| {
            tx.stage(WriteOp::Update {
                table: table.to_string(),
                id,
                record,
            })
        })
    }

    pub fn stage_delete(&self, table: &str, id: i64) -> Result<()> {
        self.with_transaction(|tx| {
            tx.stage(WriteOp::Delete {
                table: table.to_string(),
                id,
            })
        })
    }

    /// `ModelError::Unregistered` unless `table` is known to this session.
    pub async fn ensure_table(&self, table: &str) -> Result<()> {
        self.read(table, |_| ()).await
    }

    async fn read<R>(&self, table: &str, f: impl FnOnce(&Table) -> R) -> Result<R> {
        {
            let state = self.state.lock()?;
            if let Some(tx) = state.as_ref() {
                let rows = tx
                    .working
                    .get(table)
                    .ok_or_else(|| ModelError::Unregistered(table.to_string()))?;
                return Ok(f(rows));
            }
        }

        let snapshot = self.db.store().snapshot().await;
        let rows = snapshot
            .get(table)
            .ok_or_else(|| ModelError::Unregistered(table.to_string()))?;
        Ok(f(rows))
    }

    /// Row by primary key, including writes staged in this session.
    pub async fn fetch(&self, table: &str, id: i64) -> Result<Option<Record>> {
        self.read(table, |rows| rows.get(id).cloned()).await
    }

    /// First row whose `column` equals `value`.
    pub async fn find_by(
        &self,
        table: &str,
        column: &str,
        value: &crate::core::Value,
    ) -> Result<Option<(i64, Record)>> {
        self.read(table, |rows| {
            rows.find_by(column, value)
                .map(|(id, record)| (id, record.clone()))
        })
        .await
    }

    pub async fn select(&self, table: &str, selection: &Selection) -> Result<Vec<Record>> {
        self.read(table, |rows| rows.select(selection)).await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut()
            && let Some(tx) = state.take()
            && !tx.ops.is_empty()
        {
            log::warn!(
                "session {} dropped with an open transaction; discarding {} staged write(s)",
                self.id,
                tx.ops.len()
            );
        }
    }
}
