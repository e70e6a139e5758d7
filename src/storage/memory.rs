use super::{Table, TableSchema, Tables, WriteOp};
use crate::core::{ModelError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::RwLock;

/// Shared in-memory store.
///
/// Holds the published state of every registered table. Sessions read a
/// snapshot of it and publish their staged writes through [`apply`](Self::apply),
/// which replays them against the latest state under the write lock.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    /// Id sequences, shared by all sessions. Rolled-back inserts leave gaps.
    sequences: Mutex<HashMap<String, i64>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a table unless it exists already.
    pub async fn create_table(&self, schema: TableSchema) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.get(&schema.name) {
            if existing.schema() != &schema {
                return Err(ModelError::Configuration(format!(
                    "table '{}' is already registered with a different schema",
                    schema.name
                )));
            }
            return Ok(());
        }

        self.sequences.lock()?.entry(schema.name.clone()).or_insert(0);
        tables.insert(schema.name.clone(), Table::new(schema));
        Ok(())
    }

    pub async fn has_table(&self, name: &str) -> bool {
        self.tables.read().await.contains_key(name)
    }

    /// O(1) copy of the published state.
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }

    pub fn next_id(&self, table: &str) -> Result<i64> {
        let mut sequences = self.sequences.lock()?;
        let current = sequences
            .get_mut(table)
            .ok_or_else(|| ModelError::Unregistered(table.to_string()))?;
        *current += 1;
        Ok(*current)
    }

    /// Publishes a batch atomically: either every operation applies to the
    /// latest state or the store is left untouched.
    pub async fn apply(&self, ops: &[WriteOp]) -> Result<()> {
        let mut tables = self.tables.write().await;
        let mut next = tables.clone();
        for op in ops {
            apply_op(&mut next, op)?;
        }
        *tables = next;
        Ok(())
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(Table::len)
            .ok_or_else(|| ModelError::Unregistered(table.to_string()))
    }
}

pub(crate) fn apply_op(tables: &mut Tables, op: &WriteOp) -> Result<()> {
    let table = tables
        .get_mut(op.table())
        .ok_or_else(|| ModelError::Unregistered(op.table().to_string()))?;

    match op {
        WriteOp::Insert { id, record, .. } => table.insert(*id, record.clone()),
        WriteOp::Update { id, record, .. } => table.update(*id, record.clone()),
        WriteOp::Delete { id, .. } => table.delete(*id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::entity::Record;

    fn row(token: &str) -> Record {
        let mut record = Record::new();
        record.insert("token".into(), Value::Text(token.into()));
        record
    }

    #[tokio::test]
    async fn apply_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.create_table(TableSchema::new("notes")).await.unwrap();

        let ops = vec![
            WriteOp::Insert { table: "notes".into(), id: 1, record: row("a") },
            WriteOp::Insert { table: "notes".into(), id: 2, record: row("a") },
        ];
        assert!(store.apply(&ops).await.unwrap_err().is_conflict());
        assert_eq!(store.row_count("notes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sequences_are_per_table() {
        let store = MemoryStore::new();
        store.create_table(TableSchema::new("notes")).await.unwrap();
        store.create_table(TableSchema::new("users")).await.unwrap();

        assert_eq!(store.next_id("notes").unwrap(), 1);
        assert_eq!(store.next_id("notes").unwrap(), 2);
        assert_eq!(store.next_id("users").unwrap(), 1);
        assert!(matches!(
            store.next_id("missing"),
            Err(ModelError::Unregistered(_))
        ));
    }

    #[tokio::test]
    async fn reregistering_with_another_schema_fails() {
        let store = MemoryStore::new();
        store.create_table(TableSchema::new("notes")).await.unwrap();
        store.create_table(TableSchema::new("notes")).await.unwrap();

        let err = store
            .create_table(TableSchema::new("notes").unique_column("slug"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Configuration(_)));
    }
}
