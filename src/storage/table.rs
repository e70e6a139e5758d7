use super::{Order, Selection, TableSchema};
use crate::core::{ModelError, Result, Value};
use crate::entity::{ID, Record};
use im::OrdMap;

/// Rows of one entity table keyed by id.
///
/// Backed by a persistent map, so cloning a table (for a savepoint or a
/// transaction's working copy) shares structure instead of copying rows.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    rows: OrdMap<i64, Record>,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: OrdMap::new(),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Record> {
        self.rows.get(&id)
    }

    pub fn find_by(&self, column: &str, value: &Value) -> Option<(i64, &Record)> {
        if column == ID {
            let id = value.as_i64()?;
            return self.rows.get(&id).map(|record| (id, record));
        }
        self.rows
            .iter()
            .find(|(_, record)| record.get(column) == Some(value))
            .map(|(id, record)| (*id, record))
    }

    pub fn insert(&mut self, id: i64, mut record: Record) -> Result<()> {
        if self.rows.contains_key(&id) {
            return Err(ModelError::ConstraintViolation(format!(
                "duplicate primary key {}.id = {}",
                self.schema.name, id
            )));
        }
        record.insert(ID.to_string(), Value::Integer(id));
        self.check_uniqueness(&record, None)?;
        self.rows.insert(id, record);
        Ok(())
    }

    /// Merges `patch` into the current row. Columns absent from the patch
    /// keep their stored values, so a full record rewrites the whole row.
    pub fn update(&mut self, id: i64, patch: Record) -> Result<()> {
        let Some(current) = self.rows.get(&id) else {
            return Err(ModelError::Transaction(format!(
                "row {}.id = {} no longer exists",
                self.schema.name, id
            )));
        };

        let mut record = current.clone();
        record.extend(patch);
        record.insert(ID.to_string(), Value::Integer(id));
        self.check_uniqueness(&record, Some(id))?;
        self.rows.insert(id, record);
        Ok(())
    }

    pub fn delete(&mut self, id: i64) -> Result<()> {
        self.rows.remove(&id).map(|_| ()).ok_or_else(|| {
            ModelError::Transaction(format!(
                "row {}.id = {} no longer exists",
                self.schema.name, id
            ))
        })
    }

    /// NULLs never collide, as in SQL unique constraints.
    fn check_uniqueness(&self, record: &Record, exclude: Option<i64>) -> Result<()> {
        for column in &self.schema.unique_columns {
            let Some(value) = record.get(column) else {
                continue;
            };
            if value.is_null() {
                continue;
            }

            let clash = self
                .rows
                .iter()
                .any(|(id, row)| Some(*id) != exclude && row.get(column) == Some(value));

            if clash {
                return Err(ModelError::ConstraintViolation(format!(
                    "duplicate value for unique column {}.{}",
                    self.schema.name, column
                )));
            }
        }
        Ok(())
    }

    pub fn select(&self, selection: &Selection) -> Vec<Record> {
        let mut matched: Vec<&Record> = self
            .rows
            .values()
            .filter(|record| {
                selection
                    .filters
                    .iter()
                    .all(|(column, value)| record.get(column).unwrap_or(&Value::Null) == value)
            })
            .collect();

        // Rows iterate in id order already; only re-sort for explicit ordering.
        if let Some((column, order)) = &selection.order_by {
            matched.sort_by(|a, b| {
                let left = a.get(column).unwrap_or(&Value::Null);
                let right = b.get(column).unwrap_or(&Value::Null);
                let ordering = left.compare(right);
                match order {
                    Order::Asc => ordering,
                    Order::Desc => ordering.reverse(),
                }
            });
        }

        matched
            .into_iter()
            .skip(selection.offset)
            .take(selection.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
