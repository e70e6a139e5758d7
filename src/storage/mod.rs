pub mod memory;
pub mod table;

pub use memory::MemoryStore;
pub use table::Table;

use crate::entity::{Entity, Record, TOKEN};
use crate::core::Value;

/// All tables of a store or of a transaction's working copy.
pub type Tables = im::HashMap<String, Table>;

/// Table definition: name plus the columns carrying a unique constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub unique_columns: Vec<String>,
}

impl TableSchema {
    /// A table whose `token` column is unique.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique_columns: vec![TOKEN.to_string()],
        }
    }

    pub fn unique_column(mut self, column: impl Into<String>) -> Self {
        let column = column.into();
        if !self.unique_columns.contains(&column) {
            self.unique_columns.push(column);
        }
        self
    }

    pub fn for_entity<E: Entity>() -> Self {
        E::columns()
            .iter()
            .filter(|column| column.unique)
            .fold(Self::new(E::table_name()), |schema, column| {
                schema.unique_column(column.name)
            })
    }
}

/// A staged write, replayed against the store when a transaction publishes.
///
/// `Update` carries only the columns it changes; they are merged into the
/// row as it stands at publish time.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert { table: String, id: i64, record: Record },
    Update { table: String, id: i64, record: Record },
    Delete { table: String, id: i64 },
}

impl WriteOp {
    pub fn table(&self) -> &str {
        match self {
            WriteOp::Insert { table, .. }
            | WriteOp::Update { table, .. }
            | WriteOp::Delete { table, .. } => table,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

/// Row selection for listing queries. Filters are equality matches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, Order)>,
    pub offset: usize,
    pub limit: Option<usize>,
}
