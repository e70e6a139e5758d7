use crate::auth::Caller;
use crate::core::{ModelError, Result, Value};
use crate::entity::{Entity, IS_ACTIVE};
use crate::session::Session;
use crate::storage::{Order, Selection};
use std::marker::PhantomData;

/// Lazy query over one entity table.
///
/// Nothing runs until [`all`](Self::all), [`first`](Self::first) or
/// [`count`](Self::count) is awaited. Reads see writes staged in the session.
///
/// ```
/// # use modelkit::{Crud, Database, Entity, EntityBase, ModelConfig, Order};
/// # #[derive(Debug, Clone, Entity)]
/// # struct Article { #[entity(base)] base: EntityBase, title: String, views: i64 }
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> modelkit::Result<()> {
/// # let db = Database::new(ModelConfig::default())?;
/// # db.register::<Article>().await?;
/// # let session = db.session();
/// let popular = Article::query(&session)
///     .active_only()
///     .order_by("views", Order::Desc)
///     .limit(10)
///     .all()
///     .await?;
/// # assert!(popular.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct Query<'s, E: Entity> {
    session: &'s Session,
    selection: Selection,
    matches_nothing: bool,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity> Query<'s, E> {
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            selection: Selection::default(),
            matches_nothing: false,
            _entity: PhantomData,
        }
    }

    pub fn filter_by(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.selection.filters.push((column.into(), value.into()));
        self
    }

    /// Excludes soft-deleted rows.
    pub fn active_only(self) -> Self {
        self.filter_by(IS_ACTIVE, true)
    }

    /// Restricts the query to rows owned by the caller. Entities without an
    /// owner column are not filtered; a caller without a user id owns nothing.
    pub fn owned_by(mut self, caller: &dyn Caller) -> Self {
        let Some(column) = E::owner_column() else {
            return self;
        };
        match caller.user_id() {
            Some(user_id) => self.filter_by(column, user_id),
            None => {
                self.matches_nothing = true;
                self
            }
        }
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.selection.order_by = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.selection.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.selection.offset = offset;
        self
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    fn check_columns(&self) -> Result<()> {
        let ordered = self.selection.order_by.iter().map(|(column, _)| column);
        let filtered = self.selection.filters.iter().map(|(column, _)| column);

        match filtered.chain(ordered).find(|column| !E::has_column(column)) {
            Some(unknown) => Err(ModelError::UnknownField {
                entity: E::entity_name(),
                column: unknown.clone(),
            }),
            None => Ok(()),
        }
    }

    pub async fn all(self) -> Result<Vec<E>> {
        self.check_columns()?;
        if self.matches_nothing {
            self.session.ensure_table(E::table_name()).await?;
            return Ok(Vec::new());
        }

        self.session
            .select(E::table_name(), &self.selection)
            .await?
            .iter()
            .map(E::from_record)
            .collect()
    }

    pub async fn first(self) -> Result<Option<E>> {
        Ok(self.limit(1).all().await?.into_iter().next())
    }

    pub async fn count(self) -> Result<usize> {
        self.check_columns()?;
        if self.matches_nothing {
            self.session.ensure_table(E::table_name()).await?;
            return Ok(0);
        }

        Ok(self
            .session
            .select(E::table_name(), &self.selection)
            .await?
            .len())
    }
}
