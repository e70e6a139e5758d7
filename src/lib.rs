// ============================================================================
// ModelKit Library
// ============================================================================
//
// Base entity layer for web applications: every entity carries an id, an
// opaque token, audit timestamps and a soft-delete flag, and gets CRUD
// helpers running inside nested checkpoints over a transactional store.
//
// ============================================================================

// Lets `#[derive(Entity)]` expand to `::modelkit::...` paths inside this crate too.
extern crate self as modelkit;

pub mod auth;
pub mod config;
pub mod core;
pub mod crud;
pub mod entity;
pub mod prelude;
pub mod query;
pub mod session;
pub mod storage;
pub mod token;
pub mod web;

pub use auth::{AuthCheck, BcryptHasher, Caller, CallerContext, Password, PasswordHasher};
pub use config::ModelConfig;
pub use core::{FieldValue, ModelError, Result, Value};
pub use crud::{Crud, DeleteMode, SaveOptions, WriteOutcome};
pub use entity::{Changes, Column, Entity, EntityBase, Record};
pub use query::Query;
pub use session::{Checkpoint, Database, DatabaseBuilder, Session};
pub use storage::{MemoryStore, Order, Selection};
pub use token::{RandomTokens, TokenSource};

/// Derives [`Entity`](entity::Entity) for a struct embedding an [`EntityBase`].
///
/// Field attributes: `#[entity(base)]`, `#[entity(unique)]`,
/// `#[entity(readonly)]`, `#[entity(password)]`, `#[entity(owner)]` and
/// `#[entity(skip)]`. The struct attribute `#[entity(table = "...")]`
/// overrides the snake_case table name.
pub use modelkit_derive::Entity;
