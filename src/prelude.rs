//! Everything an application module needs to define and use entities.
//!
//! ```
//! use modelkit::prelude::*;
//! ```

pub use crate::{
    AuthCheck, CallerContext, Changes, Crud, Database, DeleteMode, Entity, EntityBase,
    ModelConfig, ModelError, Order, Password, SaveOptions, Session, Value, WriteOutcome,
};
pub use crate::auth::Caller;
