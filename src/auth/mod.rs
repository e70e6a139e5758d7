//! Caller identity and password handling.
//!
//! The CRUD layer never reads a process-wide "current user"; every call
//! receives a [`Caller`] explicitly.

pub mod caller;
pub mod password;

pub use caller::{AuthCheck, Caller, CallerContext};
pub use password::{BcryptHasher, Password, PasswordHasher};
