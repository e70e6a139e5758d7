//! Opaque entity tokens.

use crate::core::{ModelError, Result, Value};
use crate::entity::Entity;
use crate::session::Session;
use rand::RngCore;
use rand::rngs::OsRng;

/// Source of candidate tokens.
///
/// The default draws from the OS random generator; tests and applications
/// with their own token scheme can install another source on the
/// [`DatabaseBuilder`](crate::DatabaseBuilder).
pub trait TokenSource: Send + Sync {
    fn next_token(&self, bytes: usize) -> String;
}

/// Hex-encoded random bytes from the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn next_token(&self, bytes: usize) -> String {
        let mut buf = vec![0u8; bytes];
        OsRng.fill_bytes(&mut buf);
        hex::encode(buf)
    }
}

/// Gives `entity` a token no other row of its table holds.
///
/// An empty token is replaced by a fresh draw; a token that collides with a
/// different row is redrawn. The store's unique constraint remains the final
/// authority, since another session may claim the same token before commit.
pub(crate) async fn assign_unique_token<E: Entity>(session: &Session, entity: &mut E) -> Result<String> {
    let config = session.database().config();
    let source = session.database().token_source();

    let mut attempts = 0u32;
    if entity.base().token().is_empty() {
        entity.base_mut().set_token(source.next_token(config.token_bytes));
        attempts += 1;
    }

    loop {
        let token = entity.base().token().to_string();
        if !token_taken::<E>(session, &token, entity.base().id()).await? {
            return Ok(token);
        }

        if attempts >= config.max_token_attempts {
            log::warn!(
                "{}: no free token after {} attempts",
                E::entity_name(),
                attempts
            );
            return Err(ModelError::TokenSpaceExhausted {
                entity: E::entity_name(),
                attempts,
            });
        }

        entity.base_mut().set_token(source.next_token(config.token_bytes));
        attempts += 1;
    }
}

async fn token_taken<E: Entity>(session: &Session, token: &str, own_id: Option<i64>) -> Result<bool> {
    let existing = session
        .find_by(E::table_name(), crate::entity::TOKEN, &Value::from(token))
        .await?;

    Ok(match existing {
        Some((id, _)) => Some(id) != own_id,
        None => false,
    })
}
