use super::Session;
use crate::core::Result;

/// A nested savepoint within a [`Session`].
///
/// Must be resolved with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); a checkpoint dropped unresolved (early
/// return, panic unwinding, cancelled future) rolls back.
#[must_use = "a checkpoint rolls back when dropped unresolved"]
pub struct Checkpoint<'s> {
    session: &'s Session,
    depth: usize,
    resolved: bool,
}

impl<'s> Checkpoint<'s> {
    pub(super) fn new(session: &'s Session, depth: usize) -> Self {
        Self {
            session,
            depth,
            resolved: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Keeps the checkpoint's writes. Closing the last checkpoint of an
    /// implicit transaction publishes it to the store.
    pub async fn commit(mut self) -> Result<()> {
        self.resolved = true;
        let pending = match self.session.release(self.depth) {
            Ok(pending) => pending,
            Err(err) => {
                self.session.rollback_to(self.depth);
                return Err(err);
            }
        };

        if let Some(ops) = pending {
            self.session.publish(ops).await?;
        }
        Ok(())
    }

    /// Discards everything staged since the checkpoint was opened.
    pub fn rollback(mut self) {
        self.resolved = true;
        self.session.rollback_to(self.depth);
    }
}

impl Drop for Checkpoint<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            log::warn!(
                "session {}: checkpoint {} dropped unresolved, rolling back",
                self.session.id(),
                self.depth
            );
            self.session.rollback_to(self.depth);
        }
    }
}
