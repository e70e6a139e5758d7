/// The party on whose behalf a CRUD call runs.
///
/// Applications implement this for their own session/user types; the
/// [`CallerContext`] value type covers the common cases.
pub trait Caller: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// Id of the authenticated user, used to scope owner-filtered listings.
    fn user_id(&self) -> Option<i64> {
        None
    }
}

/// Plain caller description passed explicitly into every CRUD call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerContext {
    authenticated: bool,
    user_id: Option<i64>,
}

impl CallerContext {
    /// Unauthenticated caller. Writes gated by [`AuthCheck::Required`] become no-ops.
    pub const fn anonymous() -> Self {
        Self {
            authenticated: false,
            user_id: None,
        }
    }

    /// Authenticated end user.
    pub const fn user(user_id: i64) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id),
        }
    }

    /// Authenticated background job or maintenance task without a user id.
    pub const fn system() -> Self {
        Self {
            authenticated: true,
            user_id: None,
        }
    }
}

impl Caller for CallerContext {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn user_id(&self) -> Option<i64> {
        self.user_id
    }
}

/// Whether a write requires an authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthCheck {
    #[default]
    Required,
    Skipped,
}

impl AuthCheck {
    /// Returns false when the write must be skipped for this caller.
    pub fn permits(self, caller: &dyn Caller) -> bool {
        match self {
            AuthCheck::Required => caller.is_authenticated(),
            AuthCheck::Skipped => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_check_blocks_anonymous_callers() {
        assert!(!AuthCheck::Required.permits(&CallerContext::anonymous()));
        assert!(AuthCheck::Required.permits(&CallerContext::user(1)));
        assert!(AuthCheck::Required.permits(&CallerContext::system()));
    }

    #[test]
    fn skipped_check_permits_everyone() {
        assert!(AuthCheck::Skipped.permits(&CallerContext::anonymous()));
    }

    #[test]
    fn system_caller_has_no_user_id() {
        assert_eq!(CallerContext::system().user_id(), None);
        assert_eq!(CallerContext::user(9).user_id(), Some(9));
    }
}
