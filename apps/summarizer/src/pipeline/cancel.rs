//! Cooperative cancellation for pipeline runs.
//!
//! The orchestrator polls the token between node transitions only. An external call that
//! is already in flight finishes (or times out) on its own and its result is dropped.

use tokio_util::sync::CancellationToken;

/// Held by whoever may cancel the run.
#[derive(Debug)]
pub struct CancelHandle {
    token: CancellationToken,
}

/// Held by the run. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    token: CancellationToken,
}

pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let token = CancellationToken::new();
    (
        CancelHandle {
            token: token.clone(),
        },
        CancelToken { token },
    )
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    #[cfg(test)]
    pub fn never() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token for one run inside a larger scope. Cancelling the parent cancels it too.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_visible_to_all_clones() {
        let (handle, token) = cancel_pair();
        let other = token.clone();
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(token.is_cancelled());
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_never_token_stays_live() {
        assert!(!CancelToken::never().is_cancelled());
    }

    #[test]
    fn test_dropped_handle_does_not_cancel() {
        let (handle, token) = cancel_pair();
        drop(handle);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_parent_cancel_reaches_child() {
        let (handle, token) = cancel_pair();
        let child = token.child();

        handle.cancel();
        assert!(child.is_cancelled());
    }
}
