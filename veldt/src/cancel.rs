//! Caller-driven cancellation with optional deadlines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use std::sync::Arc;

use crate::error::Error;


/// A cloneable cancellation handle threaded through all public operations.
///
/// Canceling any clone cancels them all. Operations consult the token at
/// their suspension points (store calls, channel operations, per-coordinate
/// work) and return [`Error::Canceled`] or [`Error::DeadlineExceeded`] at
/// the next check; they never interrupt a committed transaction.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    canceled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancelToken {

    /// A token that never expires on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires once the given timeout has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                canceled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// Request cancellation of every operation holding a clone of this token.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Relaxed);
    }

    /// True once the token was canceled or its deadline elapsed.
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Relaxed)
            || self.inner.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Check the token, returning the error to surface when it fired.
    pub fn check(&self) -> Result<(), Error> {
        if self.inner.canceled.load(Ordering::Relaxed) {
            Err(Error::Canceled)
        } else if self.inner.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            Err(Error::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

}
