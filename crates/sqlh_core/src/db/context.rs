//! Deadlines and cancellation for database calls.
//!
//! A [`Context`] is passed to every query, transaction and migration. Derived
//! contexts inherit the parent's cancellation and can only shorten its
//! deadline.

use super::{DbError, DbResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CancelFlag {
    cancelled: AtomicBool,
    parent: Option<Arc<CancelFlag>>,
}

impl CancelFlag {
    fn is_set(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.parent.as_ref().is_some_and(|parent| parent.is_set())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Arc<CancelFlag>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derives a child context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self.child(self.deadline),
        }
    }

    /// Derives a child context that expires at `deadline`, or earlier if the
    /// parent does.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let effective = match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        };
        self.child(Some(effective))
    }

    fn child(&self, deadline: Option<Instant>) -> Self {
        Self {
            deadline,
            cancel: Arc::new(CancelFlag {
                cancelled: AtomicBool::new(false),
                parent: Some(Arc::clone(&self.cancel)),
            }),
        }
    }

    /// Cancels this context, its clones and every context derived from it.
    pub fn cancel(&self) {
        self.cancel.cancelled.store(true, Ordering::Release);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Returns why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<DbError> {
        if self.cancel.is_set() {
            return Some(DbError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DbError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> DbResult<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
