use std::thread::{self, ThreadId};

use crate::error::{Result, StreamError};

/// Records which thread may use a reader, writer or transform stream.
///
/// Objects start owned by the thread that created them. Ownership can be
/// handed to the current thread with [`reassign`](Self::reassign) or
/// dropped with [`unassign`](Self::unassign), after which the next caller
/// claims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerThread(Option<ThreadId>);

impl OwnerThread {
    /// Owned by the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self(Some(thread::current().id()))
    }

    /// Fails unless the calling thread owns the object; an unassigned
    /// object is claimed by the caller.
    ///
    /// # Errors
    ///
    /// [`StreamError::StreamState`] when another thread owns it.
    pub fn check(&mut self, what: &str) -> Result<()> {
        let me = thread::current().id();
        match self.0 {
            Some(owner) if owner == me => Ok(()),
            Some(owner) => Err(StreamError::state(format!(
                "{what} is owned by thread {owner:?} and cannot be used from {me:?}"
            ))),
            None => {
                self.0 = Some(me);
                Ok(())
            }
        }
    }

    pub fn reassign(&mut self) {
        self.0 = Some(thread::current().id());
    }

    pub fn unassign(&mut self) {
        self.0 = None;
    }

    #[must_use]
    pub fn owner(&self) -> Option<ThreadId> {
        self.0
    }
}

impl Default for OwnerThread {
    fn default() -> Self {
        Self::current()
    }
}
