//! Scoped host transactions for mutating commands.

use thiserror::Error;
use tracing::debug;

use super::DISPATCH_TARGET;

/// Failures opening or closing a host transaction.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A transaction is already in progress.
    #[error("transaction '{open}' is already open")]
    AlreadyOpen {
        /// Label of the open transaction.
        open: String,
    },
    /// Commit or rollback was requested with nothing open.
    #[error("no transaction is open")]
    NotOpen,
    /// The host refused to commit.
    #[error("host rejected commit of '{label}': {reason}")]
    CommitRejected {
        /// Label of the transaction.
        label: String,
        /// Host-supplied reason.
        reason: String,
    },
}

/// Host state that supports all-or-nothing mutation.
///
/// A failed `commit` leaves the transaction open; the caller is expected to
/// roll it back.
pub trait Transactional {
    /// Opens a transaction named `label`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::AlreadyOpen`] when nesting is attempted.
    fn begin(&mut self, label: &str) -> Result<(), TransactionError>;

    /// Makes every change since `begin` permanent.
    ///
    /// # Errors
    ///
    /// Returns an error when nothing is open or the host refuses.
    fn commit(&mut self) -> Result<(), TransactionError>;

    /// Discards every change since `begin`. A no-op when nothing is open.
    fn rollback(&mut self);
}

/// Open transaction that rolls back unless committed.
///
/// Dropping the scope, including during a panic unwind, discards the
/// transaction's changes.
pub struct TransactionScope<'h, H: Transactional> {
    host: &'h mut H,
    label: String,
    finished: bool,
}

impl<'h, H: Transactional> TransactionScope<'h, H> {
    /// Opens a transaction on `host`.
    ///
    /// # Errors
    ///
    /// Propagates the host's refusal to begin.
    pub fn begin(host: &'h mut H, label: &str) -> Result<Self, TransactionError> {
        host.begin(label)?;
        Ok(Self {
            host,
            label: label.to_owned(),
            finished: false,
        })
    }

    /// Host under the open transaction.
    pub fn host(&mut self) -> &mut H {
        self.host
    }

    /// Commits the transaction, rolling back if the host refuses.
    ///
    /// # Errors
    ///
    /// Propagates the host's commit failure.
    pub fn commit(mut self) -> Result<(), TransactionError> {
        self.finished = true;
        let result = self.host.commit();
        if result.is_err() {
            self.host.rollback();
        }
        result
    }
}

impl<H: Transactional> Drop for TransactionScope<'_, H> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!(
            target: DISPATCH_TARGET,
            transaction = %self.label,
            "rolling back transaction"
        );
        self.host.rollback();
    }
}
