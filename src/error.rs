//! Error taxonomy for the LSA API.
//!
//! Every fallible entry point in [`crate::api`] returns `Result<T, LsaError>`.
//! Conditions the crate considers a violation of its own internal invariants
//! (a protection change failing on a page we believe we own) are not modeled
//! as variants here at all: they go through [`crate::fatal::abort_corrupted`]
//! and never return to a caller.

use nix::errno::Errno;
use thiserror::Error;

/// Recoverable failure of an LSA operation.
#[derive(Debug, Error)]
pub enum LsaError {
    /// `create`/`clone` called by a thread that already owns an LSA.
    #[error("thread already owns an LSA")]
    AlreadyExists,

    /// `destroy`/`read`/`write` called by a thread with no LSA.
    #[error("calling thread has no LSA")]
    NotFound,

    /// `clone` named a source thread with no LSA.
    #[error("clone source thread has no LSA")]
    SourceNotFound,

    /// `create` called with a non-positive size.
    #[error("LSA size must be greater than zero")]
    InvalidSize,

    /// `read`/`write` range falls outside `0..size`, including the case
    /// where `offset + length` overflows.
    #[error("offset/length range falls outside the LSA")]
    OutOfBounds,

    /// The OS refused to map, unmap, or account for a page.
    #[error("page allocation failed: {0}")]
    AllocFailed(#[from] Errno),
}

pub type Result<T> = core::result::Result<T, LsaError>;
