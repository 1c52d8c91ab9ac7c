//! The crate's one escape hatch for a fatal condition: the OS refusing a
//! protection change on a page whose accounting we believe is correct.
//! These are impossible-state guards, not recoverable errors; they never
//! produce an `LsaError`. They log and abort.

/// Log `context` at `error!` and abort the process.
///
/// Called only from [`crate::protection`] when `mprotect` fails on a page
/// the caller has just finished accounting for. Reaching this point means
/// the crate's own bookkeeping has already diverged from reality, so there
/// is nothing a caller could do with a returned error.
#[cold]
pub(crate) fn abort_corrupted(context: &str) -> ! {
    log::error!("fatal: {context}");
    std::process::abort()
}
