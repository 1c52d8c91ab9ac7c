//! `FaultArbiter`: the process-wide `SIGSEGV`/`SIGBUS` handler.
//!
//! Installed once, lazily, by [`crate::registry::Registry::global`]. On a
//! protection fault it classifies the faulting address against the
//! registry and either terminates the faulting thread (owner misuse) or
//! restores the default disposition and re-raises (anything else).

use std::os::raw::c_int;
use std::sync::Once;

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::registry::{FaultVerdict, Registry};

static INSTALL: Once = Once::new();

/// Install the handler for `SIGSEGV` and `SIGBUS`. Idempotent; safe to call
/// more than once (only the first call does anything).
pub(crate) fn install() {
    INSTALL.call_once(|| {
        let action = SigAction::new(
            SigHandler::SigAction(handle_fault),
            SaFlags::SA_SIGINFO,
            SigSet::empty(),
        );
        // SAFETY: `handle_fault` only touches async-signal-safe state (see
        // its own safety note) and we install it before any LSA exists, so
        // there is nothing for it to race against yet.
        unsafe {
            signal::sigaction(Signal::SIGSEGV, &action).expect("failed to install SIGSEGV handler");
            signal::sigaction(Signal::SIGBUS, &action).expect("failed to install SIGBUS handler");
        }
        log::debug!("fault arbiter installed for SIGSEGV/SIGBUS");
    });
}

/// The signal handler itself.
///
/// # Safety / signal-safety
///
/// This function runs on the faulting thread's stack and may interrupt any
/// instruction, including one inside a regular API call. It must not
/// allocate and must not acquire a lock that a regular API call might be
/// holding: it reaches the registry only through
/// [`Registry::scan_fault`], which uses `try_lock` and treats contention as
/// "propagate". It does not go through the `log` facade (its global
/// dispatch is not guaranteed signal-safe); under the `fault-diagnostics`
/// feature it instead writes one fixed line via a raw `write(2)`.
extern "C" fn handle_fault(sig: c_int, info: *mut libc::siginfo_t, _ctx: *mut libc::c_void) {
    // SAFETY: `info` is a valid, non-null siginfo_t for the duration of the
    // handler call, as guaranteed by the `sigaction(2)` contract.
    let fault_addr = unsafe { (*info).si_addr() } as usize;
    let registry = Registry::global();
    let page_base = fault_addr & !(registry.page_size - 1);
    // `std::thread::current()` lazily allocates on a thread's first call,
    // which is not safe to risk from a handler that may have interrupted
    // the allocator itself. `pthread_self()` is async-signal-safe and never
    // allocates, so the handler uses it and compares against the `pthread_t`
    // cached in each registry entry instead of going through `ThreadId`.
    let this_thread = unsafe { libc::pthread_self() };

    match registry.scan_fault(this_thread, page_base) {
        FaultVerdict::OwnerMisuse => {
            diagnostic("owner accessed its own LSA outside the API");
            // SAFETY: terminates only the calling thread, without running
            // destructors for its stack frames. This is the same trade-off
            // `pthread_exit` makes in general: there is no stable std API
            // to end only the current thread.
            unsafe { libc::pthread_exit(std::ptr::null_mut()) };
        }
        FaultVerdict::Unrelated | FaultVerdict::LockContended => {
            diagnostic("unrelated fault, restoring default disposition");
            restore_default_and_reraise(sig);
        }
    }
}

fn restore_default_and_reraise(sig: c_int) {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    let signal = Signal::try_from(sig).expect("signal delivered to our own handler");
    // SAFETY: restoring the default disposition before re-raising is the
    // standard "I'm not handling this" pattern for a chained signal handler.
    unsafe {
        let _ = signal::sigaction(signal, &default);
    }
    unsafe {
        libc::raise(sig);
    }
}

#[cfg(feature = "fault-diagnostics")]
fn diagnostic(message: &str) {
    // SAFETY: `write` to `STDERR_FILENO` is async-signal-safe; the buffer
    // lives for the duration of the call and is not read afterwards.
    unsafe {
        libc::write(libc::STDERR_FILENO, message.as_ptr().cast(), message.len());
        libc::write(libc::STDERR_FILENO, b"\n".as_ptr().cast(), 1);
    }
}

#[cfg(not(feature = "fault-diagnostics"))]
fn diagnostic(_message: &str) {}
