//! The process-wide `Registry`: the only mutable structure shared across
//! threads, and the structure [`crate::fault`] must be able to consult from
//! signal context without blocking or allocating.
//!
//! A single [`std::sync::Mutex`] guards a plain `HashMap`. Regular API
//! calls take it with a blocking `lock()`; the fault handler only ever
//! `try_lock()`s it and propagates the fault if that fails, per the
//! signal-safety requirement in the spec's concurrency model.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, TryLockError};
use std::thread::ThreadId;

use crate::config::Config;
use crate::lsa::Lsa;

static CONFIG: OnceLock<Config> = OnceLock::new();
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Set the process-wide configuration. Must be called before the first LSA
/// operation to have any effect; once the registry has been lazily
/// initialized with the default configuration, this is a no-op and returns
/// `Err` with the configuration that was not applied.
pub fn configure(config: Config) -> Result<(), Config> {
    CONFIG.set(config)
}

pub(crate) struct Registry {
    pub(crate) page_size: usize,
    map: Mutex<HashMap<ThreadId, Lsa>>,
}

/// Outcome of scanning the registry for a faulting page address, from
/// inside the signal handler.
pub(crate) enum FaultVerdict {
    /// The address belongs to a page in the faulting thread's own LSA: the
    /// owner is touching its storage outside an API call.
    OwnerMisuse,
    /// No match, or the page belongs to another thread's LSA: not our
    /// business, propagate to the default handler.
    Unrelated,
    /// The registry lock was contended; conservatively propagate rather
    /// than risk deadlocking against a regular API call.
    LockContended,
}

impl Registry {
    /// The process-wide instance, lazily created (and the fault handler
    /// installed) on first access.
    pub(crate) fn global() -> &'static Registry {
        REGISTRY.get_or_init(|| {
            let config = *CONFIG.get_or_init(Config::default);
            let page_size = os_page_size();
            crate::fault::install();
            log::info!("registry initialized (page_size = {page_size})");
            Registry { page_size, map: Mutex::new(HashMap::with_capacity(config.initial_capacity)) }
        })
    }

    pub(crate) fn with_lock<R>(&self, f: impl FnOnce(&mut HashMap<ThreadId, Lsa>) -> R) -> R {
        let mut guard = self.map.lock().unwrap_or_else(|poison| poison.into_inner());
        f(&mut guard)
    }

    /// Signal-context-safe scan: never blocks, never allocates.
    ///
    /// `faulting_thread` must come from `pthread_self()`, not
    /// `std::thread::current()`: the latter can allocate on a thread's first
    /// call, which the calling signal handler must never risk. Each entry
    /// carries its own `pthread_t`, captured with `pthread_self()` at
    /// `create`/`clone_from` time, for this comparison.
    pub(crate) fn scan_fault(&self, faulting_thread: libc::pthread_t, page_base: usize) -> FaultVerdict {
        let guard = match self.map.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return FaultVerdict::LockContended,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        for lsa in guard.values() {
            for page in &lsa.pages {
                if page.base() == page_base {
                    return if lsa.owner == faulting_thread {
                        FaultVerdict::OwnerMisuse
                    } else {
                        FaultVerdict::Unrelated
                    };
                }
            }
        }
        FaultVerdict::Unrelated
    }
}

fn os_page_size() -> usize {
    // SAFETY: `sysconf` with a valid name is always safe to call.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).expect("sysconf(_SC_PAGESIZE) returned a non-positive value")
}
