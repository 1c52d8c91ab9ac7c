//! The five user-facing LSA operations: `create`, `destroy`, `read`,
//! `write`, `clone`. Every operation here targets the calling thread's own
//! LSA (except `clone`, which names a source thread to copy from).

use std::thread::ThreadId;

use crate::error::{LsaError, Result};
use crate::lsa::Lsa;
use crate::page;
use crate::protection;
use crate::registry::Registry;

fn current() -> ThreadId {
    std::thread::current().id()
}

/// The calling thread's `pthread_t`, cached on each registry entry so the
/// signal handler can identify ownership without calling `current()`.
fn current_pthread() -> libc::pthread_t {
    // SAFETY: `pthread_self()` has no preconditions and never fails.
    unsafe { libc::pthread_self() }
}

/// Allocate a private LSA of `size` bytes for the calling thread.
///
/// Requires the caller to not already own an LSA and `size > 0`. On
/// partial allocation failure, every page mapped so far for this call is
/// unmapped again before returning (falls out of `Vec<Arc<PageFrame>>`'s
/// own drop, since nothing else references them yet).
pub fn create(size: usize) -> Result<()> {
    if size == 0 {
        return Err(LsaError::InvalidSize);
    }
    let registry = Registry::global();
    let page_size = registry.page_size;
    let count = page::page_count(size, page_size);
    log::debug!("create(size = {size}) -> {count} pages");

    registry.with_lock(|map| {
        let tid = current();
        if map.contains_key(&tid) {
            return Err(LsaError::AlreadyExists);
        }

        let mut pages = Vec::with_capacity(count);
        for _ in 0..count {
            pages.push(protection::allocate_page(page_size)?);
        }

        map.insert(tid, Lsa { size, page_size, pages, owner: current_pthread() });
        log::info!("LSA created for {tid:?}: {size} bytes, {count} pages");
        Ok(())
    })
}

/// Destroy the calling thread's LSA, releasing a reference to each of its
/// pages (unmapping any page whose last reference this was).
pub fn destroy() -> Result<()> {
    let registry = Registry::global();
    registry.with_lock(|map| {
        let tid = current();
        let lsa = map.remove(&tid).ok_or(LsaError::NotFound)?;
        log::info!("LSA destroyed for {tid:?}: {} pages released", lsa.page_count());
        Ok(())
    })
}

/// Read `length` bytes starting at `offset` from the calling thread's LSA
/// into `out`, which must be at least `length` bytes long.
pub fn read(offset: usize, length: usize, out: &mut [u8]) -> Result<()> {
    assert!(out.len() >= length, "out buffer shorter than requested length");
    let registry = Registry::global();
    registry.with_lock(|map| {
        let tid = current();
        let lsa = map.get(&tid).ok_or(LsaError::NotFound)?;
        lsa.check_range(offset, length)?;

        log::trace!("read(offset = {offset}, length = {length}) for {tid:?}");
        lsa.unprotect_all();
        lsa.read_into(offset, length, &mut out[..length]);
        lsa.protect_all();
        Ok(())
    })
}

/// Write `length` bytes from `data` (at least `length` bytes long) into the
/// calling thread's LSA starting at `offset`, CoW-splitting any shared page
/// touched by the range before writing to it.
pub fn write(offset: usize, length: usize, data: &[u8]) -> Result<()> {
    assert!(data.len() >= length, "data buffer shorter than requested length");
    let registry = Registry::global();
    registry.with_lock(|map| {
        let tid = current();
        let lsa = map.get_mut(&tid).ok_or(LsaError::NotFound)?;
        lsa.check_range(offset, length)?;

        log::trace!("write(offset = {offset}, length = {length}) for {tid:?}");
        lsa.unprotect_all();
        // Reprotect on every exit, success or failure: an error here means
        // an allocation failed mid-split, not that the LSA's pages are in
        // an unsafe state to leave unprotected.
        let result = lsa.write_from(offset, length, &data[..length]);
        lsa.protect_all();
        result
    })
}

/// Give the calling thread a copy-on-write clone of `source`'s LSA.
///
/// Requires the caller to not already own an LSA and `source` to own one.
/// Every page in `source`'s LSA is shared (its reference count
/// incremented) rather than copied.
pub fn clone_from(source: ThreadId) -> Result<()> {
    let registry = Registry::global();
    registry.with_lock(|map| {
        let tid = current();
        if map.contains_key(&tid) {
            return Err(LsaError::AlreadyExists);
        }
        let source_lsa = map.get(&source).ok_or(LsaError::SourceNotFound)?;

        let pages = source_lsa.pages.clone();
        let cloned = Lsa {
            size: source_lsa.size,
            page_size: source_lsa.page_size,
            pages,
            owner: current_pthread(),
        };
        log::info!("LSA cloned from {source:?} to {tid:?}: {} pages shared", cloned.page_count());
        map.insert(tid, cloned);
        Ok(())
    })
}

/// Expose the base address of one of the calling thread's own pages.
///
/// Not part of the stable public contract: gated behind the
/// `introspection` feature and used only by the `tests/` integration
/// suite, which needs a real address to fabricate an illegitimate access
/// through (the whole point of the crate is that callers otherwise have no
/// way to name a page directly).
#[cfg(feature = "introspection")]
pub fn debug_page_base(index: usize) -> Option<usize> {
    let registry = Registry::global();
    registry.with_lock(|map| map.get(&current())?.pages.get(index).map(|p| p.base()))
}
