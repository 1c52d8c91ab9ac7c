//! `ProtectionOps`: the narrow `unsafe` façade over `mmap`/`mprotect`/`munmap`.
//!
//! Everything above this module deals in [`crate::page::PageFrame`] values
//! and never touches a raw pointer itself. This mirrors how the reference
//! implementation's native-call tracer toggles page protection around a
//! traced region (map `PROT_NONE`, flip to `PROT_READ | PROT_WRITE` for the
//! duration of an owner operation, flip back before returning).

use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::mman::{self, MapFlags, ProtFlags};

use crate::error::LsaError;
use crate::fatal::abort_corrupted;
use crate::page::{PageFrame, PageRef};

/// Map a fresh anonymous page, initially with no access at all.
///
/// Freshly-mapped anonymous pages are zero-filled by the OS, which is how
/// `destroy` followed by `create` of the same size yields zero-initialized
/// storage (invariant 6 in the spec's testable properties) without this
/// crate doing any zeroing itself.
pub(crate) fn allocate_page(page_size: usize) -> Result<PageRef, LsaError> {
    #[cfg(test)]
    test_support::maybe_inject_failure()?;

    let len = NonZeroUsize::new(page_size).expect("page size is never zero");
    // SAFETY: anonymous, not file-backed; no prior mapping at this address
    // is assumed or required.
    let base = unsafe {
        mman::mmap_anonymous(
            None,
            len,
            ProtFlags::PROT_NONE,
            MapFlags::MAP_PRIVATE,
        )
    }
    .map_err(LsaError::AllocFailed)?;
    log::trace!("mapped page at {:#x} ({page_size} bytes)", base.as_ptr() as usize);

    #[cfg(test)]
    test_support::note_page_mapped();

    Ok(Arc::new(PageFrame { base: base.as_ptr().cast(), len: page_size }))
}

/// Unmap a page frame. Only called from [`PageFrame::drop`].
pub(crate) fn free_page(base: *mut u8, len: usize) -> Result<(), Errno> {
    let Some(ptr) = NonNull::new(base) else { return Ok(()) };
    // SAFETY: `base`/`len` came from a matching `mmap_anonymous` call and no
    // other reference to this page can exist (this runs from `Drop`, after
    // the last `Arc` clone has gone away).
    unsafe { mman::munmap(ptr.cast(), len) }
}

/// Set a page's protection to `PROT_NONE`. Fatal if the OS refuses: an
/// owning LSA always knows the frame it is protecting is still mapped.
pub(crate) fn protect(page: &PageFrame) {
    if let Err(errno) = set_prot(page, ProtFlags::PROT_NONE) {
        abort_corrupted(&format!("mprotect(PROT_NONE) failed on page {:#x}: {errno}", page.base()));
    }
}

/// Set a page's protection to `PROT_READ | PROT_WRITE`. Fatal if the OS
/// refuses, for the same reason as [`protect`].
pub(crate) fn unprotect(page: &PageFrame) {
    if let Err(errno) = set_prot(page, ProtFlags::PROT_READ | ProtFlags::PROT_WRITE) {
        abort_corrupted(&format!(
            "mprotect(READ|WRITE) failed on page {:#x}: {errno}",
            page.base()
        ));
    }
}

fn set_prot(page: &PageFrame, prot: ProtFlags) -> Result<(), Errno> {
    let Some(ptr) = NonNull::new(page.base) else { return Ok(()) };
    // SAFETY: `ptr` is a live mapping owned by `page` for its whole lifetime.
    unsafe { mman::mprotect(ptr.cast(), page.len, prot) }
}

/// Copy `len` bytes from `src` to `dst`, both assumed unprotected
/// (`PROT_READ | PROT_WRITE`) for the duration of the call by the caller.
pub(crate) fn copy_page(dst: &PageFrame, src: &PageFrame, len: usize) {
    debug_assert!(len <= dst.len && len <= src.len);
    // SAFETY: both pages are unprotected by the caller and non-overlapping
    // (they are distinct mappings), so a plain byte copy is sound.
    unsafe {
        std::ptr::copy_nonoverlapping(src.base, dst.base, len);
    }
}

/// Copy `out.len()` bytes out of `page` starting at `offset_in_page`.
/// Caller must have unprotected `page` and guarantee the range fits within it.
pub(crate) fn read_bytes(page: &PageFrame, offset_in_page: usize, out: &mut [u8]) {
    debug_assert!(offset_in_page + out.len() <= page.len);
    // SAFETY: `page` is unprotected by the caller for the duration of this
    // call, and the range was bounds-checked by `Lsa::check_range`.
    unsafe {
        std::ptr::copy_nonoverlapping(page.base.add(offset_in_page), out.as_mut_ptr(), out.len());
    }
}

/// Copy `data` into `page` starting at `offset_in_page`.
/// Caller must have unprotected `page` and guarantee the range fits within it.
pub(crate) fn write_bytes(page: &PageFrame, offset_in_page: usize, data: &[u8]) {
    debug_assert!(offset_in_page + data.len() <= page.len);
    // SAFETY: same as `read_bytes`, in the other direction.
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), page.base.add(offset_in_page), data.len());
    }
}

/// Test-only fault injection for exercising partial-allocation rollback
/// (scenario 6: a multi-page `create` fails partway through and leaks
/// nothing). Not reachable outside `#[cfg(test)]` builds.
#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::Cell;

    use crate::error::LsaError;

    // `allocate_page` is only ever called by the thread running `create`, and
    // the default test harness gives every `#[test]` its own thread, so
    // thread-local state here is naturally isolated per test: one test
    // arming fault injection never perturbs `create` calls made by other
    // tests running concurrently on their own threads.
    thread_local! {
        static LIVE_PAGES: Cell<usize> = const { Cell::new(0) };
        static FAIL_AFTER: Cell<usize> = const { Cell::new(usize::MAX) };
        static ALLOC_COUNT: Cell<usize> = const { Cell::new(0) };
    }

    /// Pages currently mapped by `allocate_page`/`free_page` calls made on
    /// this thread, independent of the registry, so a test can assert
    /// nothing was leaked after a failure.
    pub(crate) fn live_pages() -> usize {
        LIVE_PAGES.with(|c| c.get())
    }

    pub(crate) fn note_page_mapped() {
        LIVE_PAGES.with(|c| c.set(c.get() + 1));
    }

    pub(crate) fn note_page_unmapped() {
        LIVE_PAGES.with(|c| c.set(c.get() - 1));
    }

    /// Arm fault injection on this thread to fail the call numbered `n`
    /// (0-based) of [`super::allocate_page`], and reset the call counter.
    /// Returns a guard that disarms injection again on drop, so a panicking
    /// test doesn't leak a failure mode into whatever runs next on this
    /// thread.
    pub(crate) fn fail_nth_allocation(n: usize) -> FailureGuard {
        ALLOC_COUNT.with(|c| c.set(0));
        FAIL_AFTER.with(|c| c.set(n));
        FailureGuard
    }

    pub(crate) struct FailureGuard;

    impl Drop for FailureGuard {
        fn drop(&mut self) {
            FAIL_AFTER.with(|c| c.set(usize::MAX));
            ALLOC_COUNT.with(|c| c.set(0));
        }
    }

    pub(crate) fn maybe_inject_failure() -> Result<(), LsaError> {
        let call = ALLOC_COUNT.with(|c| {
            let call = c.get();
            c.set(call + 1);
            call
        });
        if call == FAIL_AFTER.with(|c| c.get()) {
            return Err(LsaError::AllocFailed(nix::errno::Errno::ENOMEM));
        }
        Ok(())
    }
}
