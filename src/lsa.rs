//! The `LSA` entity: one thread's storage, as a declared size and an
//! ordered list of shared page references.

use std::sync::Arc;

use crate::error::LsaError;
use crate::page::{self, PageRef};
use crate::protection;

pub(crate) struct Lsa {
    pub(crate) size: usize,
    pub(crate) page_size: usize,
    pub(crate) pages: Vec<PageRef>,
    /// The owning thread's `pthread_t`, captured at creation time so the
    /// signal handler can identify ownership without calling
    /// `std::thread::current()` (see `Registry::scan_fault`).
    pub(crate) owner: libc::pthread_t,
}

impl Lsa {
    pub(crate) fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Validate `offset + length <= size`, treating overflow as out of
    /// bounds rather than wrapping (see the open question in the design
    /// notes about the source's unchecked addition).
    pub(crate) fn check_range(&self, offset: usize, length: usize) -> Result<(), LsaError> {
        let end = offset.checked_add(length).ok_or(LsaError::OutOfBounds)?;
        if end > self.size { Err(LsaError::OutOfBounds) } else { Ok(()) }
    }

    pub(crate) fn protect_all(&self) {
        for page in &self.pages {
            crate::protection::protect(page);
        }
    }

    pub(crate) fn unprotect_all(&self) {
        for page in &self.pages {
            crate::protection::unprotect(page);
        }
    }

    /// `(page_index, offset_within_page)` for a linear offset into this LSA.
    pub(crate) fn locate(&self, offset: usize) -> (usize, usize) {
        page::split_offset(offset, self.page_size)
    }

    /// Copy `length` bytes starting at `offset` into `out`. Caller must have
    /// already unprotected every page in this LSA and must reprotect them
    /// afterwards; this never fails once the range has been bounds-checked.
    pub(crate) fn read_into(&self, offset: usize, length: usize, out: &mut [u8]) {
        let mut cur = offset;
        let mut done = 0;
        while done < length {
            let (index, page_offset) = self.locate(cur);
            let chunk = (length - done).min(self.page_size - page_offset);
            protection::read_bytes(&self.pages[index], page_offset, &mut out[done..done + chunk]);
            cur += chunk;
            done += chunk;
        }
    }

    /// Copy `length` bytes from `data` starting at `offset`, CoW-splitting
    /// any shared page before the first byte is written to it. Caller must
    /// have already unprotected every page in this LSA and must reprotect
    /// them afterwards regardless of the outcome.
    pub(crate) fn write_from(&mut self, offset: usize, length: usize, data: &[u8]) -> Result<(), LsaError> {
        let mut cur = offset;
        let mut done = 0;
        while done < length {
            let (index, page_offset) = self.locate(cur);
            if Arc::strong_count(&self.pages[index]) > 1 {
                self.cow_split(index)?;
            }
            let chunk = (length - done).min(self.page_size - page_offset);
            protection::write_bytes(&self.pages[index], page_offset, &data[done..done + chunk]);
            cur += chunk;
            done += chunk;
        }
        Ok(())
    }

    /// Replace the shared page at `index` with a private copy, leaving the
    /// original intact (and protected again) for whoever else still holds
    /// it.
    fn cow_split(&mut self, index: usize) -> Result<(), LsaError> {
        let old = &self.pages[index];
        let new_page = protection::allocate_page(self.page_size)?;
        // The new mapping starts PROT_NONE; it must be writable for the
        // memcpy below and for whatever remains of the caller's write, for
        // the lifetime of the unprotected window (see design notes).
        protection::unprotect(&new_page);
        protection::copy_page(&new_page, old, self.page_size);
        protection::protect(old);
        self.pages[index] = new_page;
        Ok(())
    }
}
