//! Per-thread Local Storage Areas (LSAs) backed by OS page protection.
//!
//! Each thread may [`api::create`] a private, byte-addressable region. The
//! region's pages are mapped `PROT_NONE` outside of an API call, so any
//! direct load or store to it, by the owner or by anyone else, faults; a
//! process-wide signal handler classifies that fault and terminates the
//! offending thread if it was the owner misusing its own storage. A thread
//! may [`api::clone_from`] another thread's LSA to get a copy-on-write view
//! of it: pages are shared until one side writes, at which point that side
//! transparently gets a private copy.
//!
//! ```no_run
//! use std::thread;
//!
//! lsa::api::create(4096).unwrap();
//! lsa::api::write(0, 5, b"hello").unwrap();
//!
//! let mut buf = [0u8; 5];
//! lsa::api::read(0, 5, &mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//!
//! lsa::api::destroy().unwrap();
//! ```
//!
//! This crate only supports Unix-like targets: the core mechanism is
//! `mmap`/`mprotect`/`sigaction`, which have no portable Windows equivalent
//! at this level.

#![cfg(unix)]

pub mod api;
pub mod config;
pub mod error;

mod fatal;
mod fault;
mod lsa;
mod page;
mod protection;
mod registry;

pub use error::{LsaError, Result};
