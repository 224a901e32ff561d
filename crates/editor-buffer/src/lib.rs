//! # Editor Buffer Engine
//!
//! A mutable, randomly-addressable byte sequence split into bounded
//! pages, with a reversible undo log, charset-aware byte/char/line
//! position translation, and read-only memory-mapped backing for
//! large files.
//!
//! Layering, leaf first: `page` (one bounded byte run plus cached
//! line/char summaries), then `pages` (the ordered page store with a
//! position cache), then `buffer` (the user-facing handle wiring the
//! store to the undo log and observers), then `registry` (the list of
//! named live buffers). `charset` and `undo_log` are the stateless
//! decode and record-layout helpers the layers above share; `raw`
//! holds the file representation trait and the byte-for-byte one.

pub mod buffer;
pub mod charset;
pub mod enums;
pub mod errors;
pub mod page;
pub mod pages;
pub mod raw;
pub mod registry;
pub mod undo_log;
