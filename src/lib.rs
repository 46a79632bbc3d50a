//! Append-in-place round-robin time-series store.
//!
//! Two on-disk formats share one tool: *RRDB-v1* keeps a fixed-capacity
//! circular buffer of timestamped samples plus derived rolling aggregates
//! (max, min, count, mean, sum) over calendar-aligned windows, and *Touch-v2*
//! keeps per-path event counts in dynamically allocated circular buffers
//! bucketed by wall-clock time. Files are mutated in place under an advisory
//! `lockf` lock on byte 0, so independent processes can share a store.
//!
//! ## Example
//!
//! ```no_run
//! use std::io;
//!
//! use rrdb::command::{Request, Verb};
//!
//! // create counters.rrdb with one value set, 500 samples and a daily count.
//! let req = Request {
//!     verb: Verb::Create,
//!     path: "data/counters.rrdb".into(),
//!     set_count: 1,
//!     sample_count: 500,
//!     xform: "RRDBCOUNT:ONEDAY:RRDBSUM:ONEHOUR:0".into(),
//!     ..Request::default()
//! };
//! rrdb::command::run(&req, &mut io::stdout()).unwrap();
//! ```
//!
//! The `rrdb` binary exposes the same operations through long-only flags
//! (`--command=update --dir=data --filename=counters.rrdb --values=12`) and a
//! line-oriented pipe mode reading commands from standard input.

pub mod codec;
pub mod command;
pub mod error;
mod ffi;
pub mod period;
pub mod reducer;
pub mod ring;
pub mod series;
pub mod store;
pub mod touch;

pub use error::{Error, Result};
