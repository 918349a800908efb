#![deny(missing_docs)]

//! Process-local bookkeeping for parallel I/O.
//!
//! A [`PioContext`] owns every I/O system, open file and decomposition of one process. Handles
//! are generation-tagged, so a handle to a freed resource reports not-found instead of aliasing
//! whatever reused its slot. Distributed-array writes are buffered per file and flushed through
//! a [`HyperslabSink`], one box per active I/O task, carrying only the elements this process
//! supplies.

pub use context::*;
pub use darray::*;
pub use decomp::*;
pub use file::*;
pub use handle::*;
pub use iosystem::*;
pub use store::*;
pub use var::*;

mod context;
mod darray;
mod decomp;
mod file;
mod handle;
mod iosystem;
mod store;
mod var;
