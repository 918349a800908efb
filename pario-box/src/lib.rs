#![deny(missing_docs)]

//! Planning for the box rearranger.
//!
//! Every function in this crate is a deterministic, communication-free computation: each task of a
//! process group runs the same planner on the same global shape and arrives at the same table of
//! I/O boxes, then extracts its own slice. Nothing here blocks or allocates shared state.

pub use blocksize::*;
pub use gcd::*;
pub use options::*;
pub use partition::*;
pub use plan::*;
pub use region::*;

mod blocksize;
mod gcd;
mod options;
mod partition;
mod plan;
mod region;
