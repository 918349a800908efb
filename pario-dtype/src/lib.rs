#![cfg(target_endian = "little")]
#![deny(missing_docs)]

//! Element types for Pario
//!
//! This crate maps the integer type codes used by array-file formats onto the element types the
//! rearranger moves around, together with their wire representation, byte width and default fill
//! value. All raw buffers exchanged with the rest of the workspace are little-endian.

pub use elem_type::*;
pub use fill::*;

mod elem_type;
mod fill;
