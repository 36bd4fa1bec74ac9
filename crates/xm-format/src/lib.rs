//! `.xm` binary loader and `libxm` compact serializer for xmplay.
//!
//! `xm_ir` owns the data model; this crate turns wire bytes into a
//! populated `Context` (and back, for the compact dump format). Parsing
//! happens once at load time, off the real-time audio path, so unlike
//! `xm-engine` this crate is a normal `std` crate.

mod delta;
mod libxm;
mod reader;
mod xm;

#[cfg(test)]
mod test_fixtures;

pub use libxm::{load_libxm, serialize_libxm, LibxmOptions};
pub use xm::load_xm;

pub use xm_ir::LoadError;
