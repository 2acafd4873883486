//! scanfs common types, run identifiers, and errors.
//!
//! This crate provides foundational types shared across scanfs-core modules:
//! - The unified error type with its exit-code taxonomy
//! - Run identifiers deriving the per-run directory and volume-group names
//! - Filesystem-type classification for the scan targets

pub mod error;
pub mod fstype;
pub mod id;

pub use error::{Error, Result};
pub use fstype::FsType;
pub use id::RunId;
