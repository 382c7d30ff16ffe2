//! This crate exists to coordinate versions of `tracing` across the workspace, so that every
//! crate logs through the same subscriber without pinning the version in several places.

pub use tracing;
