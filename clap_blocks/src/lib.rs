//! Building blocks for [`clap`]-driven configs.
//!
//! They can easily be re-used using `#[clap(flatten)]`.
#![warn(missing_docs)]

pub mod cache;
pub mod logging;
pub mod proxy;
