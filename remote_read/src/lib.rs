//! Prometheus remote-read wire format.
//!
//! A remote-read body is a protobuf [`ReadRequest`] compressed with the snappy block format.
//! This crate owns the message definitions ([`prompb`]), the codec ([`decode_read_request`] /
//! [`encode_read_request`]) and small helpers to reason about query time ranges.

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

mod breakdown;
mod codec;
pub mod prompb;
mod query;

pub use breakdown::Breakdown;
pub use codec::{decode_read_request, encode_read_request, DecodeError, EncodeError};
pub use prompb::*;
pub use query::time_from_millis;
