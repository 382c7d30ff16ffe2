//! Snappy block + protobuf codec for [`ReadRequest`].
//!
//! Remote-read bodies use the snappy *block* format (no stream framing), exactly as produced by
//! Prometheus' `snappy.Encode`.

use bytes::Bytes;
use prost::Message;
use snafu::{ResultExt, Snafu};

use crate::ReadRequest;

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum DecodeError {
    #[snafu(display("can't decode body as snappy: {source}"))]
    Decompress { source: snap::Error },

    #[snafu(display("can't unmarshal snappy decompressed body as protobuf: {source}"))]
    Deserialize { source: prost::DecodeError },
}

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum EncodeError {
    #[snafu(display("can't compress body as snappy: {source}"))]
    Compress { source: snap::Error },
}

/// Decompress and deserialize a remote-read request body.
pub fn decode_read_request(body: &[u8]) -> Result<ReadRequest, DecodeError> {
    let decompressed = snap::raw::Decoder::new()
        .decompress_vec(body)
        .context(DecompressSnafu)?;

    ReadRequest::decode(decompressed.as_slice()).context(DeserializeSnafu)
}

/// Serialize and compress a remote-read request, producing a body suitable for
/// [`decode_read_request`].
pub fn encode_read_request(request: &ReadRequest) -> Result<Bytes, EncodeError> {
    let raw = request.encode_to_vec();
    let compressed = snap::raw::Encoder::new()
        .compress_vec(&raw)
        .context(CompressSnafu)?;
    Ok(Bytes::from(compressed))
}
