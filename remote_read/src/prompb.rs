//! Prometheus remote-read request messages.
//!
//! These mirror `prometheus/prompb/remote.proto` and `types.proto`, restricted to the request
//! side. Field tags must stay in sync with upstream.

/// A batch of queries sent by a Prometheus server to a remote-read endpoint.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadRequest {
    /// Queries answered independently by the backend.
    #[prost(message, repeated, tag = "1")]
    pub queries: Vec<Query>,
    /// Response types the client accepts, in order of preference.
    #[prost(enumeration = "read_request::ResponseType", repeated, tag = "2")]
    pub accepted_response_types: Vec<i32>,
}

/// Nested types of [`ReadRequest`].
pub mod read_request {
    /// Encoding of the answer a client is willing to read.
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum ResponseType {
        /// Snappy-compressed protobuf `ReadResponse`.
        Samples = 0,
        /// Stream of protobuf `ChunkedReadResponse` frames.
        StreamedXorChunks = 1,
    }
}

/// A single time-range query.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Query {
    /// Inclusive start of the range, in milliseconds.
    #[prost(int64, tag = "1")]
    pub start_timestamp_ms: i64,
    /// Inclusive end of the range, in milliseconds.
    #[prost(int64, tag = "2")]
    pub end_timestamp_ms: i64,
    /// Series selectors, all of which must match.
    #[prost(message, repeated, tag = "3")]
    pub matchers: Vec<LabelMatcher>,
    /// Engine hints, absent for older clients.
    #[prost(message, optional, tag = "4")]
    pub hints: Option<ReadHints>,
}

/// Series selector.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LabelMatcher {
    /// How `value` is compared.
    #[prost(enumeration = "label_matcher::Type", tag = "1")]
    pub r#type: i32,
    /// Label name.
    #[prost(string, tag = "2")]
    pub name: String,
    /// Literal or regular expression, depending on the type.
    #[prost(string, tag = "3")]
    pub value: String,
}

/// Nested types of [`LabelMatcher`].
pub mod label_matcher {
    /// Comparison operator of a [`LabelMatcher`](super::LabelMatcher).
    #[derive(
        Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
    )]
    #[repr(i32)]
    pub enum Type {
        /// Equal.
        Eq = 0,
        /// Not equal.
        Neq = 1,
        /// Regex match.
        Re = 2,
        /// Regex non-match.
        Nre = 3,
    }

    impl Type {
        /// PromQL operator for this matcher type.
        pub fn as_operator(&self) -> &'static str {
            match self {
                Self::Eq => "=",
                Self::Neq => "!=",
                Self::Re => "=~",
                Self::Nre => "!~",
            }
        }
    }
}

/// Execution hints the Prometheus engine attaches to a query.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReadHints {
    /// Query step size in milliseconds.
    #[prost(int64, tag = "1")]
    pub step_ms: i64,
    /// Function name wrapping the selector, if any.
    #[prost(string, tag = "2")]
    pub func: String,
    /// Start time in milliseconds, accounting for lookback and range selectors.
    #[prost(int64, tag = "3")]
    pub start_ms: i64,
    /// End time in milliseconds.
    #[prost(int64, tag = "4")]
    pub end_ms: i64,
    /// Labels used by the aggregation wrapping the selector.
    #[prost(string, repeated, tag = "5")]
    pub grouping: Vec<String>,
    /// Whether `grouping` lists kept labels (`by`) rather than dropped ones (`without`).
    #[prost(bool, tag = "6")]
    pub by: bool,
    /// Range of a range-vector selector in milliseconds.
    #[prost(int64, tag = "7")]
    pub range_ms: i64,
}
