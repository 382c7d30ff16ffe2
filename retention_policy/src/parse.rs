//! Decoding of the `/query` JSON answer to `SHOW RETENTION POLICIES`.
//!
//! The answer looks like:
//!
//! ```json
//! {"results": [{"statement_id": 0, "series": [{
//!     "columns": ["name", "duration", "shardGroupDuration", "replicaN", "default"],
//!     "values": [["autogen", "0s", "168h0m0s", 1, true]]
//! }]}]}
//! ```
//!
//! Parsing is all-or-nothing: any missing column or malformed cell fails the whole answer.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{PolicySet, RetentionPolicy};

const COL_NAME: &str = "name";
const COL_DURATION: &str = "duration";
const COL_SHARD_GROUP_DURATION: &str = "shardGroupDuration";
const COL_REPLICA_N: &str = "replicaN";
const COL_DEFAULT: &str = "default";

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum ParseError {
    #[snafu(display("can't decode query response as JSON: {source}"))]
    Json { source: serde_json::Error },

    #[snafu(display("query returned an error: {message}"))]
    Response { message: String },

    #[snafu(display("result #{result}: statement returned an error: {message}"))]
    Statement { result: usize, message: String },

    #[snafu(display("result #{result}: series #{series}: column '{column}' not found"))]
    MissingColumn {
        result: usize,
        series: usize,
        column: &'static str,
    },

    #[snafu(display(
        "result #{result}: series #{series}: rp #{row}: can't read '{value}' as {expected} for {column}"
    ))]
    InvalidCell {
        result: usize,
        series: usize,
        row: usize,
        column: &'static str,
        value: String,
        expected: &'static str,
    },

    #[snafu(display(
        "result #{result}: series #{series}: rp #{row}: can't parse '{value}' as duration for {column}: {source}"
    ))]
    InvalidDuration {
        result: usize,
        series: usize,
        row: usize,
        column: &'static str,
        value: String,
        source: humantime::DurationError,
    },
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Column positions of one series.
#[derive(Debug, Clone, Copy)]
struct Columns {
    name: usize,
    duration: usize,
    shard_group_duration: usize,
    replica_n: usize,
    default: usize,
}

impl Columns {
    fn locate(series: &Series, result: usize, series_idx: usize) -> Result<Self, ParseError> {
        let find = |column: &'static str| -> Result<usize, ParseError> {
            series
                .columns
                .iter()
                .position(|c| c == column)
                .context(MissingColumnSnafu {
                    result,
                    series: series_idx,
                    column,
                })
        };

        Ok(Self {
            name: find(COL_NAME)?,
            duration: find(COL_DURATION)?,
            shard_group_duration: find(COL_SHARD_GROUP_DURATION)?,
            replica_n: find(COL_REPLICA_N)?,
            default: find(COL_DEFAULT)?,
        })
    }
}

/// Position of a cell, for error reporting.
#[derive(Debug, Clone, Copy)]
struct Cell {
    result: usize,
    series: usize,
    row: usize,
}

impl Cell {
    fn get<'a>(&self, row: &'a [Value], idx: usize) -> &'a Value {
        row.get(idx).unwrap_or(&Value::Null)
    }

    fn invalid(&self, column: &'static str, value: &Value, expected: &'static str) -> ParseError {
        InvalidCellSnafu {
            result: self.result,
            series: self.series,
            row: self.row,
            column,
            value: value.to_string(),
            expected,
        }
        .build()
    }

    fn string<'a>(
        &self,
        row: &'a [Value],
        idx: usize,
        column: &'static str,
    ) -> Result<&'a str, ParseError> {
        let value = self.get(row, idx);
        value
            .as_str()
            .ok_or_else(|| self.invalid(column, value, "string"))
    }

    fn duration(
        &self,
        row: &[Value],
        idx: usize,
        column: &'static str,
    ) -> Result<Duration, ParseError> {
        let s = self.string(row, idx, column)?;
        humantime::parse_duration(s).context(InvalidDurationSnafu {
            result: self.result,
            series: self.series,
            row: self.row,
            column,
            value: s,
        })
    }

    fn integer(&self, row: &[Value], idx: usize, column: &'static str) -> Result<i64, ParseError> {
        let value = self.get(row, idx);
        value
            .as_i64()
            .ok_or_else(|| self.invalid(column, value, "integer"))
    }

    fn boolean(&self, row: &[Value], idx: usize, column: &'static str) -> Result<bool, ParseError> {
        let value = self.get(row, idx);
        value
            .as_bool()
            .ok_or_else(|| self.invalid(column, value, "boolean"))
    }
}

/// Parse the body of a `SHOW RETENTION POLICIES` query into a [`PolicySet`].
///
/// Policies of every result and series are merged; on duplicate names the last one wins.
pub fn parse_show_retention_policies(body: &[u8]) -> Result<PolicySet, ParseError> {
    let response: QueryResponse = serde_json::from_slice(body).context(JsonSnafu)?;
    if let Some(message) = response.error {
        return ResponseSnafu { message }.fail();
    }

    let mut policies = PolicySet::new();
    for (result_idx, result) in response.results.iter().enumerate() {
        if let Some(message) = &result.error {
            return StatementSnafu {
                result: result_idx,
                message,
            }
            .fail();
        }

        for (series_idx, series) in result.series.iter().enumerate() {
            let columns = Columns::locate(series, result_idx, series_idx)?;

            for (row_idx, row) in series.values.iter().enumerate() {
                let cell = Cell {
                    result: result_idx,
                    series: series_idx,
                    row: row_idx,
                };

                policies.insert(RetentionPolicy {
                    name: cell.string(row, columns.name, COL_NAME)?.to_string(),
                    duration: cell.duration(row, columns.duration, COL_DURATION)?,
                    shard_group_duration: cell.duration(
                        row,
                        columns.shard_group_duration,
                        COL_SHARD_GROUP_DURATION,
                    )?,
                    replica_n: cell.integer(row, columns.replica_n, COL_REPLICA_N)?,
                    default: cell.boolean(row, columns.default, COL_DEFAULT)?,
                });
            }
        }
    }

    Ok(policies)
}
