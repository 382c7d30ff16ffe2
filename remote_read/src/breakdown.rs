//! Human readable rendering of a [`ReadRequest`] for debug logs.

use std::fmt;

use crate::{label_matcher, query::time_from_millis, ReadRequest};

/// Multi-line [`Display`](fmt::Display) of every query in a request.
#[derive(Debug, Clone, Copy)]
pub struct Breakdown<'a>(pub &'a ReadRequest);

impl fmt::Display for Breakdown<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, query) in self.0.queries.iter().enumerate() {
            writeln!(f, "Query #{}", index + 1)?;
            writeln!(
                f,
                "  StartTimestampMs: {} ({})",
                query.start_timestamp_ms,
                time_from_millis(query.start_timestamp_ms)
            )?;
            writeln!(
                f,
                "  EndTimestampMs:   {} ({})",
                query.end_timestamp_ms,
                time_from_millis(query.end_timestamp_ms)
            )?;
            writeln!(f, "  Matchers:")?;
            for matcher in &query.matchers {
                let op = label_matcher::Type::try_from(matcher.r#type)
                    .map(|t| t.as_operator())
                    .unwrap_or("?");
                writeln!(f, "    {}{}{:?}", matcher.name, op, matcher.value)?;
            }
            match &query.hints {
                Some(hints) => {
                    writeln!(f, "  Hints:")?;
                    writeln!(f, "    StepMs:  {}", hints.step_ms)?;
                    writeln!(f, "    Func:    {}", hints.func)?;
                    writeln!(
                        f,
                        "    StartMs: {} ({})",
                        hints.start_ms,
                        time_from_millis(hints.start_ms)
                    )?;
                    writeln!(
                        f,
                        "    EndMs:   {} ({})",
                        hints.end_ms,
                        time_from_millis(hints.end_ms)
                    )?;
                }
                None => writeln!(f, "  Hints:  none")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LabelMatcher, Query};

    #[test]
    fn test_breakdown() {
        let req = ReadRequest {
            queries: vec![Query {
                start_timestamp_ms: 0,
                end_timestamp_ms: 60_000,
                matchers: vec![LabelMatcher {
                    r#type: label_matcher::Type::Neq as i32,
                    name: "job".to_string(),
                    value: "node".to_string(),
                }],
                hints: None,
            }],
            accepted_response_types: vec![],
        };

        let got = Breakdown(&req).to_string();
        let want = "Query #1\n\
                    \x20 StartTimestampMs: 0 (1970-01-01T00:00:00.000Z)\n\
                    \x20 EndTimestampMs:   60000 (1970-01-01T00:01:00.000Z)\n\
                    \x20 Matchers:\n\
                    \x20   job!=\"node\"\n\
                    \x20 Hints:  none\n";
        assert_eq!(got, want);
    }
}
