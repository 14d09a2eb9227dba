//! Per-call records handed back to callers alongside the answer.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};

use super::SolverMeta;

/// Upper bound on the length of an input summary, in characters.
pub const SUMMARY_LIMIT: usize = 400;

/// The outcome of one tool call.
///
/// Exactly one of `result` and `error` is set; the constructors are the only
/// way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    tool: String,
    solver: Option<&'static str>,
    algorithm: Option<&'static str>,
    guarantee: Option<&'static str>,
    complexity: Option<&'static str>,
    input_summary: String,
    result: Option<Value>,
    error: Option<String>,
    elapsed_s: f64,
    julia_threads: Option<usize>,
}

impl ToolResult {
    pub fn success(
        tool: impl Into<String>,
        meta: Option<SolverMeta>,
        input_summary: String,
        result: Value,
        elapsed: Duration,
        julia_threads: Option<usize>,
    ) -> Self {
        Self::build(tool.into(), meta, input_summary, Some(result), None, elapsed, julia_threads)
    }

    pub fn failure(
        tool: impl Into<String>,
        meta: Option<SolverMeta>,
        input_summary: String,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self::build(tool.into(), meta, input_summary, None, Some(error.into()), elapsed, None)
    }

    fn build(
        tool: String,
        meta: Option<SolverMeta>,
        input_summary: String,
        result: Option<Value>,
        error: Option<String>,
        elapsed: Duration,
        julia_threads: Option<usize>,
    ) -> Self {
        Self {
            tool,
            solver: meta.map(|m| m.display_name),
            algorithm: meta.map(|m| m.algorithm),
            guarantee: meta.map(|m| m.guarantee),
            complexity: meta.map(|m| m.complexity),
            input_summary,
            result,
            error,
            elapsed_s: (elapsed.as_secs_f64() * 10_000.0).round() / 10_000.0,
            julia_threads,
        }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Display name of the solver, when the tool is a known one.
    pub fn solver(&self) -> Option<&str> {
        self.solver
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm
    }

    pub fn guarantee(&self) -> Option<&str> {
        self.guarantee
    }

    pub fn complexity(&self) -> Option<&str> {
        self.complexity
    }

    pub fn input_summary(&self) -> &str {
        &self.input_summary
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    /// Wall time of the call in seconds, rounded to four decimals.
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }

    pub fn julia_threads(&self) -> Option<usize> {
        self.julia_threads
    }

    /// What the model sees as the tool's answer.
    pub fn message_content(&self) -> String {
        match (&self.result, &self.error) {
            (Some(result), _) => result.to_string(),
            (None, error) => json!({ "error": error.as_deref().unwrap_or_default() }).to_string(),
        }
    }
}

/// Compact, bounded description of a call's arguments for display.
///
/// Long lists collapse to `key=[n items]` and large objects to
/// `key={n entries}`. Arguments that are not a JSON object are shown as
/// given.
pub fn summarize_arguments(raw: &str) -> String {
    let summary = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(args)) => args
            .iter()
            .map(|(key, value)| match value {
                Value::Array(items) if items.len() > 6 => format!("{key}=[{} items]", items.len()),
                Value::Object(map) if map.len() > 4 => format!("{key}={{{} entries}}", map.len()),
                other => format!("{key}={other}"),
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => raw.trim().to_string(),
    };
    truncate(summary)
}

fn truncate(text: String) -> String {
    if text.chars().count() <= SUMMARY_LIMIT {
        return text;
    }
    let mut short: String = text.chars().take(SUMMARY_LIMIT - 3).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: SolverMeta = SolverMeta {
        display_name: "Bin Packing",
        algorithm: "First Fit Decreasing",
        guarantee: "(11/9) OPT + O(1) bins",
        complexity: "O(n log n)",
    };

    #[test]
    fn success_carries_result_only() {
        let record = ToolResult::success(
            "bin_packing",
            Some(META),
            "items=[5, 5]".into(),
            json!({"num_bins": 1}),
            Duration::from_micros(123_456),
            Some(4),
        );
        assert!(record.is_success());
        assert_eq!(record.error(), None);
        assert_eq!(record.solver(), Some("Bin Packing"));
        assert_eq!(record.elapsed_s(), 0.1235);
        assert_eq!(record.julia_threads(), Some(4));
        assert_eq!(record.message_content(), r#"{"num_bins":1}"#);
    }

    #[test]
    fn failure_carries_error_only() {
        let record = ToolResult::failure("foo", None, String::new(), "unknown tool: foo", Duration::ZERO);
        assert!(!record.is_success());
        assert_eq!(record.result(), None);
        assert_eq!(record.solver(), None);
        let content: Value = serde_json::from_str(&record.message_content()).unwrap();
        assert_eq!(content, json!({"error": "unknown tool: foo"}));
    }

    #[test]
    fn summary_collapses_large_collections() {
        let raw = json!({
            "bin_capacity": 10,
            "items": [1, 2, 3, 4, 5, 6, 7],
            "labels": {"a": 1, "b": 2, "c": 3, "d": 4, "e": 5},
            "small": [1, 2],
        })
        .to_string();
        assert_eq!(
            summarize_arguments(&raw),
            "bin_capacity=10, items=[7 items], labels={5 entries}, small=[1,2]"
        );
    }

    #[test]
    fn summary_is_bounded() {
        let long = format!("{{\"constraints\": [\"{}\"]}}", "x".repeat(1000));
        let summary = summarize_arguments(&long);
        assert_eq!(summary.chars().count(), SUMMARY_LIMIT);
        assert!(summary.ends_with("..."));
        assert_eq!(summarize_arguments("not json"), "not json");
    }
}
