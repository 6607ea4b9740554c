//! Locating and classifying the probe result inside the engine's JSON report.
//!
//! The report is validated once, at the boundary, into [`PlaybookOutput`].
//! Extraction then requires exactly one `(play, task, host)` triple where
//! both the play and the task carry the probe title. Entries unrelated to the
//! probe may be incomplete: a missing name never matches, and a `failed` flag
//! that is not a boolean is read leniently.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use lantern_core::ResultKind;
use lantern_script::PLAYBOOK_TITLE;

use crate::sanitize::parse_output;

pub const PARSE_FAILURE: &str = "Unable to parse ansible output...";
pub const SHAPE_FAILURE: &str = "Unable to interpret ansible result...";

// ---------------------------------------------------------------------------
// Report model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybookOutput {
    pub plays: Vec<PlayOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayOutput {
    #[serde(default)]
    pub play: Named,
    #[serde(default)]
    pub tasks: Vec<TaskOutput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub task: Named,
    #[serde(default)]
    pub hosts: BTreeMap<String, HostOutcome>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Named {
    #[serde(default)]
    pub name: String,
}

/// Per-host result of one task.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostOutcome {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub failed: Option<bool>,
    #[serde(default)]
    pub msg: Value,
}

/// `true`/`false`, truthy strings such as `"yes"`, or numbers. Anything else
/// counts as absent.
fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let flag = match Value::deserialize(deserializer)? {
        Value::Bool(flag) => Some(flag),
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        Value::Number(number) => number.as_f64().map(|n| n != 0.0),
        _ => None,
    };
    Ok(flag)
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Why no unique probe result could be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractError {
    NoMatch,
    Ambiguous { matches: usize },
}

/// Select the single probe result for `host`.
pub fn extract<'a>(output: &'a PlaybookOutput, host: &str) -> Result<&'a HostOutcome, ExtractError> {
    let matches: Vec<&HostOutcome> = output
        .plays
        .iter()
        .filter(|play| play.play.name == PLAYBOOK_TITLE)
        .flat_map(|play| play.tasks.iter())
        .filter(|task| task.task.name == PLAYBOOK_TITLE)
        .filter_map(|task| task.hosts.get(host))
        .collect();

    match matches.as_slice() {
        [single] => Ok(*single),
        [] => Err(ExtractError::NoMatch),
        many => Err(ExtractError::Ambiguous {
            matches: many.len(),
        }),
    }
}

/// Final verdict on one run's stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interpretation {
    pub successful: bool,
    pub kind: ResultKind,
    pub result: String,
}

/// Classify a matched result. A string message is returned verbatim; anything
/// else is pretty-printed with `indent` spaces. An absent `failed` flag means
/// success.
pub fn classify(outcome: &HostOutcome, indent: usize) -> Interpretation {
    let (kind, result) = match &outcome.msg {
        Value::String(text) => (ResultKind::String, text.clone()),
        other => (ResultKind::Structure, to_pretty_json(other, indent)),
    };
    Interpretation {
        successful: !outcome.failed.unwrap_or(false),
        kind,
        result,
    }
}

/// Parse, validate, extract and classify in one step.
pub fn interpret(stdout: &str, host: &str, indent: usize) -> Interpretation {
    let unknown = |result: String| Interpretation {
        successful: false,
        kind: ResultKind::Unknown,
        result,
    };

    let value = match parse_output(stdout) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!(error = %err, "engine output is not JSON");
            return unknown(PARSE_FAILURE.to_string());
        }
    };
    let output: PlaybookOutput = match serde_json::from_value(value) {
        Ok(output) => output,
        Err(err) => {
            tracing::debug!(error = %err, "engine output is not a playbook report");
            return unknown(SHAPE_FAILURE.to_string());
        }
    };

    match extract(&output, host) {
        Ok(outcome) => classify(outcome, indent),
        Err(ExtractError::NoMatch) => unknown(format!(
            "{SHAPE_FAILURE} No result for host '{host}'."
        )),
        Err(ExtractError::Ambiguous { matches }) => unknown(format!(
            "{SHAPE_FAILURE} Expected one result for host '{host}', found {matches}."
        )),
    }
}

/// `serde_json` pretty printing with a configurable indent width.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T, indent: usize) -> String {
    let indent = " ".repeat(indent);
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if value.serialize(&mut serializer).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
