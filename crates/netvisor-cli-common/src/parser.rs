//! Parsing of Netvisor CLI output.
//!
//! Conventions understood here:
//!
//! - `no-show-headers` queries print whitespace separated rows whose columns
//!   follow the requested `format` order
//! - a single-attribute query on one entity prints `<entity-key> <value>`;
//!   a row holding only the key means the attribute is unset
//! - info commands (`fabric-info`, `switch-setup-show`) print `key: value` lines
//! - `count-output` prints `Count: N`
//! - mutations print nothing in quiet mode, `Success`/`created` on effect,
//!   or a message containing `already` when nothing changed

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::transport::CliOutput;

static COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Count:\s*(\d+)").expect("Invalid regex pattern"));

/// Classified CLI output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Non-empty stdout split into whitespace separated tokens per line.
    Rows(Vec<Vec<String>>),
    /// Empty stdout or the literal `Success`.
    Empty,
    /// Non-empty stderr.
    Error(String),
}

impl Response {
    /// Rows of the response; empty for [`Response::Empty`] and [`Response::Error`].
    pub fn rows(&self) -> &[Vec<String>] {
        match self {
            Response::Rows(rows) => rows,
            _ => &[],
        }
    }

    /// True when the CLI reported an error (the entity is absent for may-fail queries).
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        match self {
            Response::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }
}

/// Effect of a mutation as reported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    AlreadyApplied,
}

/// Classifies raw transport output.
pub fn classify(output: &CliOutput) -> Response {
    if !output.stderr.is_empty() {
        return Response::Error(output.stderr.clone());
    }
    if output.exit_code != 0 {
        let message = if output.stdout.is_empty() {
            format!("exit code {}", output.exit_code)
        } else {
            output.stdout.clone()
        };
        return Response::Error(message);
    }
    classify_stdout(&output.stdout)
}

/// Classifies stdout of a successful invocation.
pub fn classify_stdout(stdout: &str) -> Response {
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "Success" {
        return Response::Empty;
    }
    let rows: Vec<Vec<String>> = trimmed
        .lines()
        .map(|line| line.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|tokens| !tokens.is_empty())
        .collect();
    Response::Rows(rows)
}

/// Value of a single-attribute query with the entity key stripped.
///
/// Returns `None` when there is no row or the row only holds the key.
pub fn attribute(rows: &[Vec<String>]) -> Option<String> {
    let row = rows.first()?;
    if row.len() < 2 {
        return None;
    }
    Some(row[1..].join(" "))
}

/// Last token of the first row, for keyless single-value queries.
pub fn value(rows: &[Vec<String>]) -> Option<String> {
    rows.first().and_then(|row| row.last()).cloned()
}

/// Values of column `index` across all rows that have it.
pub fn column(rows: &[Vec<String>], index: usize) -> Vec<String> {
    rows.iter().filter_map(|row| row.get(index).cloned()).collect()
}

/// Parses `key: value` lines.
pub fn key_values(rows: &[Vec<String>]) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for row in rows {
        let Some((first, rest)) = row.split_first() else {
            continue;
        };
        if let Some(key) = first.strip_suffix(':') {
            values.insert(key.to_string(), rest.join(" "));
        }
    }
    values
}

/// Extracts `N` from `Count: N`.
pub fn count(rows: &[Vec<String>]) -> Option<usize> {
    rows.iter().find_map(|row| {
        let line = row.join(" ");
        COUNT_RE
            .captures(&line)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// Interprets the output of a mutation; `None` when the output is unrecognised.
pub fn mutation_outcome(response: &Response) -> Option<MutationOutcome> {
    match response {
        Response::Empty => Some(MutationOutcome::Applied),
        Response::Error(_) => None,
        Response::Rows(rows) => {
            let text = rows
                .iter()
                .map(|row| row.join(" "))
                .collect::<Vec<_>>()
                .join("\n");
            let lower = text.to_lowercase();
            if lower.contains("already") {
                Some(MutationOutcome::AlreadyApplied)
            } else if lower.contains("success") || lower.contains("created") {
                Some(MutationOutcome::Applied)
            } else {
                None
            }
        }
    }
}
