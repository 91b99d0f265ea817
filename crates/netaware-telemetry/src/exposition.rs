//! Tokenizer for the line-oriented metrics exposition format served by node
//! exporters.
//!
//! The whole payload is tokenized in one pass into a map from metric name to
//! its samples before any field is read, so lookups do not depend on the order
//! in which the exporter prints its series.

use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// One `name{labels} value` line
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Label pairs, ordered by label name
    pub labels: BTreeMap<String, String>,
    /// Sample value
    pub value: f64,
}

impl Sample {
    /// Whether every `(name, value)` pair in `selector` is present on this sample
    pub fn matches(&self, selector: &[(&str, &str)]) -> bool {
        selector
            .iter()
            .all(|(key, value)| self.labels.get(*key).map(String::as_str) == Some(*value))
    }
}

/// A parsed exposition payload
#[derive(Debug, Clone, Default)]
pub struct Exposition {
    series: HashMap<String, Vec<Sample>>,
    skipped_lines: usize,
}

impl Exposition {
    /// Tokenize an exposition payload.
    ///
    /// Comment lines (`# HELP`, `# TYPE`, ...) and blank lines are ignored.
    /// Lines that cannot be tokenized are skipped and counted; parsing as a
    /// whole never fails.
    pub fn parse(text: &str) -> Self {
        let mut exposition = Self::default();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_line(line) {
                Ok((name, sample)) => exposition.series.entry(name).or_default().push(sample),
                Err(reason) => {
                    trace!(line = index + 1, %reason, "Skipping malformed exposition line");
                    exposition.skipped_lines += 1;
                }
            }
        }

        exposition
    }

    /// Value of the first sample of `name` whose labels include `selector`
    pub fn get(&self, name: &str, selector: &[(&str, &str)]) -> Option<f64> {
        self.samples(name)
            .iter()
            .find(|sample| sample.matches(selector))
            .map(|sample| sample.value)
    }

    /// Like [`Exposition::get`], for monotonic counters and gauges that must be
    /// non-negative integers. Values in scientific notation are accepted.
    pub fn get_count(&self, name: &str, selector: &[(&str, &str)]) -> Option<u64> {
        self.get(name, selector)
            .filter(|value| value.is_finite() && *value >= 0.0)
            .map(|value| value.round() as u64)
    }

    /// All samples recorded for `name`
    pub fn samples(&self, name: &str) -> &[Sample] {
        self.series.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct metric names
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Number of sample lines that could not be tokenized
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == ':'
}

/// Split a sample line into metric name, labels and value. A trailing
/// timestamp is ignored.
fn parse_line(line: &str) -> Result<(String, Sample), String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| "missing value".to_string())?;
    let name = &line[..name_end];
    if name.is_empty() || !name.chars().all(is_name_char) {
        return Err(format!("invalid metric name '{}'", name));
    }

    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if let Some(label_block) = rest.strip_prefix('{') {
        let (parsed, remainder) = parse_labels(label_block)?;
        labels = parsed;
        rest = remainder;
    }

    let value_token = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| format!("missing value for '{}'", name))?;
    let value = value_token
        .parse::<f64>()
        .map_err(|e| format!("invalid value '{}': {}", value_token, e))?;

    Ok((name.to_string(), Sample { labels, value }))
}

/// Parse the inside of a `{...}` label block. Returns the labels and whatever
/// follows the closing brace.
fn parse_labels(input: &str) -> Result<(BTreeMap<String, String>, &str), String> {
    let mut labels = BTreeMap::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest
            .find('=')
            .ok_or_else(|| "label without '='".to_string())?;
        let key = rest[..eq].trim();
        if key.is_empty() || !key.chars().all(is_name_char) {
            return Err(format!("invalid label name '{}'", key));
        }

        rest = rest[eq + 1..].trim_start();
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| format!("value of label '{}' is not quoted", key))?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let end = loop {
            match chars.next() {
                Some((i, '"')) => break i,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, c)) => value.push(c),
                    None => return Err(format!("unterminated escape in label '{}'", key)),
                },
                Some((_, c)) => value.push(c),
                None => return Err(format!("unterminated value for label '{}'", key)),
            }
        };

        labels.insert(key.to_string(), value);
        rest = rest[end + 1..].trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        }
    }
}
