//! Target normalization and screenshot file naming

use serde::Serialize;
use std::fmt;

const DEFAULT_SCHEME: &str = "http://";
const FILLER: char = '_';

/// A normalized URL ready to enter the work queue.
///
/// Never empty: construction goes through [`Target::parse`], which drops
/// blank input.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Trim `raw` and default its scheme to `http://`. Returns `None` for
    /// blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.contains("://") {
            Some(Self(trimmed.to_string()))
        } else {
            Some(Self(format!("{DEFAULT_SCHEME}{trimmed}")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// File name of the PNG captured for this target.
    ///
    /// Derived only from the normalized URL, so each distinct target maps to
    /// one stable file.
    pub fn screenshot_filename(&self) -> String {
        let flattened = self
            .0
            .replace("://", &FILLER.to_string())
            .replace(['/', ':'], &FILLER.to_string());

        format!("{}.png", sanitize_filename(&flattened))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Target {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Normalize raw input lines, dropping blank ones.
pub fn parse_targets<I, S>(lines: I) -> Vec<Target>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| Target::parse(line.as_ref()))
        .collect()
}

pub fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => FILLER,
            c if c.is_control() || c.is_whitespace() => FILLER,
            c => c,
        })
        .collect()
}
