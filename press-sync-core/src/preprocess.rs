//! Text rewrites applied to a markdown body before rendering.
//!
//! A post opts in through its `preprocess` metadata key, a comma-separated list run
//! left to right.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, WpError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preprocessor {
    /// Keeps leading indentation visible by turning each leading space into `&nbsp;`.
    /// Fenced code blocks and blank lines are left alone.
    LeadingSpaces,
}

impl Preprocessor {
    pub fn name(&self) -> &'static str {
        match self {
            Preprocessor::LeadingSpaces => "leading_spaces",
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            Preprocessor::LeadingSpaces => preserve_leading_spaces(text),
        }
    }
}

impl FromStr for Preprocessor {
    type Err = WpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "leading_spaces" => Ok(Preprocessor::LeadingSpaces),
            other => Err(WpError::UnknownPreprocessor(other.to_string())),
        }
    }
}

impl fmt::Display for Preprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parses a directive such as `"leading_spaces"` into an ordered pipeline. Empty
/// entries are skipped; the first unknown name fails the whole directive.
pub fn parse_pipeline(directive: &str) -> Result<Vec<Preprocessor>> {
    directive
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(Preprocessor::from_str)
        .collect()
}

pub fn apply_pipeline(pipeline: &[Preprocessor], text: &str) -> String {
    pipeline.iter().fold(text.to_string(), |acc, step| {
        debug!(preprocessor = %step, "Applying preprocessor");
        step.apply(&acc)
    })
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}(```|~~~)").unwrap());
static LEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^( +)(\S)").unwrap());

fn preserve_leading_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut fence: Option<&str> = None;
    for line in text.split_inclusive('\n') {
        if let Some(m) = FENCE.captures(line).and_then(|c| c.get(1)) {
            match fence {
                None => fence = Some(m.as_str()),
                Some(open) if open == m.as_str() => fence = None,
                Some(_) => {}
            }
            out.push_str(line);
            continue;
        }
        if fence.is_some() {
            out.push_str(line);
            continue;
        }
        let replaced = LEADING.replace(line, |caps: &regex::Captures| {
            format!("{}{}", "&nbsp;".repeat(caps[1].len()), &caps[2])
        });
        out.push_str(&replaced);
    }
    out
}
