// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output line pattern matching.
//!
//! Each process compiles its ready/event patterns once at supervisor
//! construction; every output line is then tested against the whole set.
//! Patterns apply to a single line; multi-line matching is not supported.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// A compiled, ordered set of line patterns.
#[derive(Debug)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

/// One pattern match against a line: the pattern's declaration index and
/// its capture groups. Named groups appear under their name; unnamed
/// groups under their 1-based position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch {
    pub pattern_id: usize,
    pub captures: HashMap<String, String>,
}

#[derive(Debug, Error)]
#[error("invalid pattern {pattern:?}: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

impl PatternSet {
    /// Compile patterns, preserving declaration order.
    pub fn compile<'a, I>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p).map_err(|source| PatternError { pattern: p.to_string(), source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Test a line against every pattern; matches come back in
    /// declaration order.
    pub fn match_line(&self, line: &str) -> Vec<PatternMatch> {
        self.patterns
            .iter()
            .enumerate()
            .filter_map(|(pattern_id, regex)| {
                let caps = regex.captures(line)?;
                let mut captures = HashMap::new();
                for (i, name) in regex.capture_names().enumerate() {
                    if i == 0 {
                        continue;
                    }
                    if let Some(m) = caps.get(i) {
                        let key =
                            name.map(str::to_string).unwrap_or_else(|| i.to_string());
                        captures.insert(key, m.as_str().to_string());
                    }
                }
                Some(PatternMatch { pattern_id, captures })
            })
            .collect()
    }

    /// True if any pattern matches the line.
    pub fn matches(&self, line: &str) -> bool {
        self.patterns.iter().any(|r| r.is_match(line))
    }
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
