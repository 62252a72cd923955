// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template variable expansion.
//!
//! Spawn requests are built from `${dotted.name}` templates in command
//! strings, argv elements, and environment values. Expansion happens once,
//! when the spawn request is constructed; the expanded values are frozen
//! for that process instance.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex pattern for `${name}` or `${namespace.name}` tokens.
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z0-9_-]+)*)\}")
        .expect("constant regex pattern is valid")
});

/// Expand `${dotted.name}` tokens with values from the vars map.
///
/// Unknown tokens expand to the empty string and are logged at debug level.
pub fn expand(template: &str, vars: &HashMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            match vars.get(name) {
                Some(value) => value.clone(),
                None => {
                    tracing::debug!(token = name, "unknown template variable");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Expand each element of an argv template.
pub fn expand_argv(argv: &[String], vars: &HashMap<String, String>) -> Vec<String> {
    argv.iter().map(|arg| expand(arg, vars)).collect()
}

/// Expand the values of an environment map. Keys are taken literally.
pub fn expand_env(
    env: &HashMap<String, String>,
    vars: &HashMap<String, String>,
) -> HashMap<String, String> {
    env.iter().map(|(k, v)| (k.clone(), expand(v, vars))).collect()
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
