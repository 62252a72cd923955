// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline configuration model.
//!
//! The config file surface (format, includes, defaulting) lives outside the
//! daemon; what arrives here is JSON for a full pipeline. `from_json` is the
//! validated entry point: after it returns, process names are unique, every
//! dependency and watch target resolves, the dependency graph is a DAG, and
//! every declared regex compiles.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a process is expected to keep running or to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    #[default]
    Service,
    Task,
}

/// When a finished process should be started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RestartMode {
    Never,
    #[default]
    OnFailure,
    Always,
}

/// Restart policy with exponential back-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestartPolicy {
    pub mode: RestartMode,
    /// Consecutive failed attempts before giving up. 0 means unlimited.
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub backoff_factor: f64,
    pub max_backoff_ms: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            mode: RestartMode::default(),
            max_attempts: 5,
            backoff_ms: 500,
            backoff_factor: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RestartPolicy {
    /// Delay before restart attempt `n` (1-based):
    /// `min(backoff_ms * backoff_factor^(n-1), max_backoff_ms)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let raw = self.backoff_ms as f64 * self.backoff_factor.powi(exponent as i32);
        let capped = raw.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Whether another attempt is allowed after `attempts` failures so far.
    pub fn allows_attempt(&self, attempts: u32) -> bool {
        self.max_attempts == 0 || attempts < self.max_attempts
    }
}

/// A regex over output lines that publishes a named event when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPattern {
    pub regex: String,
    pub emit_event: String,
    /// Renames capture groups in the published data (`group -> key`).
    /// Groups absent from the map keep their own name.
    #[serde(default)]
    pub capture_map: HashMap<String, String>,
}

/// Reaction to a named event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRule {
    pub event: String,
    pub action: EventAction,
}

/// What an event rule does to its process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventAction {
    Start,
    Stop,
    Restart,
    /// Launch a one-shot child (outside the supervised lifecycle).
    /// Command, args, and env overlay are templates expanded against the
    /// triggering event.
    Spawn {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
}

/// Circuit breaker tuning for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerConfig {
    pub threshold: u32,
    pub window_ms: u64,
    pub cooldown_ms: u64,
}

/// One supervised process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    pub name: String,
    /// Argv template; element 0 is the program.
    pub command: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub process_type: ProcessType,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub restart: RestartPolicy,
    #[serde(default)]
    pub ready_patterns: Vec<String>,
    #[serde(default)]
    pub event_patterns: Vec<EventPattern>,
    #[serde(default)]
    pub on_event: Vec<EventRule>,
    #[serde(default)]
    pub circuit_breaker: Option<BreakerConfig>,
    /// When false and this is a task, a non-zero exit aborts downstream starts.
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl ProcessSpec {
    /// A service that declares a start/restart event rule waits for its
    /// trigger instead of starting with the pipeline.
    pub fn event_triggered(&self) -> bool {
        self.process_type == ProcessType::Service
            && self
                .on_event
                .iter()
                .any(|r| matches!(r.action, EventAction::Start | EventAction::Restart))
    }
}

/// A set of path globs whose changes restart target processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchSpec {
    pub id: String,
    /// Globs relative to the project root (e.g. `src/**`).
    pub patterns: Vec<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Names of processes to restart on a change.
    pub targets: Vec<String>,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_log_capacity() -> usize {
    10_000
}

/// The validated pipeline for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default)]
    pub project_name: String,
    pub processes: Vec<ProcessSpec>,
    #[serde(default)]
    pub watches: Vec<WatchSpec>,
    /// Per-stream ring capacity for the in-memory log store.
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl PipelineConfig {
    /// Parse and validate a pipeline from JSON.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the rest of the daemon relies on.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let mut names = HashSet::new();
        for spec in &self.processes {
            if spec.name.is_empty() {
                return Err(PipelineError::EmptyName);
            }
            if !names.insert(spec.name.as_str()) {
                return Err(PipelineError::DuplicateName(spec.name.clone()));
            }
            if spec.command.is_empty() {
                return Err(PipelineError::EmptyCommand(spec.name.clone()));
            }
        }
        for spec in &self.processes {
            for dep in &spec.depends_on {
                if dep == &spec.name || !names.contains(dep.as_str()) {
                    return Err(PipelineError::UnknownDependency {
                        process: spec.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
            for pattern in &spec.ready_patterns {
                compile_check(&spec.name, pattern)?;
            }
            for ep in &spec.event_patterns {
                compile_check(&spec.name, &ep.regex)?;
            }
        }
        for watch in &self.watches {
            for target in &watch.targets {
                if !names.contains(target.as_str()) {
                    return Err(PipelineError::UnknownWatchTarget {
                        watch: watch.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        self.start_order()?;
        Ok(())
    }

    /// Topological order of processes (Kahn), stable in declaration order.
    pub fn start_order(&self) -> Result<Vec<String>, PipelineError> {
        let mut indegree: HashMap<&str, usize> =
            self.processes.iter().map(|p| (p.name.as_str(), p.depends_on.len())).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for spec in &self.processes {
            for dep in &spec.depends_on {
                dependents.entry(dep.as_str()).or_default().push(spec.name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = self
            .processes
            .iter()
            .filter(|p| p.depends_on.is_empty())
            .map(|p| p.name.as_str())
            .collect();
        let mut order = Vec::with_capacity(self.processes.len());

        while let Some(name) = queue.pop_front() {
            order.push(name.to_string());
            for dependent in dependents.get(name).map(Vec::as_slice).unwrap_or(&[]) {
                if let Some(degree) = indegree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.processes.len() {
            let stuck = self
                .processes
                .iter()
                .map(|p| p.name.clone())
                .find(|name| !order.contains(name))
                .unwrap_or_default();
            return Err(PipelineError::DependencyCycle(stuck));
        }
        Ok(order)
    }

    pub fn process(&self, name: &str) -> Option<&ProcessSpec> {
        self.processes.iter().find(|p| p.name == name)
    }
}

fn compile_check(process: &str, pattern: &str) -> Result<(), PipelineError> {
    regex::Regex::new(pattern).map(|_| ()).map_err(|source| PipelineError::InvalidRegex {
        process: process.to_string(),
        pattern: pattern.to_string(),
        source: Box::new(source),
    })
}

/// Pipeline validation errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("process name must not be empty")]
    EmptyName,

    #[error("duplicate process name: {0}")]
    DuplicateName(String),

    #[error("process {0} has an empty command")]
    EmptyCommand(String),

    #[error("process {process} depends on unknown process {dependency}")]
    UnknownDependency { process: String, dependency: String },

    #[error("dependency cycle involving process {0}")]
    DependencyCycle(String),

    #[error("watch {watch} targets unknown process {target}")]
    UnknownWatchTarget { watch: String, target: String },

    #[error("process {process} has invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        process: String,
        pattern: String,
        source: Box<regex::Error>,
    },
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
