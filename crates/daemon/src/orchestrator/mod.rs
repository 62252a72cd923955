// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The central coordinator.
//!
//! Owns one supervisor per declared process, wires pattern-emitted events
//! to `on_event` actions, gates starts on the dependency order, and routes
//! debounced file changes into service restarts. All reactions flow
//! through the shared event bus; supervisors never call back into the
//! orchestrator.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use clier_core::pipeline::{EventAction, PipelineConfig, ProcessSpec, ProcessType};
use clier_core::{
    expand, expand_argv, expand_env, ClierEvent, Clock, PatternError, PipelineError, ProcessState,
    StreamKind, SystemClock,
};
use clier_wire::ProcessStatusEntry;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::debounce::Debouncer;
use crate::event_bus::{name_matches, EventBus};
use crate::logs::LogStore;
use crate::supervisor::{process_type_str, Supervisor, Trigger};

/// Debounce window for watch-triggered restarts, keyed per process.
const RESTART_DEBOUNCE: Duration = Duration::from_millis(100);

/// Orchestrator with the production clock.
pub type DaemonOrchestrator = Orchestrator<SystemClock>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

struct Gate {
    /// Processes already handed to a start task (or skipped for good).
    launched: HashSet<String>,
    paused: bool,
}

pub struct Orchestrator<C: Clock> {
    config: PipelineConfig,
    clock: C,
    bus: EventBus,
    logs: Arc<LogStore>,
    supervisors: HashMap<String, Supervisor<C>>,
    start_order: Vec<String>,
    restart_debounce: Debouncer,
    gate: Mutex<Gate>,
}

impl<C: Clock> Orchestrator<C> {
    /// Build supervisors, breakers, and log rings for a validated pipeline.
    pub fn new(
        config: PipelineConfig,
        clock: C,
        bus: EventBus,
        logs: Arc<LogStore>,
        paused: bool,
    ) -> Result<Arc<Self>, OrchestratorError> {
        let start_order = config.start_order()?;
        let mut supervisors = HashMap::new();
        for spec in &config.processes {
            let supervisor = Supervisor::new(
                spec.clone(),
                &config.project_name,
                clock.clone(),
                bus.clone(),
                Arc::clone(&logs),
            )?;
            supervisors.insert(spec.name.clone(), supervisor);
        }

        Ok(Arc::new(Self {
            config,
            clock,
            bus,
            logs,
            supervisors,
            start_order,
            restart_debounce: Debouncer::new(RESTART_DEBOUNCE),
            gate: Mutex::new(Gate { launched: HashSet::new(), paused }),
        }))
    }

    /// Subscribe to the bus and begin coordinating. Also kicks off the
    /// initial dependency-ordered starts unless the pipeline is paused.
    pub fn run(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe("*");
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                this.handle_event(&event);
            }
        });
        self.evaluate_starts();
        handle
    }

    pub fn project_name(&self) -> &str {
        &self.config.project_name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn supervisor(&self, name: &str) -> Option<&Supervisor<C>> {
        self.supervisors.get(name)
    }

    /// Status entries in declaration order.
    pub fn statuses(&self) -> Vec<ProcessStatusEntry> {
        self.config
            .processes
            .iter()
            .filter_map(|spec| self.supervisors.get(&spec.name))
            .map(Supervisor::status)
            .collect()
    }

    /// Stop everything in reverse start order and cancel pending work.
    pub async fn shutdown(&self) {
        self.gate.lock().paused = true;
        self.restart_debounce.cancel_all();
        for name in self.start_order.iter().rev() {
            if let Some(supervisor) = self.supervisors.get(name) {
                supervisor.shutdown().await;
            }
        }
        info!("pipeline stopped");
    }

    fn handle_event(self: &Arc<Self>, event: &ClierEvent) {
        // Lifecycle transitions can unblock queued starts
        if event.name.ends_with(":ready")
            || event.name.ends_with(":exit")
            || event.name.ends_with(":crashed")
        {
            self.evaluate_starts();
        }

        if event.name == "file.changed" {
            self.handle_file_change(event);
        }

        for spec in &self.config.processes {
            for rule in &spec.on_event {
                if rule_matches(&rule.event, event) {
                    self.run_action(spec, &rule.action, event);
                }
            }
        }
    }

    /// Start every process whose dependency gate is satisfied: services
    /// wait for dependencies to be ready, tasks wait for task
    /// dependencies to finish successfully.
    fn evaluate_starts(self: &Arc<Self>) {
        let mut gate = self.gate.lock();
        if gate.paused {
            return;
        }
        for name in &self.start_order {
            if gate.launched.contains(name) {
                continue;
            }
            let Some(supervisor) = self.supervisors.get(name) else { continue };
            if supervisor.state() != ProcessState::Pending {
                // Already driven manually or by an event rule
                gate.launched.insert(name.clone());
                continue;
            }
            let spec = supervisor.spec();
            if spec.event_triggered() {
                continue;
            }

            match self.dependency_gate(spec) {
                DepGate::Ready => {
                    gate.launched.insert(name.clone());
                    let supervisor = supervisor.clone();
                    let name = name.clone();
                    tokio::spawn(async move {
                        if let Err(e) = supervisor.start(None).await {
                            warn!(process = %name, error = %e, "pipeline start failed");
                        }
                    });
                }
                DepGate::Waiting => {}
                DepGate::Aborted(dep) => {
                    warn!(process = %name, failed_dependency = %dep, "skipping start: upstream task failed");
                    gate.launched.insert(name.clone());
                }
            }
        }
    }

    fn dependency_gate(&self, spec: &ProcessSpec) -> DepGate {
        for dep in &spec.depends_on {
            let Some(dep_sup) = self.supervisors.get(dep) else { continue };
            let dep_spec = dep_sup.spec();
            let state = dep_sup.state();
            match dep_spec.process_type {
                ProcessType::Service => {
                    if state != ProcessState::Ready {
                        return DepGate::Waiting;
                    }
                }
                ProcessType::Task => match state {
                    ProcessState::Stopped if dep_sup.last_exit_code() == Some(0) => {}
                    ProcessState::Stopped | ProcessState::Crashed | ProcessState::CircuitOpen => {
                        if !dep_spec.continue_on_failure {
                            return DepGate::Aborted(dep.clone());
                        }
                    }
                    _ => return DepGate::Waiting,
                },
            }
        }
        DepGate::Ready
    }

    /// `file.changed` → debounced restart per target process.
    fn handle_file_change(self: &Arc<Self>, event: &ClierEvent) {
        let Some(watch) = self.config.watches.iter().find(|w| w.id == event.process_name) else {
            return;
        };
        for target in &watch.targets {
            let Some(supervisor) = self.supervisors.get(target) else { continue };
            let supervisor = supervisor.clone();
            let trigger = Trigger::from_event(event);
            let target_name = target.clone();
            let key = format!("restart:{target}");
            self.restart_debounce.debounce(&key, move || {
                debug!(process = %target_name, "file change restart");
                tokio::spawn(async move {
                    if let Err(e) = supervisor.restart(Some(trigger)).await {
                        warn!(process = %target_name, error = %e, "watch restart failed");
                    }
                });
            });
        }
    }

    fn run_action(self: &Arc<Self>, spec: &ProcessSpec, action: &EventAction, event: &ClierEvent) {
        let trigger = Trigger::from_event(event);
        let Some(supervisor) = self.supervisors.get(&spec.name) else { return };
        let supervisor = supervisor.clone();
        let name = spec.name.clone();

        match action {
            EventAction::Start => {
                tokio::spawn(async move {
                    if let Err(e) = supervisor.start(Some(trigger)).await {
                        warn!(process = %name, error = %e, "event-triggered start failed");
                    }
                });
            }
            EventAction::Stop => {
                tokio::spawn(async move {
                    if let Err(e) = supervisor.stop(None).await {
                        warn!(process = %name, error = %e, "event-triggered stop failed");
                    }
                });
            }
            EventAction::Restart => {
                tokio::spawn(async move {
                    if let Err(e) = supervisor.restart(Some(trigger)).await {
                        warn!(process = %name, error = %e, "event-triggered restart failed");
                    }
                });
            }
            EventAction::Spawn { command, args, env } => {
                self.spawn_one_shot(spec, command, args, env, &trigger);
            }
        }
    }

    /// Launch a one-shot child outside the supervised lifecycle. Output is
    /// captured into the declaring process's log rings.
    fn spawn_one_shot(
        self: &Arc<Self>,
        spec: &ProcessSpec,
        command: &str,
        args: &[String],
        env_overlay: &HashMap<String, String>,
        trigger: &Trigger,
    ) {
        let mut vars = HashMap::new();
        vars.insert("process.name".to_string(), spec.name.clone());
        vars.insert("process.type".to_string(), process_type_str(spec.process_type).to_string());
        vars.insert("project.name".to_string(), self.config.project_name.clone());
        vars.insert("current.timestamp".to_string(), self.clock.epoch_ms().to_string());
        vars.insert("event.source".to_string(), trigger.source.clone());
        vars.insert("event.name".to_string(), trigger.event_name.clone());
        vars.insert("event.type".to_string(), trigger.event_type.clone());
        vars.insert("event.timestamp".to_string(), trigger.epoch_ms.to_string());
        for (group, value) in &trigger.captures {
            vars.insert(format!("match.{group}"), value.clone());
        }

        let program = expand(command, &vars);
        if program.is_empty() {
            warn!(process = %spec.name, "spawn action expanded to empty command");
            return;
        }
        let args = expand_argv(args, &vars);
        let mut env = expand_env(env_overlay, &vars);
        env.insert("EVENT_SOURCE".to_string(), trigger.source.clone());
        env.insert("EVENT_NAME".to_string(), trigger.event_name.clone());
        env.insert("EVENT_TYPE".to_string(), trigger.event_type.clone());
        env.insert("EVENT_TIMESTAMP".to_string(), trigger.epoch_ms.to_string());
        env.insert("PROCESS_NAME".to_string(), spec.name.clone());
        env.insert("PROCESS_TYPE".to_string(), process_type_str(spec.process_type).to_string());
        env.insert("PROJECT_NAME".to_string(), self.config.project_name.clone());
        env.insert("CURRENT_TIMESTAMP".to_string(), self.clock.epoch_ms().to_string());

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let logs = Arc::clone(&self.logs);
        let clock = self.clock.clone();
        let process_name = spec.name.clone();
        tokio::spawn(async move {
            let child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!(process = %process_name, command = %program, error = %e, "spawn action failed");
                    return;
                }
            };
            match child.wait_with_output().await {
                Ok(output) => {
                    for line in String::from_utf8_lossy(&output.stdout).lines() {
                        logs.append(&process_name, StreamKind::Stdout, line, clock.epoch_ms());
                    }
                    for line in String::from_utf8_lossy(&output.stderr).lines() {
                        logs.append(&process_name, StreamKind::Stderr, line, clock.epoch_ms());
                    }
                    debug!(process = %process_name, status = %output.status, "spawn action finished");
                }
                Err(e) => {
                    warn!(process = %process_name, error = %e, "spawn action wait failed");
                }
            }
        });
    }
}

enum DepGate {
    Ready,
    Waiting,
    Aborted(String),
}

/// An `on_event` rule matches the full published name or the name with
/// its `<source>:` prefix stripped (patterns emit `<process>:<event>`).
fn rule_matches(rule_event: &str, event: &ClierEvent) -> bool {
    if name_matches(rule_event, &event.name) {
        return true;
    }
    let prefix = format!("{}:", event.process_name);
    event
        .name
        .strip_prefix(&prefix)
        .map(|suffix| name_matches(rule_event, suffix))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
