// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-process supervision: spawn, lifecycle state machine, stdio capture,
//! restart policy.
//!
//! State machine (see `ProcessState`):
//! pending → starting → running → ready; exits route to stopped, crashed,
//! a scheduled restart (back to starting), or circuitOpen when the breaker
//! trips. `stop` escalates SIGTERM → SIGKILL after the grace period.
//!
//! Operations are serialized on a per-supervisor async lock. Exit handling
//! runs on the reaper task and touches only the synchronous state mutex,
//! so a `stop` waiting out its grace period never deadlocks with it.

mod stdio;

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clier_core::pipeline::{ProcessSpec, ProcessType, RestartMode};
use clier_core::{expand, expand_argv, expand_env, ClierEvent, Clock, PatternError, PatternSet,
    ProcessState};
use clier_wire::ProcessStatusEntry;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::breaker::CircuitBreaker;
use crate::event_bus::EventBus;
use crate::logs::LogStore;

/// Spawn-to-ready timeout: past this, a warning is logged and the process
/// stays `running`.
pub const SPAWN_READY_TIMEOUT: Duration = Duration::from_secs(60);

/// A process alive this long resets its restart attempt counter.
pub const SUCCESS_RESET: Duration = Duration::from_secs(30);

/// Exits (non-zero or signalled) within this window of spawn count as
/// circuit breaker failures; surviving it counts as breaker success.
pub const SERVICE_GRACE_PERIOD: Duration = Duration::from_millis(2_000);

/// Default SIGTERM grace before SIGKILL.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// Bound on waiting for the post-SIGKILL exit.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// The event context bound to an event-triggered operation. Carries the
/// variables exposed to templates (`event.*`, `match.*`) and to the child
/// environment (`EVENT_*`).
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    pub source: String,
    pub event_name: String,
    pub event_type: String,
    pub epoch_ms: u64,
    pub captures: HashMap<String, String>,
}

impl Trigger {
    pub fn from_event(event: &ClierEvent) -> Self {
        let mut captures = HashMap::new();
        if let Some(serde_json::Value::Object(map)) = &event.data {
            for (key, value) in map {
                if let serde_json::Value::String(s) = value {
                    captures.insert(key.clone(), s.clone());
                }
            }
        }
        Self {
            source: event.process_name.clone(),
            event_name: event.name.clone(),
            event_type: serde_json::to_value(event.event_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            epoch_ms: event.epoch_ms,
            captures,
        }
    }
}

/// Errors surfaced to callers of start/stop/restart/input.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("circuit open; retry in {retry_after_ms}ms")]
    CircuitOpen { retry_after_ms: u64 },

    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("process is not running")]
    NotRunning,

    #[error("input failed: {0}")]
    Input(String),
}

struct Proc {
    state: ProcessState,
    /// Incarnation counter, bumped on each spawn. Exit/output handlers
    /// from an older child carry a stale epoch and are ignored.
    epoch: u64,
    pid: Option<u32>,
    stdin: Option<ChildStdin>,
    exited: Option<watch::Receiver<bool>>,
    restart_attempts: u32,
    last_exit_code: Option<i32>,
    started_at: Option<Instant>,
    /// Pending back-off restart or breaker probe.
    timer: Option<JoinHandle<()>>,
    /// Trigger of the current incarnation, reused for scheduled restarts.
    trigger: Option<Trigger>,
}

pub(crate) struct Shared<C: Clock> {
    spec: ProcessSpec,
    project_name: String,
    clock: C,
    bus: EventBus,
    logs: Arc<LogStore>,
    breaker: Option<CircuitBreaker<C>>,
    ready_patterns: PatternSet,
    event_patterns: PatternSet,
    proc: Mutex<Proc>,
    op_lock: AsyncMutex<()>,
}

/// Supervisor for one declared process. Cheap to clone via `Arc` inside;
/// all clones drive the same child.
pub struct Supervisor<C: Clock> {
    shared: Arc<Shared<C>>,
}

impl<C: Clock> Clone for Supervisor<C> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<C: Clock> Supervisor<C> {
    pub fn new(
        spec: ProcessSpec,
        project_name: &str,
        clock: C,
        bus: EventBus,
        logs: Arc<LogStore>,
    ) -> Result<Self, PatternError> {
        let ready_patterns = PatternSet::compile(spec.ready_patterns.iter().map(String::as_str))?;
        let event_patterns =
            PatternSet::compile(spec.event_patterns.iter().map(|p| p.regex.as_str()))?;
        let breaker = spec
            .circuit_breaker
            .map(|config| CircuitBreaker::new(config, clock.clone()));
        logs.register(&spec.name);

        Ok(Self {
            shared: Arc::new(Shared {
                spec,
                project_name: project_name.to_string(),
                clock,
                bus,
                logs,
                breaker,
                ready_patterns,
                event_patterns,
                proc: Mutex::new(Proc {
                    state: ProcessState::Pending,
                    epoch: 0,
                    pid: None,
                    stdin: None,
                    exited: None,
                    restart_attempts: 0,
                    last_exit_code: None,
                    started_at: None,
                    timer: None,
                    trigger: None,
                }),
                op_lock: AsyncMutex::new(()),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.spec.name
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.shared.spec
    }

    pub fn state(&self) -> ProcessState {
        self.shared.proc.lock().state
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.shared.proc.lock().last_exit_code
    }

    /// Start the process. No-op when already starting/running/ready;
    /// rejected with a retry hint while the circuit is open.
    pub async fn start(&self, trigger: Option<Trigger>) -> Result<ProcessState, SupervisorError> {
        let _op = self.shared.op_lock.lock().await;
        self.shared.start_locked(trigger, false).await
    }

    /// Stop with SIGTERM, escalating to SIGKILL after the grace period.
    /// Exits during the window land in `stopped` and never restart.
    pub async fn stop(&self, grace: Option<Duration>) -> Result<ProcessState, SupervisorError> {
        let _op = self.shared.op_lock.lock().await;
        self.shared.stop_locked(grace).await
    }

    /// Stop then start.
    pub async fn restart(&self, trigger: Option<Trigger>) -> Result<ProcessState, SupervisorError> {
        {
            let _op = self.shared.op_lock.lock().await;
            self.shared.stop_locked(None).await?;
        }
        self.start(trigger).await
    }

    /// Write to the child's stdin. Only legal in `running` or `ready`.
    pub async fn send_input(
        &self,
        data: &str,
        append_newline: bool,
    ) -> Result<usize, SupervisorError> {
        let _op = self.shared.op_lock.lock().await;
        let mut stdin = {
            let mut proc = self.shared.proc.lock();
            if !matches!(proc.state, ProcessState::Running | ProcessState::Ready) {
                return Err(SupervisorError::NotRunning);
            }
            proc.stdin.take().ok_or(SupervisorError::NotRunning)?
        };

        let mut bytes = data.as_bytes().to_vec();
        if append_newline {
            bytes.push(b'\n');
        }
        let result = async {
            stdin.write_all(&bytes).await?;
            stdin.flush().await
        }
        .await;

        match result {
            Ok(()) => {
                self.shared.proc.lock().stdin = Some(stdin);
                Ok(bytes.len())
            }
            // Broken pipe: drop the handle, the reaper will observe the exit
            Err(e) => Err(SupervisorError::Input(e.to_string())),
        }
    }

    pub fn status(&self) -> ProcessStatusEntry {
        let proc = self.shared.proc.lock();
        let uptime_ms = if proc.state.is_active() {
            proc.started_at.map(|t| (self.shared.clock.now() - t).as_millis() as u64)
        } else {
            None
        };
        ProcessStatusEntry {
            name: self.shared.spec.name.clone(),
            state: proc.state,
            process_type: self.shared.spec.process_type,
            pid: proc.pid,
            restart_attempts: proc.restart_attempts,
            breaker_state: self.shared.breaker.as_ref().map(|b| b.state().as_str().to_string()),
            last_exit_code: proc.last_exit_code,
            uptime_ms,
        }
    }

    /// Terminal stop for daemon shutdown: cancels timers and stops the
    /// child without scheduling anything further.
    pub async fn shutdown(&self) {
        if let Err(e) = self.stop(None).await {
            warn!(process = %self.shared.spec.name, error = %e, "shutdown stop failed");
        }
    }
}

impl<C: Clock> Shared<C> {
    async fn start_locked(
        self: &Arc<Self>,
        trigger: Option<Trigger>,
        from_schedule: bool,
    ) -> Result<ProcessState, SupervisorError> {
        {
            let proc = self.proc.lock();
            if from_schedule {
                // A stop/start since scheduling supersedes this timer
                if proc.state != ProcessState::Starting {
                    return Ok(proc.state);
                }
            } else if proc.state.is_active() {
                return Ok(proc.state);
            }
        }

        if let Some(breaker) = &self.breaker {
            if let Err(rejected) = breaker.attempt_start() {
                let mut proc = self.proc.lock();
                proc.state = ProcessState::CircuitOpen;
                self.schedule_probe(&mut proc, rejected.retry_after_ms);
                return Err(SupervisorError::CircuitOpen {
                    retry_after_ms: rejected.retry_after_ms,
                });
            }
        }

        self.spawn_child(trigger).await
    }

    async fn spawn_child(
        self: &Arc<Self>,
        trigger: Option<Trigger>,
    ) -> Result<ProcessState, SupervisorError> {
        {
            let mut proc = self.proc.lock();
            proc.state = ProcessState::Starting;
            if let Some(timer) = proc.timer.take() {
                timer.abort();
            }
        }

        let vars = self.build_vars(trigger.as_ref());
        let argv = expand_argv(&self.spec.command, &vars);
        let program = argv.first().filter(|p| !p.is_empty()).cloned();
        let Some(program) = program else {
            return self.fail_spawn(trigger, "command expanded to empty argv".to_string());
        };

        let mut command = Command::new(&program);
        command
            .args(&argv[1..])
            .envs(expand_env(&self.spec.env, &vars))
            .envs(self.ambient_env(trigger.as_ref()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.spec.cwd {
            command.current_dir(expand(&cwd.to_string_lossy(), &vars));
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return self.fail_spawn(trigger, e.to_string()),
        };

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (exit_tx, exit_rx) = watch::channel(false);

        let epoch = {
            let mut proc = self.proc.lock();
            proc.epoch += 1;
            proc.state = ProcessState::Running;
            proc.pid = pid;
            proc.stdin = stdin;
            proc.exited = Some(exit_rx);
            proc.started_at = Some(self.clock.now());
            proc.trigger = trigger;
            proc.epoch
        };

        info!(process = %self.spec.name, pid, "process spawned");
        self.bus
            .publish(&ClierEvent::started(&self.spec.name, pid.unwrap_or(0), self.clock.epoch_ms()));

        stdio::spawn_io(Arc::clone(self), epoch, stdout, stderr);

        // Reaper: runs exit handling, then wakes any stop() waiters
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let status = child.wait().await;
            shared.handle_exit(epoch, status);
            let _ = exit_tx.send(true);
        });

        if self.ready_patterns.is_empty() {
            self.transition_ready(epoch);
        } else {
            let shared = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(SPAWN_READY_TIMEOUT).await;
                let proc = shared.proc.lock();
                if proc.epoch == epoch && proc.state == ProcessState::Running {
                    warn!(
                        process = %shared.spec.name,
                        timeout_secs = SPAWN_READY_TIMEOUT.as_secs(),
                        "no ready pattern matched within the spawn-to-ready timeout"
                    );
                }
            });
        }

        if self.breaker.is_some() {
            let shared = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(SERVICE_GRACE_PERIOD).await;
                let healthy = {
                    let proc = shared.proc.lock();
                    proc.epoch == epoch && proc.state.is_active()
                };
                if healthy {
                    if let Some(breaker) = &shared.breaker {
                        breaker.record_success();
                    }
                }
            });
        }

        Ok(self.proc.lock().state)
    }

    /// OS-level spawn failure: counts as an immediate failed exit for the
    /// breaker and the restart policy.
    fn fail_spawn(
        self: &Arc<Self>,
        trigger: Option<Trigger>,
        message: String,
    ) -> Result<ProcessState, SupervisorError> {
        warn!(process = %self.spec.name, error = %message, "spawn failed");
        {
            let mut proc = self.proc.lock();
            proc.trigger = trigger;
            proc.last_exit_code = None;
        }
        self.after_failure(true);
        Err(SupervisorError::Spawn(message))
    }

    async fn stop_locked(
        self: &Arc<Self>,
        grace: Option<Duration>,
    ) -> Result<ProcessState, SupervisorError> {
        let (pid, exited) = {
            let mut proc = self.proc.lock();
            if let Some(timer) = proc.timer.take() {
                timer.abort();
            }
            match proc.state {
                ProcessState::Pending
                | ProcessState::Stopped
                | ProcessState::Crashed
                | ProcessState::CircuitOpen => {
                    proc.state = ProcessState::Stopped;
                    return Ok(ProcessState::Stopped);
                }
                // A scheduled restart has state starting with no child yet
                ProcessState::Starting if proc.pid.is_none() => {
                    proc.state = ProcessState::Stopped;
                    return Ok(ProcessState::Stopped);
                }
                _ => {}
            }
            proc.state = ProcessState::Stopping;
            (proc.pid, proc.exited.clone())
        };

        if let Some(pid) = pid {
            send_signal(pid, Signal::SIGTERM);
        }

        let grace = grace.unwrap_or(DEFAULT_STOP_GRACE);
        if let Some(mut exited) = exited {
            let terminated =
                tokio::time::timeout(grace, exited.wait_for(|done| *done)).await.is_ok();
            if !terminated {
                if let Some(pid) = pid {
                    warn!(process = %self.spec.name, pid, "grace period expired, sending SIGKILL");
                    send_signal(pid, Signal::SIGKILL);
                }
                let _ = tokio::time::timeout(KILL_WAIT, exited.wait_for(|done| *done)).await;
            }
        }

        Ok(self.proc.lock().state)
    }

    /// Exit handling, on the reaper task. Synchronous: only the state
    /// mutex is taken, so `stop()` can wait for the exit while holding
    /// the op lock.
    fn handle_exit(self: &Arc<Self>, epoch: u64, status: std::io::Result<std::process::ExitStatus>) {
        let code = match &status {
            Ok(status) => status.code(),
            Err(_) => None,
        };

        {
            let proc = self.proc.lock();
            if proc.epoch != epoch {
                return;
            }
        }

        debug!(process = %self.spec.name, ?code, "process exited");
        self.bus.publish(&ClierEvent::exit(&self.spec.name, code, self.clock.epoch_ms()));

        let stopping = {
            let mut proc = self.proc.lock();
            proc.pid = None;
            proc.stdin = None;
            proc.last_exit_code = code;
            if proc.state == ProcessState::Stopping {
                proc.state = ProcessState::Stopped;
                true
            } else {
                false
            }
        };
        if stopping {
            return;
        }

        let clean = code == Some(0);
        if !clean {
            self.after_failure(false);
            return;
        }

        // Clean exit: tasks are done; services follow their restart mode
        let restart = self.spec.restart.mode == RestartMode::Always;
        if restart {
            self.schedule_restart_after_exit();
        } else {
            self.proc.lock().state = ProcessState::Stopped;
        }
    }

    /// Shared failure path for non-zero exits, signal deaths, and spawn
    /// errors. Feeds the breaker, then either schedules a restart, opens
    /// the circuit, or lands in `crashed`.
    fn after_failure(self: &Arc<Self>, spawn_error: bool) {
        let early = spawn_error || {
            let proc = self.proc.lock();
            proc.started_at
                .map(|t| self.clock.now() - t < SERVICE_GRACE_PERIOD)
                .unwrap_or(true)
        };
        if early {
            if let Some(breaker) = &self.breaker {
                breaker.record_failure();
            }
        }

        let restart = match self.spec.restart.mode {
            RestartMode::Never => false,
            RestartMode::OnFailure | RestartMode::Always => true,
        };
        if !restart {
            self.enter_crashed();
            return;
        }

        if let Some(breaker) = &self.breaker {
            if let Err(rejected) = breaker.attempt_start() {
                let code = {
                    let mut proc = self.proc.lock();
                    proc.state = ProcessState::CircuitOpen;
                    self.schedule_probe(&mut proc, rejected.retry_after_ms);
                    proc.last_exit_code
                };
                warn!(process = %self.spec.name, "circuit opened after repeated failures");
                self.bus.publish(&ClierEvent::crashed(
                    &self.spec.name,
                    code,
                    self.clock.epoch_ms(),
                ));
                return;
            }
        }

        self.schedule_restart_after_exit();
    }

    fn enter_crashed(self: &Arc<Self>) {
        let code = {
            let mut proc = self.proc.lock();
            proc.state = ProcessState::Crashed;
            proc.last_exit_code
        };
        self.bus.publish(&ClierEvent::crashed(&self.spec.name, code, self.clock.epoch_ms()));
    }

    fn schedule_restart_after_exit(self: &Arc<Self>) {
        let mut proc = self.proc.lock();

        // A stable run earns a fresh attempt budget
        let healthy_run = proc
            .started_at
            .map(|t| self.clock.now() - t >= SUCCESS_RESET)
            .unwrap_or(false);
        if healthy_run {
            proc.restart_attempts = 0;
        }

        if !self.spec.restart.allows_attempt(proc.restart_attempts) {
            drop(proc);
            self.enter_crashed();
            return;
        }
        proc.restart_attempts += 1;
        let delay = self.spec.restart.delay_for_attempt(proc.restart_attempts);
        proc.state = ProcessState::Starting;
        debug!(
            process = %self.spec.name,
            attempt = proc.restart_attempts,
            delay_ms = delay.as_millis() as u64,
            "restart scheduled"
        );

        let shared = Arc::clone(self);
        let epoch = proc.epoch;
        if let Some(timer) = proc.timer.take() {
            timer.abort();
        }
        proc.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shared.run_scheduled_start(epoch).await;
        }));
    }

    async fn run_scheduled_start(self: &Arc<Self>, expected_epoch: u64) {
        let _op = self.op_lock.lock().await;
        let trigger = {
            let proc = self.proc.lock();
            if proc.epoch != expected_epoch || proc.state != ProcessState::Starting {
                return;
            }
            proc.trigger.clone()
        };
        if let Err(e) = self.start_locked(trigger, true).await {
            debug!(process = %self.spec.name, error = %e, "scheduled restart attempt failed");
        }
    }

    /// While the circuit is open, one probe start is attempted
    /// automatically once the cooldown elapses.
    fn schedule_probe(self: &Arc<Self>, proc: &mut Proc, retry_after_ms: u64) {
        let shared = Arc::clone(self);
        let epoch = proc.epoch;
        if let Some(timer) = proc.timer.take() {
            timer.abort();
        }
        proc.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(retry_after_ms)).await;
            shared.run_probe(epoch).await;
        }));
    }

    async fn run_probe(self: &Arc<Self>, expected_epoch: u64) {
        let _op = self.op_lock.lock().await;
        let trigger = {
            let proc = self.proc.lock();
            if proc.epoch != expected_epoch || proc.state != ProcessState::CircuitOpen {
                return;
            }
            proc.trigger.clone()
        };
        let Some(breaker) = &self.breaker else { return };
        match breaker.attempt_start() {
            Ok(()) => {
                info!(process = %self.spec.name, "half-open probe start");
                if let Err(e) = self.spawn_child(trigger).await {
                    debug!(process = %self.spec.name, error = %e, "probe spawn failed");
                }
            }
            Err(rejected) => {
                let mut proc = self.proc.lock();
                if proc.state == ProcessState::CircuitOpen {
                    self.schedule_probe(&mut proc, rejected.retry_after_ms);
                }
            }
        }
    }

    fn transition_ready(&self, epoch: u64) {
        let transitioned = {
            let mut proc = self.proc.lock();
            if proc.epoch == epoch && proc.state == ProcessState::Running {
                proc.state = ProcessState::Ready;
                true
            } else {
                false
            }
        };
        if transitioned {
            info!(process = %self.spec.name, "process ready");
            self.bus.publish(&ClierEvent::ready(&self.spec.name, self.clock.epoch_ms()));
        }
    }

    /// Template variables available to command/env expansion.
    fn build_vars(&self, trigger: Option<&Trigger>) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("process.name".to_string(), self.spec.name.clone());
        vars.insert("process.type".to_string(), process_type_str(self.spec.process_type).to_string());
        vars.insert("project.name".to_string(), self.project_name.clone());
        vars.insert("current.timestamp".to_string(), self.clock.epoch_ms().to_string());
        if let Some(trigger) = trigger {
            vars.insert("event.source".to_string(), trigger.source.clone());
            vars.insert("event.name".to_string(), trigger.event_name.clone());
            vars.insert("event.type".to_string(), trigger.event_type.clone());
            vars.insert("event.timestamp".to_string(), trigger.epoch_ms.to_string());
            for (group, value) in &trigger.captures {
                vars.insert(format!("match.{group}"), value.clone());
            }
        }
        vars
    }

    /// Environment handed to every child; event-triggered starts also get
    /// the `EVENT_*` variables.
    fn ambient_env(&self, trigger: Option<&Trigger>) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("PROCESS_NAME".to_string(), self.spec.name.clone());
        env.insert(
            "PROCESS_TYPE".to_string(),
            process_type_str(self.spec.process_type).to_string(),
        );
        env.insert("PROJECT_NAME".to_string(), self.project_name.clone());
        env.insert("CURRENT_TIMESTAMP".to_string(), self.clock.epoch_ms().to_string());
        if let Some(trigger) = trigger {
            env.insert("EVENT_SOURCE".to_string(), trigger.source.clone());
            env.insert("EVENT_NAME".to_string(), trigger.event_name.clone());
            env.insert("EVENT_TYPE".to_string(), trigger.event_type.clone());
            env.insert("EVENT_TIMESTAMP".to_string(), trigger.epoch_ms.to_string());
        }
        env
    }
}

pub(crate) fn process_type_str(process_type: ProcessType) -> &'static str {
    match process_type {
        ProcessType::Service => "service",
        ProcessType::Task => "task",
    }
}

fn send_signal(pid: u32, signal: Signal) {
    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
        debug!(pid, ?signal, error = %e, "signal delivery failed");
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
