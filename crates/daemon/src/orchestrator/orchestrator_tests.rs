// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use clier_core::pipeline::{EventPattern, EventRule, RestartMode, RestartPolicy, WatchSpec};
use clier_core::{EventType, FileChangeKind};
use std::path::Path;
use std::time::Instant;

fn spec(name: &str, script: &str) -> ProcessSpec {
    ProcessSpec {
        name: name.to_string(),
        command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        cwd: None,
        env: HashMap::new(),
        process_type: ProcessType::Service,
        depends_on: Vec::new(),
        restart: RestartPolicy { mode: RestartMode::Never, ..Default::default() },
        ready_patterns: Vec::new(),
        event_patterns: Vec::new(),
        on_event: Vec::new(),
        circuit_breaker: None,
        continue_on_failure: false,
    }
}

fn task(name: &str, script: &str) -> ProcessSpec {
    let mut s = spec(name, script);
    s.process_type = ProcessType::Task;
    s
}

fn pipeline(processes: Vec<ProcessSpec>) -> PipelineConfig {
    PipelineConfig {
        project_name: "demo".to_string(),
        processes,
        watches: Vec::new(),
        log_capacity: 1000,
    }
}

fn orchestrator(
    config: PipelineConfig,
) -> (Arc<Orchestrator<SystemClock>>, EventBus, Arc<LogStore>) {
    let bus = EventBus::new();
    let logs = Arc::new(LogStore::new(1000));
    let orch =
        Orchestrator::new(config, SystemClock, bus.clone(), Arc::clone(&logs), false).unwrap();
    (orch, bus, logs)
}

async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn state_of(orch: &Orchestrator<SystemClock>, name: &str) -> ProcessState {
    orch.supervisor(name).unwrap().state()
}

#[tokio::test]
async fn dependent_service_waits_for_ready() {
    let mut a = spec("a", "sleep 0.3; echo listening on port 3000; sleep 30");
    a.ready_patterns = vec!["listening on port".to_string()];
    let mut b = spec("b", "sleep 30");
    b.depends_on = vec!["a".to_string()];

    let (orch, _bus, _logs) = orchestrator(pipeline(vec![a, b]));
    let _loop_task = orch.run();

    // While a boots, b must hold in pending
    wait_until("a active", || state_of(&orch, "a").is_active()).await;
    assert_eq!(state_of(&orch, "b"), ProcessState::Pending);

    wait_until("a ready", || state_of(&orch, "a") == ProcessState::Ready).await;
    wait_until("b active", || state_of(&orch, "b").is_active()).await;

    orch.shutdown().await;
}

#[tokio::test]
async fn task_chain_runs_in_order() {
    let a = task("first", "echo first done");
    let mut b = task("second", "echo second done");
    b.depends_on = vec!["first".to_string()];

    let (orch, _bus, logs) = orchestrator(pipeline(vec![a, b]));
    let _loop_task = orch.run();

    wait_until("both tasks done", || {
        state_of(&orch, "first") == ProcessState::Stopped
            && state_of(&orch, "second") == ProcessState::Stopped
    })
    .await;

    let first_done = logs.tail("first", None, 10).unwrap();
    assert!(first_done.iter().any(|e| e.line == "first done"));
    let second_done = logs.tail("second", None, 10).unwrap();
    assert!(second_done.iter().any(|e| e.line == "second done"));
}

#[tokio::test]
async fn failed_task_aborts_downstream_starts() {
    let a = task("build", "exit 1");
    let mut b = task("deploy", "echo deploying");
    b.depends_on = vec!["build".to_string()];

    let (orch, _bus, _logs) = orchestrator(pipeline(vec![a, b]));
    let _loop_task = orch.run();

    wait_until("build crashed", || state_of(&orch, "build") == ProcessState::Crashed).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state_of(&orch, "deploy"), ProcessState::Pending, "deploy must be skipped");
}

#[tokio::test]
async fn failed_task_with_continue_on_failure_unblocks_downstream() {
    let mut a = task("lint", "exit 1");
    a.continue_on_failure = true;
    let mut b = task("test", "echo testing");
    b.depends_on = vec!["lint".to_string()];

    let (orch, _bus, _logs) = orchestrator(pipeline(vec![a, b]));
    let _loop_task = orch.run();

    wait_until("test ran", || state_of(&orch, "test") == ProcessState::Stopped).await;
}

#[tokio::test]
async fn event_pattern_spawns_consumer_with_captured_payload() {
    let out_dir = tempfile::tempdir().unwrap();
    let out_file = out_dir.path().join("payloads.txt");

    let mut producer = spec(
        "producer",
        "echo 'Generated data: p1'; echo 'Generated data: p2'; echo 'Generated data: p3'; sleep 30",
    );
    producer.event_patterns = vec![EventPattern {
        regex: "Generated data: (?<payload>.*)".to_string(),
        emit_event: "data:generated".to_string(),
        capture_map: HashMap::new(),
    }];

    let mut consumer = task("consumer", "true");
    consumer.on_event = vec![EventRule {
        event: "data:generated".to_string(),
        action: EventAction::Spawn {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                format!("echo $PAYLOAD >> {}", out_file.display()),
            ],
            env: HashMap::from([("PAYLOAD".to_string(), "${match.payload}".to_string())]),
        },
    }];

    let (orch, _bus, _logs) = orchestrator(pipeline(vec![producer, consumer]));
    let _loop_task = orch.run();

    wait_until("three consumer spawns", || {
        std::fs::read_to_string(&out_file).map(|s| s.lines().count() == 3).unwrap_or(false)
    })
    .await;

    let mut lines: Vec<String> =
        std::fs::read_to_string(&out_file).unwrap().lines().map(str::to_string).collect();
    lines.sort();
    assert_eq!(lines, vec!["p1", "p2", "p3"]);

    orch.shutdown().await;
}

#[tokio::test]
async fn event_triggered_service_is_not_boot_started() {
    let mut worker = spec("worker", "sleep 30");
    worker.on_event =
        vec![EventRule { event: "kick:off".to_string(), action: EventAction::Start }];

    let (orch, bus, _logs) = orchestrator(pipeline(vec![worker]));
    let _loop_task = orch.run();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state_of(&orch, "worker"), ProcessState::Pending);

    bus.publish(&ClierEvent::custom("cli", "kick:off", serde_json::json!({}), 0));
    wait_until("worker started by event", || state_of(&orch, "worker").is_active()).await;

    orch.shutdown().await;
}

#[tokio::test]
async fn file_change_burst_restarts_target_once() {
    let mut config = pipeline(vec![spec("web", "sleep 30")]);
    config.watches = vec![WatchSpec {
        id: "src".to_string(),
        patterns: vec!["src/**".to_string()],
        debounce_ms: 50,
        targets: vec!["web".to_string()],
    }];

    let (orch, bus, _logs) = orchestrator(config);
    let mut started = bus.subscribe("web:started");
    let _loop_task = orch.run();

    wait_until("web up", || state_of(&orch, "web").is_active()).await;
    assert!(started.recv().await.is_some());

    for i in 0..5 {
        bus.publish(&ClierEvent::file_changed(
            "src",
            Path::new(&format!("src/file{i}.rs")),
            FileChangeKind::Modified,
            0,
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Exactly one restart: one new started event, then silence
    let second = tokio::time::timeout(Duration::from_secs(5), started.recv()).await;
    assert!(second.is_ok(), "expected a restart after the burst");
    let third = tokio::time::timeout(Duration::from_millis(500), started.recv()).await;
    assert!(third.is_err(), "burst must collapse into a single restart");

    orch.shutdown().await;
}

#[tokio::test]
async fn paused_pipeline_holds_everything_pending() {
    let bus = EventBus::new();
    let logs = Arc::new(LogStore::new(100));
    let orch = Orchestrator::new(
        pipeline(vec![spec("web", "sleep 30")]),
        SystemClock,
        bus,
        logs,
        true,
    )
    .unwrap();
    let _loop_task = orch.run();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state_of(&orch, "web"), ProcessState::Pending);

    // Manual start still works while paused
    orch.supervisor("web").unwrap().start(None).await.unwrap();
    assert!(state_of(&orch, "web").is_active());
    orch.shutdown().await;
}

#[test]
fn rule_matches_accepts_scoped_and_bare_names() {
    let event = ClierEvent {
        name: "producer:data:generated".to_string(),
        process_name: "producer".to_string(),
        event_type: EventType::Custom,
        data: None,
        epoch_ms: 0,
    };
    assert!(rule_matches("data:generated", &event));
    assert!(rule_matches("producer:data:generated", &event));
    assert!(rule_matches("data:*", &event));
    assert!(!rule_matches("other:event", &event));
}
