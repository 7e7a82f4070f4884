//! End-to-end behavior of composed processes on the virtual clock.

use procflow_core::{
    process, Compose, FlowError, MultiProcessGroup, Node, Process, ProcessEvent, SimEnvironment,
    SimProcess, SimResource, SyncSpec, WorkflowConfig, WorkflowManager,
};
use procflow_env::SharedEnvironment;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn timed(env: &SharedEnvironment, name: &str, duration: f64) -> SimProcess {
    SimProcess::timed(name, duration).with_environment(env.clone())
}

// ============================================================================
// Chains
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_chain_of_three_finishes_at_sum_of_durations() {
    let env = SimEnvironment::shared();
    let line = timed(&env, "cut", 1.5)
        .then(timed(&env, "weld", 2.0))
        .then(timed(&env, "paint", 3.0));

    let out = line.execute(json!({"part": "frame"})).await.unwrap();

    assert_eq!(out, json!({"part": "frame"}));
    assert!(approx(env.now(), 6.5));
    assert_eq!(line.name(), "cut → weld → paint");
}

#[tokio::test(start_paused = true)]
async fn test_chain_threads_each_output_forward() {
    let env = SimEnvironment::shared();
    let stamp = |label: &'static str| {
        process(label, move |_ctx, mut input| {
            Box::pin(async move {
                if let Some(trail) = input["trail"].as_array_mut() {
                    trail.push(json!(label));
                }
                Ok(input)
            })
        })
        .with_environment(env.clone())
    };

    let line = stamp("a").then(stamp("b")).then(stamp("c"));
    let out = line.execute(json!({"trail": []})).await.unwrap();

    assert_eq!(out["trail"], json!(["a", "b", "c"]));
}

#[tokio::test(start_paused = true)]
async fn test_chain_stops_at_first_fault() {
    let env = SimEnvironment::shared();
    let reached = Arc::new(AtomicUsize::new(0));
    let counter = reached.clone();

    let jam = process("jam", |ctx, _| {
        Box::pin(async move {
            ctx.hold(1.0).await?;
            Err(FlowError::process_execution("jam", "conveyor jammed"))
        })
    })
    .with_environment(env.clone());
    let downstream = process("downstream", move |_ctx, input| {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(input) })
    })
    .with_environment(env.clone());

    let err = timed(&env, "load", 1.0)
        .then(jam)
        .then(downstream)
        .execute(json!(null))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Process 'jam' execution failed: conveyor jammed");
    assert_eq!(reached.load(Ordering::SeqCst), 0);
    assert!(approx(env.now(), 2.0));
}

// ============================================================================
// Groups
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_priority_group_runs_one_at_a_time_in_order() {
    let env = SimEnvironment::shared();
    let group = timed(&env, "weld(2)", 2.0)
        .parallel_with(timed(&env, "cut(1)", 1.0))
        .unwrap()
        .parallel_with(timed(&env, "paint(3)", 3.0))
        .unwrap();

    let results = group.execute(json!("frame")).await.unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["cut(1)", "weld(2)", "paint(3)"]);

    for pair in results.windows(2) {
        assert!(approx(pair[0].end_time, pair[1].start_time));
    }
    assert!(approx(env.now(), 6.0));
    assert!(results.iter().all(|r| r.payload == json!("frame")));
}

#[tokio::test(start_paused = true)]
async fn test_priority_group_reruns_identically() {
    let env = SimEnvironment::shared();
    let group = timed(&env, "b(2)", 1.0)
        .parallel_with(timed(&env, "c", 1.0))
        .unwrap()
        .parallel_with(timed(&env, "a(1)", 1.0))
        .unwrap();

    let first: Vec<String> = group
        .execute(json!(null))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    let second: Vec<String> = group
        .execute(json!(null))
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();

    assert_eq!(first, vec!["a(1)", "b(2)", "c"]);
    assert_eq!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_adding_priority_one_resorts_group() {
    let env = SimEnvironment::shared();
    let pair = timed(&env, "three(3)", 1.0)
        .parallel_with(timed(&env, "two(2)", 1.0))
        .unwrap();
    let trio = pair.parallel_with(timed(&env, "one(1)", 1.0)).unwrap();

    assert_eq!(trio.execution_order(), vec!["one(1)", "two(2)", "three(3)"]);
}

#[tokio::test(start_paused = true)]
async fn test_group_isolates_member_fault() {
    let env = SimEnvironment::shared();
    let broken = process("broken", |ctx, _| {
        Box::pin(async move {
            ctx.hold(0.5).await?;
            Err(FlowError::process_execution("broken", "spindle overheated"))
        })
    })
    .with_environment(env.clone());

    let group = timed(&env, "drill", 1.0)
        .parallel_with(broken)
        .unwrap()
        .parallel_with(timed(&env, "sand", 2.0))
        .unwrap();

    let results = group.execute(json!({"lot": 9})).await.unwrap();

    assert_eq!(results.len(), 3);
    let failures: Vec<_> = results.iter().filter(|r| !r.success).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].name, "broken");
    assert!(failures[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("spindle overheated"));
    assert!(approx(env.now(), 2.0));
}

#[tokio::test(start_paused = true)]
async fn test_shared_resource_serializes_concurrent_members() {
    let env = SimEnvironment::shared();
    let press = SimResource::new("press", 1);
    let pressed = |name: &str| timed(&env, name, 1.0).with_resource(press.clone());

    let group = pressed("left")
        .parallel_with(pressed("right"))
        .unwrap()
        .parallel_with(timed(&env, "inspect", 1.0))
        .unwrap();

    let results = group.execute(json!(null)).await.unwrap();
    assert!(results.iter().all(|r| r.success));
    assert!(approx(env.now(), 2.0));
    assert!(approx(results[2].end_time, 1.0));
}

#[tokio::test(start_paused = true)]
async fn test_group_nested_in_chain_and_chain_in_group() {
    let env = SimEnvironment::shared();
    let prep = timed(&env, "clean", 1.0).then(timed(&env, "prime", 1.0));
    let finishing = prep.parallel_with(timed(&env, "label", 0.5)).unwrap();

    let line = timed(&env, "cut", 1.0)
        .then(finishing)
        .then(timed(&env, "pack", 1.0));
    let out = line.execute(json!("part")).await.unwrap();

    let slots = out.as_array().unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0]["name"], "clean → prime");
    assert!(approx(env.now(), 4.0));
}

// ============================================================================
// Workflow manager
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_threshold_releases_while_survivors_keep_running() {
    let env = SimEnvironment::shared();
    let manager = WorkflowManager::new(env.clone());

    let events: Vec<ProcessEvent> = [1.0, 2.0, 3.0, 4.0]
        .into_iter()
        .enumerate()
        .map(|(i, d)| manager.start(timed(&env, &format!("job{i}"), d), json!(i)))
        .collect();

    let released = manager.wait_threshold(&events, 2, None).await.unwrap();
    assert_eq!(released.len(), 2);
    assert_eq!(released[0].name, "job0");
    assert_eq!(released[1].name, "job1");
    assert!(approx(env.now(), 2.0));
    assert!(!events[3].is_finished());

    let rest = manager.wait_all(&events, None).await.unwrap();
    assert_eq!(rest.len(), 4);
    assert!(rest.iter().all(|r| r.success));
    assert!(approx(env.now(), 4.0));
    assert_eq!(manager.statistics().successful_executions, 4);
}

#[tokio::test(start_paused = true)]
async fn test_any_with_timeout_expires_without_cancelling() {
    let env = SimEnvironment::shared();
    let manager = WorkflowManager::new(env.clone());

    let events = vec![
        manager.start(timed(&env, "slow", 5.0), json!(null)),
        manager.start(timed(&env, "slower", 8.0), json!(null)),
    ];

    let err = manager.wait_any(&events, Some(3.0)).await.unwrap_err();
    match err {
        FlowError::SyncTimeout {
            completed,
            required,
            ..
        } => {
            assert_eq!(completed, 0);
            assert_eq!(required, 1);
        }
        other => panic!("expected timeout, got {other}"),
    }
    assert!(approx(env.now(), 3.0));

    let first = manager.wait_any(&events, None).await.unwrap();
    assert_eq!(first[0].name, "slow");
    assert!(approx(env.now(), 5.0));
}

#[tokio::test(start_paused = true)]
async fn test_threshold_above_event_count_is_invalid() {
    let env = SimEnvironment::shared();
    let manager = WorkflowManager::new(env.clone());
    let events = vec![manager.start(timed(&env, "solo", 1.0), json!(null))];

    assert!(matches!(
        manager.wait_threshold(&events, 2, None).await,
        Err(FlowError::InvalidSync(_))
    ));
    assert!(manager.wait_threshold(&events, 0, None).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_worker_pool_bounds_concurrency() {
    let env = SimEnvironment::shared();
    let config = WorkflowConfig::default().with_max_workers(2);
    let manager = WorkflowManager::with_config(env.clone(), config).unwrap();

    let events: Vec<ProcessEvent> = (0..4)
        .map(|i| manager.start(timed(&env, &format!("unit{i}"), 1.0), json!(i)))
        .collect();

    let results = manager.wait_all(&events, None).await.unwrap();
    assert_eq!(results.len(), 4);
    assert!(approx(env.now(), 2.0));

    let late_starts = results.iter().filter(|r| approx(r.start_time, 1.0)).count();
    assert_eq!(late_starts, 2);
    assert_eq!(manager.available_workers(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_workflow_with_group_step() {
    let env = SimEnvironment::shared();
    let manager = WorkflowManager::new(env.clone());
    let finishing = manager
        .group(vec![
            timed(&env, "polish(2)", 1.0).into(),
            timed(&env, "coat(1)", 1.0).into(),
        ])
        .unwrap();

    let steps: Vec<Node> = vec![
        timed(&env, "cut", 1.0).into(),
        finishing.into(),
    ];
    let out = manager
        .run_workflow("finish_line", steps, json!({"id": 1}))
        .await
        .unwrap();

    let slots = out.as_array().unwrap();
    assert_eq!(slots[0]["name"], "coat(1)");
    assert_eq!(slots[1]["name"], "polish(2)");
    assert!(approx(env.now(), 3.0));

    let stats = manager.statistics();
    assert_eq!(stats.completed_workflows, 1);
    assert_eq!(stats.active_workflows, 0);
    assert_eq!(stats.execution_results, 2);
}

#[tokio::test(start_paused = true)]
async fn test_manager_group_uses_configured_policy() {
    let env = SimEnvironment::shared();
    let config = WorkflowConfig::from_yaml_str("priority_policy: contiguous").unwrap();
    let manager = WorkflowManager::with_config(env.clone(), config).unwrap();

    let err = manager
        .group(vec![
            timed(&env, "a(1)", 1.0).into(),
            timed(&env, "b", 1.0).into(),
        ])
        .unwrap_err();
    assert!(matches!(err, FlowError::PriorityValidation(_)));

    assert!(MultiProcessGroup::new(vec![
        Arc::new(timed(&env, "a(1)", 1.0)) as Arc<dyn Process>,
        Arc::new(timed(&env, "b", 1.0)),
    ])
    .is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_registered_sync_point_with_manager_events() {
    let env = SimEnvironment::shared();
    let manager = WorkflowManager::new(env.clone());
    let all = manager.register_sync_point(SyncSpec::all("station_done").with_timeout(10.0));

    let events = vec![
        manager.start(timed(&env, "x", 2.0), json!(null)),
        manager.start(timed(&env, "y", 3.0), json!(null)),
    ];
    let results = manager.sync_at(&all, &events).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(approx(env.now(), 3.0));
}

// ============================================================================
// Driver
// ============================================================================

#[test]
fn test_simulation_driver_runs_to_completion() {
    let finished = SimEnvironment::run(None, |env| async move {
        let line = SimProcess::timed("cut", 1.5)
            .with_environment(env.clone())
            .then(SimProcess::timed("weld", 2.0).with_environment(env.clone()));
        line.execute(json!(1)).await.map(|_| env.now())
    })
    .unwrap()
    .unwrap()
    .unwrap();

    assert!(approx(finished, 3.5));
}

#[test]
fn test_simulation_driver_stops_at_horizon() {
    let outcome = SimEnvironment::run(Some(1.0), |env| async move {
        SimProcess::timed("long", 5.0)
            .with_environment(env)
            .execute(json!(null))
            .await
    })
    .unwrap();

    assert!(outcome.is_none());
}
