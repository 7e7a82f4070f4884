//! Assembly line demo
//!
//! Builds a small production line out of composed processes and runs it on the
//! virtual clock:
//!
//! ```text
//!  cut ──► weld ──► [ drill(2) & deburr(1) & inspect(3) ] ──► paint
//! ```
//!
//! Three frames then go through the line in parallel under a worker pool of two,
//! and a THRESHOLD barrier reports when the first two are done.
//!
//! Run with:
//! ```bash
//! RUST_LOG=procflow_core=info cargo run -p procflow-core --example assembly_line
//! ```

use anyhow::Result;
use procflow_core::{
    process, Compose, Node, ProcessEvent, SharedEnvironment, SimEnvironment, SimProcess,
    SimResource, WorkflowConfig, WorkflowManager,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn station(env: &SharedEnvironment, name: &str, duration: f64) -> SimProcess {
    SimProcess::timed(name, duration).with_environment(env.clone())
}

async fn simulate(env: SharedEnvironment) -> Result<()> {
    let booth = SimResource::new("paint_booth", 1);

    // Receives the finishing group's result list.
    let paint = process("paint", |ctx, stations| {
        Box::pin(async move {
            ctx.hold(3.0).await?;
            Ok(json!({ "stations": stations, "painted_at": ctx.now() }))
        })
    })
    .with_environment(env.clone())
    .with_resource(booth)
    .with_condition(|stations| stations.is_array());

    let finishing = station(&env, "drill(2)", 1.0)
        .parallel_with(station(&env, "deburr(1)", 0.5))?
        .parallel_with(station(&env, "inspect(3)", 0.5))?;
    println!("Finishing order: {:?}", finishing.execution_order());

    let line = station(&env, "cut", 1.5)
        .then(station(&env, "weld", 2.0))
        .then(finishing)
        .then(paint);

    let config = WorkflowConfig::default().with_max_workers(2);
    let manager = WorkflowManager::with_config(env.clone(), config)?;
    manager.register(line.clone());

    // One frame end to end as a named workflow.
    let out = manager
        .run_workflow("first_frame", vec![Node::from(line.clone())], json!({"frame": 0}))
        .await?;
    println!("First frame done at t={:.1}: {}", env.now(), out);

    // Three more frames competing for two workers.
    let events: Vec<ProcessEvent> = (1..=3)
        .map(|i| manager.start(line.clone(), json!({"frame": i})))
        .collect();

    let early = manager.wait_threshold(&events, 2, None).await?;
    println!(
        "Two frames finished by t={:.1}: {:?}",
        env.now(),
        early.iter().map(|r| r.end_time).collect::<Vec<_>>()
    );

    manager.wait_all(&events, None).await?;
    println!("All frames finished by t={:.1}", env.now());

    let stats = manager.statistics();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("procflow_core=info")),
        )
        .init();

    println!("=== Assembly line ===\n");

    match SimEnvironment::run(Some(200.0), simulate)? {
        Some(outcome) => outcome?,
        None => println!("Simulation horizon reached before the line drained"),
    }

    Ok(())
}
