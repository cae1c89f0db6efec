// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use the_flowgate::admission::{Priority, WorkItem};
use the_flowgate::config::{load_and_validate_config, EngineBuilder};
use the_flowgate::engine::FlowEngine;
use the_flowgate::traits::{Downstream, DownstreamCall};
use the_flowgate::types::InstanceId;

const DEFAULT_CONFIG: &str = "configs/order-pipeline.yaml";
const DEFAULT_ORDERS: usize = 60;
const RUN_LIMIT: Duration = Duration::from_secs(20);

/// Which stage handles an order in each state, and the event it applies.
const ROUTES: [(&str, &str, &str); 3] = [
    ("CREATED", "intake", "CONFIRM"),
    ("PENDING", "payment", "PAY_OK"),
    ("PAID", "fulfillment", "SHIP"),
];

/// A stand-in dependency with fixed latency that fails every `fail_every`-th call.
struct SimulatedDownstream {
    name: String,
    latency: Duration,
    fail_every: usize,
    calls: AtomicUsize,
}

impl SimulatedDownstream {
    fn new(name: &str, latency: Duration, fail_every: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            latency,
            fail_every,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Downstream for SimulatedDownstream {
    async fn invoke(&self, call: &DownstreamCall) -> Result<(), String> {
        tokio::time::sleep(self.latency).await;
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !call.compensation && self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(format!("{} rejected {} for {}", self.name, call.event, call.instance));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: {} [config.yaml|config.toml] [order_count]", args[0]);
        eprintln!("Example: {} {} 100", args[0], DEFAULT_CONFIG);
        return Ok(());
    }
    let config_path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG);
    let orders = match args.get(2) {
        Some(count) => count
            .parse::<usize>()
            .with_context(|| format!("order count '{}' is not a number", count))?,
        None => DEFAULT_ORDERS,
    };

    println!("🚦 Flowgate Order Pipeline");
    println!("═══════════════════════════");
    println!("Config: {}", config_path);
    println!("Orders: {}", orders);
    println!();

    let config = load_and_validate_config(config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let has_order_workflow = config.workflows.iter().any(|w| w.name == "order");

    let engine = Arc::new(
        EngineBuilder::from_config(config)
            .downstream("payment-gateway", SimulatedDownstream::new("payment-gateway", Duration::from_millis(40), 7))
            .downstream("warehouse", SimulatedDownstream::new("warehouse", Duration::from_millis(10), 0))
            .build()?,
    );

    let shutdown = CancellationToken::new();
    let workers = engine.spawn_workers(shutdown.clone());
    let ticker = engine.spawn_ticker(shutdown.clone());

    if has_order_workflow {
        run_orders(&engine, orders).await?;
    } else {
        run_plain_items(&engine, orders).await;
    }

    shutdown.cancel();
    let mut processed = 0;
    for worker in workers {
        processed += worker.await?;
    }
    ticker.await?;

    println!("\n{}", "─".repeat(60));
    print_status(&engine);
    println!("\n🎉 Done: {} items processed", processed);
    Ok(())
}

/// Push every order through CONFIRM, PAY_OK and SHIP until each is terminal.
async fn run_orders(engine: &FlowEngine, orders: usize) -> Result<()> {
    let ids: Vec<InstanceId> = (0..orders)
        .map(|n| InstanceId::new(format!("order-{:04}", n)))
        .collect();
    for id in &ids {
        engine.start_workflow("order", id.clone())?;
    }

    let started = Instant::now();
    let mut routed: HashSet<(InstanceId, String)> = HashSet::new();
    let mut last_report = Instant::now();

    loop {
        let mut open = 0;
        let mut shipped = 0;
        let mut cancelled = 0;

        for (n, id) in ids.iter().enumerate() {
            let state = engine.get_state(id).await?;
            match state.as_str() {
                "SHIPPED" => shipped += 1,
                "CANCELLED" => cancelled += 1,
                _ => open += 1,
            }

            let Some((_, stage, event)) = ROUTES.iter().find(|(from, _, _)| *from == state.as_str()) else {
                continue;
            };
            if !routed.insert((id.clone(), state.to_string())) {
                continue;
            }

            let priority = match n % 3 {
                0 => Priority::High,
                1 => Priority::Medium,
                _ => Priority::Low,
            };
            let item = WorkItem::new(*stage, priority, id.as_str()).for_transition(id.clone(), *event);
            if engine.admit(item).is_err() {
                // Try again on the next pass.
                routed.remove(&(id.clone(), state.to_string()));
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            println!(
                "⏱  open={} shipped={} cancelled={} rate={:.1}",
                open,
                shipped,
                cancelled,
                engine.admission_rate()
            );
            last_report = Instant::now();
        }

        if open == 0 {
            println!("✅ All orders settled: {} shipped, {} cancelled", shipped, cancelled);
            for id in &ids {
                engine.forget_instance(id).await?;
            }
            println!("🧹 Released {} finished orders", ids.len());
            return Ok(());
        }
        if started.elapsed() > RUN_LIMIT {
            println!("⚠️  Stopping with {} orders still open", open);
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Without an order workflow, feed untracked items into the first stage.
async fn run_plain_items(engine: &FlowEngine, count: usize) {
    let Some(first) = engine.topology().stages().first().map(|s| s.id.clone()) else {
        return;
    };
    let mut rejected = 0;
    for n in 0..count {
        let item = WorkItem::new(first.clone(), Priority::Medium, format!("item-{}", n).as_str());
        if engine.admit_blocking(item, None).await.is_err() {
            rejected += 1;
        }
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("Submitted {} items to '{}', {} rejected", count, first, rejected);
}

fn print_status(engine: &FlowEngine) {
    match engine.current_constraint() {
        Some(current) => println!("🎯 Constraint: {} (score {:.3})", current.stage, current.score),
        None => println!("🎯 Constraint: none identified yet"),
    }
    println!("🪢 Admission rate: {:.1}/s", engine.admission_rate());

    println!("\n📥 Queues:");
    for status in engine.queue_statuses() {
        println!(
            "   {:<12} {:>3}/{:<3} (max {:>3})  high={} medium={} low={}",
            status.stage.as_str(),
            status.occupancy,
            status.effective_capacity,
            status.max_capacity,
            status.high,
            status.medium,
            status.low
        );
    }

    println!("\n🔌 Circuits:");
    for snapshot in engine.circuit_snapshots() {
        println!(
            "   {:<16} {:<9} calls={} failures={} ratio={:.2}",
            snapshot.dependency.as_str(),
            snapshot.state.as_str(),
            snapshot.calls,
            snapshot.failures,
            snapshot.failure_ratio
        );
    }
}
