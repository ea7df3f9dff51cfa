//! Application startup and bootstrap logic.
//!
//! This module extracts initialization from `main.rs` so it can be tested
//! under `cargo test --lib`: logging setup, transport selection, the
//! per-node run sequence, and the local worker launcher.

use std::path::Path;
use std::process::{Child, Command};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{DroverError, Result};
use crate::io::{self, Loaded, RunMetrics, TestVerdict};
use crate::pointset::PointSet;
use crate::protocol::{IterationOrchestrator, NodeContext, Outcome};
use crate::transport::local::LocalGroup;
use crate::transport::net::NetGroup;
use crate::transport::Collective;

/// Resolve the configuration file path.
///
/// Priority:
/// 1. `DROVER_CONFIG` environment variable
/// 2. `./drover.toml` if it exists
/// 3. None (use defaults)
pub fn resolve_config_path() -> Option<String> {
    std::env::var("DROVER_CONFIG").ok().or_else(|| {
        let default = "drover.toml";
        Path::new(default).exists().then(|| default.to_string())
    })
}

/// Initialize tracing subscriber from logging config.
///
/// Supports JSON and plain text formats. Uses `RUST_LOG` env var if set,
/// otherwise falls back to `config.logging.level`.
pub fn init_logging(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

/// Run this process's node to completion, spawning local workers first
/// when spawn mode is on.
pub fn run(config: Config) -> Result<()> {
    config.validate()?;

    let workers = if config.group.spawn && config.group.nodes > 1 {
        spawn_workers(&config)?
    } else {
        Vec::new()
    };

    let result = run_this_node(&config);

    // The group is fail-stop: if this node failed mid-protocol its
    // children may be blocked in a collective, so don't wait on them.
    match &result {
        Ok(_) => reap_workers(workers)?,
        Err(e) => {
            error!(error = %e, "node failed, abandoning spawned workers");
            for mut child in workers {
                let _ = child.kill();
            }
        }
    }
    result
}

fn run_this_node(config: &Config) -> Result<()> {
    let nodes = config.group.nodes;
    let rank = config.group.rank;

    if nodes == 1 {
        let mut node = LocalGroup::new(1)
            .pop()
            .ok_or_else(|| DroverError::Transport("empty local group".into()))?;
        run_node(&mut node, config)
    } else if rank == 0 {
        let mut node = NetGroup::bind_root(&config.group.root_addr, nodes)?;
        run_node(&mut node, config)
    } else {
        let mut node = NetGroup::connect_worker(&config.group.root_addr, rank, nodes)?;
        run_node(&mut node, config)
    }
}

/// The full lifecycle of one node: load (root), establish the shared run
/// context, iterate to termination, and hand the result to the output
/// boundary (root).
pub fn run_node<C: Collective>(transport: &mut C, config: &Config) -> Result<()> {
    let loaded = if transport.is_root() {
        let input = config
            .io
            .input
            .as_ref()
            .ok_or_else(|| DroverError::Config("an input file is required".into()))?;
        match io::read_points(input, config.run.max_points) {
            Ok(loaded) => Some(loaded),
            Err(e) => {
                // Workers are already blocked on the run header; a silent
                // root exit would deadlock them.
                NodeContext::abort(transport, &e.to_string())?;
                return Err(e);
            }
        }
    } else {
        None
    };
    let headers = loaded
        .as_ref()
        .map(|l| l.headers.clone())
        .unwrap_or_default();

    let ctx = NodeContext::establish(
        transport,
        &config.run,
        loaded.map(|Loaded { points, .. }| points),
    )?;

    let orchestrator = IterationOrchestrator::new(transport, ctx, &config.run);
    let (outcome, ctx) = orchestrator.run()?;

    if let Some(global) = ctx.global.as_ref() {
        finalize_root(config, &outcome, global, &headers)?;
    }

    // Every node leaves together, mirroring the synchronized start.
    transport.barrier()?;
    Ok(())
}

/// Root-only epilogue: output file, expected-result comparison, metrics.
fn finalize_root(
    config: &Config,
    outcome: &Outcome,
    global: &PointSet,
    headers: &[String],
) -> Result<()> {
    info!(
        state = %outcome.state,
        iterations = outcome.iterations,
        points = outcome.total_points,
        "clustering finished"
    );

    if let Some(output) = config.io.output.as_ref() {
        info!(path = %output.display(), "writing output");
        io::write_points(output, global, headers)?;
    }

    let verdict = match config.io.expected.as_ref() {
        Some(expected) => {
            info!(path = %expected.display(), "comparing against expected results");
            let verdict = io::compare_with_expected(global, expected)?;
            if verdict == TestVerdict::Failed {
                warn!("result does not match the expected file");
            }
            verdict
        }
        None => TestVerdict::Untested,
    };

    let timings = outcome.timings.unwrap_or_default();
    let metrics = RunMetrics {
        label: config.run.label.clone(),
        used_iterations: outcome.iterations,
        total_seconds: timings.total_seconds,
        assignment_seconds: timings.assignment_seconds,
        centroids_seconds: timings.centroids_seconds,
        max_iteration_seconds: timings.max_iteration_seconds,
        num_points: outcome.total_points,
        num_clusters: config.run.num_clusters,
        max_iterations: config.run.max_iterations,
        num_nodes: config.group.nodes,
        test_verdict: verdict,
    };
    metrics.log_summary();

    if let Some(path) = config.io.metrics.as_ref() {
        info!(path = %path.display(), "appending metrics row");
        io::append_row(path, &metrics)?;
    }
    Ok(())
}

/// Command-line arguments for a spawned worker of the given rank. Workers
/// only participate in the protocol, so root-only I/O flags are not
/// passed down.
pub fn worker_args(config: &Config, rank: usize) -> Vec<String> {
    let mut args = vec![
        "--rank".to_string(),
        rank.to_string(),
        "--nodes".to_string(),
        config.group.nodes.to_string(),
        "--root-addr".to_string(),
        config.group.root_addr.clone(),
        "--clusters".to_string(),
        config.run.num_clusters.to_string(),
        "--iterations".to_string(),
        config.run.max_iterations.to_string(),
        "--max-points".to_string(),
        config.run.max_points.to_string(),
    ];
    // Workers still need the input flag to pass validation, even though
    // only root opens the file.
    if let Some(input) = config.io.input.as_ref() {
        args.push("--input".to_string());
        args.push(input.display().to_string());
    }
    if config.run.proper_distance {
        args.push("--proper-distance".to_string());
    }
    args
}

fn spawn_workers(config: &Config) -> Result<Vec<Child>> {
    let exe = std::env::current_exe()
        .map_err(|e| DroverError::Config(format!("cannot locate own binary: {e}")))?;

    let mut children = Vec::with_capacity(config.group.nodes - 1);
    for rank in 1..config.group.nodes {
        let child = Command::new(&exe)
            .args(worker_args(config, rank))
            .spawn()
            .map_err(|e| {
                DroverError::Transport(format!("failed to spawn worker {rank}: {e}"))
            })?;
        info!(rank, pid = child.id(), "spawned worker");
        children.push(child);
    }
    Ok(children)
}

fn reap_workers(workers: Vec<Child>) -> Result<()> {
    for (i, mut child) in workers.into_iter().enumerate() {
        let rank = i + 1;
        let status = child
            .wait()
            .map_err(|e| DroverError::Transport(format!("waiting on worker {rank}: {e}")))?;
        if !status.success() {
            return Err(DroverError::Transport(format!(
                "worker {rank} exited with {status}"
            )));
        }
        info!(rank, "worker finished");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_worker_args_shape() {
        let mut config = Config::default();
        config.group.nodes = 3;
        config.group.root_addr = "127.0.0.1:9999".into();
        config.run.num_clusters = 4;
        config.run.proper_distance = true;
        config.io.input = Some(PathBuf::from("points.csv"));
        config.io.output = Some(PathBuf::from("out.csv"));
        config.io.metrics = Some(PathBuf::from("metrics.csv"));

        let args = worker_args(&config, 2);
        let joined = args.join(" ");
        assert!(joined.contains("--rank 2"));
        assert!(joined.contains("--nodes 3"));
        assert!(joined.contains("--root-addr 127.0.0.1:9999"));
        assert!(joined.contains("--clusters 4"));
        assert!(joined.contains("--input points.csv"));
        assert!(joined.contains("--proper-distance"));
        assert!(
            !joined.contains("out.csv") && !joined.contains("metrics.csv"),
            "root-only outputs must not leak to workers"
        );
    }

    #[test]
    fn test_single_node_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("points.csv");
        std::fs::write(
            &input,
            "x,y\n0.0,0.0\n2.0,0.0\n4.0,0.0\n6.0,0.0\n8.0,0.0\n10.0,0.0\n",
        )
        .unwrap();
        let output = dir.path().join("out.csv");
        let metrics = dir.path().join("metrics.csv");

        let mut config = Config::default();
        config.run.num_clusters = 2;
        config.run.max_iterations = 10;
        config.io.input = Some(input);
        config.io.output = Some(output.clone());
        config.io.metrics = Some(metrics.clone());

        run(config).unwrap();

        let out = std::fs::read_to_string(&output).unwrap();
        assert!(out.starts_with("x,y,Cluster"));
        assert_eq!(out.lines().count(), 7);

        let metrics_content = std::fs::read_to_string(&metrics).unwrap();
        assert!(metrics_content.contains(",untested"));
    }
}
