use std::path::PathBuf;

use clap::Parser;

use drover::config::Config;
use drover::startup::{init_logging, resolve_config_path, run};

/// Distributed k-means clustering over collective message passing.
#[derive(Parser)]
#[command(name = "drover", version)]
struct Cli {
    /// Input CSV of points to cluster (required; read by root only)
    #[arg(short = 'f', long)]
    input: Option<PathBuf>,

    /// Write the clustered points to this CSV
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Compare the result against this expected-result CSV
    #[arg(short = 't', long)]
    expected: Option<PathBuf>,

    /// Append a metrics row to this CSV (created with headers if absent)
    #[arg(short = 'm', long)]
    metrics: Option<PathBuf>,

    /// Label recorded in the metrics row
    #[arg(short = 'l', long)]
    label: Option<String>,

    /// Number of clusters to create
    #[arg(short = 'k', long)]
    clusters: Option<usize>,

    /// Maximum number of iterations
    #[arg(short = 'i', long)]
    iterations: Option<u32>,

    /// Maximum number of points to read from the input file
    #[arg(short = 'n', long)]
    max_points: Option<usize>,

    /// Measure proper Euclidean distance (slower) instead of the squared
    /// distance; the clustering itself is identical
    #[arg(short = 'e', long)]
    proper_distance: bool,

    /// Number of nodes in the process group
    #[arg(long)]
    nodes: Option<usize>,

    /// This node's rank within the group (0 is root)
    #[arg(long)]
    rank: Option<usize>,

    /// Address the root node listens on for workers
    #[arg(long)]
    root_addr: Option<String>,

    /// Spawn ranks 1..nodes as child processes (rank 0 only)
    #[arg(long)]
    spawn: bool,

    /// Config file (TOML); defaults to DROVER_CONFIG or ./drover.toml
    #[arg(short = 'c', long)]
    config: Option<String>,
}

impl Cli {
    /// CLI flags override config-file and environment values.
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.input {
            config.io.input = Some(v);
        }
        if let Some(v) = self.output {
            config.io.output = Some(v);
        }
        if let Some(v) = self.expected {
            config.io.expected = Some(v);
        }
        if let Some(v) = self.metrics {
            config.io.metrics = Some(v);
        }
        if let Some(v) = self.label {
            config.run.label = v;
        }
        if let Some(v) = self.clusters {
            config.run.num_clusters = v;
        }
        if let Some(v) = self.iterations {
            config.run.max_iterations = v;
        }
        if let Some(v) = self.max_points {
            config.run.max_points = v;
        }
        if self.proper_distance {
            config.run.proper_distance = true;
        }
        if let Some(v) = self.nodes {
            config.group.nodes = v;
        }
        if let Some(v) = self.rank {
            config.group.rank = v;
        }
        if let Some(v) = self.root_addr {
            config.group.root_addr = v;
        }
        if self.spawn {
            config.group.spawn = true;
        }
    }
}

fn main() {
    // Load .env
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config_path = cli.config.clone().or_else(resolve_config_path);

    let mut config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("drover: {e}");
            std::process::exit(1);
        }
    };
    cli.apply(&mut config);

    init_logging(&config);

    if let Err(e) = run(config) {
        tracing::error!(error = %e, "run failed");
        std::process::exit(1);
    }
}
