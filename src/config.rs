use crate::error::{DroverError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub group: GroupConfig,
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Clustering parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_num_clusters")]
    pub num_clusters: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_points")]
    pub max_points: usize,
    /// True selects the proper Euclidean distance (with square root);
    /// false the faster squared distance. The assignment arg-min is the
    /// same either way.
    #[serde(default)]
    pub proper_distance: bool,
    /// Label recorded in the metrics row for this run.
    #[serde(default = "default_label")]
    pub label: String,
}

/// Process-group topology, fixed for the run's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default = "default_nodes")]
    pub nodes: usize,
    #[serde(default)]
    pub rank: usize,
    #[serde(default = "default_root_addr")]
    pub root_addr: String,
    /// When set on rank 0, spawn ranks 1..nodes as child processes of
    /// this binary instead of expecting an external launcher.
    #[serde(default)]
    pub spawn: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IoConfig {
    /// Input CSV of points. Required; loaded by root only.
    #[serde(default)]
    pub input: Option<PathBuf>,
    /// Output CSV for the converged assignment. Optional.
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Expected-result CSV to compare against. Optional.
    #[serde(default)]
    pub expected: Option<PathBuf>,
    /// Metrics CSV to append one row per run to. Optional.
    #[serde(default)]
    pub metrics: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_num_clusters() -> usize {
    15
}
fn default_max_iterations() -> u32 {
    10_000
}
fn default_max_points() -> usize {
    5_000
}
fn default_label() -> String {
    "no-label".to_string()
}
fn default_nodes() -> usize {
    1
}
fn default_root_addr() -> String {
    std::env::var("DROVER_ROOT_ADDR").unwrap_or_else(|_| "127.0.0.1:7400".to_string())
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    std::env::var("DROVER_LOG_FORMAT").unwrap_or_else(|_| "plain".to_string())
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            num_clusters: default_num_clusters(),
            max_iterations: default_max_iterations(),
            max_points: default_max_points(),
            proper_distance: false,
            label: default_label(),
        }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            rank: 0,
            root_addr: default_root_addr(),
            spawn: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    /// After loading, env var overrides are applied so that:
    /// env var > TOML file > defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    DroverError::Config(format!("failed to read config file {p}: {e}"))
                })?;
                toml::from_str(&content)
                    .map_err(|e| DroverError::Config(format!("failed to parse config: {e}")))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides on top of file/default values.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = std::env::var("DROVER_CLUSTERS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.run.num_clusters = v;
        }
        if let Some(v) = std::env::var("DROVER_MAX_ITERATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.run.max_iterations = v;
        }
        if let Some(v) = std::env::var("DROVER_MAX_POINTS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.run.max_points = v;
        }
        if let Some(v) = std::env::var("DROVER_NODES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.group.nodes = v;
        }
        if let Some(v) = std::env::var("DROVER_RANK")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.group.rank = v;
        }
        if let Ok(v) = std::env::var("DROVER_ROOT_ADDR") {
            self.group.root_addr = v;
        }
        if let Ok(v) = std::env::var("DROVER_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("DROVER_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate the surface the protocol consumes. Called before any
    /// collective is entered, so a failure here exits cleanly without
    /// leaving a peer blocked.
    pub fn validate(&self) -> Result<()> {
        if self.io.input.is_none() {
            return Err(DroverError::Config(
                "an input file is required (--input)".into(),
            ));
        }
        if self.run.num_clusters == 0 {
            return Err(DroverError::Config("--clusters must be positive".into()));
        }
        if self.run.max_iterations == 0 {
            return Err(DroverError::Config("--iterations must be positive".into()));
        }
        if self.run.max_points == 0 {
            return Err(DroverError::Config("--max-points must be positive".into()));
        }
        if self.group.nodes == 0 {
            return Err(DroverError::Config("--nodes must be positive".into()));
        }
        if self.group.rank >= self.group.nodes {
            return Err(DroverError::Config(format!(
                "rank {} is out of range for a group of {}",
                self.group.rank, self.group.nodes
            )));
        }
        if self.group.spawn && self.group.rank != 0 {
            return Err(DroverError::Config(
                "--spawn is only valid on rank 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        let mut config = Config::default();
        config.io.input = Some(PathBuf::from("points.csv"));
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.run.num_clusters, 15);
        assert_eq!(config.run.max_iterations, 10_000);
        assert_eq!(config.run.max_points, 5_000);
        assert!(!config.run.proper_distance);
        assert_eq!(config.run.label, "no-label");
        assert_eq!(config.group.nodes, 1);
        assert_eq!(config.group.rank, 0);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            [run]
            num_clusters = 3
            max_iterations = 50
            proper_distance = true

            [group]
            nodes = 4
            root_addr = "10.0.0.1:9000"

            [io]
            input = "data/points.csv"
            metrics = "metrics.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.run.num_clusters, 3);
        assert_eq!(config.run.max_iterations, 50);
        assert!(config.run.proper_distance);
        assert_eq!(config.run.max_points, 5_000, "unset fields keep defaults");
        assert_eq!(config.group.nodes, 4);
        assert_eq!(config.group.root_addr, "10.0.0.1:9000");
        assert_eq!(config.io.input, Some(PathBuf::from("data/points.csv")));
        assert!(config.io.output.is_none());
    }

    #[test]
    fn test_validate_requires_input() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(DroverError::Config(msg)) if msg.contains("input")
        ));
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_counts() {
        let mut config = minimal();
        config.run.num_clusters = 0;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.run.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.group.rank = 4;
        config.group.nodes = 4;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.group.spawn = true;
        config.group.rank = 1;
        config.group.nodes = 2;
        assert!(config.validate().is_err());
    }
}
