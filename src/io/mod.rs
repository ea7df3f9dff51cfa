//! File boundaries of a run: point CSV input/output, the per-run metrics
//! sink, and the expected-result comparison. All of these are root-only
//! and stateless; the protocol core never touches the filesystem.

pub mod csv;
pub mod metrics;
pub mod verify;

pub use self::csv::{read_points, write_points, Loaded};
pub use metrics::{append_row, RunMetrics, TestVerdict};
pub use verify::compare_with_expected;
