//! Reading and writing point datasets as delimited files.
//!
//! Input files carry a header row and two or three columns: x, y, and an
//! optional pre-assigned cluster labelled `cluster_<id>`. Output files
//! always carry the cluster column, appended after the input's coordinate
//! headers for easy side-by-side comparison.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{DroverError, Result};
use crate::pointset::{PointSet, NO_CLUSTER};

/// A dataset fresh off disk, with the header row it came with.
#[derive(Debug)]
pub struct Loaded {
    pub points: PointSet,
    pub headers: Vec<String>,
    pub dimensions: usize,
}

/// Read up to `max_points` points from a CSV file.
pub fn read_points(path: &Path, max_points: usize) -> Result<Loaded> {
    let file = File::open(path).map_err(|e| {
        DroverError::Config(format!("cannot read input file {}: {e}", path.display()))
    })?;
    let loaded = read_points_from(file, max_points)?;
    debug!(
        path = %path.display(),
        points = loaded.points.len(),
        "loaded dataset"
    );
    Ok(loaded)
}

/// Read up to `max_points` points from any reader.
pub fn read_points_from(reader: impl Read, max_points: usize) -> Result<Loaded> {
    let mut csv_reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let dimensions = headers.len();
    if dimensions < 2 {
        return Err(DroverError::Validation(format!(
            "input needs at least x and y columns, found {dimensions}"
        )));
    }
    let has_cluster_column = dimensions > 2;

    let mut points = PointSet::with_capacity(max_points);
    for record in csv_reader.records() {
        if points.len() == max_points {
            break;
        }
        let record = record?;
        if record.len() < 2 {
            // A short trailing line ends the dataset, matching hand-edited
            // files that end with a stray delimiter or blank-ish line.
            warn!(
                line = points.len() + 2,
                "short line in input, stopping here"
            );
            break;
        }

        let x = parse_coord(record.get(0).unwrap_or(""), points.len())?;
        let y = parse_coord(record.get(1).unwrap_or(""), points.len())?;
        let cluster_id = if has_cluster_column && record.len() > 2 {
            parse_cluster_label(record.get(2).unwrap_or(""))
        } else {
            NO_CLUSTER
        };
        points.push(x, y, cluster_id);
    }

    Ok(Loaded {
        points,
        headers,
        dimensions,
    })
}

fn parse_coord(field: &str, index: usize) -> Result<f64> {
    field.parse().map_err(|_| {
        DroverError::Validation(format!("point {index}: bad coordinate {field:?}"))
    })
}

/// Parse a cluster label of the form `cluster_7` (any non-digit prefix is
/// skipped). Labels without digits map to no assignment.
fn parse_cluster_label(field: &str) -> i32 {
    let digits = field.trim_start_matches(|c: char| !c.is_ascii_digit());
    match digits.parse() {
        Ok(id) => id,
        Err(_) => {
            warn!(label = field, "unparseable cluster label, treating as unassigned");
            NO_CLUSTER
        }
    }
}

/// Write the dataset to a CSV file, silently overwriting an existing one.
pub fn write_points(path: &Path, points: &PointSet, headers: &[String]) -> Result<()> {
    let file = File::create(path).map_err(|e| {
        DroverError::Config(format!("cannot write output file {}: {e}", path.display()))
    })?;
    write_points_to(file, points, headers)
}

/// Write the dataset to any writer: coordinate headers plus a `Cluster`
/// column, coordinates at 7 decimal places, clusters as `cluster_<id>`.
pub fn write_points_to(writer: impl Write, points: &PointSet, headers: &[String]) -> Result<()> {
    let mut csv_writer = ::csv::Writer::from_writer(writer);

    let mut header_row: Vec<&str> = headers.iter().take(2).map(String::as_str).collect();
    header_row.push("Cluster");
    csv_writer.write_record(&header_row)?;

    for (x, y, cluster_id) in points.iter() {
        csv_writer.write_record(&[
            format!("{x:.7}"),
            format!("{y:.7}"),
            format!("cluster_{cluster_id}"),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "x,y\n1.5,2.5\n3.0,4.0\n10.25,0.125\n";

    #[test]
    fn test_read_basic() {
        let loaded = read_points_from(INPUT.as_bytes(), 100).unwrap();
        assert_eq!(loaded.headers, vec!["x", "y"]);
        assert_eq!(loaded.dimensions, 2);
        assert_eq!(loaded.points.len(), 3);
        assert_eq!(loaded.points.x(0), 1.5);
        assert_eq!(loaded.points.y(2), 0.125);
        assert_eq!(loaded.points.cluster_id(0), NO_CLUSTER);
    }

    #[test]
    fn test_read_caps_at_max_points() {
        let loaded = read_points_from(INPUT.as_bytes(), 2).unwrap();
        assert_eq!(loaded.points.len(), 2);
    }

    #[test]
    fn test_read_cluster_column() {
        let input = "x,y,Cluster\n1.0,2.0,cluster_3\n4.0,5.0,cluster_0\n";
        let loaded = read_points_from(input.as_bytes(), 100).unwrap();
        assert_eq!(loaded.dimensions, 3);
        assert_eq!(loaded.points.cluster_id(0), 3);
        assert_eq!(loaded.points.cluster_id(1), 0);
    }

    #[test]
    fn test_read_rejects_single_column() {
        let input = "x\n1.0\n";
        assert!(read_points_from(input.as_bytes(), 10).is_err());
    }

    #[test]
    fn test_read_rejects_bad_coordinate() {
        let input = "x,y\n1.0,banana\n";
        assert!(read_points_from(input.as_bytes(), 10).is_err());
    }

    #[test]
    fn test_unparseable_cluster_label_is_unassigned() {
        let input = "x,y,Cluster\n1.0,2.0,whatever\n";
        let loaded = read_points_from(input.as_bytes(), 10).unwrap();
        assert_eq!(loaded.points.cluster_id(0), NO_CLUSTER);
    }

    #[test]
    fn test_write_format() {
        let mut points = PointSet::with_capacity(2);
        points.push(1.5, 2.25, 0);
        points.push(3.0, 4.0, 1);

        let mut out = Vec::new();
        write_points_to(&mut out, &points, &["x".into(), "y".into()]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("x,y,Cluster"));
        assert_eq!(lines.next(), Some("1.5000000,2.2500000,cluster_0"));
        assert_eq!(lines.next(), Some("3.0000000,4.0000000,cluster_1"));
    }

    #[test]
    fn test_round_trip() {
        let mut points = PointSet::with_capacity(3);
        points.push(0.5, -1.5, 0);
        points.push(2.0, 3.0, 1);
        points.push(-4.25, 0.0, 0);

        let mut buffer = Vec::new();
        write_points_to(&mut buffer, &points, &["x".into(), "y".into()]).unwrap();
        let loaded = read_points_from(buffer.as_slice(), 10).unwrap();

        assert_eq!(loaded.points.len(), 3);
        for i in 0..3 {
            assert_eq!(loaded.points.x(i), points.x(i));
            assert_eq!(loaded.points.y(i), points.y(i));
            assert_eq!(loaded.points.cluster_id(i), points.cluster_id(i));
        }
    }
}
