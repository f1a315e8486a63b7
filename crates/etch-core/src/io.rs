// ─────────────────────────────────────────────────────────────────────
// Beam Etch Core — CSV I/O
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Plain-text CSV readers and writers for samples, beams, grids and logs.
//!
//! Thickness tables come in many column layouts; a [`SchemaResolver`] maps
//! the header to x/y/thickness columns. Beam tables are headerless numeric
//! matrices.

use std::io::Write;
use std::path::Path;

use etch_types::error::{EtchError, EtchResult};
use etch_types::state::{ScatteredSample, WaferGrid};
use log::debug;
use ndarray::Array2;

use crate::beam::BeamProfile;
use crate::recipe::StageSpeedMap;
use crate::trajectory::TrajectoryPoint;

/// Column indices of a thickness table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThicknessColumns {
    pub x: usize,
    pub y: usize,
    pub thickness: usize,
}

/// Maps a header (and the first data row) to thickness-table columns.
pub trait SchemaResolver {
    fn resolve(&self, header: &[String], first_row: Option<&[String]>)
        -> EtchResult<ThicknessColumns>;
}

/// Default resolver: named columns first, then the first three columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderedRules;

const X_NAMES: [&str; 2] = ["x", "x(mm)"];
const Y_NAMES: [&str; 2] = ["y", "y(mm)"];
const THICKNESS_NAMES: [&str; 4] = ["Thickness(nm)", "Thickness", "thickness", "value"];

fn find_case_insensitive(header: &[String], names: &[&str]) -> Option<usize> {
    header.iter().position(|h| {
        let h = h.trim().to_ascii_lowercase();
        names.iter().any(|n| h == *n)
    })
}

impl SchemaResolver for OrderedRules {
    fn resolve(
        &self,
        header: &[String],
        first_row: Option<&[String]>,
    ) -> EtchResult<ThicknessColumns> {
        let named_x = find_case_insensitive(header, &X_NAMES);
        let named_y = find_case_insensitive(header, &Y_NAMES);

        if let (Some(x), Some(y)) = (named_x, named_y) {
            let by_name = THICKNESS_NAMES
                .iter()
                .find_map(|name| header.iter().position(|h| h.trim() == *name));
            let numeric = || {
                (0..header.len()).find(|&i| {
                    i != x
                        && i != y
                        && first_row
                            .and_then(|row| row.get(i))
                            .is_some_and(|cell| cell.trim().parse::<f64>().is_ok())
                })
            };
            if let Some(thickness) = by_name.or_else(numeric) {
                return Ok(ThicknessColumns { x, y, thickness });
            }
        }

        if header.len() >= 3 {
            debug!("no named thickness columns in {header:?}, using the first three");
            return Ok(ThicknessColumns {
                x: 0,
                y: 1,
                thickness: 2,
            });
        }
        Err(EtchError::SchemaNotFound(format!(
            "cannot map x/y/thickness columns from header {header:?}"
        )))
    }
}

fn split_cells(line: &str) -> Vec<String> {
    line.split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect()
}

fn is_numeric_row(cells: &[String]) -> bool {
    !cells.is_empty() && cells.iter().all(|c| c.parse::<f64>().is_ok())
}

/// Parse a thickness table. Rows whose mapped cells are not numeric are
/// dropped. A fully numeric first line is treated as data, not a header.
pub fn parse_thickness_csv(
    content: &str,
    resolver: &dyn SchemaResolver,
) -> EtchResult<Vec<ScatteredSample>> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let Some(first) = lines.next() else {
        return Err(EtchError::SchemaNotFound("empty thickness table".to_string()));
    };
    let first = split_cells(first);
    let body: Vec<Vec<String>> = lines.map(split_cells).collect();

    let (cols, data): (ThicknessColumns, Vec<&[String]>) = if is_numeric_row(&first) {
        if first.len() < 3 {
            return Err(EtchError::SchemaNotFound(format!(
                "headerless table needs 3 columns, found {}",
                first.len()
            )));
        }
        let rows = std::iter::once(first.as_slice())
            .chain(body.iter().map(Vec::as_slice))
            .collect();
        (
            ThicknessColumns {
                x: 0,
                y: 1,
                thickness: 2,
            },
            rows,
        )
    } else {
        let cols = resolver.resolve(&first, body.first().map(Vec::as_slice))?;
        (cols, body.iter().map(Vec::as_slice).collect())
    };

    let cell = |row: &[String], i: usize| row.get(i).and_then(|c| c.parse::<f64>().ok());
    let mut dropped = 0usize;
    let samples: Vec<ScatteredSample> = data
        .into_iter()
        .filter_map(|row| {
            let parsed = (
                cell(row, cols.x),
                cell(row, cols.y),
                cell(row, cols.thickness),
            );
            match parsed {
                (Some(x), Some(y), Some(t)) if x.is_finite() && y.is_finite() && t.is_finite() => {
                    Some(ScatteredSample::new(x, y, t))
                }
                _ => {
                    dropped += 1;
                    None
                }
            }
        })
        .collect();
    if dropped > 0 {
        debug!("dropped {dropped} non-numeric thickness rows");
    }
    Ok(samples)
}

pub fn read_thickness_csv(
    path: &Path,
    resolver: &dyn SchemaResolver,
) -> EtchResult<Vec<ScatteredSample>> {
    let content = std::fs::read_to_string(path)?;
    parse_thickness_csv(&content, resolver)
}

/// Parse a headerless beam matrix. Blank or malformed cells read as 0.
pub fn parse_beam_csv(content: &str) -> EtchResult<BeamProfile> {
    let rows: Vec<Vec<f64>> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| {
            split_cells(l)
                .iter()
                .map(|c| c.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0))
                .collect()
        })
        .collect();
    BeamProfile::from_rows(&rows)
}

pub fn read_beam_csv(path: &Path) -> EtchResult<BeamProfile> {
    let content = std::fs::read_to_string(path)?;
    parse_beam_csv(&content)
}

/// Fixed decimals used when writing each kind of map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Dwell,
    Velocity,
    Thickness,
    Depth,
}

impl MapKind {
    pub fn precision(self) -> usize {
        match self {
            MapKind::Dwell => 5,
            MapKind::Velocity => 10,
            MapKind::Thickness => 2,
            MapKind::Depth => 5,
        }
    }
}

fn format_value(v: f64, precision: usize) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else {
        format!("{v:.precision$}")
    }
}

/// Labeled matrix: header `Y\X,x0,x1,…`, then one `y,v0,v1,…` row per
/// data row.
pub fn write_labeled_grid<W: Write>(
    out: &mut W,
    x_labels: &[f64],
    y_labels: &[f64],
    data: &Array2<f64>,
    precision: usize,
) -> EtchResult<()> {
    let expected = (y_labels.len(), x_labels.len());
    if data.dim() != expected {
        return Err(EtchError::GridMismatch {
            expected,
            found: data.dim(),
        });
    }
    write!(out, "Y\\X")?;
    for x in x_labels {
        write!(out, ",{x:.4}")?;
    }
    writeln!(out)?;
    for (row, y) in data.rows().into_iter().zip(y_labels) {
        write!(out, "{y:.4}")?;
        for &v in row.iter() {
            write!(out, ",{}", format_value(v, precision))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn write_grid_csv<W: Write>(
    out: &mut W,
    grid: &WaferGrid,
    field: &Array2<f64>,
    kind: MapKind,
) -> EtchResult<()> {
    let axis = grid.axis.to_vec();
    write_labeled_grid(out, &axis, &axis, field, kind.precision())
}

pub fn write_stage_map_csv<W: Write>(out: &mut W, map: &StageSpeedMap) -> EtchResult<()> {
    write_labeled_grid(
        out,
        &map.x,
        &map.y,
        &map.speeds,
        MapKind::Velocity.precision(),
    )
}

pub fn write_trajectory_csv<W: Write>(out: &mut W, points: &[TrajectoryPoint]) -> EtchResult<()> {
    writeln!(out, "X(mm),Y(mm),Velocity(mm/s)")?;
    for p in points {
        writeln!(out, "{:.3},{:.3},{:.6}", p.x, p.y, p.velocity)?;
    }
    Ok(())
}

pub fn write_samples_csv<W: Write>(out: &mut W, samples: &[ScatteredSample]) -> EtchResult<()> {
    writeln!(out, "x,y,thickness")?;
    for s in samples {
        writeln!(out, "{},{},{}", s.x, s.y, s.thickness)?;
    }
    Ok(())
}

/// One `key,value` row per log entry.
pub fn write_log_csv<W: Write>(out: &mut W, rows: &[(String, String)]) -> EtchResult<()> {
    for (k, v) in rows {
        writeln!(out, "{k},{v}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_string(f: impl FnOnce(&mut Vec<u8>) -> EtchResult<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_named_columns_any_order() {
        let csv = "Point,Thickness(nm),Y(mm),X(mm)\n1,1800.5,2.0,1.0\n2,1790,-3,4\n";
        let s = parse_thickness_csv(csv, &OrderedRules).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s[0], ScatteredSample::new(1.0, 2.0, 1800.5));
        assert_eq!(s[1], ScatteredSample::new(4.0, -3.0, 1790.0));
    }

    #[test]
    fn test_first_numeric_remaining_column() {
        let csv = "site,x,y,film\nA,0,0,100\nB,1,0,101\n";
        let s = parse_thickness_csv(csv, &OrderedRules).unwrap();
        // "site" is not numeric, "film" is
        assert_eq!(s[1].thickness, 101.0);
    }

    #[test]
    fn test_positional_fallback() {
        let csv = "a,b,c\n1,2,3\n4,5,6\n";
        let s = parse_thickness_csv(csv, &OrderedRules).unwrap();
        assert_eq!(s[1], ScatteredSample::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_headerless_numeric() {
        let csv = "1,2,3\n4,5,6\n";
        let s = parse_thickness_csv(csv, &OrderedRules).unwrap();
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn test_schema_not_found() {
        let err = parse_thickness_csv("foo,bar\n1,2\n", &OrderedRules).unwrap_err();
        assert!(matches!(err, EtchError::SchemaNotFound(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_non_numeric_rows_dropped() {
        let csv = "x,y,thickness\n0,0,10\n1,n/a,11\n\n2,2,12\n";
        let s = parse_thickness_csv(csv, &OrderedRules).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s[1].thickness, 12.0);
    }

    #[test]
    fn test_custom_resolver() {
        struct Reversed;
        impl SchemaResolver for Reversed {
            fn resolve(
                &self,
                _header: &[String],
                _first_row: Option<&[String]>,
            ) -> EtchResult<ThicknessColumns> {
                Ok(ThicknessColumns {
                    x: 2,
                    y: 1,
                    thickness: 0,
                })
            }
        }
        let s = parse_thickness_csv("t,y,x\n5,6,7\n", &Reversed).unwrap();
        assert_eq!(s[0], ScatteredSample::new(7.0, 6.0, 5.0));
    }

    #[test]
    fn test_beam_parsing() {
        let csv = "1,2,3\n\n4,,bad\n5\n";
        let b = parse_beam_csv(csv).unwrap();
        assert_eq!(b.dim(), (3, 3));
        assert_eq!(b.samples()[[1, 1]], 0.0);
        assert_eq!(b.samples()[[1, 2]], 0.0);
        assert_eq!(b.samples()[[2, 0]], 5.0);
        assert_eq!(b.samples()[[2, 2]], 0.0);
        assert!(matches!(parse_beam_csv("\n\n"), Err(EtchError::EmptyBeam)));
    }

    #[test]
    fn test_grid_csv_format() {
        let grid = WaferGrid::new(1.0, 1.0, 1.0).unwrap();
        let field = ndarray::array![[1.0, f64::NAN], [0.123456, 2.0]];
        let text = to_string(|b| write_grid_csv(b, &grid, &field, MapKind::Thickness));
        assert_eq!(
            text,
            "Y\\X,-0.5000,0.5000\n-0.5000,1.00,NaN\n0.5000,0.12,2.00\n"
        );
    }

    #[test]
    fn test_grid_csv_shape_checked() {
        let mut buf = Vec::new();
        let r = write_labeled_grid(&mut buf, &[0.0], &[0.0, 1.0], &Array2::zeros((1, 1)), 2);
        assert!(matches!(r, Err(EtchError::GridMismatch { .. })));
    }

    #[test]
    fn test_trajectory_csv_format() {
        let pts = [TrajectoryPoint {
            x: 1.0,
            y: -2.5,
            velocity: 3.1234567,
        }];
        let text = to_string(|b| write_trajectory_csv(b, &pts));
        assert_eq!(text, "X(mm),Y(mm),Velocity(mm/s)\n1.000,-2.500,3.123457\n");
    }

    #[test]
    fn test_samples_and_log_csv() {
        let text = to_string(|b| write_samples_csv(b, &[ScatteredSample::new(1.5, 0.0, 1800.0)]));
        assert_eq!(text, "x,y,thickness\n1.5,0,1800\n");
        let rows = vec![("Date".to_string(), "20260101".to_string())];
        assert_eq!(to_string(|b| write_log_csv(b, &rows)), "Date,20260101\n");
    }
}
