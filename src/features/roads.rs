//! Road network features: per-cell centreline length and road density.
//!
//! Each polyline is clipped edge by edge with the same parametric clipper
//! the trajectory stage uses, so a road crossing a cell boundary splits
//! exactly and total centreline length is conserved.

use std::path::Path;

use anyhow::Result;
use geo::LineString;
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};
use rayon::prelude::*;

use crate::common::csv::write_csv;
use crate::fishnet::Fishnet;
use crate::segments::{ClipOutcome, clip_to_grid};
use crate::summary::{DropReason, RunSummary};

/// Accumulate per-cell road centreline metres over all polylines.
///
/// Polylines are clipped in parallel in input order and folded
/// sequentially, so the per-cell sums are stable across worker counts.
/// Degenerate edges contribute nothing; a polyline with any non-finite
/// coordinate is dropped whole and counted.
pub fn featurize(net: &Fishnet, roads: &[LineString<f64>]) -> (Vec<f64>, RunSummary) {
    let mut summary = RunSummary::new("roads");
    summary.read(roads.len() as u64);

    let clipped: Vec<Option<Vec<(u32, f64)>>> = roads
        .par_iter()
        .map(|line| {
            let mut pieces = Vec::new();
            for edge in line.0.windows(2) {
                let (s, e) = (edge[0], edge[1]);
                match clip_to_grid(net, s.x, s.y, e.x, e.y) {
                    ClipOutcome::Segments(segs) => {
                        pieces.extend(segs.into_iter().filter(|(_, l)| *l > 0.0));
                    }
                    ClipOutcome::Degenerate(_) => {}
                    ClipOutcome::Invalid => return None,
                }
            }
            Some(pieces)
        })
        .collect();

    let mut lengths_m = vec![0.0_f64; net.len()];
    for outcome in &clipped {
        match outcome {
            None => summary.drop_row(DropReason::InvalidGeometry),
            Some(pieces) => {
                for (id, len) in pieces {
                    lengths_m[(*id - 1) as usize] += len;
                }
                summary.keep();
            }
        }
    }
    (lengths_m, summary)
}

/// Build the road feature frame: centreline km and density (km of road per
/// km² of cell), full grid coverage.
pub fn to_frame(net: &Fishnet, lengths_m: &[f64]) -> Result<DataFrame> {
    anyhow::ensure!(
        lengths_m.len() == net.len(),
        "[features::roads] Lengths cover {} cells, fishnet has {}",
        lengths_m.len(),
        net.len()
    );
    let area_km2 = net.cell_area_km2();
    let ids: Vec<u32> = net.ids().collect();
    let km: Vec<f64> = lengths_m.iter().map(|m| m / 1000.0).collect();
    let density: Vec<f64> = km.iter().map(|km| km / area_km2).collect();
    let df = DataFrame::new(vec![
        Series::new("grid_id".into(), ids).into(),
        Series::new("road_length_km".into(), km).into(),
        Series::new("road_density_km_per_km2".into(), density).into(),
    ])?;
    Ok(df)
}

pub fn write_features(net: &Fishnet, lengths_m: &[f64], path: &Path) -> Result<()> {
    write_csv(&to_frame(net, lengths_m)?, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fishnet;
    use geo::{Coord, MultiPolygon, Rect, line_string};

    fn net(cols: u32, rows: u32) -> Fishnet {
        let boundary = MultiPolygon(vec![
            Rect::new(
                Coord { x: 0.0, y: 0.0 },
                Coord { x: cols as f64 * 500.0, y: rows as f64 * 500.0 },
            )
            .to_polygon(),
        ]);
        fishnet::build(&boundary, 500.0, 4547).unwrap()
    }

    #[test]
    fn straight_road_splits_across_cells() {
        let net = net(2, 1);
        let road = line_string![(x: 100.0, y: 250.0), (x: 900.0, y: 250.0)];
        let (lengths, summary) = featurize(&net, &[road]);
        assert!((lengths[0] - 400.0).abs() < 1e-9);
        assert!((lengths[1] - 400.0).abs() < 1e-9);
        assert_eq!(summary.rows_out(), 1);
    }

    #[test]
    fn bent_road_length_is_conserved() {
        let net = net(2, 2);
        let road = line_string![
            (x: 100.0, y: 100.0),
            (x: 600.0, y: 100.0),
            (x: 600.0, y: 700.0),
        ];
        let total_in = 500.0 + 600.0;
        let (lengths, _) = featurize(&net, &[road]);
        let total_out: f64 = lengths.iter().sum();
        assert!((total_out - total_in).abs() < 1e-6, "got {total_out}");
    }

    #[test]
    fn density_uses_cell_area() {
        let net = net(1, 1);
        // 500 m of road in a 0.25 km² cell: 0.5 km / 0.25 km² = 2.
        let df = to_frame(&net, &[500.0]).unwrap();
        let density = df.column("road_density_km_per_km2").unwrap().f64().unwrap().get(0).unwrap();
        assert!((density - 2.0).abs() < 1e-12);
    }

    #[test]
    fn non_finite_polyline_is_dropped_whole() {
        let net = net(1, 1);
        let bad = line_string![(x: 100.0, y: 100.0), (x: f64::NAN, y: 200.0)];
        let good = line_string![(x: 100.0, y: 100.0), (x: 200.0, y: 100.0)];
        let (lengths, summary) = featurize(&net, &[bad, good]);
        assert!((lengths[0] - 100.0).abs() < 1e-9);
        assert_eq!(summary.dropped_for(DropReason::InvalidGeometry), 1);
        assert_eq!(summary.rows_out(), 1);
    }

    #[test]
    fn empty_network_gives_zero_everywhere() {
        let net = net(2, 1);
        let (lengths, _) = featurize(&net, &[]);
        assert_eq!(lengths, vec![0.0, 0.0]);
    }
}
