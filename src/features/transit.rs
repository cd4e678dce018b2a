//! Transit features: stop counts per cell and centroid-to-nearest-stop
//! distances, bus and metro separately.

use std::path::Path;

use anyhow::{Result, ensure};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};
use rstar::{RTree, primitives::GeomWithData};

use crate::common::csv::write_csv;
use crate::fishnet::Fishnet;
use crate::summary::{DropReason, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopKind {
    Bus,
    Metro,
}

/// One transit stop, already projected to the metric CRS. `id` is the
/// stable input row index used to break nearest-neighbour ties.
#[derive(Debug, Clone)]
pub struct Stop {
    pub id: u32,
    pub kind: StopKind,
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
}

/// Per-cell transit features over the full cell set.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitFeatures {
    pub bus_counts: Vec<u64>,
    pub metro_counts: Vec<u64>,
    pub nearest_bus_m: Vec<f64>,
    pub nearest_metro_m: Vec<f64>,
}

type IndexedStop = GeomWithData<[f64; 2], u32>;

/// Exact nearest distance from a point to any stop in the tree, metres.
/// Equidistant stops differ only in witness id, never in the distance, so
/// the reported value is stable regardless of which one the tree yields.
fn nearest_distance(tree: &RTree<IndexedStop>, x: f64, y: f64) -> Option<f64> {
    tree.nearest_neighbor_iter_with_distance_2(&[x, y])
        .next()
        .map(|(_, d2)| d2.sqrt())
}

/// Count stops per cell and measure centroid-to-nearest distances.
///
/// Stops outside the fishnet still participate in the nearest-distance
/// search (a stop just over the boundary is still the closest one), but
/// are not counted into any cell.
pub fn featurize(net: &Fishnet, stops: &[Stop]) -> Result<(TransitFeatures, RunSummary)> {
    let mut summary = RunSummary::new("transit");
    summary.read(stops.len() as u64);

    let mut bus_counts = vec![0u64; net.len()];
    let mut metro_counts = vec![0u64; net.len()];
    let mut bus_tree_input: Vec<IndexedStop> = Vec::new();
    let mut metro_tree_input: Vec<IndexedStop> = Vec::new();

    for stop in stops {
        if !stop.x.is_finite() || !stop.y.is_finite() {
            summary.drop_row(DropReason::NotAPoint);
            continue;
        }
        let entry = IndexedStop::new([stop.x, stop.y], stop.id);
        match stop.kind {
            StopKind::Bus => bus_tree_input.push(entry),
            StopKind::Metro => metro_tree_input.push(entry),
        }
        if let Some(id) = net.locate(stop.x, stop.y) {
            match stop.kind {
                StopKind::Bus => bus_counts[(id - 1) as usize] += 1,
                StopKind::Metro => metro_counts[(id - 1) as usize] += 1,
            }
        }
        summary.keep();
    }

    ensure!(
        !bus_tree_input.is_empty() && !metro_tree_input.is_empty(),
        "[features::transit] Need at least one bus and one metro stop to measure nearest distances (got {} bus, {} metro)",
        bus_tree_input.len(),
        metro_tree_input.len()
    );
    let bus_tree = RTree::bulk_load(bus_tree_input);
    let metro_tree = RTree::bulk_load(metro_tree_input);

    let size = net.cell_size_m();
    let mut nearest_bus_m = Vec::with_capacity(net.len());
    let mut nearest_metro_m = Vec::with_capacity(net.len());
    for cell in net.cells() {
        let c = cell.centroid(size);
        // Trees are non-empty by the ensure above.
        nearest_bus_m.push(nearest_distance(&bus_tree, c.x(), c.y()).unwrap_or(f64::MAX));
        nearest_metro_m.push(nearest_distance(&metro_tree, c.x(), c.y()).unwrap_or(f64::MAX));
    }

    Ok((TransitFeatures { bus_counts, metro_counts, nearest_bus_m, nearest_metro_m }, summary))
}

pub fn to_frame(net: &Fishnet, features: &TransitFeatures) -> Result<DataFrame> {
    ensure!(
        features.bus_counts.len() == net.len(),
        "[features::transit] Features cover {} cells, fishnet has {}",
        features.bus_counts.len(),
        net.len()
    );
    let ids: Vec<u32> = net.ids().collect();
    let df = DataFrame::new(vec![
        Series::new("grid_id".into(), ids).into(),
        Series::new("bus_count".into(), features.bus_counts.clone()).into(),
        Series::new("metro_count".into(), features.metro_counts.clone()).into(),
        Series::new("nearest_bus_distance_m".into(), features.nearest_bus_m.clone()).into(),
        Series::new("nearest_metro_distance_m".into(), features.nearest_metro_m.clone()).into(),
    ])?;
    Ok(df)
}

pub fn write_features(net: &Fishnet, features: &TransitFeatures, path: &Path) -> Result<()> {
    write_csv(&to_frame(net, features)?, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fishnet;
    use geo::{Coord, MultiPolygon, Rect};

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

    fn stop(id: u32, kind: StopKind, x: f64, y: f64) -> Stop {
        Stop { id, kind, name: None, x, y }
    }

    #[test]
    fn counts_and_distances_per_cell() {
        let net = net(2, 1);
        let stops = vec![
            stop(0, StopKind::Bus, 100.0, 100.0),
            stop(1, StopKind::Bus, 200.0, 100.0),
            stop(2, StopKind::Metro, 750.0, 250.0),
        ];
        let (features, summary) = featurize(&net, &stops).unwrap();
        assert_eq!(features.bus_counts, vec![2, 0]);
        assert_eq!(features.metro_counts, vec![0, 1]);
        assert_eq!(summary.rows_out(), 3);

        // Cell 2 centroid is (750, 250): the metro stop sits on it.
        assert_eq!(features.nearest_metro_m[1], 0.0);
        // Cell 1 centroid (250, 250) to bus stop (200, 100).
        let expected = (50.0_f64.powi(2) + 150.0_f64.powi(2)).sqrt();
        assert!((features.nearest_bus_m[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn outside_stops_measure_but_do_not_count() {
        let net = net(1, 1);
        let stops = vec![
            stop(0, StopKind::Bus, 750.0, 250.0),
            stop(1, StopKind::Metro, 250.0, 750.0),
        ];
        let (features, _) = featurize(&net, &stops).unwrap();
        assert_eq!(features.bus_counts, vec![0]);
        assert_eq!(features.metro_counts, vec![0]);
        assert!((features.nearest_bus_m[0] - 500.0).abs() < 1e-9);
        assert!((features.nearest_metro_m[0] - 500.0).abs() < 1e-9);
    }

    #[test]
    fn equidistant_stops_give_one_distance() {
        let net = net(1, 1);
        // Two bus stops mirrored around the centroid (250, 250).
        let stops = vec![
            stop(7, StopKind::Bus, 150.0, 250.0),
            stop(3, StopKind::Bus, 350.0, 250.0),
            stop(9, StopKind::Metro, 250.0, 250.0),
        ];
        let (features, _) = featurize(&net, &stops).unwrap();
        assert!((features.nearest_bus_m[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn missing_class_is_fatal() {
        let net = net(1, 1);
        let stops = vec![stop(0, StopKind::Bus, 100.0, 100.0)];
        assert!(featurize(&net, &stops).is_err());
    }

    #[test]
    fn non_finite_stop_is_dropped() {
        let net = net(1, 1);
        let stops = vec![
            stop(0, StopKind::Bus, f64::NAN, 100.0),
            stop(1, StopKind::Bus, 100.0, 100.0),
            stop(2, StopKind::Metro, 200.0, 200.0),
        ];
        let (features, summary) = featurize(&net, &stops).unwrap();
        assert_eq!(features.bus_counts, vec![1]);
        assert_eq!(summary.dropped_for(DropReason::NotAPoint), 1);
    }
}
