//! Trajectory–grid segmentation.
//!
//! Each OD is reduced to the straight segment between its projected
//! endpoints and split across the fishnet cells it crosses. Cells are
//! axis-aligned squares, so the split is an exact parametric clip of the
//! segment against each candidate cell's AABB (Liang–Barsky): the per-cell
//! lengths sum to the segment's Euclidean length with no topology failures
//! possible. Geometry problems are values ([`ClipOutcome`]), never panics.

use anyhow::{Result, bail, ensure};
use geo::Rect;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::path::Path;

use crate::common::csv::{f64_column, read_csv, u32_column, write_csv};
use crate::fishnet::Fishnet;
use crate::summary::{DropReason, RunSummary};
use crate::trips::CleanedTrip;
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};

/// Below this Euclidean length (metres) an OD is treated as degenerate.
pub const DEGENERATE_EPS_M: f64 = 1e-6;

/// Absolute floor of the length-conservation tolerance, metres.
const CONSERVATION_ABS_M: f64 = 1e-3;

/// Per-cell contributions of one OD, ordered by ascending grid id.
pub type SegmentList = SmallVec<[(u32, f64); 4]>;

/// Outcome of splitting one OD across the grid.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipOutcome {
    /// Ordinary case: length-carrying (and possibly zero-length touch)
    /// contributions per crossed cell.
    Segments(SegmentList),
    /// Start equals end; the containing cell (if any) gets one zero-length
    /// segment count.
    Degenerate(Option<u32>),
    /// Non-finite input coordinates; the OD is dropped and counted.
    Invalid,
}

/// Parametric clip of the segment `(sx,sy) → (ex,ey)` to a rectangle.
///
/// Returns the `t`-interval of the segment inside the (closed) rectangle,
/// or `None` when they do not meet. `t0 == t1` is a point touch.
fn clip_segment_rect(sx: f64, sy: f64, ex: f64, ey: f64, rect: &Rect<f64>) -> Option<(f64, f64)> {
    #[inline]
    fn clip_param(p: f64, q: f64, t0: &mut f64, t1: &mut f64) -> bool {
        if p == 0.0 {
            // Segment parallel to this boundary: inside iff q >= 0.
            return q >= 0.0;
        }
        let r = q / p;
        if p < 0.0 {
            if r > *t1 {
                return false;
            }
            if r > *t0 {
                *t0 = r;
            }
        } else {
            if r < *t0 {
                return false;
            }
            if r < *t1 {
                *t1 = r;
            }
        }
        true
    }

    let (dx, dy) = (ex - sx, ey - sy);
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    let inside = clip_param(-dx, sx - rect.min().x, &mut t0, &mut t1)
        && clip_param(dx, rect.max().x - sx, &mut t0, &mut t1)
        && clip_param(-dy, sy - rect.min().y, &mut t0, &mut t1)
        && clip_param(dy, rect.max().y - sy, &mut t0, &mut t1);
    (inside && t0 <= t1).then_some((t0, t1))
}

/// Split one OD across the fishnet.
///
/// Candidates come from the R-tree envelope query and are processed in
/// ascending grid id, so the output order is deterministic. Zero-length
/// corner touches are kept only when the touch point is the OD's own start
/// or end; a mid-segment corner graze contributes nothing.
pub fn clip_to_grid(net: &Fishnet, sx: f64, sy: f64, ex: f64, ey: f64) -> ClipOutcome {
    if ![sx, sy, ex, ey].iter().all(|v| v.is_finite()) {
        return ClipOutcome::Invalid;
    }

    let length = ((ex - sx).powi(2) + (ey - sy).powi(2)).sqrt();
    if length < DEGENERATE_EPS_M {
        return ClipOutcome::Degenerate(net.locate(sx, sy));
    }

    let min = [sx.min(ex), sy.min(ey)];
    let max = [sx.max(ex), sy.max(ey)];
    let mut segments = SegmentList::new();

    for id in net.candidates(min, max) {
        let cell = match net.cell(id) {
            Some(c) => c,
            None => continue,
        };
        let rect = cell.rect(net.cell_size_m());

        // A segment collinear with a shared cell edge belongs to the cell
        // whose half-open interval owns that edge (the right/upper
        // neighbour), mirroring point lookup; otherwise both cells would
        // count the full length.
        if (sx == ex && sx == rect.max().x) || (sy == ey && sy == rect.max().y) {
            continue;
        }

        if let Some((t0, t1)) = clip_segment_rect(sx, sy, ex, ey, &rect) {
            if t1 > t0 {
                segments.push((id, (t1 - t0) * length));
            } else if t0 == 0.0 || t1 == 1.0 {
                segments.push((id, 0.0));
            }
        }
    }

    ClipOutcome::Segments(segments)
}

/// Per-cell aggregate over all ODs: segment count and total metres, indexed
/// by `grid_id - 1` over the full cell set.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAccum {
    pub counts: Vec<u64>,
    pub lengths_m: Vec<f64>,
}

impl GridAccum {
    pub fn zeroed(n: usize) -> Self {
        Self { counts: vec![0; n], lengths_m: vec![0.0; n] }
    }
}

/// Split every trip and reduce into the per-cell aggregate.
///
/// The clip step runs in parallel but preserves input order; the fold is
/// sequential in ascending trip order, so per-cell sums are byte-identical
/// across reruns and worker counts. Exceeding the OD's own length is a
/// consistency violation and aborts the batch.
pub fn aggregate(net: &Fishnet, trips: &[CleanedTrip]) -> Result<(GridAccum, RunSummary)> {
    let mut summary = RunSummary::new("segments");
    summary.read(trips.len() as u64);

    let clipped: Vec<ClipOutcome> = trips
        .par_iter()
        .map(|t| clip_to_grid(net, t.sx, t.sy, t.ex, t.ey))
        .collect();

    let mut accum = GridAccum::zeroed(net.len());
    for (trip, outcome) in trips.iter().zip(&clipped) {
        match outcome {
            ClipOutcome::Invalid => summary.drop_row(DropReason::InvalidGeometry),
            ClipOutcome::Degenerate(cell) => {
                if let Some(id) = cell {
                    accum.counts[(*id - 1) as usize] += 1;
                }
                summary.keep();
            }
            ClipOutcome::Segments(segments) => {
                let length =
                    ((trip.ex - trip.sx).powi(2) + (trip.ey - trip.sy).powi(2)).sqrt();
                let covered: f64 = segments.iter().map(|(_, l)| l).sum();
                let tolerance = (1e-6 * length).max(CONSERVATION_ABS_M);
                if covered > length + tolerance {
                    bail!(
                        "[segments] Consistency violation for trip {}: covered {covered:.6} m exceeds OD length {length:.6} m",
                        trip.trip_id
                    );
                }
                for (id, seg_len) in segments {
                    accum.counts[(*id - 1) as usize] += 1;
                    accum.lengths_m[(*id - 1) as usize] += seg_len;
                }
                summary.keep();
            }
        }
    }

    ensure!(
        accum.lengths_m.iter().all(|v| v.is_finite()),
        "[segments] Non-finite aggregate length"
    );
    Ok((accum, summary))
}

/// Write the per-cell segment artifact (cells with contributions only; the
/// emission stage zero-fills over the full cell set).
pub fn write_segments(accum: &GridAccum, path: &Path) -> Result<()> {
    let mut ids = Vec::new();
    let mut counts = Vec::new();
    let mut lengths = Vec::new();
    for (i, (&count, &length)) in accum.counts.iter().zip(&accum.lengths_m).enumerate() {
        if count > 0 {
            ids.push(i as u32 + 1);
            counts.push(count);
            lengths.push(length);
        }
    }
    let df = DataFrame::new(vec![
        Series::new("grid_id".into(), ids).into(),
        Series::new("segment_count".into(), counts).into(),
        Series::new("total_length_m".into(), lengths).into(),
    ])?;
    write_csv(&df, path)
}

/// Read a segment artifact back, zero-filled over the full cell set.
/// A grid id unknown to the fishnet means the cell set drifted: fatal.
pub fn read_segments(net: &Fishnet, path: &Path) -> Result<GridAccum> {
    let df = read_csv(path)?;
    let ids = u32_column(&df, "grid_id")?;
    let counts = u32_column(&df, "segment_count")?;
    let lengths = f64_column(&df, "total_length_m")?;

    let mut accum = GridAccum::zeroed(net.len());
    for i in 0..ids.len() {
        let id = ids[i];
        ensure!(
            net.cell(id).is_some(),
            "[segments] grid_id {id} in {} is not in the fishnet; rebuild from the fishnet stage",
            path.display()
        );
        accum.counts[(id - 1) as usize] = counts[i] as u64;
        accum.lengths_m[(id - 1) as usize] =
            lengths[i].ok_or_else(|| anyhow::anyhow!("[segments] Null length for grid_id {id}"))?;
    }
    Ok(accum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fishnet;
    use geo::{Coord, MultiPolygon};

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

    fn trip(id: &str, sx: f64, sy: f64, ex: f64, ey: f64) -> CleanedTrip {
        CleanedTrip { trip_id: id.into(), sx, sy, ex, ey }
    }

    #[test]
    fn single_cell_diagonal() {
        let net = net(1, 1);
        let ClipOutcome::Segments(segs) = clip_to_grid(&net, 100.0, 100.0, 400.0, 400.0) else {
            panic!("expected segments");
        };
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].0, 1);
        assert!((segs[0].1 - 300.0 * 2.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn two_cell_split_conserves_length() {
        let net = net(2, 1);
        let ClipOutcome::Segments(segs) = clip_to_grid(&net, 100.0, 250.0, 900.0, 250.0) else {
            panic!("expected segments");
        };
        assert_eq!(segs.as_slice(), &[(1, 400.0), (2, 400.0)]);
    }

    #[test]
    fn degenerate_od_counts_once_with_zero_length() {
        let net = net(1, 1);
        assert_eq!(clip_to_grid(&net, 250.0, 250.0, 250.0, 250.0), ClipOutcome::Degenerate(Some(1)));

        let (accum, summary) = aggregate(&net, &[trip("t", 250.0, 250.0, 250.0, 250.0)]).unwrap();
        assert_eq!(accum.counts, vec![1]);
        assert_eq!(accum.lengths_m, vec![0.0]);
        assert_eq!(summary.rows_out(), 1);
    }

    #[test]
    fn non_finite_coordinates_are_invalid() {
        let net = net(1, 1);
        assert_eq!(clip_to_grid(&net, f64::NAN, 0.0, 1.0, 1.0), ClipOutcome::Invalid);
        let (_, summary) = aggregate(&net, &[trip("t", f64::NAN, 0.0, 1.0, 1.0)]).unwrap();
        assert_eq!(summary.dropped_for(DropReason::InvalidGeometry), 1);
    }

    #[test]
    fn length_conservation_across_a_grid_walk() {
        // Diagonal across a 3x2 grid; per-cell pieces must sum to the
        // Euclidean length within the absolute floor.
        let net = net(3, 2);
        let (sx, sy, ex, ey): (f64, f64, f64, f64) = (50.0, 50.0, 1450.0, 950.0);
        let length = ((ex - sx).powi(2) + (ey - sy).powi(2)).sqrt();
        let ClipOutcome::Segments(segs) = clip_to_grid(&net, sx, sy, ex, ey) else {
            panic!("expected segments");
        };
        let covered: f64 = segs.iter().map(|(_, l)| l).sum();
        assert!((covered - length).abs() < 1e-3, "covered {covered} vs {length}");
        assert!(segs.iter().all(|(_, l)| *l >= 0.0));
    }

    #[test]
    fn segment_on_shared_edge_is_counted_once() {
        // Vertical OD exactly on x = 500, the edge between cells 1 and 2:
        // only the right cell (which owns the edge) gets the length.
        let net = net(2, 1);
        let ClipOutcome::Segments(segs) = clip_to_grid(&net, 500.0, 100.0, 500.0, 400.0) else {
            panic!("expected segments");
        };
        assert_eq!(segs.as_slice(), &[(2, 300.0)]);
    }

    #[test]
    fn mid_segment_corner_graze_contributes_nothing() {
        // OD through the 4-corner at (500, 500) of a 2x2 grid along the
        // diagonal: the off-diagonal cells see a point touch mid-segment.
        let net = net(2, 2);
        let ClipOutcome::Segments(segs) = clip_to_grid(&net, 100.0, 100.0, 900.0, 900.0) else {
            panic!("expected segments");
        };
        let ids: Vec<u32> = segs.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn permutation_invariance_of_aggregate() {
        let net = net(3, 2);
        let trips = vec![
            trip("a", 50.0, 50.0, 1450.0, 950.0),
            trip("b", 100.0, 250.0, 900.0, 250.0),
            trip("c", 700.0, 100.0, 700.0, 900.0),
        ];
        let mut shuffled = trips.clone();
        shuffled.swap(0, 2);

        let (fwd, _) = aggregate(&net, &trips).unwrap();
        let (rev, _) = aggregate(&net, &shuffled).unwrap();
        for (a, b) in fwd.lengths_m.iter().zip(&rev.lengths_m) {
            let scale = a.abs().max(1.0);
            assert!((a - b).abs() / scale < 1e-6);
        }
        assert_eq!(fwd.counts, rev.counts);
    }

    #[test]
    fn artifact_round_trip_and_drift_detection() {
        let net2 = net(2, 1);
        let (accum, _) = aggregate(&net2, &[trip("a", 100.0, 250.0, 900.0, 250.0)]).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("morning.csv");
        write_segments(&accum, &path).unwrap();
        let back = read_segments(&net2, &path).unwrap();
        assert_eq!(back, accum);

        // A smaller fishnet must reject the artifact (cell-set drift).
        let net1 = net(1, 1);
        assert!(read_segments(&net1, &path).is_err());
    }
}
