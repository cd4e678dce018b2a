//! The metric fishnet: the 500 m × 500 m cell set every component keys on.
//!
//! Cells are axis-aligned squares on a regular grid anchored at the
//! boundary's bbox lower-left corner, identified by a stable 1-based
//! `grid_id` assigned in row-major (row, col) order. The fishnet is built
//! once, persisted, and read-only afterwards; every worker gets an immutable
//! snapshot.

mod builder;

pub use builder::{build, district_union};

use anyhow::{Context, Result, ensure};
use geo::{Coord, Point, Rect};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};

use crate::common::{
    csv::{read_csv, u32_column, write_csv},
    fs::atomic_write,
    paths::DataDir,
};

/// One fishnet cell. `min_x`/`min_y` locate its lower-left corner in the
/// metric CRS; the square extends `cell_size_m` in each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub id: u32,
    pub row: u32,
    pub col: u32,
    pub min_x: f64,
    pub min_y: f64,
}

impl Cell {
    pub fn rect(&self, cell_size_m: f64) -> Rect<f64> {
        Rect::new(
            Coord { x: self.min_x, y: self.min_y },
            Coord { x: self.min_x + cell_size_m, y: self.min_y + cell_size_m },
        )
    }

    pub fn centroid(&self, cell_size_m: f64) -> Point<f64> {
        Point::new(self.min_x + cell_size_m / 2.0, self.min_y + cell_size_m / 2.0)
    }
}

/// A cell's AABB in the R-tree, associated with its grid id.
#[derive(Debug, Clone)]
struct CellEnvelope {
    id: u32,
    bbox: Rect<f64>,
}

impl RTreeObject for CellEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Sidecar manifest persisted next to the cell table; lets downstream
/// components detect cell-set drift between runs.
#[derive(Debug, Serialize, Deserialize)]
struct FishnetManifest {
    version: String,
    epsg: u32,
    cell_size_m: f64,
    origin_x: f64,
    origin_y: f64,
    rows: u32,
    cols: u32,
    count: usize,
}

/// The full cell set plus its spatial index and O(1) tile lookup.
pub struct Fishnet {
    cell_size_m: f64,
    epsg: u32,
    origin: (f64, f64),
    rows: u32,
    cols: u32,
    cells: Vec<Cell>,
    by_tile: ahash::AHashMap<(u32, u32), u32>,
    rtree: RTree<CellEnvelope>,
}

impl Fishnet {
    /// Assemble a fishnet from an already-validated cell list. Ids must be
    /// exactly 1..=n in ascending order.
    pub(crate) fn from_cells(
        origin: (f64, f64),
        rows: u32,
        cols: u32,
        cell_size_m: f64,
        epsg: u32,
        cells: Vec<Cell>,
    ) -> Result<Self> {
        ensure!(!cells.is_empty(), "[fishnet] Cell set is empty");
        for (i, cell) in cells.iter().enumerate() {
            ensure!(
                cell.id as usize == i + 1,
                "[fishnet] Non-contiguous grid_id {} at position {}",
                cell.id,
                i
            );
        }
        let by_tile = cells.iter().map(|c| ((c.row, c.col), c.id)).collect();
        let rtree = RTree::bulk_load(
            cells
                .iter()
                .map(|c| CellEnvelope { id: c.id, bbox: c.rect(cell_size_m) })
                .collect(),
        );
        Ok(Self { cell_size_m, epsg, origin, rows, cols, cells, by_tile, rtree })
    }

    #[inline] pub fn len(&self) -> usize { self.cells.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.cells.is_empty() }
    #[inline] pub fn cells(&self) -> &[Cell] { &self.cells }
    #[inline] pub fn cell_size_m(&self) -> f64 { self.cell_size_m }
    #[inline] pub fn epsg(&self) -> u32 { self.epsg }

    /// Area of one cell in km².
    #[inline]
    pub fn cell_area_km2(&self) -> f64 {
        (self.cell_size_m / 1000.0).powi(2)
    }

    /// Cell by grid id (ids are 1-based and contiguous).
    pub fn cell(&self, id: u32) -> Option<&Cell> {
        self.cells.get(id.checked_sub(1)? as usize)
    }

    /// Grid ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.cells.iter().map(|c| c.id)
    }

    /// Locate the cell containing a point.
    ///
    /// Membership is half-open per axis (`[min, min + size)`), so a point on
    /// a shared edge belongs to exactly one cell and nothing is counted
    /// twice.
    pub fn locate(&self, x: f64, y: f64) -> Option<u32> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let col = ((x - self.origin.0) / self.cell_size_m).floor();
        let row = ((y - self.origin.1) / self.cell_size_m).floor();
        if col < 0.0 || row < 0.0 || col >= self.cols as f64 || row >= self.rows as f64 {
            return None;
        }
        self.by_tile.get(&(row as u32, col as u32)).copied()
    }

    /// Candidate cell ids whose AABB intersects the query envelope, in
    /// ascending id order (deterministic downstream iteration).
    pub fn candidates(&self, min: [f64; 2], max: [f64; 2]) -> Vec<u32> {
        let envelope = AABB::from_corners(min, max);
        let mut ids: Vec<u32> = self
            .rtree
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Persist the cell table and manifest under the data directory.
    pub fn write(&self, dir: &DataDir) -> Result<()> {
        let (ids, rows, cols, min_xs, min_ys) = self.cells.iter().fold(
            (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new()),
            |(mut ids, mut rs, mut cs, mut xs, mut ys), c| {
                ids.push(c.id);
                rs.push(c.row);
                cs.push(c.col);
                xs.push(c.min_x);
                ys.push(c.min_y);
                (ids, rs, cs, xs, ys)
            },
        );
        let df = DataFrame::new(vec![
            Series::new("grid_id".into(), ids).into(),
            Series::new("row".into(), rows).into(),
            Series::new("col".into(), cols).into(),
            Series::new("min_x".into(), min_xs).into(),
            Series::new("min_y".into(), min_ys).into(),
        ])?;
        write_csv(&df, &dir.fishnet_cells())?;

        let manifest = FishnetManifest {
            version: "1".into(),
            epsg: self.epsg,
            cell_size_m: self.cell_size_m,
            origin_x: self.origin.0,
            origin_y: self.origin.1,
            rows: self.rows,
            cols: self.cols,
            count: self.cells.len(),
        };
        let bytes = serde_json::to_vec_pretty(&manifest)
            .context("[fishnet] Failed to serialize manifest")?;
        atomic_write(&dir.fishnet_manifest(), &bytes)
    }

    /// Read a persisted fishnet back from the data directory.
    pub fn read(dir: &DataDir) -> Result<Self> {
        let manifest_path = dir.fishnet_manifest();
        let bytes = std::fs::read(&manifest_path).with_context(|| {
            format!("[fishnet] Missing manifest (run the fishnet stage first): {}", manifest_path.display())
        })?;
        let manifest: FishnetManifest =
            serde_json::from_slice(&bytes).context("[fishnet] Failed to parse manifest.json")?;

        let df = read_csv(&dir.fishnet_cells())?;
        let ids = u32_column(&df, "grid_id")?;
        let rows = u32_column(&df, "row")?;
        let cols = u32_column(&df, "col")?;
        ensure!(
            ids.len() == manifest.count,
            "[fishnet] Manifest count {} does not match cell table rows {}",
            manifest.count,
            ids.len()
        );

        let cells = ids
            .into_iter()
            .zip(rows)
            .zip(cols)
            .map(|((id, row), col)| Cell {
                id,
                row,
                col,
                min_x: manifest.origin_x + col as f64 * manifest.cell_size_m,
                min_y: manifest.origin_y + row as f64 * manifest.cell_size_m,
            })
            .collect();

        Self::from_cells(
            (manifest.origin_x, manifest.origin_y),
            manifest.rows,
            manifest.cols,
            manifest.cell_size_m,
            manifest.epsg,
            cells,
        )
    }
}
