//! Fishnet construction from a city boundary.

use anyhow::{Result, ensure};
use geo::{BooleanOps, BoundingRect, MultiPolygon, Relate};

use super::{Cell, Fishnet};

/// Union the district polygons into the single study-area boundary.
pub fn district_union(districts: &[MultiPolygon<f64>]) -> Result<MultiPolygon<f64>> {
    ensure!(!districts.is_empty(), "[fishnet::builder] No district polygons supplied");
    districts
        .iter()
        .cloned()
        .reduce(|a, b| a.union(&b))
        .ok_or_else(|| anyhow::anyhow!("[fishnet::builder] District union is empty"))
}

/// Tile the boundary's bbox with `cell_size_m` squares and keep each cell
/// that is entirely contained in the boundary.
///
/// Tiles are aligned to the bbox lower-left corner. A cell that touches the
/// boundary but is not fully contained is excluded; `grid_id` runs 1..=n in
/// row-major (row, col) order with row 0 at the bottom.
pub fn build(boundary: &MultiPolygon<f64>, cell_size_m: f64, epsg: u32) -> Result<Fishnet> {
    ensure!(cell_size_m > 0.0, "[fishnet::builder] cell size must be positive");
    let bbox = boundary
        .bounding_rect()
        .ok_or_else(|| anyhow::anyhow!("[fishnet::builder] Boundary polygon is empty"))?;

    let origin = (bbox.min().x, bbox.min().y);
    let cols = (bbox.width() / cell_size_m).ceil() as u32;
    let rows = (bbox.height() / cell_size_m).ceil() as u32;
    ensure!(rows > 0 && cols > 0, "[fishnet::builder] Boundary bbox is degenerate");

    let mut cells = Vec::new();
    let mut next_id: u32 = 1;
    for row in 0..rows {
        for col in 0..cols {
            let cell = Cell {
                id: next_id,
                row,
                col,
                min_x: origin.0 + col as f64 * cell_size_m,
                min_y: origin.1 + row as f64 * cell_size_m,
            };
            let square = cell.rect(cell_size_m).to_polygon();
            // Fully-contained inclusion rule; equality counts as contained.
            let im = boundary.relate(&square);
            if im.is_contains() {
                cells.push(cell);
                next_id += 1;
            }
        }
    }
    ensure!(
        !cells.is_empty(),
        "[fishnet::builder] No cell is fully contained in the boundary; check CRS and cell size"
    );

    log::info!(
        "[fishnet] tiled {}x{} bbox, kept {} of {} cells",
        rows,
        cols,
        cells.len(),
        (rows as usize) * (cols as usize)
    );
    Fishnet::from_cells(origin, rows, cols, cell_size_m, epsg, cells)
}
