//! Shapefile ingest and conversion to `geo` types.

use std::path::Path;

use anyhow::{Context, Result};
use shapefile::{self as shp, Shape, dbase::Record, Reader};

/// Reads all shapes + attribute records from a given `.shp` file path.
pub fn read_shapefile(path: &Path) -> Result<Vec<(Shape, Record)>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let mut items = Vec::with_capacity(reader.shape_count()?);
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.context("Error reading shape+record")?;
        items.push((shape, record));
    }
    Ok(items)
}

/// Convert shapefile::Polygon to geo::MultiPolygon<f64>
pub fn polygon_to_geo(p: &shp::Polygon) -> geo::MultiPolygon<f64> {
    /// Ensure first and last are the same for geo::LineString coords
    fn ensure_closed(coords: &mut Vec<geo::Coord<f64>>) {
        if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
            coords.push(coords[0])
        }
    }

    /// Get the signed area of a geo::Coord list (negative for hole)
    fn signed_area(pts: &[geo::Coord<f64>]) -> f64 {
        let mut a = 0.0;
        for w in pts.windows(2) {
            a += w[0].x * w[1].y - w[1].x * w[0].y;
        }
        a / 2.0
    }

    // 1) Convert each ring into a LineString (ensure closed)
    let mut ls_rings: Vec<(geo::LineString<f64>, bool /*is_exterior*/)> =
        Vec::with_capacity(p.rings().len());
    for ring in p.rings().iter() {
        let mut coords: Vec<geo::Coord<f64>> =
            ring.points().iter().map(|pt| geo::Coord { x: pt.x, y: pt.y }).collect();
        ensure_closed(&mut coords);
        let ls = geo::LineString(coords);
        // Shapefile convention: exterior rings wind CW (negative signed area).
        let is_exterior = signed_area(&ls.0) < 0.0;
        ls_rings.push((ls, is_exterior));
    }

    // 2) Group: each exterior with its following holes (Shapefile stores rings in this order)
    let mut polys: Vec<geo::Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<geo::LineString<f64>> = None;
    let mut current_holes: Vec<geo::LineString<f64>> = Vec::new();

    for (ls, is_exterior) in ls_rings {
        if is_exterior {
            // flush previous polygon
            if let Some(ext) = current_exterior.take() {
                polys.push(geo::Polygon::new(ext, current_holes));
                current_holes = Vec::new();
            }
            current_exterior = Some(ls);
        } else {
            current_holes.push(ls);
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(geo::Polygon::new(ext, current_holes));
    }

    geo::MultiPolygon(polys)
}

/// Convert shapefile::Polyline into the geo line strings it contains
/// (one per part).
pub fn polyline_to_geo(p: &shp::Polyline) -> Vec<geo::LineString<f64>> {
    p.parts()
        .iter()
        .map(|part| {
            geo::LineString(
                part.iter().map(|pt| geo::Coord { x: pt.x, y: pt.y }).collect(),
            )
        })
        .collect()
}

/// Extract polygon geometry from any polygon-bearing shape variant.
pub fn shape_to_multi_polygon(shape: &Shape) -> Option<geo::MultiPolygon<f64>> {
    match shape {
        Shape::Polygon(p) => Some(polygon_to_geo(p)),
        _ => None,
    }
}

/// Extract the line strings of any polyline-bearing shape variant.
pub fn shape_to_line_strings(shape: &Shape) -> Option<Vec<geo::LineString<f64>>> {
    match shape {
        Shape::Polyline(p) => Some(polyline_to_geo(p)),
        _ => None,
    }
}

/// Extract the (x, y) of any point-bearing shape variant.
pub fn shape_to_point(shape: &Shape) -> Option<(f64, f64)> {
    match shape {
        Shape::Point(p) => Some((p.x, p.y)),
        Shape::PointM(p) => Some((p.x, p.y)),
        Shape::PointZ(p) => Some((p.x, p.y)),
        _ => None,
    }
}

/// Look up a named text attribute in a DBF record.
pub fn record_text(record: &Record, field: &str) -> Option<String> {
    use shapefile::dbase::FieldValue;
    match record.get(field) {
        Some(FieldValue::Character(opt)) => opt.clone(),
        Some(FieldValue::Memo(s)) => Some(s.clone()),
        Some(FieldValue::Numeric(Some(n))) => Some(n.to_string()),
        Some(FieldValue::Integer(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    #[test]
    fn polygon_rings_are_grouped_by_orientation() {
        // One CW exterior square with one CCW hole.
        let exterior = vec![
            shp::Point::new(0.0, 0.0),
            shp::Point::new(0.0, 10.0),
            shp::Point::new(10.0, 10.0),
            shp::Point::new(10.0, 0.0),
            shp::Point::new(0.0, 0.0),
        ];
        let hole = vec![
            shp::Point::new(2.0, 2.0),
            shp::Point::new(4.0, 2.0),
            shp::Point::new(4.0, 4.0),
            shp::Point::new(2.0, 4.0),
            shp::Point::new(2.0, 2.0),
        ];
        let polygon = shp::Polygon::with_rings(vec![
            shp::PolygonRing::Outer(exterior),
            shp::PolygonRing::Inner(hole),
        ]);
        let mp = polygon_to_geo(&polygon);
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert!((mp.unsigned_area() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn polyline_parts_become_line_strings() {
        let polyline = shp::Polyline::with_parts(vec![
            vec![shp::Point::new(0.0, 0.0), shp::Point::new(5.0, 0.0)],
            vec![shp::Point::new(0.0, 1.0), shp::Point::new(0.0, 4.0)],
        ]);
        let lines = polyline_to_geo(&polyline);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0.len(), 2);
    }
}
