//! Input layer readers: district boundaries, POIs, road networks and
//! transit stops, from shapefile or CSV, reprojected on ingress.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use geo::{Coord, LineString, MultiPolygon};

use crate::common::{
    crs::Transformer,
    csv::{f64_column, read_csv, str_column},
    shp::{read_shapefile, record_text, shape_to_line_strings, shape_to_multi_polygon, shape_to_point},
};
use crate::features::poi::PoiRecord;
use crate::features::transit::{Stop, StopKind};
use crate::fishnet::district_union;

fn is_csv(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

/// Read the district polygons and union them into the study-area boundary,
/// reprojecting into the metric CRS when the source differs.
pub fn read_boundary(path: &Path, source_epsg: u32, target_epsg: u32) -> Result<MultiPolygon<f64>> {
    let shapes = read_shapefile(path)?;
    let mut districts: Vec<MultiPolygon<f64>> = shapes
        .iter()
        .filter_map(|(shape, _)| shape_to_multi_polygon(shape))
        .collect();
    ensure!(
        !districts.is_empty(),
        "[ingest] No polygon features in {}",
        path.display()
    );
    if source_epsg != target_epsg {
        let transformer = Transformer::new(source_epsg, target_epsg)?;
        districts = districts
            .iter()
            .map(|d| transformer.apply_multi_polygon(d))
            .collect::<Result<_>>()
            .with_context(|| format!("[ingest] Failed to reproject boundary {}", path.display()))?;
    }
    district_union(&districts)
}

/// Read a POI layer (shapefile points or a `subclass,lon,lat` CSV) and
/// project it into the metric CRS. Rows that cannot be read or projected
/// are skipped and counted.
pub fn read_pois(
    path: &Path,
    subclass_field: &str,
    to_metric: &Transformer,
) -> Result<(Vec<PoiRecord>, u64)> {
    let raw: Vec<(Option<String>, f64, f64)> = if is_csv(path) {
        let df = read_csv(path)?;
        let subclasses = str_column(&df, subclass_field)?;
        let lons = f64_column(&df, "lon")?;
        let lats = f64_column(&df, "lat")?;
        (0..df.height())
            .filter_map(|i| Some((subclasses[i].clone(), lons[i]?, lats[i]?)))
            .collect()
    } else {
        read_shapefile(path)?
            .iter()
            .filter_map(|(shape, record)| {
                let (lon, lat) = shape_to_point(shape)?;
                Some((record_text(record, subclass_field), lon, lat))
            })
            .collect()
    };

    let mut skipped = 0;
    let mut pois = Vec::with_capacity(raw.len());
    for (subclass, lon, lat) in raw {
        let (Some(subclass), Ok((x, y))) = (subclass, to_metric.apply(lon, lat)) else {
            skipped += 1;
            continue;
        };
        pois.push(PoiRecord { subclass, x, y });
    }
    ensure!(!pois.is_empty(), "[ingest] No usable POI rows in {}", path.display());
    Ok((pois, skipped))
}

/// Read a road network shapefile as line strings in the metric CRS.
/// Parts with fewer than two vertices are dropped.
pub fn read_roads(
    path: &Path,
    source_epsg: u32,
    target_epsg: u32,
) -> Result<Vec<LineString<f64>>> {
    let shapes = read_shapefile(path)?;
    let mut lines: Vec<LineString<f64>> = shapes
        .iter()
        .filter_map(|(shape, _)| shape_to_line_strings(shape))
        .flatten()
        .filter(|line| line.0.len() >= 2)
        .collect();
    ensure!(!lines.is_empty(), "[ingest] No polyline features in {}", path.display());

    if source_epsg != target_epsg {
        let transformer = Transformer::new(source_epsg, target_epsg)?;
        for line in &mut lines {
            for coord in &mut line.0 {
                let (x, y) = transformer.apply(coord.x, coord.y).with_context(|| {
                    format!("[ingest] Failed to reproject road network {}", path.display())
                })?;
                *coord = Coord { x, y };
            }
        }
    }
    Ok(lines)
}

/// Read one transit stop layer (shapefile points or a `name,lon,lat` CSV)
/// as a single kind, projecting into the metric CRS. Stop ids start at
/// `id_offset` in input row order.
pub fn read_stops(
    path: &Path,
    kind: StopKind,
    id_offset: u32,
    to_metric: &Transformer,
) -> Result<Vec<Stop>> {
    let raw: Vec<(Option<String>, f64, f64)> = if is_csv(path) {
        let df = read_csv(path)?;
        let names = str_column(&df, "name").unwrap_or_else(|_| vec![None; df.height()]);
        let lons = f64_column(&df, "lon")?;
        let lats = f64_column(&df, "lat")?;
        (0..df.height())
            .filter_map(|i| Some((names[i].clone(), lons[i]?, lats[i]?)))
            .collect()
    } else {
        read_shapefile(path)?
            .iter()
            .filter_map(|(shape, record)| {
                let (lon, lat) = shape_to_point(shape)?;
                Some((record_text(record, "name"), lon, lat))
            })
            .collect()
    };
    ensure!(!raw.is_empty(), "[ingest] No usable stops in {}", path.display());

    raw.into_iter()
        .enumerate()
        .map(|(i, (name, lon, lat))| {
            let (x, y) = to_metric.apply(lon, lat)?;
            Ok(Stop { id: id_offset + i as u32, kind, name, x, y })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::crs::EPSG_WGS84;
    use std::fs;

    #[test]
    fn csv_pois_are_projected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pois.csv");
        fs::write(&path, "subclass,lon,lat\npark,108.9,34.2\ncompany,108.95,34.25\n,108.9,34.2\n")
            .unwrap();
        let t = Transformer::wgs84_to(4547).unwrap();
        let (pois, skipped) = read_pois(&path, "subclass", &t).unwrap();
        assert_eq!(pois.len(), 2);
        assert_eq!(skipped, 1);
        assert_eq!(pois[0].subclass, "park");
        assert!(pois[0].x < 500_000.0);
    }

    #[test]
    fn csv_stops_keep_input_order_and_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.csv");
        fs::write(&path, "name,lon,lat\nstop a,108.9,34.2\nstop b,108.91,34.21\n").unwrap();
        let t = Transformer::wgs84_to(4547).unwrap();
        let stops = read_stops(&path, StopKind::Bus, 100, &t).unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0].id, 100);
        assert_eq!(stops[1].id, 101);
        assert_eq!(stops[0].name.as_deref(), Some("stop a"));
        assert_eq!(stops[0].kind, StopKind::Bus);
    }

    #[test]
    fn empty_stop_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus.csv");
        fs::write(&path, "name,lon,lat\n").unwrap();
        let t = Transformer::wgs84_to(EPSG_WGS84).unwrap();
        assert!(read_stops(&path, StopKind::Bus, 0, &t).is_err());
    }
}
