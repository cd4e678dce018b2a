//! OD trip cleaning and projection.
//!
//! Raw trip CSVs arrive with WGS84 endpoints and local timestamps. A trip
//! survives cleaning when its start time falls in the requested peak window
//! (half-open), both endpoints parse, pass the city lon/lat bracket, and
//! land inside the district union after projection. Everything else is
//! dropped and counted.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Timelike};
use geo::{Contains, MultiPolygon, Point};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};
use std::path::Path;

use crate::common::{
    crs::Transformer,
    csv::{f64_column, read_csv, str_column, write_csv},
};
use crate::config::{Peak, PipelineConfig};
use crate::summary::{DropReason, RunSummary};

/// A cleaned trip: endpoints in the metric CRS, ready for segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTrip {
    pub trip_id: String,
    pub sx: f64,
    pub sy: f64,
    pub ex: f64,
    pub ey: f64,
}

/// Parse a trip timestamp; the feed mixes two layouts.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y/%m/%d %H:%M"];
    let trimmed = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

/// Filter and project one peak window's trips out of the raw OD frame.
pub fn clean(
    df: &DataFrame,
    cfg: &PipelineConfig,
    peak: Peak,
    transformer: &Transformer,
    boundary: &MultiPolygon<f64>,
) -> Result<(Vec<CleanedTrip>, RunSummary)> {
    let window = cfg.peak_window(peak);
    let mut summary = RunSummary::new("trips");

    let trip_ids = str_column(df, "trip_id")?;
    let start_times = str_column(df, "start_time")?;
    let start_lons = f64_column(df, "start_lon")?;
    let start_lats = f64_column(df, "start_lat")?;
    let end_lons = f64_column(df, "end_lon")?;
    let end_lats = f64_column(df, "end_lat")?;

    summary.read(df.height() as u64);
    let mut out = Vec::new();

    for i in 0..df.height() {
        let Some(start_time) = start_times[i].as_deref().and_then(parse_timestamp) else {
            summary.drop_row(DropReason::BadTimestamp);
            continue;
        };
        if !window.contains(start_time.hour()) {
            summary.drop_row(DropReason::OutsideWindow);
            continue;
        }

        let (Some(slon), Some(slat), Some(elon), Some(elat)) =
            (start_lons[i], start_lats[i], end_lons[i], end_lats[i])
        else {
            summary.drop_row(DropReason::MissingCoordinate);
            continue;
        };

        let in_bracket = |lon: f64, lat: f64| {
            cfg.bbox_city_lon.contains(lon) && cfg.bbox_city_lat.contains(lat)
        };
        if !in_bracket(slon, slat) || !in_bracket(elon, elat) {
            summary.drop_row(DropReason::OutsideBbox);
            continue;
        }

        let (Ok((sx, sy)), Ok((ex, ey))) =
            (transformer.apply(slon, slat), transformer.apply(elon, elat))
        else {
            summary.drop_row(DropReason::InvalidGeometry);
            continue;
        };

        if !boundary.contains(&Point::new(sx, sy)) || !boundary.contains(&Point::new(ex, ey)) {
            summary.drop_row(DropReason::OutsideBoundary);
            continue;
        }

        let trip_id = trip_ids[i].clone().unwrap_or_else(|| i.to_string());
        out.push(CleanedTrip { trip_id, sx, sy, ex, ey });
        summary.keep();
    }

    Ok((out, summary))
}

/// Write the cleaned-trip artifact.
pub fn write_cleaned(trips: &[CleanedTrip], path: &Path) -> Result<()> {
    let df = DataFrame::new(vec![
        Series::new("trip_id".into(), trips.iter().map(|t| t.trip_id.clone()).collect::<Vec<_>>()).into(),
        Series::new("sx".into(), trips.iter().map(|t| t.sx).collect::<Vec<_>>()).into(),
        Series::new("sy".into(), trips.iter().map(|t| t.sy).collect::<Vec<_>>()).into(),
        Series::new("ex".into(), trips.iter().map(|t| t.ex).collect::<Vec<_>>()).into(),
        Series::new("ey".into(), trips.iter().map(|t| t.ey).collect::<Vec<_>>()).into(),
    ])?;
    write_csv(&df, path)
}

/// Read a cleaned-trip artifact back, preserving row order.
pub fn read_cleaned(path: &Path) -> Result<Vec<CleanedTrip>> {
    let df = read_csv(path)
        .with_context(|| format!("[trips] Missing cleaned trips (run the trips stage first): {}", path.display()))?;
    let trip_ids = str_column(&df, "trip_id")?;
    let sx = f64_column(&df, "sx")?;
    let sy = f64_column(&df, "sy")?;
    let ex = f64_column(&df, "ex")?;
    let ey = f64_column(&df, "ey")?;

    (0..df.height())
        .map(|i| {
            let coords = (|| Some((sx[i]?, sy[i]?, ex[i]?, ey[i]?)))()
                .ok_or_else(|| anyhow::anyhow!("[trips] Null coordinate in cleaned artifact row {i}"))?;
            Ok(CleanedTrip {
                trip_id: trip_ids[i].clone().unwrap_or_else(|| i.to_string()),
                sx: coords.0,
                sy: coords.1,
                ex: coords.2,
                ey: coords.3,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HourWindow;
    use geo::{Coord, Rect};

    fn frame(rows: &[(&str, &str, f64, f64, f64, f64)]) -> DataFrame {
        DataFrame::new(vec![
            Series::new("trip_id".into(), rows.iter().map(|r| r.0).collect::<Vec<_>>()).into(),
            Series::new("start_time".into(), rows.iter().map(|r| r.1).collect::<Vec<_>>()).into(),
            Series::new("start_lon".into(), rows.iter().map(|r| r.2).collect::<Vec<_>>()).into(),
            Series::new("start_lat".into(), rows.iter().map(|r| r.3).collect::<Vec<_>>()).into(),
            Series::new("end_lon".into(), rows.iter().map(|r| r.4).collect::<Vec<_>>()).into(),
            Series::new("end_lat".into(), rows.iter().map(|r| r.5).collect::<Vec<_>>()).into(),
        ])
        .unwrap()
    }

    /// Identity-ish test fixture: a transformer into the default metric CRS
    /// and a boundary that covers the whole bracket.
    fn fixture() -> (PipelineConfig, Transformer, MultiPolygon<f64>) {
        let cfg = PipelineConfig::default();
        let t = Transformer::wgs84_to(cfg.target_crs).unwrap();
        // Project the bracket corners to build a generous metric boundary.
        let (x0, y0) = t.apply(108.0, 34.0).unwrap();
        let (x1, y1) = t.apply(109.5, 35.0).unwrap();
        let boundary = MultiPolygon(vec![
            Rect::new(
                Coord { x: x0 - 10_000.0, y: y0 - 10_000.0 },
                Coord { x: x1 + 10_000.0, y: y1 + 10_000.0 },
            )
            .to_polygon(),
        ]);
        (cfg, t, boundary)
    }

    #[test]
    fn window_filter_is_half_open() {
        let (cfg, t, boundary) = fixture();
        let df = frame(&[
            ("a", "2021-06-01 06:59:59", 108.9, 34.2, 108.91, 34.21),
            ("b", "2021-06-01 07:00:00", 108.9, 34.2, 108.91, 34.21),
            ("c", "2021-06-01 08:59:59", 108.9, 34.2, 108.91, 34.21),
            ("d", "2021-06-01 09:00:00", 108.9, 34.2, 108.91, 34.21),
        ]);
        let (kept, summary) = clean(&df, &cfg, Peak::Morning, &t, &boundary).unwrap();
        let ids: Vec<_> = kept.iter().map(|t| t.trip_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(summary.dropped_for(DropReason::OutsideWindow), 2);
    }

    #[test]
    fn evening_window_respects_config_override() {
        let (mut cfg, t, boundary) = fixture();
        cfg.peak_evening = HourWindow::new(18, 20);
        let df = frame(&[
            ("a", "2021-06-01 17:30:00", 108.9, 34.2, 108.91, 34.21),
            ("b", "2021-06-01 18:30:00", 108.9, 34.2, 108.91, 34.21),
        ]);
        let (kept, _) = clean(&df, &cfg, Peak::Evening, &t, &boundary).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].trip_id, "b");
    }

    #[test]
    fn out_of_bracket_and_bad_rows_are_counted() {
        let (cfg, t, boundary) = fixture();
        let df = frame(&[
            ("a", "not a time", 108.9, 34.2, 108.91, 34.21),
            ("b", "2021-06-01 07:30:00", 120.0, 34.2, 108.91, 34.21),
            ("c", "2021-06-01 07:30:00", 108.9, 34.2, 108.91, 34.21),
        ]);
        let (kept, summary) = clean(&df, &cfg, Peak::Morning, &t, &boundary).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(summary.dropped_for(DropReason::BadTimestamp), 1);
        assert_eq!(summary.dropped_for(DropReason::OutsideBbox), 1);
        assert!((summary.drop_rate() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn timestamp_formats() {
        assert!(parse_timestamp("2021-06-01 07:30:00").is_some());
        assert!(parse_timestamp("2021/06/01 07:30").is_some());
        assert!(parse_timestamp("2021/06/01 07:30:15").is_some());
        assert!(parse_timestamp("June 1st").is_none());
    }

    #[test]
    fn artifact_round_trip_preserves_order() {
        let trips = vec![
            CleanedTrip { trip_id: "t2".into(), sx: 1.0, sy: 2.0, ex: 3.0, ey: 4.0 },
            CleanedTrip { trip_id: "t1".into(), sx: 5.0, sy: 6.0, ex: 7.0, ey: 8.0 },
        ];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("morning.csv");
        write_cleaned(&trips, &path).unwrap();
        assert_eq!(read_cleaned(&path).unwrap(), trips);
    }
}
