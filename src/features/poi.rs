//! POI features: per-class counts and land-use mixing entropy.

use std::path::Path;

use ahash::AHashMap;
use anyhow::{Context, Result};
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};

use crate::common::csv::write_csv;
use crate::fishnet::Fishnet;
use crate::summary::{DropReason, RunSummary};

/// The five land-use classes, in canonical column order.
pub const CLASS_NAMES: [&str; 5] =
    ["leisure", "office", "public_service", "transport_facility", "residential"];

pub const N_CLASSES: usize = CLASS_NAMES.len();

/// Subclass → class mapping. This is data, not code: the default table is
/// embedded from `assets/poi_classes.json` and can be overridden by a file
/// so a re-classification never needs a code change.
pub struct PoiClassTable {
    map: AHashMap<String, usize>,
}

impl PoiClassTable {
    /// The embedded default mapping.
    pub fn embedded() -> Result<Self> {
        Self::from_json(include_str!("../../assets/poi_classes.json"))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("[features::poi] Failed to read class table: {}", path.display()))?;
        Self::from_json(&text)
    }

    /// Parse a `{"class": ["subclass", ...], ...}` JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let by_class: AHashMap<String, Vec<String>> =
            serde_json::from_str(text).context("[features::poi] Malformed class table JSON")?;
        let mut map = AHashMap::new();
        for (class, subclasses) in by_class {
            let idx = CLASS_NAMES
                .iter()
                .position(|n| *n == class)
                .with_context(|| format!("[features::poi] Unknown class in table: {class}"))?;
            for subclass in subclasses {
                map.insert(subclass, idx);
            }
        }
        anyhow::ensure!(!map.is_empty(), "[features::poi] Class table is empty");
        Ok(Self { map })
    }

    /// Class index of a subclass, if mapped.
    pub fn classify(&self, subclass: &str) -> Option<usize> {
        self.map.get(subclass).copied()
    }
}

/// One POI, already projected to the metric CRS.
#[derive(Debug, Clone)]
pub struct PoiRecord {
    pub subclass: String,
    pub x: f64,
    pub y: f64,
}

/// Normalized Shannon entropy of the 5-class mix in one cell.
///
/// Empty cells score 0; a perfectly uniform mix scores 1.
pub fn mixing_entropy(counts: &[u64; N_CLASSES]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    let h: f64 = counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum();
    h / (N_CLASSES as f64).ln()
}

/// Count POIs per class per cell. POIs outside the fishnet and unmapped
/// subclasses are dropped and counted.
pub fn featurize(
    net: &Fishnet,
    pois: &[PoiRecord],
    table: &PoiClassTable,
) -> (Vec<[u64; N_CLASSES]>, RunSummary) {
    let mut summary = RunSummary::new("poi");
    summary.read(pois.len() as u64);
    let mut counts = vec![[0u64; N_CLASSES]; net.len()];

    for poi in pois {
        let Some(class) = table.classify(&poi.subclass) else {
            summary.drop_row(DropReason::UnknownSubclass);
            continue;
        };
        let Some(id) = net.locate(poi.x, poi.y) else {
            summary.drop_row(DropReason::OutsideBoundary);
            continue;
        };
        counts[(id - 1) as usize][class] += 1;
        summary.keep();
    }
    (counts, summary)
}

/// Build the POI feature frame: five count columns, the total and the
/// normalized mixing entropy, full grid coverage.
pub fn to_frame(net: &Fishnet, counts: &[[u64; N_CLASSES]]) -> Result<DataFrame> {
    anyhow::ensure!(
        counts.len() == net.len(),
        "[features::poi] Counts cover {} cells, fishnet has {}",
        counts.len(),
        net.len()
    );
    let ids: Vec<u32> = net.ids().collect();
    let mut columns: Vec<polars::prelude::Column> =
        vec![Series::new("grid_id".into(), ids).into()];
    for (k, name) in CLASS_NAMES.iter().enumerate() {
        let col: Vec<u64> = counts.iter().map(|c| c[k]).collect();
        columns.push(Series::new(format!("{name}_poi_count").into(), col).into());
    }
    let totals: Vec<u64> = counts.iter().map(|c| c.iter().sum()).collect();
    columns.push(Series::new("total_poi_count".into(), totals).into());
    let entropy: Vec<f64> = counts.iter().map(mixing_entropy).collect();
    columns.push(Series::new("land_mix_entropy_norm".into(), entropy).into());
    Ok(DataFrame::new(columns)?)
}

pub fn write_features(net: &Fishnet, counts: &[[u64; N_CLASSES]], path: &Path) -> Result<()> {
    write_csv(&to_frame(net, counts)?, path)
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

    #[test]
    fn entropy_sanity() {
        assert_eq!(mixing_entropy(&[4, 4, 4, 4, 4]), 1.0);
        assert_eq!(mixing_entropy(&[20, 0, 0, 0, 0]), 0.0);
        assert_eq!(mixing_entropy(&[0, 0, 0, 0, 0]), 0.0);
        let h = mixing_entropy(&[10, 10, 0, 0, 0]);
        assert!((h - 2.0_f64.ln() / 5.0_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn entropy_stays_in_unit_interval() {
        for counts in [[1, 0, 0, 0, 0], [3, 1, 4, 1, 5], [100, 1, 1, 1, 1], [7, 7, 7, 7, 6]] {
            let h = mixing_entropy(&counts);
            assert!((0.0..=1.0).contains(&h), "H' = {h} for {counts:?}");
        }
    }

    #[test]
    fn embedded_table_parses_and_classifies() {
        let table = PoiClassTable::embedded().unwrap();
        assert_eq!(table.classify("park"), Some(0));
        assert_eq!(table.classify("company"), Some(1));
        assert_eq!(table.classify("hospital"), Some(2));
        assert_eq!(table.classify("bus_station"), Some(3));
        assert_eq!(table.classify("residential_quarter"), Some(4));
        assert_eq!(table.classify("starship_pad"), None);
    }

    #[test]
    fn counts_land_in_the_right_cell() {
        let net = net(2, 1);
        let table = PoiClassTable::embedded().unwrap();
        let pois = vec![
            PoiRecord { subclass: "park".into(), x: 100.0, y: 100.0 },
            PoiRecord { subclass: "park".into(), x: 600.0, y: 100.0 },
            PoiRecord { subclass: "company".into(), x: 600.0, y: 200.0 },
            PoiRecord { subclass: "starship_pad".into(), x: 100.0, y: 100.0 },
            PoiRecord { subclass: "park".into(), x: 5000.0, y: 100.0 },
        ];
        let (counts, summary) = featurize(&net, &pois, &table);
        assert_eq!(counts[0], [1, 0, 0, 0, 0]);
        assert_eq!(counts[1], [1, 1, 0, 0, 0]);
        assert_eq!(summary.dropped_for(DropReason::UnknownSubclass), 1);
        assert_eq!(summary.dropped_for(DropReason::OutsideBoundary), 1);
        assert_eq!(summary.rows_out(), 3);
    }

    #[test]
    fn frame_has_full_grid_coverage() {
        let net = net(3, 1);
        let counts = vec![[0; 5]; 3];
        let df = to_frame(&net, &counts).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 8);
    }
}
