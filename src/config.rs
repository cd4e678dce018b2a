//! Pipeline configuration.
//!
//! Every tunable of the pipeline lives here: cell size, emission factor,
//! peak windows, the city's lon/lat sanity bracket, the city-centre point,
//! the target CRS and the table post-processing quantiles. All values have
//! embedded defaults (Xi'an study area) and can be overridden from a JSON
//! file passed with `--config`. Environment variables are never consulted.

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// A half-open daily hour interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourWindow {
    pub start: u32,
    pub end: u32,
}

impl HourWindow {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Inclusive on the left, exclusive on the right.
    #[inline]
    pub fn contains(&self, hour: u32) -> bool {
        self.start <= hour && hour < self.end
    }
}

/// Which peak window a run operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Peak {
    Morning,
    Evening,
}

impl Peak {
    pub fn label(&self) -> &'static str {
        match self {
            Peak::Morning => "morning",
            Peak::Evening => "evening",
        }
    }

    pub const ALL: [Peak; 2] = [Peak::Morning, Peak::Evening];
}

impl std::fmt::Display for Peak {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Native unit of the population raster, confirmed at ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterUnits {
    /// Pixel values are persons per square kilometre.
    PersonsPerKm2,
    /// Pixel values are persons per pixel; divided by the pixel area (km²)
    /// on read.
    PersonsPerPixel,
}

/// An inclusive numeric bracket, e.g. the city's plausible longitude range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub min: f64,
    pub max: f64,
}

impl Bracket {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, v: f64) -> bool {
        self.min <= v && v <= self.max
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Edge length of a fishnet cell, metres.
    pub cell_size_m: f64,
    /// Avoided CO2 per cycled kilometre, kg.
    pub emission_factor_kg_per_km: f64,
    pub peak_morning: HourWindow,
    pub peak_evening: HourWindow,
    pub bbox_city_lon: Bracket,
    pub bbox_city_lat: Bracket,
    /// City centre used for the distance-to-centre feature (lon, lat).
    pub city_centre_lonlat: (f64, f64),
    /// EPSG code of the metric CRS all computation happens in.
    pub target_crs: u32,
    pub winsorize_low: f64,
    pub winsorize_high: f64,
    /// Worker threads for the clipping stages; 0 picks `min(cores, 12)`.
    pub workers: usize,
    pub raster_units: RasterUnits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cell_size_m: 500.0,
            emission_factor_kg_per_km: 0.1807,
            peak_morning: HourWindow::new(7, 9),
            peak_evening: HourWindow::new(17, 19),
            bbox_city_lon: Bracket::new(108.0, 109.5),
            bbox_city_lat: Bracket::new(34.0, 35.0),
            // Xi'an Bell Tower
            city_centre_lonlat: (108.9462, 34.2587),
            target_crs: 4547,
            winsorize_low: 0.01,
            winsorize_high: 0.99,
            workers: 0,
            raster_units: RasterUnits::PersonsPerKm2,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file; absent fields keep defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("[config] Failed to read config file: {}", path.display()))?;
        let cfg: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("[config] Failed to parse config file: {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an optional path, falling back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_path(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.cell_size_m > 0.0, "[config] cell_size_m must be positive");
        ensure!(
            self.emission_factor_kg_per_km >= 0.0,
            "[config] emission_factor_kg_per_km must be non-negative"
        );
        for w in [&self.peak_morning, &self.peak_evening] {
            ensure!(
                w.start < w.end && w.end <= 24,
                "[config] peak window [{}, {}) is not a valid hour interval",
                w.start,
                w.end
            );
        }
        ensure!(
            0.0 <= self.winsorize_low && self.winsorize_low < self.winsorize_high && self.winsorize_high <= 1.0,
            "[config] winsorize quantiles must satisfy 0 <= low < high <= 1"
        );
        Ok(())
    }

    /// Area of one cell in km², derived (never hard-coded 0.25).
    #[inline]
    pub fn cell_area_km2(&self) -> f64 {
        (self.cell_size_m / 1000.0).powi(2)
    }

    pub fn peak_window(&self, peak: Peak) -> HourWindow {
        match peak {
            Peak::Morning => self.peak_morning,
            Peak::Evening => self.peak_evening,
        }
    }

    /// Effective worker count for the parallel clipping stages.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(12)
        }
    }
}
