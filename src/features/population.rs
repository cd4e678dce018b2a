//! Population features from a gridded density raster.
//!
//! The raster arrives as a WGS84 GeoTIFF (persons/km² or persons/pixel).
//! Pixel centres are projected into the metric CRS and binned onto the
//! fishnet; each cell reports the mean density of the pixels that landed in
//! it. A cell too small or oddly placed to catch any pixel centre falls
//! back to a bilinear sample at its centroid. Everything fail-closed: an
//! uncovered cell is 0, never NaN.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, bail, ensure};
use ndarray::Array2;
use polars::{frame::DataFrame, prelude::NamedFrom, series::Series};
use tiff::{
    decoder::{Decoder, DecodingResult},
    tags::Tag,
};

use crate::common::{crs::Transformer, csv::write_csv};
use crate::config::RasterUnits;
use crate::fishnet::Fishnet;

// Metres per degree on the GRS80 sphere, for pixel-area estimates only.
const M_PER_DEG_LAT: f64 = 110_574.0;
const M_PER_DEG_LON_EQUATOR: f64 = 111_320.0;

/// A north-up geographic raster: row 0 is the top edge, pixel sizes are in
/// degrees and positive.
pub struct Raster {
    values: Array2<f64>,
    origin_lon: f64,
    origin_lat: f64,
    px_w_deg: f64,
    px_h_deg: f64,
    nodata: Option<f64>,
}

impl Raster {
    pub fn new(
        values: Array2<f64>,
        origin_lon: f64,
        origin_lat: f64,
        px_w_deg: f64,
        px_h_deg: f64,
        nodata: Option<f64>,
    ) -> Result<Self> {
        ensure!(
            px_w_deg > 0.0 && px_h_deg > 0.0,
            "[features::population] Pixel size must be positive (got {px_w_deg} x {px_h_deg})"
        );
        ensure!(values.nrows() > 0 && values.ncols() > 0, "[features::population] Empty raster");
        Ok(Self { values, origin_lon, origin_lat, px_w_deg, px_h_deg, nodata })
    }

    /// Decode a single-band GeoTIFF. The geotransform comes from the
    /// ModelPixelScale and ModelTiepoint tags; affine ModelTransformation
    /// rasters are not supported.
    pub fn from_geotiff(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("[features::population] Failed to open raster: {}", path.display()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("[features::population] Not a TIFF: {}", path.display()))?;

        let (width, height) = decoder
            .dimensions()
            .context("[features::population] Raster has no dimensions")?;

        let scale = decoder
            .get_tag_f64_vec(Tag::ModelPixelScaleTag)
            .context("[features::population] Missing ModelPixelScale tag; not a supported GeoTIFF")?;
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::ModelTiepointTag)
            .context("[features::population] Missing ModelTiepoint tag; not a supported GeoTIFF")?;
        ensure!(scale.len() >= 2, "[features::population] Malformed ModelPixelScale tag");
        ensure!(tiepoint.len() >= 6, "[features::population] Malformed ModelTiepoint tag");
        let (px_w_deg, px_h_deg) = (scale[0], scale[1]);
        // Tiepoint maps raster (i, j) to model (x, y); shift back to (0, 0).
        let origin_lon = tiepoint[3] - tiepoint[0] * px_w_deg;
        let origin_lat = tiepoint[4] + tiepoint[1] * px_h_deg;

        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim().parse::<f64>().ok());

        let data: Vec<f64> = match decoder
            .read_image()
            .with_context(|| format!("[features::population] Failed to decode raster: {}", path.display()))?
        {
            DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
            DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::F64(v) => v,
        };
        ensure!(
            data.len() == (width as usize) * (height as usize),
            "[features::population] Raster is not single-band: {} samples for {}x{}",
            data.len(),
            width,
            height
        );
        let values = Array2::from_shape_vec((height as usize, width as usize), data)
            .context("[features::population] Raster shape mismatch")?;

        log::info!(
            "[population] loaded {}x{} raster, pixel {:.6}°x{:.6}°, nodata {:?}",
            width, height, px_w_deg, px_h_deg, nodata
        );
        Self::new(values, origin_lon, origin_lat, px_w_deg, px_h_deg, nodata)
    }

    #[inline] pub fn nrows(&self) -> usize { self.values.nrows() }
    #[inline] pub fn ncols(&self) -> usize { self.values.ncols() }

    /// Valid (finite, non-nodata) value at a pixel.
    fn value(&self, row: usize, col: usize) -> Option<f64> {
        let v = *self.values.get((row, col))?;
        if !v.is_finite() {
            return None;
        }
        if let Some(nodata) = self.nodata {
            if v == nodata {
                return None;
            }
        }
        Some(v)
    }

    fn pixel_centre(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_lon + (col as f64 + 0.5) * self.px_w_deg,
            self.origin_lat - (row as f64 + 0.5) * self.px_h_deg,
        )
    }

    /// Ground area of one pixel at a given latitude, km².
    fn pixel_area_km2(&self, lat: f64) -> f64 {
        let w_km = self.px_w_deg * M_PER_DEG_LON_EQUATOR * lat.to_radians().cos() / 1000.0;
        let h_km = self.px_h_deg * M_PER_DEG_LAT / 1000.0;
        w_km * h_km
    }

    /// Bilinear sample at a geographic point, skipping nodata neighbours
    /// and renormalizing the weights. `None` when every neighbour is
    /// nodata or the point is off the raster.
    pub fn sample_bilinear(&self, lon: f64, lat: f64) -> Option<f64> {
        let fx = (lon - self.origin_lon) / self.px_w_deg - 0.5;
        let fy = (self.origin_lat - lat) / self.px_h_deg - 0.5;
        if fx < -0.5 || fy < -0.5 || fx > self.ncols() as f64 - 0.5 || fy > self.nrows() as f64 - 0.5 {
            return None;
        }
        let fx = fx.clamp(0.0, (self.ncols() - 1) as f64);
        let fy = fy.clamp(0.0, (self.nrows() - 1) as f64);
        let (c0, r0) = (fx.floor() as usize, fy.floor() as usize);
        let c1 = (c0 + 1).min(self.ncols() - 1);
        let r1 = (r0 + 1).min(self.nrows() - 1);
        let (wx, wy) = (fx - c0 as f64, fy - r0 as f64);

        let mut total = 0.0;
        let mut weight = 0.0;
        for (r, c, w) in [
            (r0, c0, (1.0 - wx) * (1.0 - wy)),
            (r0, c1, wx * (1.0 - wy)),
            (r1, c0, (1.0 - wx) * wy),
            (r1, c1, wx * wy),
        ] {
            if let Some(v) = self.value(r, c) {
                total += w * v;
                weight += w;
            }
        }
        (weight > 0.0).then(|| total / weight)
    }
}

/// Per-cell population features over the full cell set.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationFeatures {
    /// Mean density, persons/km².
    pub mean_density: Vec<f64>,
}

/// Bin the raster onto the fishnet and average the density per cell.
///
/// `to_metric` projects raster coordinates into the fishnet CRS;
/// `to_geographic` is its inverse, used for the centroid fallback.
pub fn featurize(
    net: &Fishnet,
    raster: &Raster,
    units: RasterUnits,
    to_metric: &Transformer,
    to_geographic: &Transformer,
) -> Result<PopulationFeatures> {
    let (row_range, col_range) = pixel_window(net, raster, to_geographic)?;

    let mut sums = vec![0.0_f64; net.len()];
    let mut counts = vec![0u64; net.len()];
    for row in row_range {
        for col in col_range.clone() {
            let Some(value) = raster.value(row, col) else { continue };
            let (lon, lat) = raster.pixel_centre(row, col);
            let density = match units {
                RasterUnits::PersonsPerKm2 => value,
                RasterUnits::PersonsPerPixel => value / raster.pixel_area_km2(lat),
            };
            let Ok((x, y)) = to_metric.apply(lon, lat) else { continue };
            if let Some(id) = net.locate(x, y) {
                sums[(id - 1) as usize] += density;
                counts[(id - 1) as usize] += 1;
            }
        }
    }

    let size = net.cell_size_m();
    let mut uncovered = 0u64;
    let mean_density = net
        .cells()
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            if counts[i] > 0 {
                return Ok(sums[i] / counts[i] as f64);
            }
            uncovered += 1;
            let centroid = cell.centroid(size);
            let (lon, lat) = to_geographic.apply(centroid.x(), centroid.y())?;
            let fallback = match raster.sample_bilinear(lon, lat) {
                Some(value) => match units {
                    RasterUnits::PersonsPerKm2 => value,
                    RasterUnits::PersonsPerPixel => value / raster.pixel_area_km2(lat),
                },
                None => 0.0,
            };
            Ok(fallback)
        })
        .collect::<Result<Vec<f64>>>()?;

    if uncovered > 0 {
        log::debug!("[population] {uncovered} of {} cells fell back to bilinear sampling", net.len());
    }
    ensure!(
        mean_density.iter().all(|v| v.is_finite()),
        "[features::population] Non-finite mean density"
    );
    Ok(PopulationFeatures { mean_density })
}

/// Raster pixel window covering the fishnet extent, padded by one pixel.
fn pixel_window(
    net: &Fishnet,
    raster: &Raster,
    to_geographic: &Transformer,
) -> Result<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let size = net.cell_size_m();
    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for cell in net.cells() {
        min_x = min_x.min(cell.min_x);
        min_y = min_y.min(cell.min_y);
        max_x = max_x.max(cell.min_x + size);
        max_y = max_y.max(cell.min_y + size);
    }

    let (mut min_lon, mut min_lat) = (f64::INFINITY, f64::INFINITY);
    let (mut max_lon, mut max_lat) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for (x, y) in [(min_x, min_y), (min_x, max_y), (max_x, min_y), (max_x, max_y)] {
        let (lon, lat) = to_geographic.apply(x, y)?;
        min_lon = min_lon.min(lon);
        min_lat = min_lat.min(lat);
        max_lon = max_lon.max(lon);
        max_lat = max_lat.max(lat);
    }

    let col_lo = ((min_lon - raster.origin_lon) / raster.px_w_deg - 1.0).floor().max(0.0) as usize;
    let col_hi = ((max_lon - raster.origin_lon) / raster.px_w_deg + 1.0).ceil() as usize;
    let row_lo = ((raster.origin_lat - max_lat) / raster.px_h_deg - 1.0).floor().max(0.0) as usize;
    let row_hi = ((raster.origin_lat - min_lat) / raster.px_h_deg + 1.0).ceil() as usize;
    if col_lo >= raster.ncols() || row_lo >= raster.nrows() {
        bail!("[features::population] Raster does not overlap the fishnet extent");
    }
    Ok((row_lo..row_hi.min(raster.nrows()), col_lo..col_hi.min(raster.ncols())))
}

/// Build the population feature frame: mean density, total persons per cell
/// and the density in kilo-persons/km², full grid coverage.
pub fn to_frame(net: &Fishnet, features: &PopulationFeatures) -> Result<DataFrame> {
    ensure!(
        features.mean_density.len() == net.len(),
        "[features::population] Features cover {} cells, fishnet has {}",
        features.mean_density.len(),
        net.len()
    );
    let area_km2 = net.cell_area_km2();
    let ids: Vec<u32> = net.ids().collect();
    let persons: Vec<f64> = features.mean_density.iter().map(|d| d * area_km2).collect();
    let kdensity: Vec<f64> = features.mean_density.iter().map(|d| d / 1000.0).collect();
    let df = DataFrame::new(vec![
        Series::new("grid_id".into(), ids).into(),
        Series::new("population_density_persons_per_km2".into(), features.mean_density.clone()).into(),
        Series::new("persons".into(), persons).into(),
        Series::new("population_density_kpersons_per_km2".into(), kdensity).into(),
    ])?;
    Ok(df)
}

pub fn write_features(net: &Fishnet, features: &PopulationFeatures, path: &Path) -> Result<()> {
    write_csv(&to_frame(net, features)?, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::crs::EPSG_WGS84;
    use crate::fishnet;
    use geo::{Coord, MultiPolygon, Rect};

    /// A fishnet whose cells sit on real Gauss-Krüger coordinates near
    /// Xi'an, so projection round-trips are exercised for real.
    fn xian_net(cols: u32, rows: u32) -> (Fishnet, Transformer, Transformer) {
        let fwd = Transformer::wgs84_to(4547).unwrap();
        let inv = Transformer::new(4547, EPSG_WGS84).unwrap();
        let (x0, y0) = fwd.apply(108.9, 34.2).unwrap();
        // Anchor the boundary to a clean 500 m lattice point.
        let (x0, y0) = ((x0 / 500.0).round() * 500.0, (y0 / 500.0).round() * 500.0);
        let boundary = MultiPolygon(vec![
            Rect::new(
                Coord { x: x0, y: y0 },
                Coord { x: x0 + cols as f64 * 500.0, y: y0 + rows as f64 * 500.0 },
            )
            .to_polygon(),
        ]);
        (fishnet::build(&boundary, 500.0, 4547).unwrap(), fwd, inv)
    }

    /// A constant-valued raster generously covering the fishnet.
    fn constant_raster(net: &Fishnet, inv: &Transformer, value: f64) -> Raster {
        let cell = net.cells()[0];
        let (lon, lat) = inv.apply(cell.min_x, cell.min_y).unwrap();
        Raster::new(
            Array2::from_elem((200, 200), value),
            lon - 0.1,
            lat + 0.1,
            0.002,
            0.002,
            None,
        )
        .unwrap()
    }

    #[test]
    fn constant_raster_gives_constant_density() {
        let (net, fwd, inv) = xian_net(2, 2);
        let raster = constant_raster(&net, &inv, 1234.5);
        let features =
            featurize(&net, &raster, RasterUnits::PersonsPerKm2, &fwd, &inv).unwrap();
        for d in &features.mean_density {
            assert!((d - 1234.5).abs() < 1e-9);
        }
    }

    #[test]
    fn nodata_pixels_are_excluded_from_the_mean() {
        let (net, fwd, inv) = xian_net(1, 1);
        let mut raster = constant_raster(&net, &inv, 100.0);
        // Poison half the raster with the nodata marker.
        raster.nodata = Some(-999.0);
        for row in 0..raster.values.nrows() {
            for col in 0..raster.values.ncols() {
                if col % 2 == 0 {
                    raster.values[(row, col)] = -999.0;
                }
            }
        }
        let features =
            featurize(&net, &raster, RasterUnits::PersonsPerKm2, &fwd, &inv).unwrap();
        assert!((features.mean_density[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn persons_per_pixel_units_are_converted() {
        let (net, fwd, inv) = xian_net(1, 1);
        let raster = constant_raster(&net, &inv, 50.0);
        let area = raster.pixel_area_km2(34.2);
        let features =
            featurize(&net, &raster, RasterUnits::PersonsPerPixel, &fwd, &inv).unwrap();
        // Within a cell the latitude varies little; the density should be
        // close to value / pixel_area.
        assert!((features.mean_density[0] / (50.0 / area) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn non_overlapping_raster_is_fatal() {
        let (net, fwd, inv) = xian_net(1, 1);
        let raster =
            Raster::new(Array2::from_elem((10, 10), 1.0), 0.0, 0.0, 0.01, 0.01, None).unwrap();
        assert!(featurize(&net, &raster, RasterUnits::PersonsPerKm2, &fwd, &inv).is_err());
    }

    #[test]
    fn bilinear_sample_interpolates() {
        let mut values = Array2::zeros((2, 2));
        values[(0, 0)] = 0.0;
        values[(0, 1)] = 10.0;
        values[(1, 0)] = 20.0;
        values[(1, 1)] = 30.0;
        let raster = Raster::new(values, 0.0, 2.0, 1.0, 1.0, None).unwrap();
        // Midpoint of all four pixel centres.
        let v = raster.sample_bilinear(1.0, 1.0).unwrap();
        assert!((v - 15.0).abs() < 1e-9);
        // On the top-left pixel centre exactly.
        let v = raster.sample_bilinear(0.5, 1.5).unwrap();
        assert!(v.abs() < 1e-9);
        // Far off the raster.
        assert!(raster.sample_bilinear(50.0, 50.0).is_none());
    }

    #[test]
    fn to_frame_derives_persons_from_area() {
        let (net, _, _) = xian_net(1, 1);
        let features = PopulationFeatures { mean_density: vec![4000.0] };
        let df = to_frame(&net, &features).unwrap();
        let persons = df.column("persons").unwrap().f64().unwrap().get(0).unwrap();
        assert!((persons - 1000.0).abs() < 1e-9);
        let kd = df
            .column("population_density_kpersons_per_km2")
            .unwrap()
            .f64()
            .unwrap()
            .get(0)
            .unwrap();
        assert!((kd - 4.0).abs() < 1e-12);
    }
}
