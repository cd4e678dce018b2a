//! CRS handling.
//!
//! All spatial computation happens in one metric CRS (default EPSG 4547,
//! CGCS2000 3° Gauss-Krüger). Inputs arriving in any other CRS are
//! reprojected on ingress through a [`Transformer`]; nothing downstream ever
//! mixes degree-valued and metre-valued coordinates.

use anyhow::{Context, Result, anyhow, bail};
use geo::{Coord, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};

/// WGS84 geographic coordinates, the CRS of raw OD and POI inputs.
pub const EPSG_WGS84: u32 = 4326;

/// Build a PROJ.4 definition for a supported EPSG code.
///
/// The CGCS2000 3-degree Gauss-Krüger "CM" series (EPSG 4534–4554) covers
/// central meridians 75°E through 135°E in 3° steps with a 500 km false
/// easting; EPSG 4547 (CM 114°E) is the default metric CRS here.
fn proj4_definition(epsg: u32) -> Result<String> {
    match epsg {
        4326 => Ok("+proj=longlat +datum=WGS84 +no_defs +type=crs".to_string()),
        // CGCS2000 geographic
        4490 => Ok("+proj=longlat +ellps=GRS80 +no_defs +type=crs".to_string()),
        4534..=4554 => {
            let lon_0 = 75 + 3 * (epsg - 4534);
            Ok(format!(
                "+proj=tmerc +lat_0=0 +lon_0={lon_0} +k=1 +x_0=500000 +y_0=0 +ellps=GRS80 +units=m +no_defs +type=crs"
            ))
        }
        _ => bail!("[common::crs] Unknown or unsupported CRS: EPSG:{epsg}"),
    }
}

fn is_geographic(epsg: u32) -> bool {
    matches!(epsg, 4326 | 4490)
}

/// A reusable transform between two EPSG-identified CRSs.
///
/// proj4rs works in radians for geographic CRSs; the degree conversion is
/// handled in code on both sides, so callers always see degrees for
/// geographic coordinates and metres for projected ones.
pub struct Transformer {
    from: Proj4,
    to: Proj4,
    from_geographic: bool,
    to_geographic: bool,
}

impl Transformer {
    pub fn new(from_epsg: u32, to_epsg: u32) -> Result<Self> {
        let from = {
            let proj_string = proj4_definition(from_epsg)?;
            Proj4::from_proj_string(&proj_string)
                .with_context(|| anyhow!("[common::crs] failed to build source PROJ.4: {proj_string}"))?
        };
        let to = {
            let proj_string = proj4_definition(to_epsg)?;
            Proj4::from_proj_string(&proj_string)
                .with_context(|| anyhow!("[common::crs] failed to build target PROJ.4: {proj_string}"))?
        };
        Ok(Self {
            from,
            to,
            from_geographic: is_geographic(from_epsg),
            to_geographic: is_geographic(to_epsg),
        })
    }

    /// The standard ingress transform: WGS84 lon/lat to the metric CRS.
    pub fn wgs84_to(metric_epsg: u32) -> Result<Self> {
        Self::new(EPSG_WGS84, metric_epsg)
    }

    /// Transform a single coordinate pair (always-xy order).
    pub fn apply(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            bail!("[common::crs] non-finite coordinate ({x}, {y})");
        }
        let mut point = if self.from_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.from, &self.to, &mut point)
            .map_err(|e| anyhow!("[common::crs] transform failed for ({x}, {y}): {e}"))?;
        if self.to_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }

    /// Reproject a whole MultiPolygon coordinate by coordinate.
    pub fn apply_multi_polygon(&self, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        use geo::MapCoords;
        let failure: std::cell::RefCell<Option<anyhow::Error>> = std::cell::RefCell::new(None);
        let projected = shape.map_coords(|coord: Coord<f64>| match self.apply(coord.x, coord.y) {
            Ok((x, y)) => Coord { x, y },
            Err(e) => {
                failure.borrow_mut().get_or_insert(e);
                Coord { x: f64::NAN, y: f64::NAN }
            }
        });
        match failure.into_inner() {
            Some(e) => Err(e),
            None => Ok(projected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_epsg_rejected() {
        assert!(Transformer::new(4326, 9999).is_err());
    }

    #[test]
    fn xian_projects_into_plausible_gauss_krueger_range() {
        let t = Transformer::wgs84_to(4547).unwrap();
        let (x, y) = t.apply(108.9462, 34.2587).unwrap();
        // CM 114°E, 500 km false easting: Xi'an sits well west of the meridian.
        assert!(x < 500_000.0);
        assert!((3_000_000.0..4_500_000.0).contains(&y));
    }

    #[test]
    fn round_trip_within_one_centimetre() {
        let fwd = Transformer::wgs84_to(4547).unwrap();
        let inv = Transformer::new(4547, EPSG_WGS84).unwrap();
        for (lon, lat) in [(108.3, 34.05), (108.9462, 34.2587), (109.4, 34.9)] {
            let (x, y) = fwd.apply(lon, lat).unwrap();
            let (lon2, lat2) = inv.apply(x, y).unwrap();
            // 1e-7 degrees is about 1 cm on the ground.
            assert!((lon - lon2).abs() < 1e-7, "lon drift: {lon} -> {lon2}");
            assert!((lat - lat2).abs() < 1e-7, "lat drift: {lat} -> {lat2}");
        }
    }

    #[test]
    fn non_finite_coordinates_are_an_error() {
        let t = Transformer::wgs84_to(4547).unwrap();
        assert!(t.apply(f64::NAN, 34.0).is_err());
    }
}
