//! Projection adapter.
//!
//! Three coordinate reference systems are supported:
//! - `EPSG:4326` geographic longitude/latitude (degrees, WGS84)
//! - `EPSG:27700` British National Grid (meters, Airy 1830 / OSGB36)
//! - `EPSG:3857` spherical Web Mercator (meters), the display projection
//!
//! The British National Grid definition is the one published with proj4:
//! `+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000
//! +ellps=airy +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489`.
//! Its constants are derived once per process in [`registry`].

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::debug;

use super::{Ellipsoid, Geodetic, Helmert, WGS84_A, ecef_to_geodetic, geodetic_to_ecef};
use crate::bounds::Extent;

/// Latitude limit of the square Web Mercator world.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;
/// Samples per edge when reprojecting an extent.
const EXTENT_EDGE_SAMPLES: usize = 8;
const TM_ARC_TOLERANCE_M: f64 = 1e-9;
const TM_MAX_ITERATIONS: usize = 32;
const BNG_REFINEMENT_STEPS: usize = 6;
const BNG_REFINEMENT_TOLERANCE_M: f64 = 1e-7;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Projection {
    /// EPSG:4326, `[lon, lat]` in degrees.
    Geographic,
    /// EPSG:27700, `[easting, northing]` in meters.
    BritishNationalGrid,
    /// EPSG:3857, `[x, y]` in meters.
    WebMercator,
}

impl Projection {
    /// The projection every in-memory feature is held in.
    pub const DISPLAY: Projection = Projection::WebMercator;

    pub fn code(self) -> &'static str {
        match self {
            Projection::Geographic => "EPSG:4326",
            Projection::BritishNationalGrid => "EPSG:27700",
            Projection::WebMercator => "EPSG:3857",
        }
    }

    pub fn is_geographic(self) -> bool {
        self == Projection::Geographic
    }

    /// Largest difference still considered "the same position" in this
    /// projection's units.
    pub fn tolerance(self) -> f64 {
        if self.is_geographic() { 1e-6 } else { 1e-3 }
    }

    fn from_epsg(epsg: u32) -> Option<Self> {
        match epsg {
            4326 => Some(Projection::Geographic),
            27700 => Some(Projection::BritishNationalGrid),
            3857 => Some(Projection::WebMercator),
            _ => None,
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("unsupported projection identifier: {0}")]
    Unsupported(String),
}

impl FromStr for Projection {
    type Err = ProjectionError;

    /// Accepts `EPSG:<n>` (any case) and `urn:ogc:def:crs:EPSG::<n>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let number = upper
            .strip_prefix("EPSG:")
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG::"));

        number
            .and_then(|n| n.parse::<u32>().ok())
            .and_then(Projection::from_epsg)
            .ok_or_else(|| ProjectionError::Unsupported(trimmed.to_string()))
    }
}

/// A position tagged with the projection its numbers are expressed in.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub projection: Projection,
}

impl Coordinate {
    pub fn new(x: f64, y: f64, projection: Projection) -> Self {
        Self { x, y, projection }
    }

    pub fn display(x: f64, y: f64) -> Self {
        Self::new(x, y, Projection::DISPLAY)
    }

    pub fn xy(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    pub fn to(self, projection: Projection) -> Coordinate {
        convert(self, projection)
    }
}

/// Converts a tagged coordinate into `to`.
pub fn convert(coordinate: Coordinate, to: Projection) -> Coordinate {
    let [x, y] = convert_xy(coordinate.xy(), coordinate.projection, to);
    Coordinate::new(x, y, to)
}

pub fn convert_xy(xy: [f64; 2], from: Projection, to: Projection) -> [f64; 2] {
    registry().convert_xy(xy, from, to)
}

/// Reprojects an extent by sampling along its edges, so the result bounds
/// edges that curve in the target projection.
pub fn convert_extent(extent: &Extent, from: Projection, to: Projection) -> Extent {
    if from == to || extent.is_empty() {
        return *extent;
    }
    let reg = registry();
    let mut out = Extent::empty();
    let [x0, y0] = extent.min;
    let [x1, y1] = extent.max;
    for i in 0..=EXTENT_EDGE_SAMPLES {
        let t = i as f64 / EXTENT_EDGE_SAMPLES as f64;
        let x = x0 + (x1 - x0) * t;
        let y = y0 + (y1 - y0) * t;
        for p in [[x, y0], [x, y1], [x0, y], [x1, y]] {
            out.extend(reg.convert_xy(p, from, to));
        }
    }
    out
}

/// Process-wide projection definitions.
pub struct ProjectionRegistry {
    british_national_grid: BritishNationalGrid,
}

static REGISTRY: Lazy<ProjectionRegistry> = Lazy::new(|| {
    debug!("registering projection definitions (EPSG:4326, EPSG:27700, EPSG:3857)");
    ProjectionRegistry {
        british_national_grid: BritishNationalGrid::osgb36(),
    }
});

/// Returns the registry, building it on first use.
pub fn registry() -> &'static ProjectionRegistry {
    &REGISTRY
}

impl ProjectionRegistry {
    pub fn convert_xy(&self, xy: [f64; 2], from: Projection, to: Projection) -> [f64; 2] {
        if from == to {
            return xy;
        }
        let lon_lat = self.to_geographic(xy, from);
        self.from_geographic(lon_lat, to)
    }

    fn to_geographic(&self, xy: [f64; 2], from: Projection) -> [f64; 2] {
        match from {
            Projection::Geographic => xy,
            Projection::WebMercator => mercator_to_lon_lat(xy),
            Projection::BritishNationalGrid => self.british_national_grid.to_wgs84(xy),
        }
    }

    fn from_geographic(&self, lon_lat: [f64; 2], to: Projection) -> [f64; 2] {
        match to {
            Projection::Geographic => lon_lat,
            Projection::WebMercator => lon_lat_to_mercator(lon_lat),
            Projection::BritishNationalGrid => self.british_national_grid.from_wgs84(lon_lat),
        }
    }
}

fn lon_lat_to_mercator([lon, lat]: [f64; 2]) -> [f64; 2] {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT);
    let x = WGS84_A * lon.to_radians();
    let y = WGS84_A * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    [x, y]
}

fn mercator_to_lon_lat([x, y]: [f64; 2]) -> [f64; 2] {
    let lon = (x / WGS84_A).to_degrees();
    let lat = (2.0 * (y / WGS84_A).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees();
    [lon, lat]
}

/// Ellipsoidal transverse Mercator using the Ordnance Survey series
/// expansions (accurate to well under a millimeter across Great Britain).
#[derive(Debug, Copy, Clone)]
struct TransverseMercator {
    ellipsoid: Ellipsoid,
    lat0: f64,
    lon0: f64,
    k0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl TransverseMercator {
    fn meridional_arc(&self, lat: f64) -> f64 {
        let a = self.ellipsoid.a;
        let b = self.ellipsoid.b();
        let n = (a - b) / (a + b);
        let n2 = n * n;
        let n3 = n2 * n;
        let d = lat - self.lat0;
        let s = lat + self.lat0;

        let ma = (1.0 + n + 1.25 * n2 + 1.25 * n3) * d;
        let mb = (3.0 * n + 3.0 * n2 + 2.625 * n3) * d.sin() * s.cos();
        let mc = (1.875 * n2 + 1.875 * n3) * (2.0 * d).sin() * (2.0 * s).cos();
        let md = (35.0 / 24.0) * n3 * (3.0 * d).sin() * (3.0 * s).cos();
        b * self.k0 * (ma - mb + mc - md)
    }

    /// `(nu, rho, eta2)`: scaled transverse and meridional radii of curvature.
    fn radii(&self, lat: f64) -> (f64, f64, f64) {
        let a = self.ellipsoid.a;
        let e2 = self.ellipsoid.e2();
        let s = lat.sin();
        let t = 1.0 - e2 * s * s;
        let nu = a * self.k0 / t.sqrt();
        let rho = a * self.k0 * (1.0 - e2) * t.powf(-1.5);
        (nu, rho, nu / rho - 1.0)
    }

    fn forward(&self, lat: f64, lon: f64) -> [f64; 2] {
        let (nu, rho, eta2) = self.radii(lat);
        let m = self.meridional_arc(lat);
        let (s, c) = lat.sin_cos();
        let t2 = lat.tan().powi(2);
        let t4 = t2 * t2;
        let c3 = c * c * c;
        let c5 = c3 * c * c;

        let i = m + self.false_northing;
        let ii = nu / 2.0 * s * c;
        let iii = nu / 24.0 * s * c3 * (5.0 - t2 + 9.0 * eta2);
        let iiia = nu / 720.0 * s * c5 * (61.0 - 58.0 * t2 + t4);
        let iv = nu * c;
        let v = nu / 6.0 * c3 * (nu / rho - t2);
        let vi = nu / 120.0 * c5 * (5.0 - 18.0 * t2 + t4 + 14.0 * eta2 - 58.0 * t2 * eta2);

        let dl = lon - self.lon0;
        let dl2 = dl * dl;
        let northing = i + ii * dl2 + iii * dl2 * dl2 + iiia * dl2 * dl2 * dl2;
        let easting = self.false_easting + iv * dl + v * dl2 * dl + vi * dl2 * dl2 * dl;
        [easting, northing]
    }

    /// Returns `(lat, lon)` in radians.
    fn inverse(&self, [easting, northing]: [f64; 2]) -> (f64, f64) {
        let ak0 = self.ellipsoid.a * self.k0;
        let mut lat = (northing - self.false_northing) / ak0 + self.lat0;
        let mut m = self.meridional_arc(lat);
        for _ in 0..TM_MAX_ITERATIONS {
            let residual = northing - self.false_northing - m;
            if residual.abs() < TM_ARC_TOLERANCE_M {
                break;
            }
            lat += residual / ak0;
            m = self.meridional_arc(lat);
        }

        let (nu, rho, eta2) = self.radii(lat);
        let t = lat.tan();
        let t2 = t * t;
        let t4 = t2 * t2;
        let t6 = t4 * t2;
        let sec = 1.0 / lat.cos();
        let nu3 = nu * nu * nu;
        let nu5 = nu3 * nu * nu;
        let nu7 = nu5 * nu * nu;

        let vii = t / (2.0 * rho * nu);
        let viii = t / (24.0 * rho * nu3) * (5.0 + 3.0 * t2 + eta2 - 9.0 * t2 * eta2);
        let ix = t / (720.0 * rho * nu5) * (61.0 + 90.0 * t2 + 45.0 * t4);
        let x = sec / nu;
        let xi = sec / (6.0 * nu3) * (nu / rho + 2.0 * t2);
        let xii = sec / (120.0 * nu5) * (5.0 + 28.0 * t2 + 24.0 * t4);
        let xiia = sec / (5040.0 * nu7) * (61.0 + 662.0 * t2 + 1320.0 * t4 + 720.0 * t6);

        let de = easting - self.false_easting;
        let de2 = de * de;
        let out_lat = lat - vii * de2 + viii * de2 * de2 - ix * de2 * de2 * de2;
        let out_lon = self.lon0 + x * de - xi * de2 * de + xii * de2 * de2 * de
            - xiia * de2 * de2 * de2 * de;
        (out_lat, out_lon)
    }
}

#[derive(Debug, Copy, Clone)]
struct BritishNationalGrid {
    grid: TransverseMercator,
    to_wgs84: Helmert,
}

impl BritishNationalGrid {
    fn osgb36() -> Self {
        Self {
            grid: TransverseMercator {
                ellipsoid: Ellipsoid::AIRY_1830,
                lat0: 49f64.to_radians(),
                lon0: (-2f64).to_radians(),
                k0: 0.999_601_271_7,
                false_easting: 400_000.0,
                false_northing: -100_000.0,
            },
            to_wgs84: Helmert::new(
                [446.448, -125.157, 542.06],
                [0.15, 0.247, 0.842],
                -20.489,
            ),
        }
    }

    fn from_wgs84(&self, [lon, lat]: [f64; 2]) -> [f64; 2] {
        let wgs84 = geodetic_to_ecef(Geodetic::from_degrees(lon, lat), Ellipsoid::WGS84);
        let airy = ecef_to_geodetic(self.to_wgs84.invert(wgs84), Ellipsoid::AIRY_1830);
        self.grid.forward(airy.lat_rad, airy.lon_rad)
    }

    /// Direct inverse; the ellipsoidal height dropped on the way out makes it
    /// disagree with `from_wgs84` by a few tenths of a millimeter.
    fn to_wgs84_direct(&self, en: [f64; 2]) -> [f64; 2] {
        let (lat, lon) = self.grid.inverse(en);
        let airy = geodetic_to_ecef(Geodetic::new(lat, lon, 0.0), Ellipsoid::AIRY_1830);
        ecef_to_geodetic(self.to_wgs84.apply(airy), Ellipsoid::WGS84).lon_lat_deg()
    }

    /// Inverse refined against `from_wgs84`, so the two are exact inverses.
    fn to_wgs84(&self, en: [f64; 2]) -> [f64; 2] {
        let target = self.to_wgs84_direct(en);
        let mut guess = target;
        for _ in 0..BNG_REFINEMENT_STEPS {
            let back = self.from_wgs84(guess);
            if (back[0] - en[0]).abs() < BNG_REFINEMENT_TOLERANCE_M
                && (back[1] - en[1]).abs() < BNG_REFINEMENT_TOLERANCE_M
            {
                break;
            }
            let drift = self.to_wgs84_direct(back);
            guess = [
                guess[0] + target[0] - drift[0],
                guess[1] + target[1] - drift[1],
            ];
        }
        guess
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BritishNationalGrid, Coordinate, Projection, ProjectionError, convert, convert_extent,
        convert_xy,
    };
    use crate::bounds::Extent;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn parses_epsg_and_urn_codes() {
        assert_eq!("EPSG:27700".parse::<Projection>(), Ok(Projection::BritishNationalGrid));
        assert_eq!("epsg:3857".parse::<Projection>(), Ok(Projection::WebMercator));
        assert_eq!(
            "urn:ogc:def:crs:EPSG::4326".parse::<Projection>(),
            Ok(Projection::Geographic)
        );
        assert_eq!(
            "EPSG:2154".parse::<Projection>(),
            Err(ProjectionError::Unsupported("EPSG:2154".to_string()))
        );
        assert!("not a crs".parse::<Projection>().is_err());
    }

    #[test]
    fn code_round_trips_through_parse() {
        for p in [
            Projection::Geographic,
            Projection::BritishNationalGrid,
            Projection::WebMercator,
        ] {
            assert_eq!(p.code().parse::<Projection>(), Ok(p));
            assert_eq!(p.to_string(), p.code());
        }
    }

    #[test]
    fn mercator_origin_and_antimeridian() {
        let o = convert_xy([0.0, 0.0], Projection::Geographic, Projection::WebMercator);
        assert_close(o[0], 0.0, 1e-9);
        assert_close(o[1], 0.0, 1e-9);

        let e = convert_xy([180.0, 0.0], Projection::Geographic, Projection::WebMercator);
        assert_close(e[0], 20_037_508.342_789_244, 1e-6);
    }

    #[test]
    fn mercator_round_trip_in_london() {
        let c = Coordinate::new(-0.127_758, 51.507_351, Projection::Geographic);
        let back = c.to(Projection::WebMercator).to(Projection::Geographic);
        assert_eq!(back.projection, Projection::Geographic);
        assert_close(back.x, c.x, 1e-9);
        assert_close(back.y, c.y, 1e-9);
    }

    #[test]
    fn grid_projection_matches_ordnance_survey_worked_example() {
        // Airy 1830 latitude/longitude from the OS coordinate-systems guide.
        let bng = BritishNationalGrid::osgb36();
        let lat = (52.0 + 39.0 / 60.0 + 27.2531 / 3600.0_f64).to_radians();
        let lon = (1.0 + 43.0 / 60.0 + 4.5177 / 3600.0_f64).to_radians();
        let [e, n] = bng.grid.forward(lat, lon);
        assert_close(e, 651_409.903, 2e-3);
        assert_close(n, 313_177.270, 2e-3);

        let (lat_rt, lon_rt) = bng.grid.inverse([e, n]);
        assert_close(lat_rt, lat, 1e-8);
        assert_close(lon_rt, lon, 1e-8);
    }

    #[test]
    fn true_origin_lands_near_false_origin() {
        // The datum shift between WGS84 and OSGB36 is on the order of 100 m.
        let [e, n] = convert_xy(
            [-2.0, 49.0],
            Projection::Geographic,
            Projection::BritishNationalGrid,
        );
        assert_close(e, 400_000.0, 200.0);
        assert_close(n, -100_000.0, 200.0);
    }

    #[test]
    fn grid_round_trip_is_sub_millimeter() {
        for lon_lat in [[-0.127_758, 51.507_351], [-3.188, 55.953], [-5.7, 50.07]] {
            let display = convert_xy(lon_lat, Projection::Geographic, Projection::DISPLAY);
            let grid = convert_xy(display, Projection::DISPLAY, Projection::BritishNationalGrid);
            let back = convert_xy(grid, Projection::BritishNationalGrid, Projection::DISPLAY);
            assert_close(back[0], display[0], 1e-4);
            assert_close(back[1], display[1], 1e-4);
        }
    }

    #[test]
    fn identity_conversion_returns_input() {
        let c = Coordinate::display(123.0, -456.0);
        assert_eq!(convert(c, Projection::DISPLAY), c);
    }

    #[test]
    fn extent_conversion_bounds_all_corners() {
        let ext = Extent::new([-1.0, 51.0], [0.0, 52.0]);
        let out = convert_extent(&ext, Projection::Geographic, Projection::BritishNationalGrid);
        for corner in [[-1.0, 51.0], [0.0, 51.0], [-1.0, 52.0], [0.0, 52.0]] {
            let p = convert_xy(corner, Projection::Geographic, Projection::BritishNationalGrid);
            assert!(out.contains(p), "{p:?} outside {out:?}");
        }
        assert!(convert_extent(&Extent::empty(), Projection::Geographic, Projection::DISPLAY)
            .is_empty());
    }
}
