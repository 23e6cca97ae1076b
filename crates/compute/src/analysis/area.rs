use std::fmt;
use std::str::FromStr;

use foundation::math::{Projection, convert_xy, round_to};
use geo::LineString;
use scene::{AREA_HECTARES_KEY, AREA_SQUARE_METRES_KEY, Feature, FeatureGeometry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SQUARE_METRES_PER_HECTARE: f64 = 10_000.0;

/// Mean earth radius (IUGG), the sphere web maps measure area on.
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AreaUnit {
    #[default]
    #[serde(rename = "m2")]
    SquareMetres,
    #[serde(rename = "ha")]
    Hectares,
}

impl AreaUnit {
    pub fn code(self) -> &'static str {
        match self {
            AreaUnit::SquareMetres => "m2",
            AreaUnit::Hectares => "ha",
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            AreaUnit::SquareMetres => "m²",
            AreaUnit::Hectares => "ha",
        }
    }
}

impl fmt::Display for AreaUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AreaUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "m2" => Ok(AreaUnit::SquareMetres),
            "ha" => Ok(AreaUnit::Hectares),
            other => Err(format!("unknown area unit: {other} (expected m2 or ha)")),
        }
    }
}

/// How the hectare figure relates to the rounded square-metre figure.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaRounding {
    /// Hectares are derived from square metres already rounded to 2 dp.
    #[default]
    Legacy,
    /// Hectares are derived from the unrounded area.
    Independent,
}

/// Unrounded spherical area in square metres of a display-projection
/// geometry. Holes are subtracted and multipolygon parts summed; points and
/// degenerate rings contribute nothing.
pub fn geodesic_area_m2(geometry: &FeatureGeometry) -> f64 {
    if !geometry.is_areal() {
        return 0.0;
    }
    let geographic =
        geometry.map_coords(|xy| convert_xy(xy, Projection::DISPLAY, Projection::Geographic));
    let total: f64 = geographic
        .polygons()
        .iter()
        .map(|p| {
            let holes: f64 = p.interiors().iter().map(ring_area).sum();
            (ring_area(p.exterior()) - holes).max(0.0)
        })
        .sum();
    if total.is_finite() { total } else { 0.0 }
}

/// Orientation-independent area enclosed by one lon/lat ring, by the
/// Chamberlain-Duquette spherical excess on the mean earth sphere.
fn ring_area(ring: &LineString<f64>) -> f64 {
    let sum: f64 = ring
        .lines()
        .map(|line| {
            let (a, b) = (line.start, line.end);
            (b.x - a.x).to_radians() * (2.0 + a.y.to_radians().sin() + b.y.to_radians().sin())
        })
        .sum();
    (sum * EARTH_MEAN_RADIUS_M * EARTH_MEAN_RADIUS_M / 2.0).abs()
}

pub fn area(geometry: &FeatureGeometry, unit: AreaUnit, rounding: AreaRounding) -> f64 {
    area_in_unit(geodesic_area_m2(geometry), unit, rounding)
}

/// Rounds an unrounded square-metre figure and expresses it in `unit`.
pub fn area_in_unit(raw: f64, unit: AreaUnit, rounding: AreaRounding) -> f64 {
    let square_metres = round_to(raw, 2);
    match (unit, rounding) {
        (AreaUnit::SquareMetres, _) => square_metres,
        (AreaUnit::Hectares, AreaRounding::Legacy) => square_metres / SQUARE_METRES_PER_HECTARE,
        (AreaUnit::Hectares, AreaRounding::Independent) => raw / SQUARE_METRES_PER_HECTARE,
    }
}

/// `"<n> m²"` or `"<n> ha"`.
pub fn format_area(geometry: &FeatureGeometry, unit: AreaUnit, rounding: AreaRounding) -> String {
    format!("{} {}", area(geometry, unit, rounding), unit.suffix())
}

/// Writes both formatted areas onto the feature's property bag.
pub fn apply_area_properties(feature: &mut Feature, rounding: AreaRounding) {
    for (key, unit) in [
        (AREA_SQUARE_METRES_KEY, AreaUnit::SquareMetres),
        (AREA_HECTARES_KEY, AreaUnit::Hectares),
    ] {
        let formatted = format_area(&feature.geometry, unit, rounding);
        feature
            .properties
            .insert(key.to_string(), Value::String(formatted));
    }
}
