//! GeoJSON codec for drawing and parcel features.
//!
//! Decoding accepts a `Feature` or a `FeatureCollection` whose coordinates are
//! expressed in a caller-chosen projection, and always yields features in the
//! display projection. Encoding converts back only when the requested
//! projection differs from the display projection.

use foundation::math::{Projection, convert_xy};
use geojson::feature::Id;
use scene::{Feature, FeatureGeometry};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryFormatError {
    #[error("JSON parse error: {0}")]
    Json(String),
    #[error("GeoJSON object must be a JSON object")]
    NotAnObject,
    #[error("GeoJSON object is missing \"type\"")]
    MissingType,
    #[error("expected a GeoJSON Feature or FeatureCollection, found {0}")]
    UnexpectedType(String),
    #[error("invalid feature at index {index}: {reason}")]
    InvalidFeature { index: usize, reason: String },
}

/// Decodes a GeoJSON `Feature` or `FeatureCollection` into display-projection
/// features. Any malformed member fails the whole decode.
pub fn decode(value: &Value, data_projection: Projection) -> Result<Vec<Feature>, GeometryFormatError> {
    let obj = value.as_object().ok_or(GeometryFormatError::NotAnObject)?;
    let ty = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(GeometryFormatError::MissingType)?;

    match ty {
        "Feature" => Ok(vec![
            decode_feature(value, data_projection)
                .map_err(|reason| GeometryFormatError::InvalidFeature { index: 0, reason })?,
        ]),
        "FeatureCollection" => {
            let items = obj
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| GeometryFormatError::InvalidFeature {
                    index: 0,
                    reason: "FeatureCollection missing features array".to_string(),
                })?;
            let features = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    decode_feature(item, data_projection)
                        .map_err(|reason| GeometryFormatError::InvalidFeature { index, reason })
                })
                .collect::<Result<Vec<_>, _>>()?;
            debug!("decoded {} feature(s) from {data_projection}", features.len());
            Ok(features)
        }
        other => Err(GeometryFormatError::UnexpectedType(other.to_string())),
    }
}

pub fn decode_str(payload: &str, data_projection: Projection) -> Result<Vec<Feature>, GeometryFormatError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| GeometryFormatError::Json(e.to_string()))?;
    decode(&value, data_projection)
}

fn decode_feature(value: &Value, data_projection: Projection) -> Result<Feature, String> {
    let parsed = geojson::Feature::from_json_value(value.clone()).map_err(|e| e.to_string())?;

    let id = match parsed.id {
        Some(Id::String(s)) => Some(s),
        Some(Id::Number(n)) => Some(n.to_string()),
        None => None,
    };
    let geometry = match parsed.geometry {
        Some(g) => convert_geometry(g.value)?,
        None => return Err("feature has no geometry".to_string()),
    };
    let geometry = if data_projection == Projection::DISPLAY {
        geometry
    } else {
        geometry.map_coords(|xy| convert_xy(xy, data_projection, Projection::DISPLAY))
    };

    Ok(Feature {
        id,
        geometry,
        properties: parsed.properties.unwrap_or_default(),
    })
}

fn convert_geometry(value: geojson::Value) -> Result<FeatureGeometry, String> {
    match value {
        geojson::Value::Point(p) => Ok(FeatureGeometry::point(position(&p)?)),
        geojson::Value::Polygon(rings) => Ok(FeatureGeometry::Polygon(rings_to_polygon(
            parse_rings(&rings)?,
        )?)),
        geojson::Value::MultiPolygon(polys) => {
            let parts = polys
                .iter()
                .map(|rings| rings_to_polygon(parse_rings(rings)?))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FeatureGeometry::MultiPolygon(geo::MultiPolygon(parts)))
        }
        other => Err(format!("unsupported geometry type: {}", other.type_name())),
    }
}

fn position(p: &[f64]) -> Result<[f64; 2], String> {
    match p {
        [x, y, ..] if x.is_finite() && y.is_finite() => Ok([*x, *y]),
        [_, _, ..] => Err("position must be finite".to_string()),
        _ => Err(format!("position must have at least 2 numbers, found {}", p.len())),
    }
}

fn parse_rings(rings: &[Vec<Vec<f64>>]) -> Result<Vec<Vec<[f64; 2]>>, String> {
    rings
        .iter()
        .map(|ring| ring.iter().map(|p| position(p)).collect())
        .collect()
}

fn rings_to_polygon(mut rings: Vec<Vec<[f64; 2]>>) -> Result<geo::Polygon<f64>, String> {
    if rings.is_empty() {
        return Err("Polygon needs an exterior ring".to_string());
    }
    let holes = rings.split_off(1);
    Ok(scene::polygon_from_rings(&rings[0], &holes))
}

/// Encodes display-projection features as a FeatureCollection in `projection`.
pub fn encode(features: &[Feature], projection: Projection) -> geojson::FeatureCollection {
    geojson::FeatureCollection {
        bbox: None,
        features: features.iter().map(|f| encode_feature(f, projection)).collect(),
        foreign_members: None,
    }
}

fn encode_feature(feature: &Feature, projection: Projection) -> geojson::Feature {
    let geometry = if projection == Projection::DISPLAY {
        feature.geometry.clone()
    } else {
        feature
            .geometry
            .map_coords(|xy| convert_xy(xy, Projection::DISPLAY, projection))
    };
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geometry_value(&geometry))),
        id: feature.id.clone().map(Id::String),
        properties: Some(feature.properties.clone()),
        foreign_members: None,
    }
}

fn geometry_value(geometry: &FeatureGeometry) -> geojson::Value {
    match geometry {
        FeatureGeometry::Point(p) => geojson::Value::Point(vec![p.x(), p.y()]),
        FeatureGeometry::Polygon(poly) => geojson::Value::Polygon(polygon_positions(poly)),
        FeatureGeometry::MultiPolygon(mp) => {
            geojson::Value::MultiPolygon(mp.0.iter().map(polygon_positions).collect())
        }
    }
}

fn polygon_positions(poly: &geo::Polygon<f64>) -> Vec<Vec<Vec<f64>>> {
    std::iter::once(poly.exterior())
        .chain(poly.interiors())
        .map(|ring| ring.coords().map(|c| vec![c.x, c.y]).collect())
        .collect()
}

/// The same features in the display projection and British National Grid,
/// keyed by projection code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedFeatures {
    #[serde(rename = "EPSG:3857")]
    pub display: geojson::FeatureCollection,
    #[serde(rename = "EPSG:27700")]
    pub british_national_grid: geojson::FeatureCollection,
}

impl ProjectedFeatures {
    pub fn is_empty(&self) -> bool {
        self.display.features.is_empty()
    }
}

pub fn encode_projected(features: &[Feature]) -> ProjectedFeatures {
    ProjectedFeatures {
        display: encode(features, Projection::DISPLAY),
        british_national_grid: encode(features, Projection::BritishNationalGrid),
    }
}

#[cfg(test)]
mod tests {
    use super::{GeometryFormatError, decode, decode_str, encode, encode_projected};
    use foundation::math::{Projection, convert_xy};
    use pretty_assertions::assert_eq;
    use scene::{Feature, FeatureGeometry};
    use serde_json::json;

    fn site(lon: f64, lat: f64) -> serde_json::Value {
        json!({
            "type": "Feature",
            "id": "site-1",
            "properties": { "name": "plot" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [lon, lat],
                    [lon + 0.001, lat],
                    [lon + 0.001, lat + 0.001],
                    [lon, lat + 0.001],
                    [lon, lat]
                ]]
            }
        })
    }

    fn assert_same_coords(a: &[Feature], b: &[Feature], eps: f64) {
        assert_eq!(a.len(), b.len());
        for (fa, fb) in a.iter().zip(b) {
            let ra = fa.geometry.rings();
            let rb = fb.geometry.rings();
            assert_eq!(ra.len(), rb.len());
            for (pa, pb) in ra.iter().flatten().zip(rb.iter().flatten()) {
                assert!((pa[0] - pb[0]).abs() <= eps, "{pa:?} vs {pb:?}");
                assert!((pa[1] - pb[1]).abs() <= eps, "{pa:?} vs {pb:?}");
            }
        }
    }

    #[test]
    fn decodes_single_feature_into_display_projection() {
        let features = decode(&site(-0.1, 51.5), Projection::Geographic).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].id.as_deref(), Some("site-1"));
        assert_eq!(features[0].property_str("name"), Some("plot"));

        let first = features[0].geometry.rings()[0][0];
        let expected = convert_xy([-0.1, 51.5], Projection::Geographic, Projection::DISPLAY);
        assert!((first[0] - expected[0]).abs() < 1e-6);
        assert!((first[1] - expected[1]).abs() < 1e-6);
    }

    #[test]
    fn decodes_feature_collection_in_order() {
        let fc = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": null,
                  "geometry": { "type": "Point", "coordinates": [1.0, 2.0] } },
                { "type": "Feature", "id": 7, "properties": {},
                  "geometry": { "type": "Point", "coordinates": [3.0, 4.0, 5.0] } }
            ]
        });
        let features = decode(&fc, Projection::DISPLAY).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].geometry, FeatureGeometry::point([1.0, 2.0]));
        assert_eq!(features[1].id.as_deref(), Some("7"));
        assert_eq!(features[1].geometry, FeatureGeometry::point([3.0, 4.0]));
    }

    #[test]
    fn rejects_malformed_input() {
        let missing_type = json!({ "features": [] });
        assert_eq!(
            decode(&missing_type, Projection::DISPLAY),
            Err(GeometryFormatError::MissingType)
        );

        let bare_geometry = json!({ "type": "Point", "coordinates": [0.0, 0.0] });
        assert_eq!(
            decode(&bare_geometry, Projection::DISPLAY),
            Err(GeometryFormatError::UnexpectedType("Point".to_string()))
        );

        let short_position = json!({
            "type": "Feature", "properties": {},
            "geometry": { "type": "Point", "coordinates": [1.0] }
        });
        assert!(matches!(
            decode(&short_position, Projection::DISPLAY),
            Err(GeometryFormatError::InvalidFeature { index: 0, .. })
        ));

        let null_geometry = json!({ "type": "Feature", "properties": {}, "geometry": null });
        assert!(decode(&null_geometry, Projection::DISPLAY).is_err());

        let line = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "properties": {},
                  "geometry": { "type": "Point", "coordinates": [0.0, 0.0] } },
                { "type": "Feature", "properties": {},
                  "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]] } }
            ]
        });
        assert!(matches!(
            decode(&line, Projection::DISPLAY),
            Err(GeometryFormatError::InvalidFeature { index: 1, .. })
        ));

        assert!(matches!(
            decode_str("{not json", Projection::DISPLAY),
            Err(GeometryFormatError::Json(_))
        ));
    }

    #[test]
    fn round_trips_through_every_projection() {
        let original = decode(&site(-1.5, 52.6), Projection::Geographic).unwrap();
        for projection in [
            Projection::Geographic,
            Projection::BritishNationalGrid,
            Projection::WebMercator,
        ] {
            let encoded = serde_json::to_value(encode(&original, projection)).unwrap();
            let decoded = decode(&encoded, projection).unwrap();
            assert_same_coords(&decoded, &original, 1e-3);
            assert_eq!(decoded[0].id, original[0].id);
            assert_eq!(decoded[0].properties, original[0].properties);
        }
    }

    fn mixed_features() -> Vec<Feature> {
        let parcel = |lon: f64, lat: f64| {
            [[lon, lat], [lon + 0.0004, lat], [lon + 0.0004, lat + 0.0003], [lon, lat + 0.0003]]
                .map(|c| convert_xy(c, Projection::Geographic, Projection::DISPLAY))
        };
        let hole = [[-1.2001, 52.1001], [-1.2001, 52.1002], [-1.2002, 52.1002]]
            .map(|c| convert_xy(c, Projection::Geographic, Projection::DISPLAY));
        let point = convert_xy([-1.21, 52.09], Projection::Geographic, Projection::DISPLAY);

        let polygon = FeatureGeometry::polygon(&parcel(-1.2003, 52.1), &[hole.to_vec()]);
        let multi = FeatureGeometry::MultiPolygon(geo::MultiPolygon(
            [parcel(-1.19, 52.1), parcel(-1.18, 52.11)]
                .iter()
                .flat_map(|ring| FeatureGeometry::polygon(ring, &[]).polygons())
                .collect(),
        ));
        vec![
            Feature::new(FeatureGeometry::point(point)).with_property("label", "1"),
            Feature::new(polygon).with_property("label", "2"),
            Feature::new(multi).with_property("label", "3"),
        ]
    }

    fn coords_in(features: &[Feature], projection: Projection) -> Vec<Vec<[f64; 2]>> {
        features
            .iter()
            .map(|f| {
                f.geometry
                    .rings()
                    .iter()
                    .flatten()
                    .map(|&xy| convert_xy(xy, Projection::DISPLAY, projection))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn mixed_geometries_round_trip_within_projection_tolerance() {
        let original = mixed_features();
        for projection in [
            Projection::Geographic,
            Projection::BritishNationalGrid,
            Projection::WebMercator,
        ] {
            let encoded = serde_json::to_value(encode(&original, projection)).unwrap();
            let decoded = decode(&encoded, projection).unwrap();
            assert_eq!(decoded.len(), original.len());
            for (d, o) in decoded.iter().zip(&original) {
                assert_eq!(d.geometry.kind(), o.geometry.kind());
                assert_eq!(d.geometry.rings().len(), o.geometry.rings().len());
                assert_eq!(d.properties, o.properties);
            }

            for check in [projection, Projection::Geographic] {
                let eps = check.tolerance();
                let want = coords_in(&original, check);
                let got = coords_in(&decoded, check);
                for (a, b) in got.iter().flatten().zip(want.iter().flatten()) {
                    assert!(
                        (a[0] - b[0]).abs() <= eps && (a[1] - b[1]).abs() <= eps,
                        "{projection} via {check}: {a:?} vs {b:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn geographic_encoding_recovers_input_degrees() {
        let features = decode(&site(-1.5, 52.6), Projection::Geographic).unwrap();
        let out = serde_json::to_value(encode(&features, Projection::Geographic)).unwrap();
        let first = &out["features"][0]["geometry"]["coordinates"][0][0];
        assert!((first[0].as_f64().unwrap() + 1.5).abs() < 1e-6);
        assert!((first[1].as_f64().unwrap() - 52.6).abs() < 1e-6);
    }

    #[test]
    fn projected_payload_is_keyed_by_code() {
        let features = decode(&site(-1.5, 52.6), Projection::Geographic).unwrap();
        let payload = serde_json::to_value(encode_projected(&features)).unwrap();
        assert_eq!(payload["EPSG:3857"]["type"], "FeatureCollection");
        assert_eq!(payload["EPSG:27700"]["type"], "FeatureCollection");
        let easting = payload["EPSG:27700"]["features"][0]["geometry"]["coordinates"][0][0][0]
            .as_f64()
            .unwrap();
        assert!(easting > 0.0 && easting < 700_000.0);

        assert!(encode_projected(&[]).is_empty());
    }
}
