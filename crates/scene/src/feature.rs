use foundation::Extent;
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};
use serde_json::{Map, Value};

/// Property key holding the sequential display label.
pub const LABEL_KEY: &str = "label";
/// Property key holding the formatted square-metre area.
pub const AREA_SQUARE_METRES_KEY: &str = "area.squareMetres";
/// Property key holding the formatted hectare area.
pub const AREA_HECTARES_KEY: &str = "area.hectares";

/// Minimum distinct vertices of a polygon ring.
pub const MIN_RING_VERTICES: usize = 3;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Point,
    Polygon,
    MultiPolygon,
}

impl GeometryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }
}

/// Geometry of a feature, always in the display projection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
    /// Only produced by merging disjoint parcels.
    MultiPolygon(MultiPolygon<f64>),
}

impl FeatureGeometry {
    pub fn point(xy: [f64; 2]) -> Self {
        FeatureGeometry::Point(Point::new(xy[0], xy[1]))
    }

    /// Builds a polygon from open rings (the closing vertex is added).
    pub fn polygon(exterior: &[[f64; 2]], holes: &[Vec<[f64; 2]>]) -> Self {
        FeatureGeometry::Polygon(polygon_from_rings(exterior, holes))
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            FeatureGeometry::Point(_) => GeometryKind::Point,
            FeatureGeometry::Polygon(_) => GeometryKind::Polygon,
            FeatureGeometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    pub fn is_areal(&self) -> bool {
        !matches!(self, FeatureGeometry::Point(_))
    }

    /// Rings as open vertex lists: exterior then holes, polygon by polygon.
    /// A point is reported as a single one-vertex ring.
    pub fn rings(&self) -> Vec<Vec<[f64; 2]>> {
        match self {
            FeatureGeometry::Point(p) => vec![vec![[p.x(), p.y()]]],
            FeatureGeometry::Polygon(poly) => polygon_rings(poly),
            FeatureGeometry::MultiPolygon(mp) => mp.0.iter().flat_map(polygon_rings).collect(),
        }
    }

    pub fn ring(&self, ring: usize) -> Option<Vec<[f64; 2]>> {
        self.rings().into_iter().nth(ring)
    }

    /// Replaces one ring's vertices. Returns `false` (leaving the geometry
    /// untouched) if the ring does not exist or the new vertex list could
    /// not form that ring.
    pub fn replace_ring(&mut self, ring: usize, vertices: Vec<[f64; 2]>) -> bool {
        match self {
            FeatureGeometry::Point(p) => {
                if ring != 0 || vertices.len() != 1 {
                    return false;
                }
                *p = Point::new(vertices[0][0], vertices[0][1]);
                true
            }
            FeatureGeometry::Polygon(poly) => {
                if vertices.len() < MIN_RING_VERTICES {
                    return false;
                }
                replace_polygon_ring(poly, ring, vertices)
            }
            FeatureGeometry::MultiPolygon(mp) => {
                if vertices.len() < MIN_RING_VERTICES {
                    return false;
                }
                let mut offset = 0;
                for poly in mp.0.iter_mut() {
                    let count = 1 + poly.interiors().len();
                    if ring < offset + count {
                        return replace_polygon_ring(poly, ring - offset, vertices);
                    }
                    offset += count;
                }
                false
            }
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.rings().iter().map(Vec::len).sum()
    }

    pub fn extent(&self) -> Extent {
        Extent::from_points(self.rings().iter().flatten().copied())
    }

    pub fn all_finite(&self) -> bool {
        self.rings()
            .iter()
            .flatten()
            .all(|p| p[0].is_finite() && p[1].is_finite())
    }

    /// Applies `f` to every coordinate, returning a new geometry.
    pub fn map_coords(&self, f: impl Fn([f64; 2]) -> [f64; 2]) -> FeatureGeometry {
        let map_ring = |ls: &LineString<f64>| -> LineString<f64> {
            ls.coords()
                .map(|c| {
                    let [x, y] = f([c.x, c.y]);
                    Coord { x, y }
                })
                .collect()
        };
        let map_polygon = |poly: &Polygon<f64>| {
            Polygon::new(
                map_ring(poly.exterior()),
                poly.interiors().iter().map(&map_ring).collect(),
            )
        };
        match self {
            FeatureGeometry::Point(p) => FeatureGeometry::point(f([p.x(), p.y()])),
            FeatureGeometry::Polygon(poly) => FeatureGeometry::Polygon(map_polygon(poly)),
            FeatureGeometry::MultiPolygon(mp) => {
                FeatureGeometry::MultiPolygon(MultiPolygon(mp.0.iter().map(&map_polygon).collect()))
            }
        }
    }

    /// Polygon parts of this geometry; empty for a point.
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        match self {
            FeatureGeometry::Point(_) => Vec::new(),
            FeatureGeometry::Polygon(poly) => vec![poly.clone()],
            FeatureGeometry::MultiPolygon(mp) => mp.0.clone(),
        }
    }
}

pub fn polygon_from_rings(exterior: &[[f64; 2]], holes: &[Vec<[f64; 2]>]) -> Polygon<f64> {
    Polygon::new(
        line_string(exterior),
        holes.iter().map(|h| line_string(h)).collect(),
    )
}

fn line_string(vertices: &[[f64; 2]]) -> LineString<f64> {
    vertices.iter().map(|&[x, y]| Coord { x, y }).collect()
}

fn open_ring(ls: &LineString<f64>) -> Vec<[f64; 2]> {
    let mut out: Vec<[f64; 2]> = ls.coords().map(|c| [c.x, c.y]).collect();
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

fn polygon_rings(poly: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(poly.exterior())
        .chain(poly.interiors())
        .map(open_ring)
        .collect()
}

fn replace_polygon_ring(poly: &mut Polygon<f64>, ring: usize, vertices: Vec<[f64; 2]>) -> bool {
    if ring > poly.interiors().len() {
        return false;
    }
    let mut rings = polygon_rings(poly);
    rings[ring] = vertices;
    *poly = polygon_from_rings(&rings[0], &rings[1..]);
    true
}

/// A geometry plus an open property bag.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Provider-assigned identifier, if any.
    pub id: Option<String>,
    pub geometry: FeatureGeometry,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: FeatureGeometry) -> Self {
        Self {
            id: None,
            geometry,
            properties: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn label(&self) -> Option<&str> {
        self.property_str(LABEL_KEY).filter(|l| !l.is_empty())
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.properties
            .insert(LABEL_KEY.to_string(), Value::String(label.into()));
    }

    /// Drops every property whose key is not listed.
    pub fn retain_properties(&mut self, keys: &[String]) {
        self.properties.retain(|k, _| keys.iter().any(|r| r == k));
    }

    pub fn extent(&self) -> Extent {
        self.geometry.extent()
    }
}
