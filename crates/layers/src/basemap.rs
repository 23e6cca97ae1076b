use foundation::Extent;
use scene::{Feature, FeatureGeometry};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderedKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

/// A basemap feature as drawn, in the display projection.
///
/// Coordinates are stored flat: `stride` numbers per vertex, the first two
/// being `x, y`.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub kind: RenderedKind,
    pub flat_coordinates: Vec<f64>,
    pub stride: usize,
}

impl RenderedFeature {
    pub fn new(kind: RenderedKind, flat_coordinates: Vec<f64>, stride: usize) -> Self {
        Self {
            kind,
            flat_coordinates,
            stride,
        }
    }

    pub fn from_vertices(kind: RenderedKind, vertices: &[[f64; 2]]) -> Self {
        Self::new(kind, vertices.iter().flatten().copied().collect(), 2)
    }

    /// Whole `x, y` vertices; a trailing partial tuple is ignored.
    pub fn vertices(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        let (flat, stride): (&[f64], usize) = if self.stride >= 2 {
            (&self.flat_coordinates, self.stride)
        } else {
            (&[], 1)
        };
        flat.chunks_exact(stride).map(|c| [c[0], c[1]])
    }

    pub fn extent(&self) -> Extent {
        Extent::from_points(self.vertices())
    }
}

impl From<&Feature> for RenderedFeature {
    fn from(feature: &Feature) -> Self {
        let kind = match &feature.geometry {
            FeatureGeometry::Point(_) => RenderedKind::Point,
            FeatureGeometry::Polygon(_) => RenderedKind::Polygon,
            FeatureGeometry::MultiPolygon(_) => RenderedKind::MultiPolygon,
        };
        let vertices: Vec<[f64; 2]> = feature.geometry.rings().into_iter().flatten().collect();
        RenderedFeature::from_vertices(kind, &vertices)
    }
}

/// Vector basemap whose rendered features can be queried by extent.
pub trait BasemapSource {
    /// Every rendered feature intersecting `extent`.
    fn features_in_extent(&self, extent: &Extent) -> Vec<RenderedFeature>;

    /// `false` while tiles are still loading.
    fn is_ready(&self) -> bool {
        true
    }
}

/// In-memory basemap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticBasemap {
    features: Vec<RenderedFeature>,
    loading: bool,
}

impl StaticBasemap {
    pub fn new(features: Vec<RenderedFeature>) -> Self {
        Self {
            features,
            loading: false,
        }
    }

    pub fn from_features(features: &[Feature]) -> Self {
        Self::new(features.iter().map(RenderedFeature::from).collect())
    }

    pub fn push(&mut self, feature: RenderedFeature) {
        self.features.push(feature);
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl BasemapSource for StaticBasemap {
    fn features_in_extent(&self, extent: &Extent) -> Vec<RenderedFeature> {
        self.features
            .iter()
            .filter(|f| f.extent().intersects(extent))
            .cloned()
            .collect()
    }

    fn is_ready(&self) -> bool {
        !self.loading
    }
}

#[cfg(test)]
mod tests {
    use super::{BasemapSource, RenderedFeature, RenderedKind, StaticBasemap};
    use foundation::Extent;

    #[test]
    fn vertices_respect_stride_and_drop_partial_tuple() {
        let f = RenderedFeature::new(
            RenderedKind::LineString,
            vec![0.0, 1.0, 9.0, 2.0, 3.0, 9.0, 4.0],
            3,
        );
        let v: Vec<[f64; 2]> = f.vertices().collect();
        assert_eq!(v, vec![[0.0, 1.0], [2.0, 3.0]]);
    }

    #[test]
    fn degenerate_stride_yields_nothing() {
        let f = RenderedFeature::new(RenderedKind::LineString, vec![0.0, 1.0], 1);
        assert_eq!(f.vertices().count(), 0);
        let empty = RenderedFeature::new(RenderedKind::LineString, Vec::new(), 2);
        assert_eq!(empty.vertices().count(), 0);
        assert!(empty.extent().is_empty());
    }

    #[test]
    fn static_basemap_filters_by_extent() {
        let mut map = StaticBasemap::new(vec![
            RenderedFeature::from_vertices(RenderedKind::LineString, &[[0.0, 0.0], [1.0, 1.0]]),
            RenderedFeature::from_vertices(RenderedKind::LineString, &[[50.0, 50.0], [60.0, 60.0]]),
        ]);
        let hits = map.features_in_extent(&Extent::new([-1.0, -1.0], [2.0, 2.0]));
        assert_eq!(hits.len(), 1);

        assert!(map.is_ready());
        map.set_loading(true);
        assert!(!map.is_ready());
    }
}
