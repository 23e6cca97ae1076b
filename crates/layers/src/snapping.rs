//! Snap candidates extracted from the rendered basemap.
//!
//! Candidates are regenerated wholesale on every extraction; nothing is
//! cached across viewport changes because tile content changes with them.

use foundation::Extent;
use foundation::math::precision::stable_total_cmp_f64;
use tracing::debug;

use crate::basemap::{BasemapSource, RenderedKind};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SnapHit {
    pub index: usize,
    pub point: [f64; 2],
    pub distance_px: f64,
}

/// Volatile set of points a new vertex may be pulled onto.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapCandidateSet {
    points: Vec<[f64; 2]>,
}

impl SnapCandidateSet {
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self { points }
    }

    /// Re-chunks a flat `x, y, x, y, ...` list; a trailing lone number is
    /// dropped.
    pub fn from_flat(flat: &[f64]) -> Self {
        Self::new(flat.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Nearest candidate within `tolerance_px` screen pixels of `target`.
    ///
    /// `resolution` is display units per pixel. Ties go to the lower index.
    pub fn snap(&self, target: [f64; 2], resolution: f64, tolerance_px: f64) -> Option<SnapHit> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return None;
        }
        self.points
            .iter()
            .enumerate()
            .map(|(index, &point)| {
                let dx = point[0] - target[0];
                let dy = point[1] - target[1];
                SnapHit {
                    index,
                    point,
                    distance_px: (dx * dx + dy * dy).sqrt() / resolution,
                }
            })
            .filter(|hit| hit.distance_px <= tolerance_px)
            .min_by(|a, b| {
                stable_total_cmp_f64(a.distance_px, b.distance_px).then(a.index.cmp(&b.index))
            })
    }
}

/// Collects every vertex of the non-point basemap features intersecting
/// `extent`. A missing source yields an empty set.
pub fn extract_snap_points(source: Option<&dyn BasemapSource>, extent: &Extent) -> SnapCandidateSet {
    let Some(source) = source else {
        return SnapCandidateSet::default();
    };
    let points: Vec<[f64; 2]> = source
        .features_in_extent(extent)
        .iter()
        .filter(|f| f.kind != RenderedKind::Point)
        .flat_map(|f| f.vertices().collect::<Vec<_>>())
        .collect();
    debug!("extracted {} snap candidates", points.len());
    SnapCandidateSet::new(points)
}
