//! Drawing interaction state machine.
//!
//! One [`DrawingSession`] exists per draw-mode activation. It owns the drawn
//! [`FeatureSet`] and the in-progress sketch, and turns pointer events into
//! geometry edits. Every method returns the notifications the change
//! produced; the engine forwards them to subscribers.

use std::fmt;
use std::mem;
use std::str::FromStr;

use compute::{AreaUnit, format_area};
use formats::{GeometryFormatError, decode, encode_projected};
use foundation::math::Projection;
use foundation::math::precision::stable_total_cmp_f64;
use layers::SnapCandidateSet;
use scene::{
    AREA_HECTARES_KEY, AREA_SQUARE_METRES_KEY, Feature, FeatureGeometry, FeatureSet, LABEL_KEY,
    MIN_RING_VERTICES,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::notification::Notification;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Idle,
    /// New features are placed vertex by vertex; existing ones stay editable.
    Drawing,
    /// Only existing features can be edited.
    Modifying,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Idle => "idle",
            Mode::Drawing => "drawing",
            Mode::Modifying => "modifying",
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DrawType {
    #[default]
    Polygon,
    Point,
}

impl FromStr for DrawType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polygon" => Ok(DrawType::Polygon),
            "point" => Ok(DrawType::Point),
            other => Err(format!("unknown draw type: {other} (expected Polygon or Point)")),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DrawOptions {
    pub draw_type: DrawType,
    /// Allow more than one feature to be drawn.
    pub draw_many: bool,
    /// Reset clears the drawing without re-arming vertex placement.
    pub reset_view_only: bool,
}

/// Addresses one vertex: feature index, ring index (exterior first, then
/// holes, polygon by polygon) and vertex index within the open ring.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexRef {
    pub feature: usize,
    pub ring: usize,
    pub vertex: usize,
}

impl VertexRef {
    pub fn new(feature: usize, ring: usize, vertex: usize) -> Self {
        Self {
            feature,
            ring,
            vertex,
        }
    }
}

/// Host gestures, with positions in the display projection.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PointerEvent {
    Click([f64; 2]),
    DoubleClick([f64; 2]),
    /// Abandons the in-progress sketch.
    Escape,
    MoveVertex { vertex: VertexRef, to: [f64; 2] },
    /// Inserts a vertex directly after `after`.
    InsertVertex { after: VertexRef, at: [f64; 2] },
    DeleteVertex(VertexRef),
}

/// Map state a pointer event is interpreted against.
#[derive(Debug, Copy, Clone)]
pub struct PointerContext<'a> {
    /// Display units per screen pixel.
    pub resolution: f64,
    pub snaps: &'a SnapCandidateSet,
}

#[derive(Debug, Clone)]
pub struct DrawingSession {
    options: DrawOptions,
    config: EngineConfig,
    mode: Mode,
    features: FeatureSet,
    sketch: Vec<[f64; 2]>,
}

impl DrawingSession {
    /// Starts a session, loading `initial` GeoJSON (a Feature or a
    /// FeatureCollection in `data_projection`) if given.
    ///
    /// A single initial feature with `draw_many` off starts in
    /// [`Mode::Modifying`]; otherwise the session starts in
    /// [`Mode::Drawing`]. A malformed initial payload fails activation and
    /// loads nothing.
    pub fn activate(
        options: DrawOptions,
        config: &EngineConfig,
        initial: Option<&Value>,
        data_projection: Projection,
    ) -> Result<(Self, Vec<Notification>), GeometryFormatError> {
        let initial = match initial {
            Some(value) => decode(value, data_projection)?,
            None => Vec::new(),
        };
        let mut features = FeatureSet::new();
        features.extend(initial);

        let mode = if features.len() == 1 && !options.draw_many {
            Mode::Modifying
        } else {
            Mode::Drawing
        };
        let mut session = Self {
            options,
            config: config.clone(),
            mode,
            features,
            sketch: Vec::new(),
        };

        let mut out = Vec::new();
        if !session.features.is_empty() {
            session.annotate();
            let extent = session.features.extent().buffer(config.draw_buffer);
            out.push(Notification::fit_view(extent));
        }
        out.push(Notification::ModeChanged(mode));
        debug!(
            "draw session activated: {:?}, {} initial feature(s), mode {mode}",
            options.draw_type,
            session.features.len()
        );
        Ok((session, out))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn options(&self) -> DrawOptions {
        self.options
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Vertices placed so far for the polygon being drawn.
    pub fn sketch(&self) -> &[[f64; 2]] {
        &self.sketch
    }

    pub fn on_pointer(&mut self, event: PointerEvent, ctx: &PointerContext<'_>) -> Vec<Notification> {
        if self.mode == Mode::Idle {
            debug!("ignoring {event:?} while idle");
            return Vec::new();
        }
        match event {
            PointerEvent::Click(at) if self.mode == Mode::Drawing => {
                self.place_vertex(at, ctx, false)
            }
            PointerEvent::DoubleClick(at) if self.mode == Mode::Drawing => {
                self.place_vertex(at, ctx, true)
            }
            PointerEvent::Click(_) | PointerEvent::DoubleClick(_) => Vec::new(),
            PointerEvent::Escape => {
                if !self.sketch.is_empty() {
                    debug!("sketch of {} vertices abandoned", self.sketch.len());
                    self.sketch.clear();
                }
                Vec::new()
            }
            PointerEvent::MoveVertex { vertex, to } => {
                let to = self.snapped(to, ctx);
                self.edit_ring(vertex, |ring| match ring.get_mut(vertex.vertex) {
                    Some(v) => {
                        *v = to;
                        true
                    }
                    None => false,
                })
            }
            PointerEvent::InsertVertex { after, at } => {
                let at = self.snapped(at, ctx);
                self.edit_ring(after, |ring| {
                    if after.vertex >= ring.len() {
                        return false;
                    }
                    ring.insert(after.vertex + 1, at);
                    true
                })
            }
            PointerEvent::DeleteVertex(vertex) => self.edit_ring(vertex, |ring| {
                if vertex.vertex >= ring.len() || ring.len() <= MIN_RING_VERTICES {
                    return false;
                }
                ring.remove(vertex.vertex);
                true
            }),
        }
    }

    /// The vertex nearest `at` within the modify tolerance, if any. Ties go
    /// to the earliest vertex.
    pub fn hit_test(&self, at: [f64; 2], resolution: f64) -> Option<VertexRef> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return None;
        }
        let tolerance = self.config.modify_pixel_tolerance;
        self.features
            .iter()
            .enumerate()
            .flat_map(|(f, feature)| {
                feature
                    .geometry
                    .rings()
                    .into_iter()
                    .enumerate()
                    .flat_map(move |(r, ring)| {
                        ring.into_iter()
                            .enumerate()
                            .map(move |(v, p)| (VertexRef::new(f, r, v), p))
                    })
            })
            .map(|(vertex, p)| (vertex, pixel_distance(p, at, resolution)))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|a, b| stable_total_cmp_f64(a.1, b.1))
            .map(|(vertex, _)| vertex)
    }

    /// Clears every feature and the sketch. Vertex placement is re-armed
    /// unless the session was opened with `reset_view_only`.
    pub fn reset(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        self.sketch.clear();
        self.features.clear();
        if self.mode != Mode::Idle {
            self.mode = Mode::Idle;
            out.push(Notification::ModeChanged(Mode::Idle));
        }
        out.push(Notification::DrawingChanged(encode_projected(&[])));
        if !self.options.reset_view_only {
            self.mode = Mode::Drawing;
            out.push(Notification::ModeChanged(Mode::Drawing));
        }
        debug!("draw session reset, mode {}", self.mode);
        out
    }

    fn place_vertex(&mut self, at: [f64; 2], ctx: &PointerContext<'_>, finish: bool) -> Vec<Notification> {
        let p = self.snapped(at, ctx);
        match self.options.draw_type {
            DrawType::Point => self.complete(FeatureGeometry::point(p)),
            DrawType::Polygon => {
                if self.closes_ring(at, ctx.resolution) {
                    return self.finish_sketch();
                }
                if self.sketch.last() != Some(&p) {
                    self.sketch.push(p);
                }
                if finish {
                    self.finish_sketch()
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn closes_ring(&self, at: [f64; 2], resolution: f64) -> bool {
        self.sketch.len() >= MIN_RING_VERTICES
            && resolution > 0.0
            && pixel_distance(self.sketch[0], at, resolution) <= self.config.modify_pixel_tolerance
    }

    fn finish_sketch(&mut self) -> Vec<Notification> {
        if self.sketch.len() < MIN_RING_VERTICES {
            debug!(
                "polygon needs {MIN_RING_VERTICES} vertices, have {}",
                self.sketch.len()
            );
            return Vec::new();
        }
        let ring = mem::take(&mut self.sketch);
        self.complete(FeatureGeometry::polygon(&ring, &[]))
    }

    fn complete(&mut self, geometry: FeatureGeometry) -> Vec<Notification> {
        self.features.push(Feature::new(geometry));
        self.geometry_changed()
    }

    fn edit_ring(
        &mut self,
        at: VertexRef,
        edit: impl FnOnce(&mut Vec<[f64; 2]>) -> bool,
    ) -> Vec<Notification> {
        let changed = self.features.modify_geometry(at.feature, |geometry| {
            let Some(mut ring) = geometry.ring(at.ring) else {
                return false;
            };
            edit(&mut ring) && geometry.replace_ring(at.ring, ring)
        });
        if !changed {
            debug!("vertex edit at {at:?} refused");
            return Vec::new();
        }
        self.geometry_changed()
    }

    fn geometry_changed(&mut self) -> Vec<Notification> {
        self.annotate();
        let mut out = vec![Notification::DrawingChanged(encode_projected(
            self.features.features(),
        ))];
        if self.mode == Mode::Drawing && !self.options.draw_many && !self.features.is_empty() {
            self.mode = Mode::Modifying;
            self.sketch.clear();
            out.push(Notification::ModeChanged(Mode::Modifying));
        }
        out
    }

    /// Labels unlabelled features by position and, when drawing polygons,
    /// refreshes both area properties.
    fn annotate(&mut self) {
        let with_area = self.options.draw_type == DrawType::Polygon;
        let rounding = self.config.area_rounding;
        self.features.annotate(|index, geometry, props| {
            let labelled = props
                .get(LABEL_KEY)
                .and_then(Value::as_str)
                .is_some_and(|l| !l.is_empty());
            if !labelled {
                props.insert(LABEL_KEY.to_string(), Value::String((index + 1).to_string()));
            }
            if with_area {
                for (key, unit) in [
                    (AREA_SQUARE_METRES_KEY, AreaUnit::SquareMetres),
                    (AREA_HECTARES_KEY, AreaUnit::Hectares),
                ] {
                    props.insert(
                        key.to_string(),
                        Value::String(format_area(geometry, unit, rounding)),
                    );
                }
            }
        });
    }

    fn snapped(&self, at: [f64; 2], ctx: &PointerContext<'_>) -> [f64; 2] {
        ctx.snaps
            .snap(at, ctx.resolution, self.config.snap_pixel_tolerance)
            .map_or(at, |hit| hit.point)
    }
}

fn pixel_distance(a: [f64; 2], b: [f64; 2], resolution: f64) -> f64 {
    (a[0] - b[0]).hypot(a[1] - b[1]) / resolution
}

#[cfg(test)]
mod tests {
    use super::{
        DrawOptions, DrawType, DrawingSession, Mode, PointerContext, PointerEvent, VertexRef,
    };
    use crate::config::EngineConfig;
    use crate::notification::Notification;
    use foundation::math::Projection;
    use layers::SnapCandidateSet;
    use scene::{AREA_HECTARES_KEY, AREA_SQUARE_METRES_KEY, GeometryKind};
    use serde_json::{Value, json};

    fn session(options: DrawOptions) -> DrawingSession {
        DrawingSession::activate(options, &EngineConfig::default(), None, Projection::DISPLAY)
            .unwrap()
            .0
    }

    fn polygon_options(draw_many: bool) -> DrawOptions {
        DrawOptions {
            draw_many,
            ..DrawOptions::default()
        }
    }

    fn ctx(snaps: &SnapCandidateSet) -> PointerContext<'_> {
        PointerContext {
            resolution: 0.1,
            snaps,
        }
    }

    fn draw_rectangle(s: &mut DrawingSession, snaps: &SnapCandidateSet) -> Vec<Notification> {
        let c = ctx(snaps);
        for at in [[0.0, 0.0], [0.0, 10.0], [10.0, 10.0]] {
            assert!(s.on_pointer(PointerEvent::Click(at), &c).is_empty());
        }
        s.on_pointer(PointerEvent::DoubleClick([10.0, 0.0]), &c)
    }

    fn parse_amount(s: &str, suffix: &str) -> f64 {
        s.strip_suffix(suffix).unwrap().trim().parse().unwrap()
    }

    fn square_feature() -> Value {
        json!({
            "type": "Feature",
            "properties": {},
            "geometry": { "type": "Polygon", "coordinates": [[
                [-1.0, 52.0], [-0.999, 52.0], [-0.999, 52.001], [-1.0, 52.001], [-1.0, 52.0]
            ]] }
        })
    }

    #[test]
    fn drawn_rectangle_gets_label_and_area() {
        let mut s = session(polygon_options(false));
        assert_eq!(s.mode(), Mode::Drawing);
        let out = draw_rectangle(&mut s, &SnapCandidateSet::default());

        assert!(matches!(out[0], Notification::DrawingChanged(ref p) if p.display.features.len() == 1));
        assert_eq!(out[1], Notification::ModeChanged(Mode::Modifying));
        assert_eq!(s.mode(), Mode::Modifying);

        let f = &s.features().features()[0];
        assert_eq!(f.geometry.kind(), GeometryKind::Polygon);
        assert_eq!(f.label(), Some("1"));
        let m2 = parse_amount(f.property_str(AREA_SQUARE_METRES_KEY).unwrap(), "m²");
        let ha = parse_amount(f.property_str(AREA_HECTARES_KEY).unwrap(), "ha");
        assert!((m2 - 100.0).abs() < 0.5, "{m2}");
        assert!((ha - 0.01).abs() < 1e-4, "{ha}");
    }

    #[test]
    fn clicking_first_vertex_closes_ring() {
        let mut s = session(polygon_options(false));
        let snaps = SnapCandidateSet::default();
        let c = ctx(&snaps);
        for at in [[0.0, 0.0], [0.0, 10.0], [10.0, 10.0]] {
            s.on_pointer(PointerEvent::Click(at), &c);
        }
        // 0.5 units at 0.1 units/px is 5 px from the first vertex.
        let out = s.on_pointer(PointerEvent::Click([0.3, 0.4]), &c);
        assert!(!out.is_empty());
        assert_eq!(s.features().features()[0].geometry.vertex_count(), 3);
    }

    #[test]
    fn too_few_vertices_do_not_finish() {
        let mut s = session(polygon_options(false));
        let snaps = SnapCandidateSet::default();
        let c = ctx(&snaps);
        s.on_pointer(PointerEvent::Click([0.0, 0.0]), &c);
        assert!(s.on_pointer(PointerEvent::DoubleClick([5.0, 5.0]), &c).is_empty());
        assert!(s.features().is_empty());
        assert_eq!(s.sketch().len(), 2);

        s.on_pointer(PointerEvent::Escape, &c);
        assert!(s.sketch().is_empty());
        assert_eq!(s.mode(), Mode::Drawing);
    }

    #[test]
    fn vertices_snap_within_pixel_tolerance() {
        let mut s = session(polygon_options(false));
        let snaps = SnapCandidateSet::new(vec![[1.0, 1.0]]);
        let c = ctx(&snaps);
        // 1 unit away is 10 px: within 15 px.
        s.on_pointer(PointerEvent::Click([0.4, 0.2]), &c);
        // 5 units away is 50 px: not snapped.
        s.on_pointer(PointerEvent::Click([6.0, 1.0]), &c);
        assert_eq!(s.sketch(), &[[1.0, 1.0], [6.0, 1.0]]);
    }

    #[test]
    fn single_initial_feature_starts_modifying() {
        let (s, out) = DrawingSession::activate(
            polygon_options(false),
            &EngineConfig::default(),
            Some(&square_feature()),
            Projection::Geographic,
        )
        .unwrap();
        assert_eq!(s.mode(), Mode::Modifying);
        assert!(matches!(out[0], Notification::FitView(_)));
        assert_eq!(out.last(), Some(&Notification::ModeChanged(Mode::Modifying)));
        assert!(!out.iter().any(|n| *n == Notification::ModeChanged(Mode::Drawing)));
        assert_eq!(s.features().features()[0].label(), Some("1"));
    }

    #[test]
    fn draw_many_keeps_drawing_and_labels_sequentially() {
        let collection = json!({ "type": "FeatureCollection", "features": [square_feature()] });
        let (mut s, _) = DrawingSession::activate(
            polygon_options(true),
            &EngineConfig::default(),
            Some(&collection),
            Projection::Geographic,
        )
        .unwrap();
        assert_eq!(s.mode(), Mode::Drawing);

        let out = draw_rectangle(&mut s, &SnapCandidateSet::default());
        assert_eq!(out.len(), 1);
        assert_eq!(s.mode(), Mode::Drawing);
        let labels: Vec<_> = s.features().iter().map(|f| f.label().unwrap()).collect();
        assert_eq!(labels, vec!["1", "2"]);
    }

    #[test]
    fn malformed_initial_payload_fails_activation() {
        let bad = json!({ "type": "FeatureCollection", "features": [square_feature(), { "type": "Feature" }] });
        let result = DrawingSession::activate(
            polygon_options(false),
            &EngineConfig::default(),
            Some(&bad),
            Projection::Geographic,
        );
        assert!(result.is_err());
    }

    #[test]
    fn modify_edits_and_refusals() {
        let mut s = session(polygon_options(false));
        let snaps = SnapCandidateSet::default();
        draw_rectangle(&mut s, &snaps);
        let c = ctx(&snaps);

        let out = s.on_pointer(
            PointerEvent::MoveVertex {
                vertex: VertexRef::new(0, 0, 2),
                to: [20.0, 20.0],
            },
            &c,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(s.features().features()[0].geometry.ring(0).unwrap()[2], [20.0, 20.0]);
        assert_eq!(s.features().features()[0].label(), Some("1"));

        s.on_pointer(
            PointerEvent::InsertVertex {
                after: VertexRef::new(0, 0, 0),
                at: [0.0, 5.0],
            },
            &c,
        );
        assert_eq!(s.features().features()[0].geometry.vertex_count(), 5);

        s.on_pointer(PointerEvent::DeleteVertex(VertexRef::new(0, 0, 1)), &c);
        s.on_pointer(PointerEvent::DeleteVertex(VertexRef::new(0, 0, 1)), &c);
        assert_eq!(s.features().features()[0].geometry.vertex_count(), 3);

        let revision = s.features().revision();
        assert!(s.on_pointer(PointerEvent::DeleteVertex(VertexRef::new(0, 0, 0)), &c).is_empty());
        assert!(s.on_pointer(PointerEvent::DeleteVertex(VertexRef::new(3, 0, 0)), &c).is_empty());
        assert_eq!(s.features().revision(), revision);

        // Drawing is disabled once modifying.
        assert!(s.on_pointer(PointerEvent::Click([50.0, 50.0]), &c).is_empty());
        assert!(s.sketch().is_empty());
    }

    #[test]
    fn hit_test_finds_nearest_vertex() {
        let mut s = session(polygon_options(false));
        draw_rectangle(&mut s, &SnapCandidateSet::default());
        assert_eq!(s.hit_test([9.8, 10.1], 0.1), Some(VertexRef::new(0, 0, 2)));
        assert_eq!(s.hit_test([5.0, 5.0], 0.1), None);
        assert_eq!(s.hit_test([5.0, 5.0], 0.0), None);
    }

    #[test]
    fn point_type_finishes_on_click_without_area() {
        let mut s = session(DrawOptions {
            draw_type: DrawType::Point,
            ..DrawOptions::default()
        });
        let snaps = SnapCandidateSet::default();
        let out = s.on_pointer(PointerEvent::Click([3.0, 4.0]), &ctx(&snaps));
        assert_eq!(out.len(), 2);
        let f = &s.features().features()[0];
        assert_eq!(f.geometry.kind(), GeometryKind::Point);
        assert!(f.property_str(AREA_SQUARE_METRES_KEY).is_none());
        assert_eq!(s.mode(), Mode::Modifying);
    }

    #[test]
    fn reset_clears_and_rearms() {
        let (mut s, _) = DrawingSession::activate(
            polygon_options(false),
            &EngineConfig::default(),
            Some(&square_feature()),
            Projection::Geographic,
        )
        .unwrap();
        let out = s.reset();
        assert!(s.features().is_empty());
        assert_eq!(s.mode(), Mode::Drawing);
        assert!(out.iter().any(|n| matches!(n, Notification::DrawingChanged(p) if p.is_empty())));
        assert_eq!(out.last(), Some(&Notification::ModeChanged(Mode::Drawing)));
    }

    #[test]
    fn view_only_reset_clears_without_rearming() {
        let (mut s, _) = DrawingSession::activate(
            DrawOptions {
                reset_view_only: true,
                ..DrawOptions::default()
            },
            &EngineConfig::default(),
            Some(&square_feature()),
            Projection::Geographic,
        )
        .unwrap();
        assert_eq!(s.mode(), Mode::Modifying);
        s.reset();
        assert!(s.features().is_empty());
        assert_eq!(s.mode(), Mode::Idle);

        let snaps = SnapCandidateSet::default();
        assert!(s.on_pointer(PointerEvent::Click([0.0, 0.0]), &ctx(&snaps)).is_empty());
        assert!(s.sketch().is_empty());
    }
}
