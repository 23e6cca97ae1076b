//! The map engine facade.
//!
//! A [`MapEngine`] is owned by one host map. It holds the draw session, the
//! merge engine, the snap controller and the static data layer, and turns
//! host calls into [`Notification`]s delivered through an [`EventBus`].

use std::fmt;
use std::slice;

use compute::{FeatureQuery, MergeEngine, NetworkError, SelectionMode, format_area};
use formats::{decode, encode_projected};
use foundation::Time;
use foundation::math::{Coordinate, Projection};
use layers::{BasemapSource, SnapCandidateSet};
use runtime::{EventBus, SubscriptionId, Ticket};
use scene::{Feature, FeatureSet, SelectionPool};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::notification::Notification;
use crate::session::{DrawOptions, DrawType, DrawingSession, Mode, PointerContext, PointerEvent, VertexRef};
use crate::snap_points::{SnapController, Viewport};

/// Resolution assumed for pointer events before the first viewport report.
pub const DEFAULT_RESOLUTION: f64 = 1.0;

pub struct MapEngine {
    config: EngineConfig,
    bus: EventBus<Notification>,
    session: Option<DrawingSession>,
    merge: MergeEngine,
    snaps: SnapController,
    basemap: Option<Box<dyn BasemapSource>>,
    viewport: Option<Viewport>,
    static_data: FeatureSet,
}

impl fmt::Debug for MapEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapEngine")
            .field("mode", &self.mode())
            .field("basemap", &self.basemap.is_some())
            .field("viewport", &self.viewport)
            .field("snap_candidates", &self.snaps.candidates().len())
            .field("selection", &self.merge.pool().len())
            .field("static_features", &self.static_data.len())
            .finish()
    }
}

impl Default for MapEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl MapEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            merge: MergeEngine::new(config.merge_options()),
            snaps: SnapController::new(config.snap_debounce_s, config.snap_min_zoom),
            config,
            bus: EventBus::new(),
            session: None,
            basemap: None,
            viewport: None,
            static_data: FeatureSet::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&Notification) + 'static) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Every notification emitted since the last drain.
    pub fn notifications(&self) -> &[Notification] {
        self.bus.events()
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.bus.drain()
    }

    pub fn mode(&self) -> Mode {
        self.session.as_ref().map_or(Mode::Idle, DrawingSession::mode)
    }

    pub fn session(&self) -> Option<&DrawingSession> {
        self.session.as_ref()
    }

    /// Starts (or restarts) draw mode. On a malformed `initial` payload the
    /// previous session is left as it was.
    pub fn activate_draw_mode(
        &mut self,
        options: DrawOptions,
        initial: Option<&Value>,
        data_projection: Projection,
    ) -> Result<Mode, EngineError> {
        let (session, out) =
            match DrawingSession::activate(options, &self.config, initial, data_projection) {
                Ok(started) => started,
                Err(e) => return Err(self.fail(e.into())),
            };
        let mode = session.mode();
        self.session = Some(session);
        self.snaps.clear();
        self.emit_all(out);
        if self.snapping_enabled() {
            self.refresh_snaps();
        }
        Ok(mode)
    }

    /// Ends draw mode, discarding the drawing. Returns `false` if draw mode
    /// was not active.
    pub fn deactivate_draw_mode(&mut self) -> bool {
        if self.session.take().is_none() {
            return false;
        }
        self.snaps.clear();
        self.bus.emit(Notification::ModeChanged(Mode::Idle));
        debug!("draw mode deactivated");
        true
    }

    pub fn on_pointer_event(&mut self, event: PointerEvent) {
        let resolution = self.resolution();
        let Some(session) = self.session.as_mut() else {
            debug!("pointer event without a draw session");
            return;
        };
        let ctx = PointerContext {
            resolution,
            snaps: self.snaps.candidates(),
        };
        let out = session.on_pointer(event, &ctx);
        self.emit_all(out);
    }

    /// The drawn vertex under `at`, for hosts deciding what a drag grabs.
    pub fn hit_test(&self, at: [f64; 2]) -> Option<VertexRef> {
        self.session.as_ref()?.hit_test(at, self.resolution())
    }

    pub fn set_basemap(&mut self, basemap: Option<Box<dyn BasemapSource>>) {
        self.basemap = basemap;
        self.snaps.clear();
    }

    pub fn snap_candidates(&self) -> &SnapCandidateSet {
        self.snaps.candidates()
    }

    /// Records the new viewport and schedules a debounced snap refresh.
    pub fn on_viewport_settled(&mut self, viewport: Viewport, now: Time) {
        self.viewport = Some(viewport);
        if self.snapping_enabled() {
            let ready = self.basemap.as_ref().is_some_and(|b| b.is_ready());
            self.snaps.viewport_settled(now, ready);
        }
    }

    /// Drives time-based work. Returns `true` if snap points were refreshed.
    pub fn tick(&mut self, now: Time) -> bool {
        if !self.snapping_enabled() {
            return false;
        }
        self.snaps
            .poll(now, self.basemap.as_deref(), self.viewport.as_ref())
    }

    /// The basemap finished loading tiles: refresh snap points now.
    pub fn on_basemap_loaded(&mut self) {
        if self.snapping_enabled() {
            self.refresh_snaps();
        }
    }

    /// Fits the view to the most relevant data, then clears the drawing.
    ///
    /// Fit priority: merged parcels, static data, the drawing itself when the
    /// session is view-only, else the host's initial view.
    pub fn reset(&mut self) {
        let drawn = self
            .session
            .as_ref()
            .filter(|s| s.options().reset_view_only && !s.features().is_empty());
        let fit = if let Some(merged) = self.merge.output() {
            Some(merged.extent().buffer(self.config.feature_buffer))
        } else if !self.static_data.is_empty() {
            Some(self.static_data.extent().buffer(self.config.geojson_buffer))
        } else {
            drawn.map(|s| s.features().extent().buffer(self.config.draw_buffer))
        };
        self.bus.emit(match fit {
            Some(extent) => Notification::fit_view(extent),
            None => Notification::ResetView,
        });

        let out = self
            .session
            .as_mut()
            .map(DrawingSession::reset)
            .unwrap_or_default();
        self.emit_all(out);
    }

    pub fn selection(&self) -> &SelectionPool {
        self.merge.pool()
    }

    pub fn merged_feature(&self) -> Option<&Feature> {
        self.merge.output()
    }

    /// Starts a point query at `point`; the host performs the request and
    /// reports back with the query's ticket.
    pub fn begin_feature_query(&mut self, point: Coordinate, mode: SelectionMode) -> FeatureQuery {
        let query = self.merge.begin_query(point, mode);
        debug!("point query {:?} ({mode:?})", query.ticket);
        query
    }

    pub fn on_query_resolved(&mut self, ticket: Ticket, response: &Value) -> Result<(), EngineError> {
        let before = self.merge.output().cloned();
        let result = self.merge.on_query_resolved(ticket, response).map(|_| ());
        if self.merge.output() != before.as_ref() {
            self.emit_merged();
        }
        result.map_err(|e| self.fail(e.into()))
    }

    pub fn on_query_failed(&mut self, ticket: Ticket, error: NetworkError) -> EngineError {
        let e = self.merge.on_query_failed(ticket, error);
        self.fail(e.into())
    }

    /// Recomputes the merged boundary after a failed union.
    pub fn retry_union(&mut self) -> Result<(), EngineError> {
        let before = self.merge.output().cloned();
        let result = self.merge.retry_union().map(|_| ());
        if self.merge.output() != before.as_ref() {
            self.emit_merged();
        }
        result.map_err(|e| self.fail(e.into()))
    }

    /// Loads display-only GeoJSON, fits the view to it and reports the
    /// formatted area of its first areal feature.
    pub fn load_static_geojson(
        &mut self,
        value: &Value,
        data_projection: Projection,
    ) -> Result<Option<String>, EngineError> {
        let features = match decode(value, data_projection) {
            Ok(features) => features,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.static_data.clear();
        self.static_data.extend(features);
        if self.static_data.is_empty() {
            return Ok(None);
        }
        let extent = self.static_data.extent().buffer(self.config.geojson_buffer);
        self.bus.emit(Notification::fit_view(extent));

        let area = self
            .static_data
            .iter()
            .find(|f| f.geometry.is_areal())
            .map(|f| format_area(&f.geometry, self.config.area_unit, self.config.area_rounding));
        if let Some(area) = &area {
            info!("static data area {area}");
            self.bus.emit(Notification::DataArea(area.clone()));
        }
        Ok(area)
    }

    pub fn static_data(&self) -> &FeatureSet {
        &self.static_data
    }

    fn resolution(&self) -> f64 {
        self.viewport.map_or(DEFAULT_RESOLUTION, |v| v.resolution)
    }

    fn snapping_enabled(&self) -> bool {
        self.basemap.is_some()
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.options().draw_type == DrawType::Polygon)
    }

    fn refresh_snaps(&mut self) {
        self.snaps
            .recompute(self.basemap.as_deref(), self.viewport.as_ref());
    }

    fn emit_merged(&mut self) {
        match self.merge.output() {
            Some(merged) => {
                let payload = encode_projected(slice::from_ref(merged));
                let extent = merged.extent().buffer(self.config.feature_buffer);
                self.bus.emit(Notification::FeaturesChanged(payload));
                self.bus.emit(Notification::fit_view(extent));
            }
            None => self
                .bus
                .emit(Notification::FeaturesChanged(encode_projected(&[]))),
        }
    }

    fn fail(&mut self, e: EngineError) -> EngineError {
        warn!("{e}");
        self.bus.emit(Notification::Failure {
            message: e.to_string(),
            retryable: e.is_retryable(),
        });
        e
    }

    fn emit_all(&mut self, notifications: Vec<Notification>) {
        for n in notifications {
            self.bus.emit(n);
        }
    }
}
