use foundation::{Extent, Time};
use layers::{BasemapSource, SnapCandidateSet, extract_snap_points};
use runtime::Debouncer;
use tracing::debug;

/// What the host map currently shows.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    /// Visible extent in the display projection.
    pub extent: Extent,
    pub zoom: f64,
    /// Display units per screen pixel.
    pub resolution: f64,
}

/// Keeps the snap candidate set in step with the viewport.
///
/// Viewport settles are debounced; a finished basemap load recomputes
/// straight away. Below the minimum zoom the set is simply emptied.
#[derive(Debug, Clone)]
pub struct SnapController {
    debouncer: Debouncer,
    min_zoom: f64,
    candidates: SnapCandidateSet,
}

impl SnapController {
    pub fn new(delay_s: f64, min_zoom: f64) -> Self {
        Self {
            debouncer: Debouncer::new(delay_s),
            min_zoom,
            candidates: SnapCandidateSet::default(),
        }
    }

    pub fn candidates(&self) -> &SnapCandidateSet {
        &self.candidates
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Schedules a recompute unless the basemap is still loading; the load
    /// completing triggers its own recompute.
    pub fn viewport_settled(&mut self, now: Time, source_ready: bool) {
        if source_ready {
            self.debouncer.notify(now);
        }
    }

    /// Runs a due recompute. Returns `true` if one ran.
    pub fn poll(
        &mut self,
        now: Time,
        source: Option<&dyn BasemapSource>,
        viewport: Option<&Viewport>,
    ) -> bool {
        if !self.debouncer.poll(now) {
            return false;
        }
        self.recompute(source, viewport);
        true
    }

    pub fn recompute(&mut self, source: Option<&dyn BasemapSource>, viewport: Option<&Viewport>) {
        self.candidates.clear();
        match viewport {
            Some(v) if v.zoom >= self.min_zoom => {
                self.candidates = extract_snap_points(source, &v.extent);
            }
            Some(v) => debug!("zoom {} below snap threshold {}", v.zoom, self.min_zoom),
            None => {}
        }
    }

    pub fn clear(&mut self) {
        self.debouncer.cancel();
        self.candidates.clear();
    }
}
