//! Feature merge engine.
//!
//! Point-query results are folded into a [`SelectionPool`] and every polygon
//! in the pool is unioned into one output boundary. The union is split into
//! `prepare_union` / [`UnionJob::run`] / `complete_union` so a host can run
//! the expensive step elsewhere; a generation stamp makes sure only the union
//! for the latest pool state ever lands.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;

use formats::{GeometryFormatError, decode};
use foundation::math::{Coordinate, Projection};
use geo::{MultiPolygon, Polygon, unary_union};
use runtime::{Generation, GenerationCounter, Ticket};
use scene::{Feature, FeatureGeometry, SelectionPool};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::{AreaRounding, apply_area_properties};
use crate::query::{FeatureQuery, NetworkError, QueryTracker};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// The new result replaces the whole pool.
    Replace,
    /// Each incoming feature is deselected if present, selected otherwise.
    Toggle,
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "replace" => Ok(SelectionMode::Replace),
            "toggle" => Ok(SelectionMode::Toggle),
            other => Err(format!("unknown selection mode: {other}")),
        }
    }
}

/// Polygon union failed; the previous output is still in place and the
/// union can be retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("polygon union failed: {reason}")]
pub struct UnionComputationError {
    pub reason: String,
}

impl UnionComputationError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error(transparent)]
    Format(#[from] GeometryFormatError),
    #[error(transparent)]
    Union(#[from] UnionComputationError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error("unknown or already resolved query ticket {0:?}")]
    UnknownTicket(Ticket),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOptions {
    /// Property holding a feature's identity. The GeoJSON `id` is only used
    /// when the property is absent, since services may number features per
    /// response.
    pub id_property: String,
    /// Properties kept on incoming features; everything else is dropped.
    pub retained_properties: Vec<String>,
    pub rounding: AreaRounding,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            id_property: "TOID".to_string(),
            retained_properties: vec!["TOID".to_string(), "DescriptiveGroup".to_string()],
            rounding: AreaRounding::Legacy,
        }
    }
}

/// Snapshot of pool polygons to union, stamped with the pool generation.
#[derive(Debug, Clone)]
pub struct UnionJob {
    generation: Generation,
    polygons: Vec<Polygon<f64>>,
}

/// Result of running a [`UnionJob`].
#[derive(Debug, Clone)]
pub struct UnionResult {
    generation: Generation,
    outcome: Result<Option<MultiPolygon<f64>>, UnionComputationError>,
}

impl UnionJob {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Unions every polygon. `Ok(None)` means there was nothing to union.
    pub fn run(self) -> UnionResult {
        UnionResult {
            generation: self.generation,
            outcome: union_polygons(&self.polygons),
        }
    }
}

fn union_polygons(
    polygons: &[Polygon<f64>],
) -> Result<Option<MultiPolygon<f64>>, UnionComputationError> {
    if polygons.is_empty() {
        return Ok(None);
    }
    let finite = |mp: &MultiPolygon<f64>| {
        FeatureGeometry::MultiPolygon(mp.clone()).all_finite()
    };
    let input = MultiPolygon(polygons.to_vec());
    if !finite(&input) {
        return Err(UnionComputationError::new("input has non-finite coordinates"));
    }

    let merged = catch_unwind(AssertUnwindSafe(|| unary_union(polygons)))
        .map_err(|_| UnionComputationError::new("numerically degenerate input"))?;
    if !finite(&merged) {
        return Err(UnionComputationError::new("union produced non-finite coordinates"));
    }
    if merged.0.is_empty() {
        return Ok(None);
    }
    Ok(Some(merged))
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnionOutcome {
    /// The output changed (or was cleared because the pool is empty).
    Updated,
    /// A newer pool state exists; the result was discarded.
    Superseded,
    /// Union failed; the previous output was kept.
    Failed(UnionComputationError),
}

#[derive(Debug, Default)]
pub struct MergeEngine {
    options: MergeOptions,
    pool: SelectionPool,
    output: Option<Feature>,
    generation: GenerationCounter,
    queries: QueryTracker,
    anonymous: u64,
}

impl MergeEngine {
    pub fn new(options: MergeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn pool(&self) -> &SelectionPool {
        &self.pool
    }

    /// The merged boundary, if the pool holds any polygon.
    pub fn output(&self) -> Option<&Feature> {
        self.output.as_ref()
    }

    /// Applies a query result to the pool. Returns `true` if the pool changed.
    pub fn update_pool(&mut self, incoming: Vec<Feature>, mode: SelectionMode) -> bool {
        let before = self.pool.clone();
        if mode == SelectionMode::Replace {
            self.pool.clear();
        }
        for mut feature in incoming {
            let id = self.identity(&feature);
            feature.retain_properties(&self.options.retained_properties);
            feature.id = Some(id.clone());
            match mode {
                SelectionMode::Replace => {
                    self.pool.insert(id, feature);
                }
                SelectionMode::Toggle => {
                    if self.pool.remove(&id).is_none() {
                        self.pool.insert(id, feature);
                    }
                }
            }
        }
        let changed = self.pool != before;
        debug!(
            "selection pool {mode:?}: {} feature(s), changed={changed}",
            self.pool.len()
        );
        changed
    }

    fn identity(&mut self, feature: &Feature) -> String {
        match feature.properties.get(&self.options.id_property) {
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
        if let Some(id) = &feature.id {
            return id.clone();
        }
        self.anonymous += 1;
        format!("anon-{}", self.anonymous)
    }

    /// Snapshots the pool for a union, superseding any earlier job.
    pub fn prepare_union(&mut self) -> UnionJob {
        let generation = self.generation.advance();
        let polygons = self
            .pool
            .features()
            .flat_map(|f| f.geometry.polygons())
            .collect();
        UnionJob {
            generation,
            polygons,
        }
    }

    pub fn complete_union(&mut self, result: UnionResult) -> UnionOutcome {
        if !self.generation.is_current(result.generation) {
            debug!("discarding superseded union {:?}", result.generation);
            return UnionOutcome::Superseded;
        }
        match result.outcome {
            Ok(None) => {
                self.output = None;
                UnionOutcome::Updated
            }
            Ok(Some(merged)) => {
                let geometry = match <[Polygon<f64>; 1]>::try_from(merged.0) {
                    Ok([single]) => FeatureGeometry::Polygon(single),
                    Err(parts) => FeatureGeometry::MultiPolygon(MultiPolygon(parts)),
                };
                let mut feature = Feature::new(geometry);
                apply_area_properties(&mut feature, self.options.rounding);
                self.output = Some(feature);
                UnionOutcome::Updated
            }
            Err(e) => {
                warn!("{e}; keeping previous merged boundary");
                UnionOutcome::Failed(e)
            }
        }
    }

    /// Updates the pool and recomputes the union in one step. If the union
    /// fails the pool is rolled back, so neither the pool nor the output
    /// reflects `incoming`.
    pub fn merge_at(
        &mut self,
        incoming: Vec<Feature>,
        mode: SelectionMode,
    ) -> Result<Option<&Feature>, UnionComputationError> {
        let before = self.pool.clone();
        self.update_pool(incoming, mode);
        let job = self.prepare_union();
        match self.complete_union(job.run()) {
            UnionOutcome::Failed(e) => {
                self.pool = before;
                self.generation.advance();
                Err(e)
            }
            _ => Ok(self.output.as_ref()),
        }
    }

    /// Recomputes the union for the current pool.
    pub fn retry_union(&mut self) -> Result<Option<&Feature>, UnionComputationError> {
        let job = self.prepare_union();
        match self.complete_union(job.run()) {
            UnionOutcome::Failed(e) => Err(e),
            _ => Ok(self.output.as_ref()),
        }
    }

    pub fn begin_query(&mut self, point: Coordinate, mode: SelectionMode) -> FeatureQuery {
        self.queries.begin(point, mode)
    }

    /// Applies a resolved point query. Results are applied in the order they
    /// resolve; an empty result leaves the pool untouched.
    pub fn on_query_resolved(
        &mut self,
        ticket: Ticket,
        response: &Value,
    ) -> Result<Option<&Feature>, MergeError> {
        let mode = self
            .queries
            .finish(ticket)
            .ok_or(MergeError::UnknownTicket(ticket))?;
        let features = decode(response, Projection::Geographic).inspect_err(|e| {
            warn!("ignoring malformed point-query response: {e}");
        })?;
        if features.is_empty() {
            debug!("point query {ticket:?} returned no features");
            return Ok(self.output.as_ref());
        }
        Ok(self.merge_at(features, mode)?)
    }

    /// Closes a failed query; the pool is unchanged.
    pub fn on_query_failed(&mut self, ticket: Ticket, error: NetworkError) -> MergeError {
        if self.queries.finish(ticket).is_none() {
            return MergeError::UnknownTicket(ticket);
        }
        warn!("{error}");
        MergeError::Network(error)
    }

    pub fn clear(&mut self) {
        self.pool.clear();
        self.output = None;
        self.generation.advance();
    }
}
