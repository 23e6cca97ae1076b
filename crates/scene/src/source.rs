use foundation::Extent;
use serde_json::{Map, Value};

use crate::feature::{Feature, FeatureGeometry};

/// Ordered, mutable collection of features forming one layer.
///
/// Mutation is append/remove/clear plus the single geometry edit path
/// [`FeatureSet::modify_geometry`]. Every successful mutation bumps
/// `revision`, which lets observers tell "changed" from "touched".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
    revision: u64,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn get(&self, index: usize) -> Option<&Feature> {
        self.features.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.features.iter()
    }

    /// Appends a feature and returns its index.
    pub fn push(&mut self, feature: Feature) -> usize {
        self.features.push(feature);
        self.bump();
        self.features.len() - 1
    }

    pub fn extend(&mut self, features: impl IntoIterator<Item = Feature>) {
        let before = self.features.len();
        self.features.extend(features);
        if self.features.len() != before {
            self.bump();
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<Feature> {
        if index >= self.features.len() {
            return None;
        }
        let f = self.features.remove(index);
        self.bump();
        Some(f)
    }

    /// Removes every feature. Returns `true` if the set changed.
    pub fn clear(&mut self) -> bool {
        if self.features.is_empty() {
            return false;
        }
        self.features.clear();
        self.bump();
        true
    }

    /// Edits one feature's geometry in place. `edit` must return `false`
    /// without touching the geometry when it refuses the change.
    pub fn modify_geometry(
        &mut self,
        index: usize,
        edit: impl FnOnce(&mut FeatureGeometry) -> bool,
    ) -> bool {
        let Some(feature) = self.features.get_mut(index) else {
            return false;
        };
        if !edit(&mut feature.geometry) {
            return false;
        }
        self.bump();
        true
    }

    /// Visits every feature with read-only geometry and a writable property
    /// bag. Does not bump `revision`.
    pub fn annotate(
        &mut self,
        mut visit: impl FnMut(usize, &FeatureGeometry, &mut Map<String, Value>),
    ) {
        for (index, feature) in self.features.iter_mut().enumerate() {
            visit(index, &feature.geometry, &mut feature.properties);
        }
    }

    pub fn extent(&self) -> Extent {
        self.features
            .iter()
            .fold(Extent::empty(), |acc, f| acc.union(&f.extent()))
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}
