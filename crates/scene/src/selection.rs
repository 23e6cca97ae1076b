use indexmap::IndexMap;

use crate::feature::Feature;

/// Selected features keyed by provider identifier.
///
/// Ordering contract:
/// - Iteration yields features in first-insertion order.
/// - Removing a feature does not perturb the order of the remaining ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionPool {
    entries: IndexMap<String, Feature>,
}

impl SelectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Feature> {
        self.entries.get(id)
    }

    /// Inserts `feature` under `id`.
    ///
    /// Returns `true` if the pool changed; an existing entry is replaced in
    /// place and keeps its position.
    pub fn insert(&mut self, id: impl Into<String>, feature: Feature) -> bool {
        let id = id.into();
        match self.entries.get_mut(&id) {
            Some(existing) if *existing == feature => false,
            Some(existing) => {
                *existing = feature;
                true
            }
            None => {
                self.entries.insert(id, feature);
                true
            }
        }
    }

    /// Removes the entry for `id`.
    ///
    /// Returns the removed feature if the pool changed.
    pub fn remove(&mut self, id: &str) -> Option<Feature> {
        self.entries.shift_remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Feature)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn features(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::SelectionPool;
    use crate::feature::{Feature, FeatureGeometry};

    fn f(x: f64) -> Feature {
        Feature::new(FeatureGeometry::point([x, 0.0]))
    }

    #[test]
    fn insert_remove_contains_and_len() {
        let mut p = SelectionPool::new();
        assert!(p.is_empty());
        assert!(!p.contains("A"));

        assert!(p.insert("A", f(1.0)));
        assert!(p.contains("A"));
        assert_eq!(p.len(), 1);
        assert!(!p.insert("A", f(1.0)));
        assert!(p.insert("A", f(2.0)));
        assert_eq!(p.len(), 1);

        assert!(p.remove("A").is_some());
        assert!(!p.contains("A"));
        assert!(p.remove("A").is_none());
    }

    #[test]
    fn iteration_keeps_insertion_order_after_removal() {
        let mut p = SelectionPool::new();
        p.insert("c", f(3.0));
        p.insert("a", f(1.0));
        p.insert("b", f(2.0));
        p.remove("a");
        let ids: Vec<&str> = p.ids().collect();
        assert_eq!(ids, vec!["c", "b"]);
    }
}
