//! Entity/path deoptimization tracker.
//!
//! The fixed-point marking pass can revisit the same variable through the
//! same property path many times (namespace re-exports are the usual
//! culprit). Recording visited (entity, path) pairs keeps the traversal
//! O(entities × path depth) instead of exponential.

use rustc_hash::FxHashSet;

use super::variable::VariableId;

/// Tracks which (entity, path) pairs have already been visited.
#[derive(Debug, Default)]
pub struct EntityPathTracker {
    entered: FxHashSet<(VariableId, String)>,
}

impl EntityPathTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a visit. Returns true if the pair was not seen before.
    pub fn enter(&mut self, entity: VariableId, path: &[&str]) -> bool {
        self.entered.insert((entity, path.join(".")))
    }

    /// Whether a pair has been visited.
    #[must_use]
    pub fn entered(&self, entity: VariableId, path: &[&str]) -> bool {
        self.entered.contains(&(entity, path.join(".")))
    }

    /// Forget everything (a fresh marking round starts from scratch).
    pub fn clear(&mut self) {
        self.entered.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_once() {
        let mut tracker = EntityPathTracker::new();
        assert!(tracker.enter(1, &["foo"]));
        assert!(!tracker.enter(1, &["foo"]));
        assert!(tracker.enter(1, &["foo", "bar"]));
        assert!(tracker.enter(2, &["foo"]));
    }

    #[test]
    fn test_entered() {
        let mut tracker = EntityPathTracker::new();
        tracker.enter(7, &[]);
        assert!(tracker.entered(7, &[]));
        assert!(!tracker.entered(7, &["x"]));
    }
}
