//! Warm-start build cache.
//!
//! A finished graph can be drained into a [`BuildCache`]; the next build
//! passes it back through `InputOptions::cache` to skip transforming modules
//! whose loaded source did not change.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ast::Program;
use crate::module::ResolvedId;
use crate::plugin::{EmittedAsset, PluginCacheStore};

/// Round-trippable snapshot of a loaded module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: String,
    /// Source as returned by `load`, before any transform.
    pub original_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_sourcemap: Option<String>,
    /// Transformed source.
    pub code: String,
    pub ast: Program,
    /// Resolved ids of static dependencies, in source order.
    pub dependencies: Vec<String>,
    /// Extra files the transform depends on.
    #[serde(default)]
    pub transform_dependencies: Vec<String>,
    /// Assets emitted while transforming; re-emitted on cache reuse.
    #[serde(default)]
    pub transform_assets: Vec<EmittedAsset>,
    /// specifier -> resolution, pre-populating the next build's resolver.
    #[serde(default)]
    pub resolved_ids: FxHashMap<String, ResolvedId>,
    /// Set when a transform hook used its plugin cache; such modules are
    /// never reused verbatim.
    #[serde(default)]
    pub custom_transform_cache: bool,
}

/// Everything a build persists for the next one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildCache {
    pub modules: Vec<ModuleRecord>,
    #[serde(default)]
    pub plugins: PluginCacheStore,
}

impl BuildCache {
    /// Index the cached modules by id for O(1) lookup during fetch.
    #[must_use]
    pub fn modules_by_id(&self) -> FxHashMap<&str, &ModuleRecord> {
        self.modules
            .iter()
            .map(|record| (record.id.as_str(), record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let record = ModuleRecord {
            id: "/src/a.js".into(),
            original_code: "export const a = 1;".into(),
            original_sourcemap: None,
            code: "export const a = 1;".into(),
            ast: Program::default(),
            dependencies: vec!["/src/b.js".into()],
            transform_dependencies: Vec::new(),
            transform_assets: Vec::new(),
            resolved_ids: FxHashMap::default(),
            custom_transform_cache: false,
        };
        let cache = BuildCache {
            modules: vec![record],
            plugins: PluginCacheStore::default(),
        };
        let json = serde_json::to_string(&cache).unwrap();
        let back: BuildCache = serde_json::from_str(&json).unwrap();
        assert_eq!(back.modules.len(), 1);
        assert_eq!(back.modules[0].id, "/src/a.js");
        assert_eq!(back.modules[0].dependencies, vec!["/src/b.js".to_string()]);
    }
}
