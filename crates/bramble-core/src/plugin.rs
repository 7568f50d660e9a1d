//! Plugin system for the module graph.
//!
//! Hooks drive the fetch pipeline: `resolve_id`, `load`, `transform`, and
//! `resolve_dynamic_import` may suspend on I/O, so they return boxed futures.
//! All analysis after fetching is synchronous and never calls back into
//! plugins.
//!
//! ## Example
//!
//! ```ignore
//! use bramble_core::plugin::{Plugin, PluginContext, HookFuture, Resolution};
//!
//! struct Virtual;
//!
//! impl Plugin for Virtual {
//!     fn name(&self) -> &str { "virtual" }
//!
//!     fn resolve_id<'a>(
//!         &'a self,
//!         source: &'a str,
//!         _importer: Option<&'a str>,
//!         _ctx: &'a PluginContext,
//!     ) -> HookFuture<'a, Resolution> {
//!         Box::pin(async move {
//!             if source == "virtual-entry" {
//!                 Ok(Resolution::Resolved("\0virtual-entry".to_string()))
//!             } else {
//!                 Ok(Resolution::Unhandled)
//!             }
//!         })
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ast::Program;
use crate::error::BuildError;

/// Result type for plugin hooks.
pub type HookResult<T> = Result<T, PluginError>;

/// Boxed future returned by async hooks.
pub type HookFuture<'a, T> = BoxFuture<'a, HookResult<T>>;

/// Error from a plugin hook.
#[derive(Debug)]
pub struct PluginError {
    /// Plugin name that caused the error.
    pub plugin: String,
    /// Hook that failed.
    pub hook: &'static str,
    /// Error message.
    pub message: String,
}

impl PluginError {
    /// Create a new plugin error.
    #[must_use]
    pub fn new(plugin: impl Into<String>, hook: &'static str, message: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            hook,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.plugin, self.hook, self.message)
    }
}

impl std::error::Error for PluginError {}

impl From<PluginError> for BuildError {
    fn from(err: PluginError) -> Self {
        let message = err.to_string();
        BuildError::plugin(&err.plugin, message)
    }
}

/// Outcome of id resolution.
///
/// The three cases are distinct on purpose: an explicit external is not the
/// same as "no opinion".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Resolved to a concrete module id.
    Resolved(String),
    /// The id is external; keep the specifier out of the graph.
    ExplicitExternal,
    /// This plugin has no opinion; ask the next one.
    Unhandled,
}

/// Source returned by `load` or `transform`.
#[derive(Debug, Clone, Default)]
pub struct SourceDescription {
    /// Module source code.
    pub code: String,
    /// Optional source map (opaque to the core).
    pub map: Option<String>,
    /// Optional pre-built AST; skips the default parser.
    pub ast: Option<Program>,
}

impl SourceDescription {
    /// Create a source description with code only.
    #[must_use]
    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
            ast: None,
        }
    }
}

/// A non-JS artifact registered through `emit_asset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedAsset {
    /// Content-derived asset id.
    pub id: String,
    /// Suggested file name.
    pub name: String,
    /// Asset content.
    pub source: String,
}

/// Per-plugin persistent cache: key -> (access counter, value).
pub type PluginCacheBucket = FxHashMap<String, (u32, serde_json::Value)>;

/// All plugin cache buckets, keyed by plugin name.
pub type PluginCacheStore = FxHashMap<String, PluginCacheBucket>;

/// Context passed to plugin hooks.
///
/// Shared across concurrent hook invocations, so interior state is behind
/// mutexes.
pub struct PluginContext {
    assets: Mutex<Vec<EmittedAsset>>,
    cache: Mutex<PluginCacheStore>,
    cache_accesses: AtomicU32,
}

impl Default for PluginContext {
    fn default() -> Self {
        Self::new(PluginCacheStore::default())
    }
}

impl PluginContext {
    /// Create a context seeded with a warm plugin cache. Every pre-existing
    /// entry ages by one access; entries nobody touches this build will cross
    /// the expiry threshold eventually.
    #[must_use]
    pub fn new(mut cache: PluginCacheStore) -> Self {
        for bucket in cache.values_mut() {
            for (counter, _) in bucket.values_mut() {
                *counter += 1;
            }
        }
        Self {
            assets: Mutex::new(Vec::new()),
            cache: Mutex::new(cache),
            cache_accesses: AtomicU32::new(0),
        }
    }

    /// Register an asset keyed by a content-derived id. Emitting the same
    /// content twice yields the same id.
    pub fn emit_asset(&self, name: impl Into<String>, source: impl Into<String>) -> String {
        let name = name.into();
        let source = source.into();
        let id = bramble_util::blake3_bytes(source.as_bytes())[..16].to_string();
        let mut assets = self.assets.lock().unwrap();
        if !assets.iter().any(|a| a.id == id) {
            assets.push(EmittedAsset {
                id: id.clone(),
                name,
                source,
            });
        }
        id
    }

    /// Re-register an already-materialized asset (cache warm start).
    pub fn emit_existing_asset(&self, asset: &EmittedAsset) {
        let mut assets = self.assets.lock().unwrap();
        if !assets.iter().any(|a| a.id == asset.id) {
            assets.push(asset.clone());
        }
    }

    /// All assets emitted so far, in emission order.
    #[must_use]
    pub fn assets(&self) -> Vec<EmittedAsset> {
        self.assets.lock().unwrap().clone()
    }

    /// Number of assets emitted so far.
    #[must_use]
    pub fn asset_count(&self) -> usize {
        self.assets.lock().unwrap().len()
    }

    /// Assets emitted after the first `from` entries.
    #[must_use]
    pub fn assets_since(&self, from: usize) -> Vec<EmittedAsset> {
        self.assets.lock().unwrap()[from..].to_vec()
    }

    /// Read a value from a plugin's cache bucket. Resets the entry's access
    /// counter.
    #[must_use]
    pub fn cache_get(&self, plugin: &str, key: &str) -> Option<serde_json::Value> {
        self.cache_accesses.fetch_add(1, Ordering::Relaxed);
        let mut cache = self.cache.lock().unwrap();
        let entry = cache.get_mut(plugin)?.get_mut(key)?;
        entry.0 = 0;
        Some(entry.1.clone())
    }

    /// Write a value into a plugin's cache bucket.
    pub fn cache_set(&self, plugin: &str, key: impl Into<String>, value: serde_json::Value) {
        self.cache_accesses.fetch_add(1, Ordering::Relaxed);
        let mut cache = self.cache.lock().unwrap();
        cache
            .entry(plugin.to_string())
            .or_default()
            .insert(key.into(), (0, value));
    }

    /// Total cache accesses so far (used to detect custom transform caching).
    #[must_use]
    pub fn cache_access_count(&self) -> u32 {
        self.cache_accesses.load(Ordering::Relaxed)
    }

    /// Drain the plugin cache, evicting entries whose access counter reached
    /// `expiry` and dropping empty buckets.
    #[must_use]
    pub fn take_cache(&self, expiry: u32) -> PluginCacheStore {
        let mut cache = self.cache.lock().unwrap();
        let mut store = std::mem::take(&mut *cache);
        for bucket in store.values_mut() {
            bucket.retain(|_, (counter, _)| *counter < expiry);
        }
        store.retain(|_, bucket| !bucket.is_empty());
        store
    }
}

/// The main plugin trait.
///
/// All hooks have default implementations, so a plugin only implements the
/// ones it cares about. Async hooks return [`HookFuture`]s; `watch_change` is
/// a synchronous notification.
pub trait Plugin: Send + Sync {
    /// Plugin name for diagnostics.
    fn name(&self) -> &str;

    /// Called once before the first module is fetched.
    fn build_start<'a>(&'a self, _ctx: &'a PluginContext) -> HookFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    /// Resolve a module specifier to an id.
    fn resolve_id<'a>(
        &'a self,
        _source: &'a str,
        _importer: Option<&'a str>,
        _ctx: &'a PluginContext,
    ) -> HookFuture<'a, Resolution> {
        Box::pin(async { Ok(Resolution::Unhandled) })
    }

    /// Load a module by id. `None` falls through to the next plugin, then to
    /// the filesystem.
    fn load<'a>(&'a self, _id: &'a str, _ctx: &'a PluginContext) -> HookFuture<'a, Option<SourceDescription>> {
        Box::pin(async { Ok(None) })
    }

    /// Transform loaded source. `None` passes the code through unchanged.
    fn transform<'a>(
        &'a self,
        _code: &'a str,
        _id: &'a str,
        _ctx: &'a PluginContext,
    ) -> HookFuture<'a, Option<SourceDescription>> {
        Box::pin(async { Ok(None) })
    }

    /// Resolve a dynamic import. `specifier` is `Some` for a string-literal
    /// argument, `None` for an arbitrary expression. Returning `Some(id)`
    /// resolves a literal specifier or replaces an expression.
    fn resolve_dynamic_import<'a>(
        &'a self,
        _specifier: Option<&'a str>,
        _importer: &'a str,
        _ctx: &'a PluginContext,
    ) -> HookFuture<'a, Option<String>> {
        Box::pin(async { Ok(None) })
    }

    /// Synchronous notification that a watched file changed.
    fn watch_change(&self, _id: &str) {}
}

/// Dispatches hooks across all registered plugins.
///
/// `resolve_id`, `load`, and `resolve_dynamic_import` are first-non-null:
/// plugins run in registration order and the first definitive answer wins.
/// `transform` chains every plugin over the current code.
pub struct PluginDriver {
    plugins: Vec<Box<dyn Plugin>>,
    ctx: PluginContext,
}

impl Default for PluginDriver {
    fn default() -> Self {
        Self::new(Vec::new(), PluginCacheStore::default())
    }
}

impl PluginDriver {
    /// Create a driver over the given plugins, seeding the plugin cache.
    #[must_use]
    pub fn new(plugins: Vec<Box<dyn Plugin>>, cache: PluginCacheStore) -> Self {
        Self {
            plugins,
            ctx: PluginContext::new(cache),
        }
    }

    /// The shared hook context.
    #[must_use]
    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Whether any plugins are registered.
    #[must_use]
    pub fn has_plugins(&self) -> bool {
        !self.plugins.is_empty()
    }

    /// Call `build_start` on every plugin, in order.
    pub async fn build_start(&self) -> Result<(), BuildError> {
        for plugin in &self.plugins {
            plugin.build_start(&self.ctx).await?;
        }
        Ok(())
    }

    /// First-non-null id resolution.
    pub async fn resolve_id(
        &self,
        source: &str,
        importer: Option<&str>,
    ) -> Result<Resolution, BuildError> {
        for plugin in &self.plugins {
            match plugin.resolve_id(source, importer, &self.ctx).await? {
                Resolution::Unhandled => continue,
                resolution => return Ok(resolution),
            }
        }
        Ok(Resolution::Unhandled)
    }

    /// First-non-null load. Returns the source and the name of the plugin
    /// that provided it.
    pub async fn load(&self, id: &str) -> Result<Option<(SourceDescription, String)>, BuildError> {
        for plugin in &self.plugins {
            if let Some(source) = plugin.load(id, &self.ctx).await? {
                return Ok(Some((source, plugin.name().to_string())));
            }
        }
        Ok(None)
    }

    /// Chain `transform` across all plugins. Returns the final source plus
    /// whether any plugin touched its cache while transforming (which makes
    /// the result unreusable from the module cache).
    pub async fn transform(
        &self,
        code: String,
        id: &str,
    ) -> Result<(SourceDescription, bool), BuildError> {
        let accesses_before = self.ctx.cache_access_count();
        let mut current = SourceDescription {
            code,
            map: None,
            ast: None,
        };
        for plugin in &self.plugins {
            if let Some(result) = plugin.transform(&current.code, id, &self.ctx).await? {
                current = result;
            }
        }
        let used_cache = self.ctx.cache_access_count() > accesses_before;
        Ok((current, used_cache))
    }

    /// First-non-null dynamic import resolution.
    pub async fn resolve_dynamic_import(
        &self,
        specifier: Option<&str>,
        importer: &str,
    ) -> Result<Option<String>, BuildError> {
        for plugin in &self.plugins {
            if let Some(resolved) = plugin
                .resolve_dynamic_import(specifier, importer, &self.ctx)
                .await?
            {
                return Ok(Some(resolved));
            }
        }
        Ok(None)
    }

    /// Synchronous in-order notification of a watched-file change.
    pub fn watch_change(&self, id: &str) {
        for plugin in &self.plugins {
            plugin.watch_change(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Resolver(&'static str, Resolution);

    impl Plugin for Resolver {
        fn name(&self) -> &str {
            self.0
        }

        fn resolve_id<'a>(
            &'a self,
            _source: &'a str,
            _importer: Option<&'a str>,
            _ctx: &'a PluginContext,
        ) -> HookFuture<'a, Resolution> {
            let resolution = self.1.clone();
            Box::pin(async move { Ok(resolution) })
        }
    }

    #[tokio::test]
    async fn test_hook_first_order() {
        let driver = PluginDriver::new(
            vec![
                Box::new(Resolver("a", Resolution::Unhandled)),
                Box::new(Resolver("b", Resolution::Resolved("/b".into()))),
                Box::new(Resolver("c", Resolution::Resolved("/c".into()))),
            ],
            PluginCacheStore::default(),
        );
        let resolution = driver.resolve_id("x", None).await.unwrap();
        assert_eq!(resolution, Resolution::Resolved("/b".into()));
    }

    #[tokio::test]
    async fn test_explicit_external_is_not_unhandled() {
        let driver = PluginDriver::new(
            vec![
                Box::new(Resolver("a", Resolution::ExplicitExternal)),
                Box::new(Resolver("b", Resolution::Resolved("/b".into()))),
            ],
            PluginCacheStore::default(),
        );
        let resolution = driver.resolve_id("x", None).await.unwrap();
        assert_eq!(resolution, Resolution::ExplicitExternal);
    }

    #[test]
    fn test_emit_asset_content_addressed() {
        let ctx = PluginContext::default();
        let a = ctx.emit_asset("logo.svg", "<svg/>");
        let b = ctx.emit_asset("logo-copy.svg", "<svg/>");
        assert_eq!(a, b);
        assert_eq!(ctx.assets().len(), 1);
    }

    #[test]
    fn test_cache_eviction_at_take() {
        let mut store = PluginCacheStore::default();
        let mut bucket = PluginCacheBucket::default();
        bucket.insert("stale".into(), (5, serde_json::json!(1)));
        bucket.insert("fresh".into(), (0, serde_json::json!(2)));
        store.insert("p".into(), bucket);
        let mut empty = PluginCacheBucket::default();
        empty.insert("old".into(), (9, serde_json::json!(3)));
        store.insert("q".into(), empty);

        let ctx = PluginContext::new(store);
        let taken = ctx.take_cache(5);
        assert_eq!(taken.get("p").unwrap().len(), 1);
        assert!(taken.get("p").unwrap().contains_key("fresh"));
        assert!(!taken.contains_key("q"));
    }

    #[test]
    fn test_cache_get_resets_counter() {
        let mut store = PluginCacheStore::default();
        let mut bucket = PluginCacheBucket::default();
        bucket.insert("k".into(), (4, serde_json::json!("v")));
        store.insert("p".into(), bucket);

        let ctx = PluginContext::new(store);
        assert_eq!(ctx.cache_get("p", "k"), Some(serde_json::json!("v")));
        let taken = ctx.take_cache(4);
        assert!(taken.get("p").unwrap().contains_key("k"));
    }
}
