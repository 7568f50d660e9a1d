//! Build configuration consumed by the graph.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::cache::BuildCache;
use crate::parse::ParserOptions;
use crate::warning::WarningHandler;

/// A requested entry point.
///
/// `target` is resolved through the plugin pipeline; `alias` (the key when the
/// input was an alias map) becomes the chunk alias of the resolved module.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub alias: Option<String>,
    pub target: String,
}

impl EntryPoint {
    /// Create an unaliased entry.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            alias: None,
            target: target.into(),
        }
    }

    /// Create an aliased entry (`{alias: target}` input form).
    #[must_use]
    pub fn aliased(alias: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            alias: Some(alias.into()),
            target: target.into(),
        }
    }
}

/// Predicate form of the `external` option.
pub type ExternalFn = Arc<dyn Fn(&str, Option<&str>, bool) -> bool + Send + Sync>;

/// Which ids are treated as external to the build.
#[derive(Clone, Default)]
pub enum ExternalOption {
    /// Nothing is external.
    #[default]
    None,
    /// Exact id match against a list.
    Ids(Vec<String>),
    /// Host predicate: `(id, importer, is_resolved) -> bool`.
    Fn(ExternalFn),
}

impl ExternalOption {
    /// Whether `id` is external. Ids beginning with `\0` are never external.
    #[must_use]
    pub fn is_external(&self, id: &str, importer: Option<&str>, is_resolved: bool) -> bool {
        if id.starts_with('\0') {
            return false;
        }
        match self {
            Self::None => false,
            Self::Ids(ids) => ids.iter().any(|e| e == id),
            Self::Fn(f) => f(id, importer, is_resolved),
        }
    }
}

impl fmt::Debug for ExternalOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "ExternalOption::None"),
            Self::Ids(ids) => f.debug_tuple("ExternalOption::Ids").field(ids).finish(),
            Self::Fn(_) => write!(f, "ExternalOption::Fn(..)"),
        }
    }
}

/// Predicate form of `pure_external_modules`.
pub type PureExternalFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Which external modules are assumed side-effect free when imported purely
/// for their side effects.
#[derive(Clone, Default)]
pub enum PureExternalModules {
    /// Externals may have side effects; bare `import "pkg"` is kept.
    #[default]
    None,
    /// No external ever has side effects.
    All,
    /// Only the listed ids are pure.
    Ids(Vec<String>),
    /// Host predicate over the external id.
    Fn(PureExternalFn),
}

impl PureExternalModules {
    /// Whether importing `id` for side effects alone can be dropped.
    #[must_use]
    pub fn is_pure(&self, id: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Ids(ids) => ids.iter().any(|e| e == id),
            Self::Fn(f) => f(id),
        }
    }
}

impl fmt::Debug for PureExternalModules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "PureExternalModules::None"),
            Self::All => write!(f, "PureExternalModules::All"),
            Self::Ids(ids) => f.debug_tuple("PureExternalModules::Ids").field(ids).finish(),
            Self::Fn(_) => write!(f, "PureExternalModules::Fn(..)"),
        }
    }
}

/// Tree-shaking policy knobs.
#[derive(Debug, Clone)]
pub struct TreeshakeOptions {
    /// If false, `x.y` without a call is inert.
    pub property_read_side_effects: bool,
    /// Externals assumed pure for side-effect-only imports.
    pub pure_external_modules: PureExternalModules,
}

impl Default for TreeshakeOptions {
    fn default() -> Self {
        Self {
            property_read_side_effects: true,
            pure_external_modules: PureExternalModules::None,
        }
    }
}

/// Per-module `this` context override.
pub type ModuleContextFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The `module_context` option: per-module override of `context`.
#[derive(Clone, Default)]
pub enum ModuleContext {
    /// No per-module override.
    #[default]
    None,
    /// Exact id -> context map.
    Map(FxHashMap<String, String>),
    /// Host function.
    Fn(ModuleContextFn),
}

impl ModuleContext {
    /// Look up the context override for a module id.
    #[must_use]
    pub fn resolve(&self, id: &str) -> Option<String> {
        match self {
            Self::None => None,
            Self::Map(map) => map.get(id).cloned(),
            Self::Fn(f) => f(id),
        }
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "ModuleContext::None"),
            Self::Map(map) => f.debug_tuple("ModuleContext::Map").field(map).finish(),
            Self::Fn(_) => write!(f, "ModuleContext::Fn(..)"),
        }
    }
}

/// Build configuration consumed by the module graph core.
pub struct InputOptions {
    /// Entry point set, in configured order.
    pub input: Vec<EntryPoint>,
    /// External id predicate.
    pub external: ExternalOption,
    /// Tree-shaking policy; `None` disables tree-shaking entirely.
    pub treeshake: Option<TreeshakeOptions>,
    /// Warm-start cache from a previous build.
    pub cache: Option<BuildCache>,
    /// Plugin-cache eviction threshold (accesses a key may go unused before
    /// it is dropped at `get_cache()`).
    pub cache_expiry: u32,
    /// Default `this` value for modules.
    pub context: String,
    /// Per-module `this` override.
    pub module_context: ModuleContext,
    /// Synthesize a shim for missing import bindings instead of failing.
    pub shim_missing_exports: bool,
    /// Prefer `const` over `var` in generated bindings.
    pub prefer_const: bool,
    /// Parser configuration for the default parser.
    pub parser: ParserOptions,
    /// One chunk per module instead of entry-reachability grouping.
    pub preserve_modules: bool,
    /// Collapse dynamic-import targets into the single entry chunk.
    pub inline_dynamic_imports: bool,
    /// Manual chunk buckets: alias -> module ids forced into that chunk.
    pub manual_chunks: FxHashMap<String, Vec<String>>,
    /// Warning handler; `None` uses the deduplicating stderr default.
    pub onwarn: Option<WarningHandler>,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            input: Vec::new(),
            external: ExternalOption::default(),
            treeshake: Some(TreeshakeOptions::default()),
            cache: None,
            cache_expiry: 10,
            context: "undefined".to_string(),
            module_context: ModuleContext::default(),
            shim_missing_exports: false,
            prefer_const: false,
            parser: ParserOptions::default(),
            preserve_modules: false,
            inline_dynamic_imports: false,
            manual_chunks: FxHashMap::default(),
            onwarn: None,
        }
    }
}

impl InputOptions {
    /// Keyword used for generated bindings.
    #[must_use]
    pub fn var_or_const(&self) -> &'static str {
        if self.prefer_const {
            "const"
        } else {
            "var"
        }
    }

    /// Resolve the `this` context for a module id.
    #[must_use]
    pub fn context_for(&self, id: &str) -> String {
        self.module_context
            .resolve(id)
            .unwrap_or_else(|| self.context.clone())
    }
}

impl fmt::Debug for InputOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputOptions")
            .field("input", &self.input)
            .field("external", &self.external)
            .field("treeshake", &self.treeshake)
            .field("cache_expiry", &self.cache_expiry)
            .field("context", &self.context)
            .field("shim_missing_exports", &self.shim_missing_exports)
            .field("prefer_const", &self.prefer_const)
            .field("preserve_modules", &self.preserve_modules)
            .field("inline_dynamic_imports", &self.inline_dynamic_imports)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_null_byte_never_external() {
        let external = ExternalOption::Fn(Arc::new(|_, _, _| true));
        assert!(external.is_external("lodash", None, false));
        assert!(!external.is_external("\0virtual", None, false));
    }

    #[test]
    fn test_external_id_list() {
        let external = ExternalOption::Ids(vec!["react".to_string()]);
        assert!(external.is_external("react", None, false));
        assert!(!external.is_external("react-dom", None, false));
    }

    #[test]
    fn test_pure_external_modules() {
        assert!(PureExternalModules::All.is_pure("anything"));
        assert!(!PureExternalModules::None.is_pure("anything"));
        let list = PureExternalModules::Ids(vec!["lodash".to_string()]);
        assert!(list.is_pure("lodash"));
        assert!(!list.is_pure("rxjs"));
    }

    #[test]
    fn test_context_for() {
        let mut options = InputOptions::default();
        assert_eq!(options.context_for("/a.js"), "undefined");
        let mut map = FxHashMap::default();
        map.insert("/a.js".to_string(), "window".to_string());
        options.module_context = ModuleContext::Map(map);
        assert_eq!(options.context_for("/a.js"), "window");
        assert_eq!(options.context_for("/b.js"), "undefined");
    }

    #[test]
    fn test_var_or_const() {
        let mut options = InputOptions::default();
        assert_eq!(options.var_or_const(), "var");
        options.prefer_const = true;
        assert_eq!(options.var_or_const(), "const");
    }
}
