//! The build graph: single owner of all modules, scopes, variables, and
//! caches.
//!
//! `build` drives the passes in order: fetch (async, hook-concurrent), link,
//! execution-order analysis, tree-shaking, chunk partitioning. Every pass
//! after fetch is synchronous and deterministic given the fetched module
//! list. A graph is single-use: dropping the build future mid-flight leaves
//! it unfinished and unusable, matching cancel-propagation semantics.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use bramble_util::is_relative_specifier;

use crate::ast::{
    EffectsContext, EntityPathTracker, GlobalScope, NamespaceIndex, VariableTable,
};
use crate::cache::{BuildCache, ModuleRecord};
use crate::chunk::{generate_chunks, ChunkGraph, ChunkInput};
use crate::error::{BuildError, BuildResult};
use crate::execution::{analyze_execution_order, assign_entry_hashes};
use crate::linker::Linker;
use crate::loader::ModuleLoader;
use crate::module::{
    DynamicResolution, ExternalModule, Module, ModuleIdx, ModuleRef,
};
use crate::options::{ExternalOption, InputOptions};
use crate::plugin::{EmittedAsset, Plugin, PluginDriver};
use crate::treeshake::{warn_unused_external_imports, TreeShaker};
use crate::warning::{default_warning_handler, Warning, WarningHandler};

/// Process-wide root of one build.
pub struct Graph {
    options: InputOptions,
    plugins: PluginDriver,
    pub modules: Vec<Module>,
    pub externals: Vec<ExternalModule>,
    module_by_id: FxHashMap<String, ModuleRef>,
    variables: VariableTable,
    namespaces: NamespaceIndex,
    globals: GlobalScope,
    tracker: EntityPathTracker,
    watch_files: FxHashSet<String>,
    warnings: Vec<Warning>,
    onwarn: WarningHandler,
    entry_indices: Vec<ModuleIdx>,
    ordered: Vec<ModuleIdx>,
    cycle_paths: Vec<Vec<String>>,
    dynamic_entries: Vec<ModuleIdx>,
    dynamic_aliases: Vec<Option<String>>,
    chunks: ChunkGraph,
    started: bool,
    finished: bool,
}

impl Graph {
    /// Create a graph over the given options and plugins. Seeds the plugin
    /// cache from the warm-start cache, if any.
    #[must_use]
    pub fn new(mut options: InputOptions, plugins: Vec<Box<dyn Plugin>>) -> Self {
        let plugin_cache = options
            .cache
            .as_ref()
            .map(|cache| cache.plugins.clone())
            .unwrap_or_default();
        let onwarn = options.onwarn.take().unwrap_or_else(default_warning_handler);

        let mut variables = VariableTable::new();
        let globals = GlobalScope::new(&mut variables);

        Self {
            options,
            plugins: PluginDriver::new(plugins, plugin_cache),
            modules: Vec::new(),
            externals: Vec::new(),
            module_by_id: FxHashMap::default(),
            variables,
            namespaces: NamespaceIndex::default(),
            globals,
            tracker: EntityPathTracker::new(),
            watch_files: FxHashSet::default(),
            warnings: Vec::new(),
            onwarn,
            entry_indices: Vec::new(),
            ordered: Vec::new(),
            cycle_paths: Vec::new(),
            dynamic_entries: Vec::new(),
            dynamic_aliases: Vec::new(),
            chunks: ChunkGraph::default(),
            started: false,
            finished: false,
        }
    }

    /// Run the whole pipeline. Fatal errors abort with no partial result;
    /// warnings flow through the `onwarn` sink either way.
    pub async fn build(&mut self) -> BuildResult<()> {
        if self.started {
            return Err(BuildError::invalid_option(
                "a graph is single-use; create a new graph for another build",
            ));
        }
        self.started = true;

        let result = self.build_inner().await;
        self.flush_warnings();
        if result.is_ok() {
            self.finished = true;
        }
        result
    }

    async fn build_inner(&mut self) -> BuildResult<()> {
        self.validate_options()?;
        self.plugins.build_start().await?;

        // Phase 1: fetch. The loader borrows the graph's arenas directly so
        // recursive fetches see in-flight modules.
        let entry_indices = {
            let cached = self
                .options
                .cache
                .as_ref()
                .map(BuildCache::modules_by_id)
                .unwrap_or_default();
            let mut loader = ModuleLoader {
                plugins: &self.plugins,
                options: &self.options,
                modules: &mut self.modules,
                externals: &mut self.externals,
                module_by_id: &mut self.module_by_id,
                watch_files: &mut self.watch_files,
                warnings: &mut self.warnings,
                cached,
            };
            loader.add_entry_modules().await?
        };
        self.entry_indices = entry_indices;
        debug!(
            modules = self.modules.len(),
            externals = self.externals.len(),
            "fetch complete"
        );

        // Phase 2: link bindings across modules.
        let mut linker = Linker {
            modules: &mut self.modules,
            externals: &mut self.externals,
            module_by_id: &self.module_by_id,
            variables: &mut self.variables,
            namespaces: &mut self.namespaces,
            globals: &mut self.globals,
            options: &self.options,
        };
        linker.link()?;

        // Phase 3: execution order, cycles, colors.
        let analysis = analyze_execution_order(
            &mut self.modules,
            &self.entry_indices,
            &self.options,
            &mut self.warnings,
        );
        self.ordered = analysis.ordered;
        self.cycle_paths = analysis.cycle_paths;
        self.dynamic_entries = analysis.dynamic_entries;
        self.dynamic_aliases = analysis.dynamic_aliases;
        assign_entry_hashes(
            &mut self.modules,
            &self.entry_indices,
            &self.dynamic_entries,
            &self.options,
        );

        // Phase 4: tree-shaking. Roots are the entries plus every internal
        // dynamic-import target; `import()` observes the whole namespace.
        let roots = self.treeshake_roots();
        let treeshake = self.options.treeshake.clone();
        let mut shaker = TreeShaker {
            modules: &mut self.modules,
            variables: &mut self.variables,
            tracker: &mut self.tracker,
            ctx: EffectsContext {
                property_read_side_effects: treeshake
                    .as_ref()
                    .map_or(true, |t| t.property_read_side_effects),
            },
            pure_externals: treeshake
                .as_ref()
                .map(|t| t.pure_external_modules.clone())
                .unwrap_or_default(),
        };
        if treeshake.is_some() {
            shaker.run(&roots, &self.ordered);
        } else {
            shaker.include_all_in_bundle(&self.ordered);
        }
        warn_unused_external_imports(&self.externals, &self.variables, &mut self.warnings);

        // Phase 5: chunk partitioning.
        self.chunks = generate_chunks(ChunkInput {
            modules: &mut self.modules,
            variables: &self.variables,
            entries: &self.entry_indices,
            dynamic_entries: &self.dynamic_entries,
            dynamic_aliases: &self.dynamic_aliases,
            ordered: &self.ordered,
            options: &self.options,
        });

        Ok(())
    }

    fn validate_options(&self) -> BuildResult<()> {
        if self.options.input.is_empty() {
            return Err(BuildError::invalid_option("options.input is required"));
        }
        if self.options.inline_dynamic_imports && self.options.input.len() > 1 {
            return Err(BuildError::invalid_option(
                "multiple entry points are not supported with inline_dynamic_imports",
            ));
        }
        if let ExternalOption::Ids(ids) = &self.options.external {
            if let Some(relative) = ids.iter().find(|id| is_relative_specifier(id)) {
                return Err(BuildError::invalid_external_id(relative));
            }
        }
        Ok(())
    }

    /// Static entries plus internal dynamic-import targets, deduplicated, in
    /// deterministic order.
    fn treeshake_roots(&self) -> Vec<ModuleIdx> {
        let mut roots = self.entry_indices.clone();
        let mut seen: FxHashSet<ModuleIdx> = roots.iter().copied().collect();
        for &idx in &self.ordered {
            for dynamic in &self.modules[idx].dynamic_imports {
                if let DynamicResolution::Internal(target) = dynamic.resolution {
                    if seen.insert(target) {
                        roots.push(target);
                    }
                }
            }
        }
        roots
    }

    fn flush_warnings(&self) {
        for warning in &self.warnings {
            (self.onwarn)(warning);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Whether the build ran to completion.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Look a module up by id.
    #[must_use]
    pub fn module(&self, id: &str) -> Option<&Module> {
        match self.module_by_id.get(id)? {
            ModuleRef::Internal(idx) => Some(&self.modules[*idx]),
            ModuleRef::External(_) => None,
        }
    }

    /// Look an external module up by id.
    #[must_use]
    pub fn external(&self, id: &str) -> Option<&ExternalModule> {
        match self.module_by_id.get(id)? {
            ModuleRef::External(idx) => Some(&self.externals[*idx]),
            ModuleRef::Internal(_) => None,
        }
    }

    /// Modules in execution order.
    pub fn ordered_modules(&self) -> impl Iterator<Item = &Module> {
        self.ordered.iter().map(|&idx| &self.modules[idx])
    }

    /// One id path per detected static-import cycle.
    #[must_use]
    pub fn cycle_paths(&self) -> &[Vec<String>] {
        &self.cycle_paths
    }

    /// Internal modules reached only through dynamic imports.
    pub fn dynamic_imports(&self) -> impl Iterator<Item = &Module> {
        self.dynamic_entries.iter().map(|&idx| &self.modules[idx])
    }

    /// Aliases aligned with `dynamic_imports`.
    #[must_use]
    pub fn dynamic_import_aliases(&self) -> &[Option<String>] {
        &self.dynamic_aliases
    }

    /// Warnings accumulated so far, in emission order.
    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// The partitioned chunks.
    #[must_use]
    pub fn chunks(&self) -> &ChunkGraph {
        &self.chunks
    }

    /// Files the watcher should observe for this graph.
    #[must_use]
    pub fn watch_files(&self) -> &FxHashSet<String> {
        &self.watch_files
    }

    /// Assets emitted by plugins, in emission order.
    #[must_use]
    pub fn assets(&self) -> Vec<EmittedAsset> {
        self.plugins.context().assets()
    }

    /// Notify plugins of a watched-file change.
    pub fn watch_change(&self, id: &str) {
        self.plugins.watch_change(id);
    }

    /// Drain the graph into a warm-start cache for the next build. Evicts
    /// plugin-cache entries that went unused past the expiry threshold.
    #[must_use]
    pub fn get_cache(&self) -> BuildCache {
        let modules = self
            .modules
            .iter()
            .map(|module| ModuleRecord {
                id: module.id.clone(),
                original_code: module.original_code.clone(),
                original_sourcemap: module.original_sourcemap.clone(),
                code: module.source.clone(),
                ast: module.ast.clone(),
                dependencies: module
                    .sources
                    .iter()
                    .filter_map(|source| module.resolved_ids.get(source))
                    .map(|resolved| resolved.id.clone())
                    .collect(),
                transform_dependencies: module.transform_dependencies.clone(),
                transform_assets: module.transform_assets.clone(),
                resolved_ids: module.resolved_ids.clone(),
                custom_transform_cache: module.custom_transform_cache,
            })
            .collect();
        BuildCache {
            modules,
            plugins: self.plugins.context().take_cache(self.options.cache_expiry),
        }
    }
}
