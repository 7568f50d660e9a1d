//! Chunk partitioning.
//!
//! Included modules group by their entry-reachability color: two modules land
//! in the same chunk exactly when the same set of roots reaches both. Chunks
//! are then linked (cross-chunk imports resolved to the owning chunk's
//! exports) and entries that cannot head their home chunk get a facade chunk
//! re-exporting their public API.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use bramble_util::hash_hex;

use crate::ast::{VariableId, VariableKind, VariableTable};
use crate::module::{DynamicResolution, ExternalIdx, Module, ModuleIdx};
use crate::options::InputOptions;

/// Index into `ChunkGraph.chunks`.
pub type ChunkId = usize;

/// Where a cross-chunk import comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkSource {
    Chunk(ChunkId),
    External(ExternalIdx),
}

/// Bindings one chunk pulls from another chunk or an external module.
#[derive(Debug, Clone)]
pub struct ChunkImport {
    pub source: ChunkSource,
    pub variables: Vec<VariableId>,
}

/// An ordered group of modules emitted as one output file.
#[derive(Debug)]
pub struct Chunk {
    pub id: ChunkId,
    pub name: String,
    /// Member modules in execution order; empty for facade chunks.
    pub modules: Vec<ModuleIdx>,
    /// The entry module heading this chunk, if any.
    pub entry_module: Option<ModuleIdx>,
    /// True when the chunk's output shape is exactly the entry's public API.
    pub is_entry_module_facade: bool,
    pub is_manual_chunk: bool,
    /// For facade chunks: the entry whose API this chunk re-exports.
    pub facade_for: Option<ModuleIdx>,
    /// Exposed bindings: exported name -> variable.
    pub exports: Vec<(String, VariableId)>,
    /// Cross-chunk and external imports.
    pub imports: Vec<ChunkImport>,
    /// Chunks this chunk loads through dynamic imports.
    pub dynamic_dependencies: Vec<ChunkId>,
}

impl Chunk {
    fn new(id: ChunkId, name: String) -> Self {
        Self {
            id,
            name,
            modules: Vec::new(),
            entry_module: None,
            is_entry_module_facade: false,
            is_manual_chunk: false,
            facade_for: None,
            exports: Vec::new(),
            imports: Vec::new(),
            dynamic_dependencies: Vec::new(),
        }
    }

    /// Whether this is a facade chunk (re-exports only, no modules).
    #[must_use]
    pub fn is_facade(&self) -> bool {
        self.facade_for.is_some()
    }
}

/// The partitioned output.
#[derive(Debug, Default)]
pub struct ChunkGraph {
    chunks: Vec<Chunk>,
}

impl ChunkGraph {
    /// All chunks, facades last.
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Chunks that head an entry point (facades included).
    pub fn entry_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks
            .iter()
            .filter(|c| c.entry_module.is_some() || c.is_facade())
    }

    /// The chunk a module was assigned to.
    #[must_use]
    pub fn chunk_for_module(&self, modules: &[Module], idx: ModuleIdx) -> Option<&Chunk> {
        modules[idx].chunk.map(|c| &self.chunks[c])
    }
}

/// Inputs the partitioner needs from the graph.
pub(crate) struct ChunkInput<'a> {
    pub modules: &'a mut Vec<Module>,
    pub variables: &'a VariableTable,
    pub entries: &'a [ModuleIdx],
    pub dynamic_entries: &'a [ModuleIdx],
    pub dynamic_aliases: &'a [Option<String>],
    pub ordered: &'a [ModuleIdx],
    pub options: &'a InputOptions,
}

/// Partition included modules into chunks and link them.
pub(crate) fn generate_chunks(input: ChunkInput<'_>) -> ChunkGraph {
    let ChunkInput {
        modules,
        variables,
        entries,
        dynamic_entries,
        dynamic_aliases,
        ordered,
        options,
    } = input;

    let manual_hashes: FxHashMap<String, String> = options
        .manual_chunks
        .keys()
        .map(|alias| {
            let hex = hash_hex(&bramble_util::entry_hash_seed(&format!("manual:{alias}")));
            (hex, alias.clone())
        })
        .collect();

    let mut graph = ChunkGraph::default();

    if options.preserve_modules {
        for &idx in ordered {
            if !modules[idx].is_included() && !modules[idx].is_entry {
                continue;
            }
            let id = graph.chunks.len();
            let name = modules[idx]
                .chunk_alias
                .clone()
                .unwrap_or_else(|| stem_of(&modules[idx].id));
            let mut chunk = Chunk::new(id, name);
            chunk.modules.push(idx);
            chunk.entry_module = Some(idx);
            chunk.is_entry_module_facade = true;
            modules[idx].chunk = Some(id);
            graph.chunks.push(chunk);
        }
        link_chunks(&mut graph, modules, variables);
        return graph;
    }

    // Group included modules (plus empty entry homes) by color.
    let mut group_order: Vec<String> = Vec::new();
    let mut groups: FxHashMap<String, Vec<ModuleIdx>> = FxHashMap::default();
    let root_set: FxHashSet<ModuleIdx> = entries
        .iter()
        .chain(dynamic_entries.iter())
        .copied()
        .collect();

    for &idx in ordered {
        let hex = hash_hex(&modules[idx].entry_points_hash);
        let is_manual = manual_hashes.contains_key(&hex);
        if !modules[idx].is_included() && !root_set.contains(&idx) && !is_manual {
            continue;
        }
        if !groups.contains_key(&hex) {
            group_order.push(hex.clone());
        }
        groups.entry(hex).or_default().push(idx);
    }

    for hex in group_order {
        let members = groups.remove(&hex).unwrap_or_default();
        let id = graph.chunks.len();

        let chunk_entries: Vec<ModuleIdx> = entries
            .iter()
            .chain(dynamic_entries.iter())
            .copied()
            .filter(|e| members.contains(e))
            .collect();

        let name = chunk_name(&hex, &chunk_entries, modules, &manual_hashes, dynamic_entries, dynamic_aliases);
        let mut chunk = Chunk::new(id, name);
        chunk.is_manual_chunk = manual_hashes.contains_key(&hex);

        match chunk_entries.as_slice() {
            [] => {}
            [single] if members.last() == Some(single) => {
                chunk.entry_module = Some(*single);
                chunk.is_entry_module_facade = true;
            }
            [first, ..] => {
                // Another module dictates the output shape; the entry keeps
                // its API through a facade chunk created below.
                chunk.entry_module = Some(*first);
                chunk.is_entry_module_facade = false;
            }
        }

        for &member in &members {
            modules[member].chunk = Some(id);
        }
        chunk.modules = members;
        graph.chunks.push(chunk);
    }

    // Facade chunks for original entries that do not cleanly head their home.
    for &entry in entries {
        let needs_facade = match modules[entry].chunk {
            Some(home) => {
                let chunk = &graph.chunks[home];
                !(chunk.is_entry_module_facade && chunk.entry_module == Some(entry))
            }
            None => true,
        };
        if needs_facade {
            let id = graph.chunks.len();
            let name = modules[entry]
                .chunk_alias
                .clone()
                .unwrap_or_else(|| stem_of(&modules[entry].id));
            let mut facade = Chunk::new(id, name);
            facade.facade_for = Some(entry);
            facade.is_entry_module_facade = true;
            graph.chunks.push(facade);
        }
    }

    link_chunks(&mut graph, modules, variables);
    debug!(chunks = graph.chunks.len(), "chunks generated");
    graph
}

fn chunk_name(
    hex: &str,
    chunk_entries: &[ModuleIdx],
    modules: &[Module],
    manual_hashes: &FxHashMap<String, String>,
    dynamic_entries: &[ModuleIdx],
    dynamic_aliases: &[Option<String>],
) -> String {
    if let Some(alias) = manual_hashes.get(hex) {
        return alias.clone();
    }
    if let Some(&entry) = chunk_entries.first() {
        if let Some(alias) = &modules[entry].chunk_alias {
            return alias.clone();
        }
        if let Some(position) = dynamic_entries.iter().position(|&d| d == entry) {
            if let Some(Some(alias)) = dynamic_aliases.get(position) {
                return alias.clone();
            }
        }
        return stem_of(&modules[entry].id);
    }
    format!("chunk-{}", &hex[..8])
}

/// Resolve cross-chunk references into chunk imports and exports.
fn link_chunks(graph: &mut ChunkGraph, modules: &[Module], variables: &VariableTable) {
    for chunk_id in 0..graph.chunks.len() {
        // Facade chunks import exactly the entry's public API from its home.
        if let Some(entry) = graph.chunks[chunk_id].facade_for {
            let mut exports: Vec<(String, VariableId)> = modules[entry]
                .export_variables
                .iter()
                .map(|(name, &vid)| (name.clone(), vid))
                .collect();
            exports.sort();
            if let Some(home) = modules[entry].chunk {
                let vids: Vec<VariableId> = exports.iter().map(|(_, vid)| *vid).collect();
                graph.chunks[chunk_id].imports.push(ChunkImport {
                    source: ChunkSource::Chunk(home),
                    variables: vids,
                });
            }
            graph.chunks[chunk_id].exports = exports;
            continue;
        }

        let mut import_map: FxHashMap<ChunkSource, Vec<VariableId>> = FxHashMap::default();
        let mut import_order: Vec<ChunkSource> = Vec::new();
        let mut seen: FxHashSet<VariableId> = FxHashSet::default();
        let mut dynamic_deps: Vec<ChunkId> = Vec::new();

        for &member in &graph.chunks[chunk_id].modules {
            for info in modules[member]
                .stmt_info
                .iter()
                .filter(|info| info.included)
            {
                for &vid in &info.referenced {
                    if !seen.insert(vid) {
                        continue;
                    }
                    let source = match &variables.get(vid).kind {
                        VariableKind::External { external, .. } => {
                            Some(ChunkSource::External(*external))
                        }
                        VariableKind::Global | VariableKind::ExportShim => None,
                        VariableKind::Local | VariableKind::Namespace { .. } => {
                            let home = variables
                                .get(vid)
                                .module
                                .and_then(|m| modules[m].chunk);
                            match home {
                                Some(home) if home != chunk_id => {
                                    Some(ChunkSource::Chunk(home))
                                }
                                _ => None,
                            }
                        }
                    };
                    if let Some(source) = source {
                        if !import_map.contains_key(&source) {
                            import_order.push(source);
                        }
                        import_map.entry(source).or_default().push(vid);
                    }
                }
            }

            // Side-effect-only dependencies still order chunk execution even
            // when no binding crosses the boundary.
            for &dep in &modules[member].dependencies {
                if !modules[dep].is_included() {
                    continue;
                }
                if let Some(dep_chunk) = modules[dep].chunk {
                    if dep_chunk != chunk_id {
                        let source = ChunkSource::Chunk(dep_chunk);
                        if !import_map.contains_key(&source) {
                            import_order.push(source);
                            import_map.insert(source, Vec::new());
                        }
                    }
                }
            }

            for dynamic in &modules[member].dynamic_imports {
                if let DynamicResolution::Internal(target) = dynamic.resolution {
                    if let Some(target_chunk) = modules[target].chunk {
                        if target_chunk != chunk_id && !dynamic_deps.contains(&target_chunk) {
                            dynamic_deps.push(target_chunk);
                        }
                    }
                }
            }
        }

        let imports: Vec<ChunkImport> = import_order
            .into_iter()
            .map(|source| ChunkImport {
                source,
                variables: import_map.remove(&source).unwrap_or_default(),
            })
            .collect();

        graph.chunks[chunk_id].imports = imports;
        graph.chunks[chunk_id].dynamic_dependencies = dynamic_deps;

        // Entry chunks expose the entry's full public API.
        if let Some(entry) = graph.chunks[chunk_id].entry_module {
            let mut exports: Vec<(String, VariableId)> = modules[entry]
                .export_variables
                .iter()
                .map(|(name, &vid)| (name.clone(), vid))
                .collect();
            exports.sort();
            graph.chunks[chunk_id].exports = exports;
        }
    }

    // Every binding another chunk imports must be exported by its home.
    let mut needed: Vec<(ChunkId, VariableId)> = Vec::new();
    for chunk in &graph.chunks {
        for import in &chunk.imports {
            if let ChunkSource::Chunk(home) = import.source {
                for &vid in &import.variables {
                    needed.push((home, vid));
                }
            }
        }
    }
    for (home, vid) in needed {
        let exports = &mut graph.chunks[home].exports;
        if !exports.iter().any(|(_, existing)| *existing == vid) {
            exports.push((variables.get(vid).name.clone(), vid));
        }
    }
}

fn stem_of(id: &str) -> String {
    std::path::Path::new(id)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("chunk")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::StmtInfo;
    use bramble_util::{entry_hash_seed, xor_hash};

    fn included_module(idx: usize, id: &str, exec_index: usize) -> Module {
        let mut module = Module::new(idx, id);
        module.exec_index = exec_index;
        module.stmt_info.push(StmtInfo {
            included: true,
            ..StmtInfo::default()
        });
        module
    }

    #[test]
    fn test_modules_group_by_color() {
        // Two entries sharing one module: three colors, three chunks.
        let mut modules = vec![
            included_module(0, "/a.js", 1),
            included_module(1, "/shared.js", 0),
            included_module(2, "/b.js", 2),
        ];
        modules[0].is_entry = true;
        modules[2].is_entry = true;
        modules[0].entry_points_hash = entry_hash_seed("/a.js");
        modules[2].entry_points_hash = entry_hash_seed("/b.js");
        let mut shared = entry_hash_seed("/a.js");
        xor_hash(&mut shared, &entry_hash_seed("/b.js"));
        modules[1].entry_points_hash = shared;

        let variables = VariableTable::new();
        let graph = generate_chunks(ChunkInput {
            modules: &mut modules,
            variables: &variables,
            entries: &[0, 2],
            dynamic_entries: &[],
            dynamic_aliases: &[],
            ordered: &[1, 0, 2],
            options: &InputOptions::default(),
        });

        assert_eq!(graph.chunks().len(), 3);
        assert_eq!(modules[1].chunk, Some(0));
        assert_ne!(modules[0].chunk, modules[2].chunk);

        // Each entry heads its own chunk; no facades needed.
        assert!(graph.chunks().iter().all(|c| !c.is_facade()));
        let a_chunk = &graph.chunks()[modules[0].chunk.unwrap()];
        assert_eq!(a_chunk.entry_module, Some(0));
        assert!(a_chunk.is_entry_module_facade);
    }

    #[test]
    fn test_empty_non_entry_group_is_dropped() {
        let mut modules = vec![included_module(0, "/a.js", 1), Module::new(1, "/shared.js")];
        modules[0].is_entry = true;
        modules[0].entry_points_hash = entry_hash_seed("/a.js");
        modules[1].entry_points_hash = entry_hash_seed("/other");
        modules[1].exec_index = 0;

        let variables = VariableTable::new();
        let graph = generate_chunks(ChunkInput {
            modules: &mut modules,
            variables: &variables,
            entries: &[0],
            dynamic_entries: &[],
            dynamic_aliases: &[],
            ordered: &[1, 0],
            options: &InputOptions::default(),
        });

        assert_eq!(graph.chunks().len(), 1);
        assert_eq!(modules[1].chunk, None);
    }

    #[test]
    fn test_preserve_modules_one_chunk_each() {
        let mut modules = vec![
            included_module(0, "/main.js", 1),
            included_module(1, "/dep.js", 0),
        ];
        modules[0].is_entry = true;

        let variables = VariableTable::new();
        let options = InputOptions {
            preserve_modules: true,
            ..InputOptions::default()
        };
        let graph = generate_chunks(ChunkInput {
            modules: &mut modules,
            variables: &variables,
            entries: &[0],
            dynamic_entries: &[],
            dynamic_aliases: &[],
            ordered: &[1, 0],
            options: &options,
        });

        assert_eq!(graph.chunks().len(), 2);
        assert!(graph.chunks().iter().all(|c| c.modules.len() == 1));
    }
}
