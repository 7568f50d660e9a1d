//! Execution-order analysis.
//!
//! Depth-first traversal from the entry modules in configured order yields a
//! topological ordering of the static-import DAG (dependencies first), with
//! back-edges reported as cycle paths. Dynamic-import targets that static
//! traversal never reached become their own roots, and every module receives
//! its entry-reachability color.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use bramble_util::{entry_hash_seed, xor_hash, EntryHash, ENTRY_HASH_LEN};

use crate::error::codes;
use crate::module::{DynamicResolution, Module, ModuleIdx};
use crate::options::InputOptions;
use crate::warning::Warning;

/// Results of the ordering pass.
#[derive(Debug, Default)]
pub struct ExecutionAnalysis {
    /// Topological order of all reachable modules, dependencies first.
    pub ordered: Vec<ModuleIdx>,
    /// One path per distinct static-import cycle, endpoints inclusive.
    pub cycle_paths: Vec<Vec<String>>,
    /// Internal dynamic-import targets not reached statically; chunk roots.
    pub dynamic_entries: Vec<ModuleIdx>,
    /// Aligned with `dynamic_entries`.
    pub dynamic_aliases: Vec<Option<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Unvisited,
    OnStack,
    Done,
}

struct Traversal<'a> {
    modules: &'a mut Vec<Module>,
    inline_dynamic_imports: bool,
    state: Vec<VisitState>,
    stack: Vec<ModuleIdx>,
    ordered: Vec<ModuleIdx>,
    cycle_paths: Vec<Vec<String>>,
    cycles_seen: FxHashSet<Vec<ModuleIdx>>,
}

impl Traversal<'_> {
    fn visit(&mut self, idx: ModuleIdx) {
        if self.state[idx] != VisitState::Unvisited {
            return;
        }
        self.state[idx] = VisitState::OnStack;
        self.stack.push(idx);

        for dep in edges(&self.modules[idx], self.inline_dynamic_imports) {
            match self.state[dep] {
                VisitState::Unvisited => self.visit(dep),
                VisitState::OnStack => self.record_cycle(dep),
                VisitState::Done => {}
            }
        }

        self.stack.pop();
        self.state[idx] = VisitState::Done;
        self.modules[idx].exec_index = self.ordered.len();
        self.ordered.push(idx);
    }

    /// A back-edge closed a cycle starting at `head`. The first path found
    /// for a given set of participants wins.
    fn record_cycle(&mut self, head: ModuleIdx) {
        let position = self
            .stack
            .iter()
            .position(|&m| m == head)
            .expect("cycle head is on the stack");
        let mut members: Vec<ModuleIdx> = self.stack[position..].to_vec();
        let mut path: Vec<String> = members
            .iter()
            .map(|&m| self.modules[m].id.clone())
            .collect();
        path.push(self.modules[head].id.clone());

        members.sort_unstable();
        if self.cycles_seen.insert(members) {
            self.cycle_paths.push(path);
        }
    }
}

/// Traversal edges of a module: static dependencies in source order, plus
/// dynamic targets when dynamic imports are being inlined.
fn edges(module: &Module, inline_dynamic: bool) -> Vec<ModuleIdx> {
    let mut deps = module.dependencies.clone();
    if inline_dynamic {
        for dynamic in &module.dynamic_imports {
            if let DynamicResolution::Internal(target) = dynamic.resolution {
                if !deps.contains(&target) {
                    deps.push(target);
                }
            }
        }
    }
    deps
}

/// Order all reachable modules and collect cycle and dynamic-entry data.
pub(crate) fn analyze_execution_order(
    modules: &mut Vec<Module>,
    entries: &[ModuleIdx],
    options: &InputOptions,
    warnings: &mut Vec<Warning>,
) -> ExecutionAnalysis {
    let module_count = modules.len();
    let mut traversal = Traversal {
        modules,
        inline_dynamic_imports: options.inline_dynamic_imports,
        state: vec![VisitState::Unvisited; module_count],
        stack: Vec::new(),
        ordered: Vec::new(),
        cycle_paths: Vec::new(),
        cycles_seen: FxHashSet::default(),
    };

    for &entry in entries {
        traversal.visit(entry);
    }

    // Frontier of dynamic imports: any internal target static traversal never
    // reached roots its own subtree. Scanning `ordered` while it grows also
    // covers dynamic imports inside dynamically-loaded subtrees.
    let mut dynamic_entries = Vec::new();
    let mut dynamic_aliases = Vec::new();
    if !options.inline_dynamic_imports {
        let mut scan = 0;
        while scan < traversal.ordered.len() {
            let idx = traversal.ordered[scan];
            scan += 1;
            let dynamics: Vec<(Option<String>, DynamicResolution)> = traversal.modules[idx]
                .dynamic_imports
                .iter()
                .map(|d| (d.specifier.clone(), d.resolution.clone()))
                .collect();
            for (specifier, resolution) in dynamics {
                if let DynamicResolution::Internal(target) = resolution {
                    if traversal.state[target] == VisitState::Unvisited {
                        dynamic_entries.push(target);
                        dynamic_aliases.push(
                            specifier
                                .as_deref()
                                .and_then(file_stem)
                                .or_else(|| file_stem(&traversal.modules[target].id)),
                        );
                        traversal.visit(target);
                    }
                }
            }
        }
    }

    for path in &traversal.cycle_paths {
        warnings.push(Warning::new(
            codes::CIRCULAR_DEPENDENCY,
            format!("Circular dependency: {}", path.join(" -> ")),
        ));
    }
    debug!(
        modules = traversal.ordered.len(),
        cycles = traversal.cycle_paths.len(),
        dynamic_entries = dynamic_entries.len(),
        "execution order computed"
    );

    ExecutionAnalysis {
        ordered: traversal.ordered,
        cycle_paths: traversal.cycle_paths,
        dynamic_entries,
        dynamic_aliases,
    }
}

/// Assign every module its entry-reachability color.
///
/// Each root (static entry or dynamic entry) contributes the hash of its id,
/// XOR-folded into every module it can reach along static edges. Dynamic
/// edges are cuts unless dynamic imports are inlined. Manual-chunk modules
/// keep a color derived from their bucket alias instead.
pub(crate) fn assign_entry_hashes(
    modules: &mut Vec<Module>,
    entries: &[ModuleIdx],
    dynamic_entries: &[ModuleIdx],
    options: &InputOptions,
) {
    let mut manual_alias: FxHashMap<String, String> = FxHashMap::default();
    for (alias, ids) in &options.manual_chunks {
        for id in ids {
            manual_alias.insert(id.clone(), alias.clone());
        }
    }

    for module in modules.iter_mut() {
        module.entry_points_hash = [0u8; ENTRY_HASH_LEN];
    }

    let roots: Vec<ModuleIdx> = entries
        .iter()
        .chain(dynamic_entries.iter())
        .copied()
        .collect();

    for &root in &roots {
        let seed: EntryHash = entry_hash_seed(&modules[root].id);
        let mut visited = vec![false; modules.len()];
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            if !manual_alias.contains_key(&modules[idx].id) {
                xor_hash(&mut modules[idx].entry_points_hash, &seed);
            }
            for dep in edges(&modules[idx], options.inline_dynamic_imports) {
                if !visited[dep] {
                    stack.push(dep);
                }
            }
        }
    }

    for module in modules.iter_mut() {
        if let Some(alias) = manual_alias.get(&module.id) {
            module.entry_points_hash = entry_hash_seed(&format!("manual:{alias}"));
        }
    }
}

fn file_stem(id: &str) -> Option<String> {
    std::path::Path::new(id)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;

    fn module(idx: usize, id: &str, dependencies: Vec<ModuleIdx>) -> Module {
        let mut module = Module::new(idx, id);
        module.dependencies = dependencies;
        module
    }

    #[test]
    fn test_topological_order_linear() {
        // a -> b -> c
        let mut modules = vec![
            module(0, "/a.js", vec![1]),
            module(1, "/b.js", vec![2]),
            module(2, "/c.js", vec![]),
        ];
        let mut warnings = Vec::new();
        let analysis =
            analyze_execution_order(&mut modules, &[0], &InputOptions::default(), &mut warnings);
        assert_eq!(analysis.ordered, vec![2, 1, 0]);
        assert!(analysis.cycle_paths.is_empty());
        assert_eq!(modules[2].exec_index, 0);
        assert_eq!(modules[0].exec_index, 2);
    }

    #[test]
    fn test_cycle_reported_once() {
        // a <-> b
        let mut modules = vec![module(0, "/a.js", vec![1]), module(1, "/b.js", vec![0])];
        let mut warnings = Vec::new();
        let analysis =
            analyze_execution_order(&mut modules, &[0], &InputOptions::default(), &mut warnings);
        assert_eq!(analysis.cycle_paths.len(), 1);
        assert_eq!(
            analysis.cycle_paths[0],
            vec!["/a.js".to_string(), "/b.js".to_string(), "/a.js".to_string()]
        );
        assert_eq!(analysis.ordered.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, codes::CIRCULAR_DEPENDENCY);
    }

    #[test]
    fn test_shared_hash_is_xor_of_entries() {
        // Two entries both importing a shared module.
        let mut modules = vec![
            module(0, "/a.js", vec![2]),
            module(1, "/b.js", vec![2]),
            module(2, "/shared.js", vec![]),
        ];
        assign_entry_hashes(&mut modules, &[0, 1], &[], &InputOptions::default());

        let mut expected = [0u8; ENTRY_HASH_LEN];
        xor_hash(&mut expected, &entry_hash_seed("/a.js"));
        xor_hash(&mut expected, &entry_hash_seed("/b.js"));
        assert_eq!(modules[2].entry_points_hash, expected);
        assert_eq!(modules[0].entry_points_hash, entry_hash_seed("/a.js"));
    }

    #[test]
    fn test_dynamic_boundary_is_a_cut() {
        let mut modules = vec![module(0, "/main.js", vec![]), module(1, "/lazy.js", vec![])];
        modules[0].dynamic_imports.push(crate::module::DynamicImport {
            stmt: 0,
            specifier: Some("./lazy".into()),
            resolution: DynamicResolution::Internal(1),
        });

        let mut warnings = Vec::new();
        let analysis =
            analyze_execution_order(&mut modules, &[0], &InputOptions::default(), &mut warnings);
        assert_eq!(analysis.dynamic_entries, vec![1]);
        assert_eq!(analysis.dynamic_aliases, vec![Some("lazy".to_string())]);

        assign_entry_hashes(&mut modules, &[0], &analysis.dynamic_entries, &InputOptions::default());
        assert_eq!(modules[0].entry_points_hash, entry_hash_seed("/main.js"));
        assert_eq!(modules[1].entry_points_hash, entry_hash_seed("/lazy.js"));
    }

    #[test]
    fn test_inline_dynamic_imports_no_frontier() {
        let mut modules = vec![module(0, "/main.js", vec![]), module(1, "/lazy.js", vec![])];
        modules[0].dynamic_imports.push(crate::module::DynamicImport {
            stmt: 0,
            specifier: Some("./lazy".into()),
            resolution: DynamicResolution::Internal(1),
        });

        let options = InputOptions {
            inline_dynamic_imports: true,
            ..InputOptions::default()
        };
        let mut warnings = Vec::new();
        let analysis = analyze_execution_order(&mut modules, &[0], &options, &mut warnings);
        assert!(analysis.dynamic_entries.is_empty());
        assert_eq!(analysis.ordered, vec![1, 0]);

        assign_entry_hashes(&mut modules, &[0], &[], &options);
        assert_eq!(modules[0].entry_points_hash, modules[1].entry_points_hash);
    }
}
