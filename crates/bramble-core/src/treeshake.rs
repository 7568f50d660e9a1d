//! Tree shaking (dead code elimination).
//!
//! Marking starts from the public exports of every chunk root and iterates
//! over the modules in execution order until no statement changes state.
//! Inclusion is monotone: a statement or variable, once included, stays
//! included, so the fixed point terminates.

use tracing::debug;

use crate::ast::effects::{stmt_has_effects, EffectsContext};
use crate::ast::{EntityPathTracker, StmtKind, VariableId, VariableKind, VariableTable};
use crate::error::codes;
use crate::module::{ExternalModule, Module, ModuleIdx};
use crate::options::PureExternalModules;
use crate::warning::Warning;

/// Marking state shared across the fixed-point iteration.
pub(crate) struct TreeShaker<'a> {
    pub modules: &'a mut Vec<Module>,
    pub variables: &'a mut VariableTable,
    pub tracker: &'a mut EntityPathTracker,
    pub ctx: EffectsContext,
    pub pure_externals: PureExternalModules,
}

impl TreeShaker<'_> {
    /// Run the marking pass. `roots` are the static entries plus every
    /// internal dynamic-import target (a dynamic import observes the full
    /// namespace of its target).
    pub fn run(&mut self, roots: &[ModuleIdx], ordered: &[ModuleIdx]) {
        for &root in roots {
            self.mark_public_exports(root);
        }

        let mut rounds = 0usize;
        loop {
            let mut changed = false;
            for &idx in ordered {
                changed |= self.include_module(idx);
            }
            rounds += 1;
            if !changed {
                break;
            }
        }
        debug!(rounds, "tree-shaking converged");
    }

    /// Include everything; used when tree-shaking is disabled.
    pub fn include_all_in_bundle(&mut self, ordered: &[ModuleIdx]) {
        for &idx in ordered {
            for i in 0..self.modules[idx].stmt_info.len() {
                self.modules[idx].stmt_info[i].included = true;
                let mut vars = self.modules[idx].stmt_info[i].declared.clone();
                vars.extend(self.modules[idx].stmt_info[i].referenced.iter().copied());
                for vid in vars {
                    self.mark_variable_included(vid);
                }
            }
        }
    }

    /// Mark the statements producing a root's public exports.
    pub fn mark_public_exports(&mut self, root: ModuleIdx) {
        let mut exports: Vec<(String, VariableId)> = self.modules[root]
            .export_variables
            .iter()
            .map(|(name, &vid)| (name.clone(), vid))
            .collect();
        exports.sort();
        for (_, vid) in exports {
            self.mark_variable_included(vid);
        }
    }

    /// Include one module's pending statements. Returns whether anything
    /// changed.
    fn include_module(&mut self, idx: ModuleIdx) -> bool {
        let mut changed = false;
        for i in 0..self.modules[idx].stmt_info.len() {
            if self.modules[idx].stmt_info[i].included {
                continue;
            }

            let has_effects = match self.modules[idx].stmt_info[i].has_effects {
                Some(cached) => cached,
                None => {
                    let computed = self.stmt_effects(idx, i);
                    self.modules[idx].stmt_info[i].has_effects = Some(computed);
                    computed
                }
            };

            let declared_included = self.modules[idx].stmt_info[i]
                .declared
                .iter()
                .any(|&vid| self.variables.get(vid).included);

            if has_effects || declared_included {
                self.modules[idx].stmt_info[i].included = true;
                changed = true;
                let referenced = self.modules[idx].stmt_info[i].referenced.clone();
                for vid in referenced {
                    self.mark_variable_included(vid);
                }
            }
        }
        changed
    }

    /// Side-effect verdict for one top-level statement under the current
    /// policy.
    fn stmt_effects(&self, idx: ModuleIdx, stmt_index: usize) -> bool {
        let module = &self.modules[idx];
        let stmt = &module.ast.body[stmt_index];

        // A bare import is kept for its side effects when the target is an
        // external not covered by the pure-externals policy. Internal targets
        // contribute their effects through their own statements.
        if let StmtKind::Import { specifiers, source } = &stmt.kind {
            if specifiers.is_empty() {
                if let Some(resolved) = module.resolved_ids.get(source) {
                    return resolved.external && !self.pure_externals.is_pure(&resolved.id);
                }
            }
            return false;
        }

        stmt_has_effects(stmt, self.ctx)
    }

    /// Mark a variable's declaration as needed. Namespace variables fan out
    /// into every export of their module; the path tracker bounds repeat
    /// visits through re-export diamonds.
    fn mark_variable_included(&mut self, vid: VariableId) -> bool {
        if !self.variables.mark_included(vid) {
            return false;
        }
        if let VariableKind::Namespace { module } = self.variables.get(vid).kind.clone() {
            let mut exports: Vec<(String, VariableId)> = self.modules[module]
                .export_variables
                .iter()
                .map(|(name, &evid)| (name.clone(), evid))
                .collect();
            exports.sort();
            for (name, evid) in exports {
                if self.tracker.enter(vid, &[&name]) {
                    self.mark_variable_included(evid);
                }
            }
        }
        true
    }
}

/// Emit `UNUSED_EXTERNAL_IMPORT` for external import bindings no reference
/// ever resolved to.
pub(crate) fn warn_unused_external_imports(
    externals: &[ExternalModule],
    variables: &VariableTable,
    warnings: &mut Vec<Warning>,
) {
    for external in externals {
        let mut names: Vec<(&String, &VariableId)> = external.variables.iter().collect();
        names.sort();
        let unused: Vec<&str> = names
            .iter()
            .filter(|(name, &vid)| name.as_str() != "*" && !variables.get(vid).used)
            .map(|(name, _)| name.as_str())
            .collect();
        if unused.is_empty() {
            continue;
        }
        let names_list = unused.join("', '");
        warnings.push(Warning::new(
            codes::UNUSED_EXTERNAL_IMPORT,
            format!(
                "'{names_list}' is imported from external module '{}' but never used",
                external.id
            ),
        ));
    }
}

