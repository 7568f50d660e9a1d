//! Structured build warnings.
//!
//! Warnings never abort the build. They accumulate on the graph in emission
//! order and are routed to the configured `onwarn` handler; the default
//! handler deduplicates by rendered string and writes to standard error.

use std::fmt;
use std::sync::Mutex;

use rustc_hash::FxHashSet;

/// Source location of a warning, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// A structured, non-fatal diagnostic.
#[derive(Debug, Clone)]
pub struct Warning {
    /// Diagnostic code (see `error::codes`).
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Plugin that raised the warning, if any.
    pub plugin: Option<String>,
    /// Module id the warning belongs to, if known.
    pub id: Option<String>,
    /// Source location within `id`, if known.
    pub loc: Option<Location>,
}

impl Warning {
    /// Create a new warning.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            plugin: None,
            id: None,
            loc: None,
        }
    }

    /// Attach the originating module id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach the originating plugin name.
    #[must_use]
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Attach a source location.
    #[must_use]
    pub fn with_loc(mut self, line: u32, column: u32) -> Self {
        self.loc = Some(Location { line, column });
        self
    }
}

impl fmt::Display for Warning {
    /// Renders `"(plugin) file (L:C) message"`, omitting the parts not known.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(plugin) = &self.plugin {
            write!(f, "({plugin}) ")?;
        }
        if let Some(id) = &self.id {
            write!(f, "{id} ")?;
            if let Some(loc) = self.loc {
                write!(f, "({}:{}) ", loc.line, loc.column)?;
            }
        }
        write!(f, "{}", self.message)
    }
}

/// Handler invoked for every warning, in emission order.
pub type WarningHandler = Box<dyn Fn(&Warning) + Send + Sync>;

/// Create the default `onwarn` handler: deduplicate by rendered string and
/// write to standard error.
#[must_use]
pub fn default_warning_handler() -> WarningHandler {
    let seen: Mutex<FxHashSet<String>> = Mutex::new(FxHashSet::default());
    Box::new(move |warning| {
        let rendered = warning.to_string();
        if seen.lock().unwrap().insert(rendered.clone()) {
            eprintln!("{rendered}");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn test_display_full() {
        let warning = Warning::new(codes::CIRCULAR_DEPENDENCY, "Circular dependency: a -> b -> a")
            .with_plugin("loader")
            .with_id("/src/a.js")
            .with_loc(3, 7);
        assert_eq!(
            warning.to_string(),
            "(loader) /src/a.js (3:7) Circular dependency: a -> b -> a"
        );
    }

    #[test]
    fn test_display_message_only() {
        let warning = Warning::new(codes::NAMESPACE_CONFLICT, "Conflicting namespaces");
        assert_eq!(warning.to_string(), "Conflicting namespaces");
    }
}
