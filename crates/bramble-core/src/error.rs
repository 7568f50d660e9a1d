//! Build error types.
//!
//! Fatal diagnostics abort the build future; advisory diagnostics flow
//! through the warning sink instead (see `warning`).

use std::fmt;

/// Diagnostic codes shared by errors and warnings.
pub mod codes {
    pub const UNRESOLVED_ENTRY: &str = "UNRESOLVED_ENTRY";
    pub const DUPLICATE_ENTRY_POINTS: &str = "DUPLICATE_ENTRY_POINTS";
    pub const BAD_LOADER: &str = "BAD_LOADER";
    pub const UNRESOLVED_IMPORT: &str = "UNRESOLVED_IMPORT";
    pub const CIRCULAR_DEPENDENCY: &str = "CIRCULAR_DEPENDENCY";
    pub const NAMESPACE_CONFLICT: &str = "NAMESPACE_CONFLICT";
    pub const INVALID_EXTERNAL_ID: &str = "INVALID_EXTERNAL_ID";
    pub const UNUSED_EXTERNAL_IMPORT: &str = "UNUSED_EXTERNAL_IMPORT";
    pub const MISSING_EXPORT: &str = "MISSING_EXPORT";
    pub const PARSE_ERROR: &str = "PARSE_ERROR";
    pub const PLUGIN_ERROR: &str = "PLUGIN_ERROR";
    pub const INVALID_OPTION: &str = "INVALID_OPTION";
}

/// A fatal build error.
///
/// Carries the diagnostic code plus whatever origin context is known: the
/// module id the error belongs to and the plugin that raised it.
#[derive(Debug, Clone)]
pub struct BuildError {
    code: &'static str,
    message: String,
    /// Module id the error originated in, if known.
    pub id: Option<String>,
    /// Plugin that raised the error, if any.
    pub plugin: Option<String>,
}

impl BuildError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            id: None,
            plugin: None,
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

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create an unresolved entry error.
    pub fn unresolved_entry(msg: impl Into<String>) -> Self {
        Self::new(codes::UNRESOLVED_ENTRY, msg)
    }

    /// Create a duplicate entry points error.
    #[must_use]
    pub fn duplicate_entry_points(alias: &str, id: &str) -> Self {
        Self::new(
            codes::DUPLICATE_ENTRY_POINTS,
            format!("Duplicate entry points detected: '{alias}' and another entry both resolve to {id}"),
        )
    }

    /// Create a loader failure error.
    pub fn bad_loader(msg: impl Into<String>) -> Self {
        Self::new(codes::BAD_LOADER, msg)
    }

    /// Create an unresolved import error (fatal form, for relative specifiers).
    #[must_use]
    pub fn unresolved_import(specifier: &str, importer: &str) -> Self {
        Self::new(
            codes::UNRESOLVED_IMPORT,
            format!("Could not resolve '{specifier}' from {importer}"),
        )
        .with_id(importer)
    }

    /// Create an invalid external id error.
    #[must_use]
    pub fn invalid_external_id(specifier: &str) -> Self {
        Self::new(
            codes::INVALID_EXTERNAL_ID,
            format!("'{specifier}' is relative and cannot be marked external without an importer to resolve it against"),
        )
    }

    /// Create a missing export error.
    #[must_use]
    pub fn missing_export(name: &str, importer: &str, source: &str) -> Self {
        Self::new(
            codes::MISSING_EXPORT,
            format!("'{name}' is not exported by {source}, imported by {importer}"),
        )
        .with_id(importer)
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(codes::PARSE_ERROR, msg)
    }

    /// Create a plugin hook error.
    pub fn plugin(plugin: &str, msg: impl Into<String>) -> Self {
        Self::new(codes::PLUGIN_ERROR, msg).with_plugin(plugin)
    }

    /// Create an invalid configuration error.
    pub fn invalid_option(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_OPTION, msg)
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(plugin) = &self.plugin {
            write!(f, "{}: [{}] {}", self.code, plugin, self.message)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for BuildError {}

/// Result alias for fallible build operations.
pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_code() {
        let err = BuildError::unresolved_entry("Could not resolve entry (./main)");
        assert_eq!(err.code(), codes::UNRESOLVED_ENTRY);
        assert!(err.to_string().contains("UNRESOLVED_ENTRY"));
    }

    #[test]
    fn test_plugin_error_display() {
        let err = BuildError::plugin("virtual", "boom");
        assert_eq!(err.plugin.as_deref(), Some("virtual"));
        assert!(err.to_string().contains("[virtual]"));
    }

    #[test]
    fn test_missing_export_context() {
        let err = BuildError::missing_export("missing", "/src/main.js", "./m");
        assert!(err.message().contains("missing"));
        assert!(err.message().contains("./m"));
        assert_eq!(err.id.as_deref(), Some("/src/main.js"));
    }
}
