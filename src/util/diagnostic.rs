//! User-friendly diagnostic messages.
//!
//! Every fetch failure is reported with the offending package, the root
//! cause, and what the user can do about it.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion for network failures.
    pub const FETCH_FAILED: &str = "Check your network connection and retry the install";

    /// Suggestion when offline mode blocks a fetch.
    pub const OFFLINE: &str = "Disable offline mode (`--offline` / `net.offline`) to download it";

    /// Suggestion when content does not match its pinned hash.
    pub const INTEGRITY: &str =
        "Verify the pinned hash in your lockfile; the upstream artifact may have been replaced";

    /// Suggestion when a cache entry failed re-verification.
    pub const CORRUPT_CACHE: &str = "The entry was evicted; run the install again to re-fetch it";

    /// Suggestion when a source descriptor is unusable.
    pub const UNSUPPORTED: &str = "Check the dependency's source specification";

    /// Suggestion when a registry is not configured.
    pub const UNKNOWN_REGISTRY: &str = "Add the registry under `[registries]` in .quay/config.toml";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Warning,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            output.push_str(&format!("  -> {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("integrity mismatch for `left-pad@1.0.0`")
            .with_context("expected sha256:abc123")
            .with_context("found sha256:def456")
            .with_location("/tmp/cache")
            .with_suggestion(suggestions::INTEGRITY);

        let output = diag.format(false);
        assert!(output.starts_with("error: integrity mismatch"));
        assert!(output.contains("  --> /tmp/cache"));
        assert!(output.contains("  -> expected sha256:abc123"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Verify the pinned hash"));
    }

    #[test]
    fn test_warning_has_no_suggestion_block() {
        let output = Diagnostic::warning("evicted corrupt entry").format(false);
        assert_eq!(output, "warning: evicted corrupt entry\n");
    }
}
