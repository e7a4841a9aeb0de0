//! Build warnings
//!
//! Nothing short of a failed top-level import stops a build. Everything else
//! that goes wrong is recorded here, logged through `tracing` as it happens,
//! and handed back to the caller with the finished model.

use serde::Serialize;

/// Category of a non-fatal problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    /// A module name matched both a local file and an installed module
    AmbiguousName,
    /// Source could not be parsed; AST docstrings are unavailable
    Parse,
    /// A default value or annotation could not be rendered
    Representation,
    /// A submodule or re-exported object could not be loaded
    Import,
    /// A name listed in `__all__` or a base class could not be resolved
    Resolution,
    /// The class hierarchy has no consistent linearization
    Mro,
    /// A type stub could not be read or disagrees with the module
    Stub,
}

impl std::fmt::Display for WarningKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AmbiguousName => "ambiguous-name",
            Self::Parse => "parse",
            Self::Representation => "representation",
            Self::Import => "import",
            Self::Resolution => "resolution",
            Self::Mro => "mro",
            Self::Stub => "stub",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    /// Module being built when the problem occurred
    pub module: String,
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.module, self.message)
    }
}

/// Collected warnings of one build
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(
        &mut self,
        kind: WarningKind,
        module: impl Into<String>,
        message: impl Into<String>,
    ) {
        let warning = Warning {
            kind,
            module: module.into(),
            message: message.into(),
        };
        tracing::warn!(target: "docweave", kind = %warning.kind, module = %warning.module, "{}", warning.message);
        self.warnings.push(warning);
    }

    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    #[must_use]
    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    #[must_use]
    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_in_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warn(WarningKind::Parse, "pkg.mod", "invalid syntax at 3:1");
        diagnostics.warn(WarningKind::Import, "pkg", "cannot import pkg.broken");
        assert_eq!(diagnostics.warnings().len(), 2);
        assert_eq!(diagnostics.count(WarningKind::Parse), 1);
        assert_eq!(
            diagnostics.warnings()[1].to_string(),
            "[import] pkg: cannot import pkg.broken"
        );
    }
}
