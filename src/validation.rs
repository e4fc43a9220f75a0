use std::collections::BTreeMap;
use std::fmt;

/// Severity of a validation warning. `Error` does not abort the process; it
/// marks the enclosing phase as failed and lets the caller decide what to do
/// with the accumulated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationSeverity::Info => write!(f, "info"),
            ValidationSeverity::Warning => write!(f, "warning"),
            ValidationSeverity::Error => write!(f, "error"),
        }
    }
}

/// A single validation finding with structured metadata. User-input problems
/// are reported through these rather than through `PgVeilError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub severity: ValidationSeverity,
    pub msg: String,
    pub meta: BTreeMap<String, String>,
}

impl ValidationWarning {
    pub fn new() -> Self {
        ValidationWarning {
            severity: ValidationSeverity::Warning,
            msg: String::new(),
            meta: BTreeMap::new(),
        }
    }

    pub fn set_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    pub fn set_severity(mut self, severity: ValidationSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn add_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }
}

impl Default for ValidationWarning {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.msg)?;
        for (key, value) in &self.meta {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// An ordered collection of warnings accumulated across validation phases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationWarnings(Vec<ValidationWarning>);

impl ValidationWarnings {
    pub fn new() -> Self {
        ValidationWarnings(Vec::new())
    }

    pub fn push(&mut self, warning: ValidationWarning) {
        self.0.push(warning);
    }

    pub fn extend(&mut self, other: ValidationWarnings) {
        self.0.extend(other.0);
    }

    /// A list is fatal iff it contains any error-severity warning.
    pub fn is_fatal(&self) -> bool {
        self.0.iter().any(ValidationWarning::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationWarning> {
        self.0.iter()
    }

    /// Adds the same metadata entry to every warning in the list.
    pub fn enrich_meta(&mut self, key: &str, value: &str) {
        for warning in &mut self.0 {
            warning
                .meta
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
}

impl IntoIterator for ValidationWarnings {
    type Item = ValidationWarning;
    type IntoIter = std::vec::IntoIter<ValidationWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<Vec<ValidationWarning>> for ValidationWarnings {
    fn from(warnings: Vec<ValidationWarning>) -> Self {
        ValidationWarnings(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_only_with_error_severity() {
        let mut warnings = ValidationWarnings::new();
        warnings.push(ValidationWarning::new().set_severity(ValidationSeverity::Info));
        warnings.push(ValidationWarning::new().set_severity(ValidationSeverity::Warning));
        assert!(!warnings.is_fatal());

        warnings.push(ValidationWarning::new().set_severity(ValidationSeverity::Error));
        assert!(warnings.is_fatal());
    }

    #[test]
    fn enrich_meta_does_not_clobber_existing_keys() {
        let mut warnings = ValidationWarnings::new();
        warnings.push(ValidationWarning::new().add_meta("TableName", "users"));
        warnings.push(ValidationWarning::new());
        warnings.enrich_meta("TableName", "orders");

        let collected: Vec<_> = warnings
            .iter()
            .map(|w| w.meta.get("TableName").unwrap().clone())
            .collect();
        assert_eq!(collected, vec!["users", "orders"]);
    }
}
