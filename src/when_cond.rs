use crate::driver::Driver;
use crate::validation::{ValidationSeverity, ValidationWarning, ValidationWarnings};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Namespace prefixes a `when` expression may use to reference columns.
pub const RECORD_NAMESPACE: &str = "record";
pub const RAW_RECORD_NAMESPACE: &str = "raw_record";

static CONDITION_COLUMN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:record|raw_record)\.([a-zA-Z_][a-zA-Z0-9_]*)").expect("valid regex")
});

/// A compiled `when` predicate. The expression engine itself lives outside
/// the core; compiling here means extracting the referenced columns and
/// validating them against the table driver so misconfigurations surface
/// before the dump starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhenCond {
    source: String,
    referenced_columns: Vec<String>,
}

impl WhenCond {
    /// Compiles an expression against a driver. An empty expression compiles
    /// to `None` with no warnings; a reference to a column the table does not
    /// have is an error warning carrying the supplied metadata.
    pub fn compile(
        source: &str,
        driver: &Driver,
        meta: &BTreeMap<String, String>,
    ) -> (Option<WhenCond>, ValidationWarnings) {
        let mut warnings = ValidationWarnings::new();
        if source.is_empty() {
            return (None, warnings);
        }

        let referenced_columns = extract_condition_columns(source);
        for column in &referenced_columns {
            if driver.column_index(column).is_none() {
                let mut warning = ValidationWarning::new()
                    .set_msg(format!(
                        "column {} referenced in when condition is not present on the table",
                        column
                    ))
                    .set_severity(ValidationSeverity::Error)
                    .add_meta("ColumnName", column);
                for (key, value) in meta {
                    warning = warning.add_meta(key, value);
                }
                warnings.push(warning);
            }
        }

        if warnings.is_fatal() {
            return (None, warnings);
        }

        (
            Some(WhenCond {
                source: source.to_string(),
                referenced_columns,
            }),
            warnings,
        )
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn referenced_columns(&self) -> &[String] {
        &self.referenced_columns
    }
}

/// Column names referenced through `record.` or `raw_record.`, first-seen
/// order, deduplicated.
pub(crate) fn extract_condition_columns(source: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    CONDITION_COLUMN_RE
        .captures_iter(source)
        .map(|captures| captures[1].to_string())
        .filter(|column| seen.insert(column.clone()))
        .collect()
}

/// Rewrites `record.<from>` and `raw_record.<from>` references to another
/// column, used when a transformer is propagated down a reference chain.
pub(crate) fn rewrite_condition_column(source: &str, from: &str, to: &str) -> String {
    source
        .replace(
            &format!("{}.{}", RECORD_NAMESPACE, from),
            &format!("{}.{}", RECORD_NAMESPACE, to),
        )
        .replace(
            &format!("{}.{}", RAW_RECORD_NAMESPACE, from),
            &format!("{}.{}", RAW_RECORD_NAMESPACE, to),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Table};

    fn driver() -> Driver {
        let mut table = Table::new("public", "users", 1);
        table.columns = vec![Column::new("id", "int4"), Column::new("active", "bool")];
        let (driver, warnings) = Driver::new(table, &[]);
        assert!(warnings.is_empty());
        driver.unwrap()
    }

    #[test]
    fn empty_expression_compiles_to_none() {
        let (cond, warnings) = WhenCond::compile("", &driver(), &BTreeMap::new());
        assert!(cond.is_none());
        assert!(warnings.is_empty());
    }

    #[test]
    fn extracts_columns_from_both_namespaces() {
        let columns =
            extract_condition_columns("record.id > 10 && raw_record.active == 'true' && record.id != 0");
        assert_eq!(columns, vec!["id", "active"]);
    }

    #[test]
    fn unknown_column_is_a_fatal_warning() {
        let (cond, warnings) = WhenCond::compile("record.missing == 1", &driver(), &BTreeMap::new());
        assert!(cond.is_none());
        assert!(warnings.is_fatal());
    }

    #[test]
    fn valid_expression_compiles() {
        let (cond, warnings) = WhenCond::compile("record.active == true", &driver(), &BTreeMap::new());
        assert!(warnings.is_empty());
        assert_eq!(cond.unwrap().referenced_columns(), ["active"]);
    }

    #[test]
    fn rewrite_touches_both_namespaces_only() {
        let rewritten = rewrite_condition_column(
            "record.id > 0 && raw_record.id != null && record.identity == 'x'",
            "id",
            "user_id",
        );
        assert_eq!(
            rewritten,
            "record.user_id > 0 && raw_record.user_id != null && record.user_identity == 'x'"
        );
    }
}
