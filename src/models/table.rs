use crate::models::{Column, Oid, TableConstraint};

/// A table in scope for the dump, identified by `(schema, name, oid)`.
///
/// Built once during introspection and enriched by the config builder with
/// subset conditions, primary keys, constraints and partition back-references.
/// Invariants: `primary_key` is a subset of the non-generated column names,
/// and the `root_pt_*` fields are set iff the table is a leaf partition whose
/// parent is in scope.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub oid: Oid,
    /// `'p'` for a partitioned parent, `'r'` for an ordinary relation.
    pub relkind: char,
    /// Ordered column list in catalog order, generated columns included and
    /// flagged. SQL generation filters on the flag.
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub constraints: Vec<TableConstraint>,
    pub subset_conds: Vec<String>,
    /// User-supplied replacement SELECT; bypasses subset planning entirely.
    pub query: Option<String>,
    pub root_pt_schema: Option<String>,
    pub root_pt_name: Option<String>,
    pub root_pt_oid: Option<Oid>,
}

impl Table {
    pub fn new(schema: &str, name: &str, oid: Oid) -> Self {
        Table {
            schema: schema.to_string(),
            name: name.to_string(),
            oid,
            relkind: 'r',
            columns: Vec::new(),
            primary_key: Vec::new(),
            constraints: Vec::new(),
            subset_conds: Vec::new(),
            query: None,
            root_pt_schema: None,
            root_pt_name: None,
            root_pt_oid: None,
        }
    }

    pub fn is_partitioned_parent(&self) -> bool {
        self.relkind == 'p'
    }

    /// Columns that appear in generated SELECT lists and in the COPY stream,
    /// in catalog order.
    pub fn non_generated_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_generated)
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

impl Default for Table {
    fn default() -> Self {
        Self::new("", "", 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_generated_columns_filters_on_flag() {
        let mut table = Table::new("public", "users", 1);
        table.columns = vec![
            Column::new("id", "int4"),
            Column {
                is_generated: true,
                ..Column::new("search", "tsvector")
            },
            Column::new("name", "text"),
        ];

        let names: Vec<_> = table.non_generated_columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }
}
