use crate::models::Table;
use crate::quoting::column_reference;

/// One endpoint of a foreign key edge: a table plus the ordered key columns
/// participating on that side. Key lists on both endpoints always have the
/// same arity and are matched positionally.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TableLink {
    table_idx: usize,
    keys: Vec<String>,
    polymorphic_exprs: Vec<String>,
}

impl TableLink {
    pub(crate) fn new(table_idx: usize, keys: Vec<String>, polymorphic_exprs: Vec<String>) -> Self {
        TableLink {
            table_idx,
            keys,
            polymorphic_exprs,
        }
    }

    pub fn table_idx(&self) -> usize {
        self.table_idx
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn polymorphic_exprs(&self) -> &[String] {
        &self.polymorphic_exprs
    }

    /// `"schema"."table"."key"` reference for the idx-th key column.
    pub(crate) fn key_reference(&self, table: &Table, idx: usize) -> String {
        column_reference(&table.schema, &table.name, &self.keys[idx])
    }
}

/// A directed foreign key edge `from -> to` where `from` is the referencing
/// table. Virtual references declared by the user are indistinguishable from
/// real constraints at this layer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Edge {
    id: usize,
    name: String,
    from: TableLink,
    to: TableLink,
    nullable: bool,
}

impl Edge {
    pub(crate) fn new(
        id: usize,
        name: String,
        from: TableLink,
        to: TableLink,
        nullable: bool,
    ) -> Self {
        Edge {
            id,
            name,
            from,
            to,
            nullable,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn from(&self) -> &TableLink {
        &self.from
    }

    pub fn to(&self) -> &TableLink {
        &self.to
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub(crate) fn is_self_referential(&self) -> bool {
        self.from.table_idx == self.to.table_idx
    }

    /// Same edge with the endpoints swapped, for the reverse adjacency view.
    pub(crate) fn reversed(&self) -> Edge {
        Edge {
            id: self.id,
            name: self.name.clone(),
            from: self.to.clone(),
            to: self.from.clone(),
            nullable: self.nullable,
        }
    }
}
