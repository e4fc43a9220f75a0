mod component;
mod cte;
mod edge;
mod graph;
mod planner;
mod query_builder;

pub use edge::{Edge, TableLink};
pub use graph::Graph;
pub use planner::SubsetPlanner;

#[cfg(test)]
pub(crate) mod test_fixtures {
    use crate::catalog_reader::ForeignKeyInfo;
    use crate::models::{Column, Oid, Table};

    pub(crate) fn table_with_pk(schema: &str, name: &str, oid: Oid, pk: &[&str]) -> Table {
        let columns = pk.iter().map(|c| (*c, "int4")).collect::<Vec<_>>();
        table_with_columns(schema, name, oid, pk, &columns)
    }

    pub(crate) fn table_with_columns(
        schema: &str,
        name: &str,
        oid: Oid,
        pk: &[&str],
        columns: &[(&str, &str)],
    ) -> Table {
        let mut table = Table::new(schema, name, oid);
        table.columns = columns
            .iter()
            .map(|(column_name, type_name)| {
                let mut column = Column::new(column_name, type_name);
                column.not_null = pk.contains(column_name);
                column
            })
            .collect();
        table.primary_key = pk.iter().map(|c| c.to_string()).collect();
        table
    }

    pub(crate) fn fk(
        name: &str,
        source_oid: Oid,
        target_oid: Oid,
        source_columns: &[&str],
        target_columns: &[&str],
    ) -> ForeignKeyInfo {
        ForeignKeyInfo {
            constraint_name: name.to_string(),
            source_table_oid: source_oid,
            target_table_oid: target_oid,
            source_columns: source_columns.iter().map(|c| c.to_string()).collect(),
            target_columns: target_columns.iter().map(|c| c.to_string()).collect(),
            nullable: false,
            source_polymorphic_exprs: Vec::new(),
            target_polymorphic_exprs: Vec::new(),
        }
    }
}
