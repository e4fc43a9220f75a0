use crate::models::{Column, CustomType, Oid, Table, TableConstraint};
use crate::postgres_client_wrapper::{get_single_result, get_single_results};
use crate::{CancelToken, ConstraintKind, Result};
use std::collections::HashMap;
use tokio_postgres::GenericClient;
use tracing::instrument;

mod custom_type;
mod foreign_key;
mod primary_key;
mod table;
mod table_column;

pub use foreign_key::ForeignKeyInfo;

use crate::catalog_reader::custom_type::CustomTypesResult;
use crate::catalog_reader::foreign_key::ForeignKeysResult;

/// Reads the catalog state the subset planner and config builder need.
///
/// The connection is caller-provided, typically a repeatable-read transaction
/// so introspection and planning observe one consistent snapshot. The reader
/// never opens its own transaction and issues no retries.
pub struct CatalogReader<'a, C: GenericClient> {
    connection: &'a C,
    cancel: CancelToken,
}

impl<'a, C: GenericClient> CatalogReader<'a, C> {
    pub fn new(connection: &'a C, cancel: CancelToken) -> Self {
        CatalogReader { connection, cancel }
    }

    /// Reads all in-scope tables with their columns and primary keys, plus
    /// the foreign key constraints connecting them.
    #[instrument(skip_all)]
    pub async fn introspect_tables(&self) -> Result<(Vec<Table>, Vec<ForeignKeyInfo>)> {
        let tables = self.get_tables().await?;
        let columns = self.get_table_columns().await?;
        let primary_keys = self.get_primary_key_columns().await?;
        let foreign_keys = self.get_foreign_keys().await?;

        let mut columns_by_table: HashMap<Oid, Vec<Column>> = HashMap::new();
        for column in columns {
            columns_by_table
                .entry(column.table_oid)
                .or_default()
                .push(column.to_column());
        }

        let mut primary_keys_by_table: HashMap<Oid, Vec<String>> = HashMap::new();
        for pk in primary_keys {
            primary_keys_by_table
                .entry(pk.table_oid)
                .or_default()
                .push(pk.column_name);
        }

        let mut result = Vec::with_capacity(tables.len());
        for row in tables {
            let mut table = Table::new(&row.schema_name, &row.table_name, row.oid);
            table.relkind = row.relkind;
            table.columns = columns_by_table.remove(&row.oid).unwrap_or_default();
            table.primary_key = primary_keys_by_table.remove(&row.oid).unwrap_or_default();
            result.push(table);
        }

        let edges = foreign_keys
            .into_iter()
            .map(ForeignKeysResult::to_foreign_key_info)
            .collect();

        Ok((result, edges))
    }

    /// Checks that a configured `(schema, name)` pair names a live table.
    pub async fn table_exists(&self, schema: &str, name: &str) -> Result<bool> {
        get_single_result(
            self.connection,
            &self.cancel,
            r#"
select exists(select 1
              from information_schema.tables
              where table_schema = $1
                and table_name = $2);
"#,
            &[&schema, &name],
        )
        .await
    }

    /// The integer server version, e.g. 150004 for 15.4.
    pub async fn get_server_version(&self) -> Result<i32> {
        let version: i32 = get_single_result(
            self.connection,
            &self.cancel,
            "select current_setting('server_version_num')::int4;",
            &[],
        )
        .await?;

        if version < 120000 {
            return Err(crate::PgVeilError::UnsupportedPostgresVersion(version));
        }

        Ok(version)
    }

    /// Oids of the leaf partitions below a partitioned parent, however deep
    /// the partition tree goes.
    pub async fn get_partition_children(&self, parent: Oid) -> Result<Vec<Oid>> {
        get_single_results(
            self.connection,
            &self.cancel,
            r#"
with recursive parts as (select inh.inhrelid as oid
                         from pg_inherits inh
                         where inh.inhparent = $1
                         union all
                         select inh.inhrelid
                         from pg_inherits inh
                                  join parts p on inh.inhparent = p.oid)
select p.oid
from parts p
         join pg_class cl on cl.oid = p.oid
where cl.relkind = 'r'
order by p.oid;
"#,
            &[&parent],
        )
        .await
    }

    /// Primary key column names of one table, in key order.
    pub async fn get_table_primary_key(&self, table: Oid) -> Result<Vec<String>> {
        get_single_results(
            self.connection,
            &self.cancel,
            r#"
select attr.attname
from pg_index ix
         join unnest(ix.indkey) with ordinality as key(attnum, ord) on true
         join pg_attribute attr on attr.attrelid = ix.indrelid and attr.attnum = key.attnum
where ix.indrelid = $1
  and ix.indisprimary
order by key.ord;
"#,
            &[&table],
        )
        .await
    }

    /// Constraints of one table. The filter on inherited constraint clones is
    /// only available on servers that track constraint parents for
    /// partitions, hence the version split.
    pub async fn get_table_constraints(
        &self,
        table: Oid,
        version: i32,
    ) -> Result<Vec<TableConstraint>> {
        let sql = if version >= 130000 {
            r#"
select con.conname, con.contype::text, pg_get_constraintdef(con.oid)
from pg_constraint con
where con.conrelid = $1
  and con.conparentid = 0
order by con.conname;
"#
        } else {
            r#"
select con.conname, con.contype::text, pg_get_constraintdef(con.oid)
from pg_constraint con
where con.conrelid = $1
order by con.conname;
"#
        };

        let rows: Vec<(String, String, String)> =
            crate::postgres_client_wrapper::get_results(self.connection, &self.cancel, sql, &[&table])
                .await?;

        rows.into_iter()
            .map(|(name, kind, definition)| {
                Ok(TableConstraint {
                    name,
                    kind: ConstraintKind::from_pg_char(kind.chars().next().unwrap_or(' '))?,
                    definition,
                })
            })
            .collect()
    }

    /// User-defined type descriptors for driver construction.
    pub async fn get_custom_types(&self) -> Result<Vec<CustomType>> {
        let rows = self.get_custom_type_rows().await?;
        Ok(rows.into_iter().map(CustomTypesResult::to_custom_type).collect())
    }
}

macro_rules! define_catalog_query {
    ($fn_name:ident, $result:ident, $query:literal) => {
        impl<C: tokio_postgres::GenericClient> $crate::catalog_reader::CatalogReader<'_, C> {
            pub(in crate::catalog_reader) async fn $fn_name(&self) -> $crate::Result<Vec<$result>> {
                $crate::postgres_client_wrapper::get_results(
                    self.connection,
                    &self.cancel,
                    $query,
                    &[],
                )
                .await
            }
        }
    };
}

pub(crate) use define_catalog_query;
