use super::define_catalog_query;
use crate::models::{Column, Oid};
use crate::postgres_client_wrapper::FromRow;
use tokio_postgres::Row;

#[derive(Debug, Eq, PartialEq)]
pub struct TableColumnsResult {
    pub table_oid: Oid,
    pub column_name: String,
    pub type_name: String,
    pub canonical_type_name: String,
    pub size: i32,
    pub not_null: bool,
    pub is_generated: bool,
}

impl FromRow for TableColumnsResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(TableColumnsResult {
            table_oid: row.try_get(0)?,
            column_name: row.try_get(1)?,
            type_name: row.try_get(2)?,
            canonical_type_name: row.try_get(3)?,
            size: row.try_get(4)?,
            not_null: row.try_get(5)?,
            is_generated: row.try_get(6)?,
        })
    }
}

impl TableColumnsResult {
    pub fn to_column(self) -> Column {
        Column {
            name: self.column_name,
            type_name: self.type_name,
            canonical_type_name: self.canonical_type_name,
            size: self.size,
            not_null: self.not_null,
            is_generated: self.is_generated,
            override_type: None,
        }
    }
}

//language=postgresql
define_catalog_query!(get_table_columns, TableColumnsResult, r#"
select cl.oid,
       attr.attname,
       t.typname,
       pg_catalog.format_type(t.oid, null),
       t.typlen::int4,
       attr.attnotnull,
       attr.attgenerated <> '' as is_generated
from pg_attribute attr
         join pg_class cl on attr.attrelid = cl.oid
         join pg_namespace ns on ns.oid = cl.relnamespace
         join pg_type t on attr.atttypid = t.oid
where cl.relkind in ('r', 'p')
  and cl.oid > 16384
  and ns.nspname not in ('pg_catalog', 'information_schema')
  and attr.attnum > 0
  and not attr.attisdropped
order by cl.oid, attr.attnum;
"#);
