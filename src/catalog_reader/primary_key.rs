use super::define_catalog_query;
use crate::models::Oid;
use crate::postgres_client_wrapper::FromRow;
use tokio_postgres::Row;

#[derive(Debug, Eq, PartialEq)]
pub struct PrimaryKeyColumnsResult {
    pub table_oid: Oid,
    pub column_name: String,
}

impl FromRow for PrimaryKeyColumnsResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(PrimaryKeyColumnsResult {
            table_oid: row.try_get(0)?,
            column_name: row.try_get(1)?,
        })
    }
}

//language=postgresql
define_catalog_query!(get_primary_key_columns, PrimaryKeyColumnsResult, r#"
select ix.indrelid, attr.attname
from pg_index ix
         join unnest(ix.indkey) with ordinality as key(attnum, ord) on true
         join pg_attribute attr on attr.attrelid = ix.indrelid and attr.attnum = key.attnum
where ix.indisprimary
  and ix.indrelid > 16384
order by ix.indrelid, key.ord;
"#);
