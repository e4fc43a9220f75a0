use super::define_catalog_query;
use crate::models::Oid;
use crate::postgres_client_wrapper::FromRow;
use tokio_postgres::Row;

#[derive(Debug, Eq, PartialEq)]
pub struct TablesResult {
    pub schema_name: String,
    pub table_name: String,
    pub oid: Oid,
    pub relkind: char,
}

impl FromRow for TablesResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        let relkind: String = row.try_get(3)?;
        Ok(TablesResult {
            schema_name: row.try_get(0)?,
            table_name: row.try_get(1)?,
            oid: row.try_get(2)?,
            relkind: relkind.chars().next().unwrap_or('r'),
        })
    }
}

//language=postgresql
define_catalog_query!(get_tables, TablesResult, r#"
select ns.nspname, cl.relname, cl.oid, cl.relkind::text
from pg_class cl
         join pg_catalog.pg_namespace ns on ns.oid = cl.relnamespace
where cl.relkind in ('r', 'p')
  and cl.oid > 16384
  and ns.nspname not in ('pg_catalog', 'information_schema')
order by ns.nspname, cl.relname;
"#);
