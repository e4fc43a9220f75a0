use super::define_catalog_query;
use crate::models::{CustomType, Oid};
use crate::postgres_client_wrapper::FromRow;
use tokio_postgres::Row;

#[derive(Debug, Eq, PartialEq)]
pub struct CustomTypesResult {
    pub oid: Oid,
    pub schema_name: String,
    pub type_name: String,
    pub canonical_name: String,
}

impl FromRow for CustomTypesResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(CustomTypesResult {
            oid: row.try_get(0)?,
            schema_name: row.try_get(1)?,
            type_name: row.try_get(2)?,
            canonical_name: row.try_get(3)?,
        })
    }
}

impl CustomTypesResult {
    pub fn to_custom_type(self) -> CustomType {
        CustomType {
            oid: self.oid,
            schema: self.schema_name,
            name: self.type_name,
            canonical_name: self.canonical_name,
        }
    }
}

//language=postgresql
define_catalog_query!(get_custom_type_rows, CustomTypesResult, r#"
select t.oid, ns.nspname, t.typname, pg_catalog.format_type(t.oid, null)
from pg_type t
         join pg_namespace ns on ns.oid = t.typnamespace
where t.oid > 16384
  and t.typtype in ('b', 'e', 'd', 'r')
  and ns.nspname not in ('pg_catalog', 'information_schema')
order by ns.nspname, t.typname;
"#);
