use super::define_catalog_query;
use crate::models::Oid;
use crate::postgres_client_wrapper::FromRow;
use tokio_postgres::Row;

#[derive(Debug, Eq, PartialEq)]
pub struct ForeignKeysResult {
    pub constraint_name: String,
    pub source_table_oid: Oid,
    pub target_table_oid: Oid,
    pub source_columns: Vec<String>,
    pub target_columns: Vec<String>,
    pub nullable: bool,
}

impl FromRow for ForeignKeysResult {
    fn from_row(row: Row) -> crate::Result<Self> {
        Ok(ForeignKeysResult {
            constraint_name: row.try_get(0)?,
            source_table_oid: row.try_get(1)?,
            target_table_oid: row.try_get(2)?,
            source_columns: row.try_get(3)?,
            target_columns: row.try_get(4)?,
            nullable: row.try_get(5)?,
        })
    }
}

/// A foreign key constraint as the graph consumes it. Virtual references
/// declared in user config are converted to the same shape, so the planner
/// cannot tell the two apart.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ForeignKeyInfo {
    pub constraint_name: String,
    pub source_table_oid: Oid,
    pub target_table_oid: Oid,
    /// Source and target columns matched positionally; always the same arity.
    pub source_columns: Vec<String>,
    pub target_columns: Vec<String>,
    /// True when any source column is nullable.
    pub nullable: bool,
    /// Free-form SQL predicates on the source side of a polymorphic edge.
    pub source_polymorphic_exprs: Vec<String>,
    /// Free-form SQL predicates on the target side of a polymorphic edge.
    pub target_polymorphic_exprs: Vec<String>,
}

impl ForeignKeysResult {
    pub fn to_foreign_key_info(self) -> ForeignKeyInfo {
        ForeignKeyInfo {
            constraint_name: self.constraint_name,
            source_table_oid: self.source_table_oid,
            target_table_oid: self.target_table_oid,
            source_columns: self.source_columns,
            target_columns: self.target_columns,
            nullable: self.nullable,
            source_polymorphic_exprs: Vec::new(),
            target_polymorphic_exprs: Vec::new(),
        }
    }
}

//language=postgresql
define_catalog_query!(get_foreign_keys, ForeignKeysResult, r#"
select con.conname,
       con.conrelid,
       con.confrelid,
       array(select attr.attname
             from unnest(con.conkey) with ordinality as key(attnum, ord)
                      join pg_attribute attr
                           on attr.attrelid = con.conrelid and attr.attnum = key.attnum
             order by key.ord)::text[] as source_columns,
       array(select attr.attname
             from unnest(con.confkey) with ordinality as key(attnum, ord)
                      join pg_attribute attr
                           on attr.attrelid = con.confrelid and attr.attnum = key.attnum
             order by key.ord)::text[] as target_columns,
       exists(select 1
              from unnest(con.conkey) as key(attnum)
                       join pg_attribute attr
                            on attr.attrelid = con.conrelid and attr.attnum = key.attnum
              where not attr.attnotnull)  as nullable
from pg_catalog.pg_constraint con
where con.contype = 'f'
  and con.conrelid > 16384
order by con.conrelid, con.conname;
"#);
