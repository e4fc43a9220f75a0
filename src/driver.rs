use crate::models::{CustomType, Oid, Table};
use crate::validation::{ValidationSeverity, ValidationWarning, ValidationWarnings};
use std::collections::BTreeMap;
use tokio_postgres::types::Type;

/// Binds a table's columns to the codecs used when values are read off the
/// wire. Built once per table entry during config building; the streaming
/// runtime looks codecs up by column index.
#[derive(Debug, Clone)]
pub struct Driver {
    table: Table,
    codecs: Vec<ColumnCodec>,
    index_by_name: BTreeMap<String, usize>,
}

/// The resolved codec of one column: either a builtin postgres type or a
/// custom type from the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnCodec {
    Builtin(Type),
    Custom { oid: Oid, name: String },
    /// The type could not be resolved; values pass through as raw text.
    Opaque { name: String },
}

impl Driver {
    /// Resolves a codec for every column. An unresolvable declared type is a
    /// plain warning (the column falls back to text passthrough); an
    /// unresolvable user override is an error warning, because the user
    /// explicitly asked for a rebinding that cannot be honored.
    pub fn new(table: Table, custom_types: &[CustomType]) -> (Option<Driver>, ValidationWarnings) {
        let mut warnings = ValidationWarnings::new();
        let mut codecs = Vec::with_capacity(table.columns.len());
        let mut index_by_name = BTreeMap::new();

        for (idx, column) in table.columns.iter().enumerate() {
            index_by_name.insert(column.name.clone(), idx);

            let type_name = column.effective_type_name();
            let codec = resolve_codec(type_name, custom_types);

            if let ColumnCodec::Opaque { .. } = codec {
                if column.override_type.is_some() {
                    warnings.push(
                        ValidationWarning::new()
                            .set_msg("cannot resolve overridden column type")
                            .set_severity(ValidationSeverity::Error)
                            .add_meta("ColumnName", &column.name)
                            .add_meta("TypeName", type_name),
                    );
                } else {
                    warnings.push(
                        ValidationWarning::new()
                            .set_msg("unknown column type, falling back to text passthrough")
                            .set_severity(ValidationSeverity::Warning)
                            .add_meta("ColumnName", &column.name)
                            .add_meta("TypeName", type_name),
                    );
                }
            }

            codecs.push(codec);
        }

        if warnings.is_fatal() {
            return (None, warnings);
        }

        (
            Some(Driver {
                table,
                codecs,
                index_by_name,
            }),
            warnings,
        )
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn codec(&self, column_idx: usize) -> Option<&ColumnCodec> {
        self.codecs.get(column_idx)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(name).copied()
    }
}

fn resolve_codec(type_name: &str, custom_types: &[CustomType]) -> ColumnCodec {
    if let Some(builtin) = builtin_type(type_name) {
        return ColumnCodec::Builtin(builtin);
    }

    if let Some(custom) = custom_types
        .iter()
        .find(|t| t.name == type_name || t.canonical_name == type_name)
    {
        return ColumnCodec::Custom {
            oid: custom.oid,
            name: custom.name.clone(),
        };
    }

    ColumnCodec::Opaque {
        name: type_name.to_string(),
    }
}

fn builtin_type(type_name: &str) -> Option<Type> {
    let t = match type_name.to_ascii_lowercase().as_str() {
        "smallint" | "int2" => Type::INT2,
        "integer" | "int" | "int4" => Type::INT4,
        "bigint" | "int8" => Type::INT8,
        "real" | "float4" => Type::FLOAT4,
        "double precision" | "float8" => Type::FLOAT8,
        "numeric" | "decimal" => Type::NUMERIC,
        "text" => Type::TEXT,
        "varchar" | "character varying" => Type::VARCHAR,
        "char" | "character" | "bpchar" => Type::BPCHAR,
        "boolean" | "bool" => Type::BOOL,
        "date" => Type::DATE,
        "timestamp" | "timestamp without time zone" => Type::TIMESTAMP,
        "timestamptz" | "timestamp with time zone" => Type::TIMESTAMPTZ,
        "time" | "time without time zone" => Type::TIME,
        "uuid" => Type::UUID,
        "json" => Type::JSON,
        "jsonb" => Type::JSONB,
        "bytea" => Type::BYTEA,
        "oid" => Type::OID,
        "name" => Type::NAME,
        "interval" => Type::INTERVAL,
        "inet" => Type::INET,
        _ => return None,
    };
    Some(t)
}
