use crate::config::{ParamsValue, TransformerConfig};
use crate::models::Column;
use std::collections::BTreeMap;

/// Returns the default anonymizing transformer for a column based on its
/// postgres type, or `None` when the type has no suitable default. The
/// mapping is case-insensitive and prefers the canonical type name.
pub fn default_transformer_for_column(column: &Column) -> Option<TransformerConfig> {
    let type_name = if column.canonical_type_name.is_empty() {
        column.type_name.as_str()
    } else {
        column.canonical_type_name.as_str()
    };

    // Array types are recognizable by a [] suffix or a _ prefix.
    if type_name.ends_with("[]") || type_name.starts_with('_') {
        return Some(array_replace(column));
    }

    scalar_default(column, type_name)
}

fn scalar_default(column: &Column, type_name: &str) -> Option<TransformerConfig> {
    let config = match type_name.to_lowercase().as_str() {
        // Text types
        "text" | "varchar" | "character varying" | "char" | "character" | "bpchar" => transformer(
            "RandomString",
            column,
            &[("min_length", "5"), ("max_length", "20")],
        ),

        // Integer types
        "integer" | "int" | "int4" | "bigint" | "int8" | "smallint" | "int2" => {
            transformer("RandomInt", column, &[("min", "1"), ("max", "2147483647")])
        }

        // Numeric/decimal types
        "numeric" | "decimal" => transformer(
            "RandomNumeric",
            column,
            &[
                ("min", "1"),
                ("max", "999999"),
                ("precision", "10"),
                ("scale", "2"),
            ],
        ),

        // Float types
        "real" | "float4" | "double precision" | "float8" => transformer(
            "RandomFloat",
            column,
            &[("min", "1.0"), ("max", "1000000.0")],
        ),

        // Date/time types get bounds spelled in the type's own format
        "date" => transformer(
            "RandomDate",
            column,
            &[("min", "1970-01-01"), ("max", "2024-12-31")],
        ),

        "timestamp" | "timestamp without time zone" => transformer(
            "RandomDate",
            column,
            &[("min", "1970-01-01 00:00:00"), ("max", "2024-12-31 23:59:59")],
        ),

        "timestamptz" | "timestamp with time zone" => transformer(
            "RandomDate",
            column,
            &[
                ("min", "1970-01-01 00:00:00+00"),
                ("max", "2024-12-31 23:59:59+00"),
            ],
        ),

        "boolean" | "bool" => transformer("RandomBool", column, &[]),

        "uuid" => transformer("RandomUuid", column, &[]),

        "json" | "jsonb" => transformer("Replace", column, &[("value", "{}")]),

        _ => return None,
    };

    Some(config)
}

fn array_replace(column: &Column) -> TransformerConfig {
    transformer(
        "Replace",
        column,
        &[("value", "{}"), ("keep_null", "true")],
    )
}

fn transformer(name: &str, column: &Column, params: &[(&str, &str)]) -> TransformerConfig {
    let mut all_params: BTreeMap<String, ParamsValue> = BTreeMap::new();
    all_params.insert("column".to_string(), ParamsValue::from(column.name.as_str()));
    for (key, value) in params {
        all_params.insert(key.to_string(), ParamsValue::from(*value));
    }
    TransformerConfig {
        name: name.to_string(),
        params: all_params,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, type_name: &str, canonical: &str) -> Column {
        let mut column = Column::new(name, type_name);
        column.canonical_type_name = canonical.to_string();
        column
    }

    #[test]
    fn canonical_type_wins_over_raw_type() {
        let config = default_transformer_for_column(&column("age", "int4", "integer")).unwrap();
        assert_eq!(config.name, "RandomInt");
        assert_eq!(config.params["column"].as_str(), "age");
        assert_eq!(config.params["max"].as_str(), "2147483647");
    }

    #[test]
    fn mapping_is_case_insensitive() {
        let config = default_transformer_for_column(&column("note", "TEXT", "")).unwrap();
        assert_eq!(config.name, "RandomString");
        assert_eq!(config.params["min_length"].as_str(), "5");
    }

    #[test]
    fn timestamptz_gets_zone_aware_bounds() {
        let config =
            default_transformer_for_column(&column("at", "timestamptz", "timestamp with time zone"))
                .unwrap();
        assert_eq!(config.name, "RandomDate");
        assert_eq!(config.params["min"].as_str(), "1970-01-01 00:00:00+00");
    }

    #[test]
    fn arrays_always_map_to_replace() {
        let suffix = default_transformer_for_column(&column("tags", "text[]", "text[]")).unwrap();
        assert_eq!(suffix.name, "Replace");
        assert_eq!(suffix.params["keep_null"].as_str(), "true");

        let prefix = default_transformer_for_column(&column("nums", "_int4", "")).unwrap();
        assert_eq!(prefix.name, "Replace");
        assert_eq!(prefix.params["value"].as_str(), "{}");
    }

    #[test]
    fn unsupported_type_has_no_default() {
        assert!(default_transformer_for_column(&column("blob", "bytea", "bytea")).is_none());
    }

    #[test]
    fn json_maps_to_empty_object_replace() {
        let config = default_transformer_for_column(&column("meta", "jsonb", "jsonb")).unwrap();
        assert_eq!(config.name, "Replace");
        assert_eq!(config.params["value"].as_str(), "{}");
    }
}
