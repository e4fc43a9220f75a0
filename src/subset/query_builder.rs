use crate::helpers::StringExt;
use crate::models::{Oid, Table};
use crate::quoting::{column_reference, force_quote, qualified_table_name};
use crate::subset::edge::Edge;
use itertools::Itertools;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Postgres limit for identifiers (NAMEDATALEN-1).
pub(crate) const MAX_IDENTIFIER_LEN: usize = 63;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
        }
    }
}

/// Returns a postgres-safe identifier not exceeding 63 bytes by hashing long
/// names: a readable prefix plus 10 hex chars of the SHA-1. Stable across
/// runs, which matters because the same CTE name is referenced from multiple
/// places in one query.
pub(crate) fn shorten(name: &str) -> String {
    if name.len() <= MAX_IDENTIFIER_LEN {
        return name.to_string();
    }

    let digest = Sha1::digest(name.as_bytes());

    // underscore + 10 hex chars must still fit
    let mut prefix_len = 40.min(MAX_IDENTIFIER_LEN - 11);
    while !name.is_char_boundary(prefix_len) {
        prefix_len -= 1;
    }

    let mut out = String::with_capacity(prefix_len + 11);
    out.push_str(&name[..prefix_len]);
    out.push('_');
    for byte in &digest[..5] {
        write!(out, "{:02x}", byte).expect("writing to a string cannot fail");
    }
    out
}

/// Name of the fixpoint ids CTE for one table.
pub(crate) fn ids_cte_name(table: &Table) -> String {
    shorten(&format!("{}__{}__ids", table.schema, table.name))
}

/// `WHERE ( cond ) AND ( cond ) AND TRUE`, or `WHERE TRUE` without conditions.
pub(crate) fn generate_where_clause(subset_conds: &[String]) -> String {
    if subset_conds.is_empty() {
        return "WHERE TRUE".to_string();
    }
    let mut clause = "WHERE ".to_string();
    clause.push_join(" AND ", subset_conds.iter().map(|c| format!("( {} )", c)));
    clause.push_str(" AND TRUE");
    clause
}

/// Explicit select list over the table's non-generated columns, in catalog
/// order, to keep the column count and order consistent with what the COPY
/// pipeline expects.
pub(crate) fn generate_select_all_columns(table: &Table) -> String {
    let mut sql = "SELECT ".to_string();
    sql.push_join(
        ", ",
        table
            .non_generated_columns()
            .map(|c| column_reference(&table.schema, &table.name, &c.name)),
    );
    sql
}

pub(crate) fn generate_select_primary_key(table: &Table) -> String {
    let mut sql = "SELECT ".to_string();
    sql.push_join(
        ", ",
        table
            .primary_key
            .iter()
            .map(|key| column_reference(&table.schema, &table.name, key)),
    );
    sql
}

/// `INNER JOIN "schema"."table" ON <keys> [AND ( subset cond )] [AND poly]`.
///
/// When the right table is materialized by a CTE earlier in the same WITH
/// list, the CTE is joined under an edge-unique alias instead, and the right
/// side's subset conditions are not re-applied: they were already applied
/// inside the CTE.
pub(crate) fn generate_join_clause(
    edge: &Edge,
    join_type: JoinType,
    left_table: &Table,
    right_table: &Table,
    right_subset_conds: &[String],
    overridden_tables: &BTreeMap<Oid, String>,
) -> String {
    let override_cte = overridden_tables.get(&right_table.oid);
    let alias = override_cte.map(|cte| shorten(&format!("{}_e{}", cte, edge.id())));

    let mut conds: Vec<String> = Vec::new();
    for idx in 0..edge.from().keys().len() {
        let left_part = edge.from().key_reference(left_table, idx);
        let right_part = match &alias {
            Some(alias) => format!(
                "{}.{}",
                force_quote(alias),
                force_quote(&edge.to().keys()[idx])
            ),
            None => edge.to().key_reference(right_table, idx),
        };
        conds.push(format!("{} = {}", left_part, right_part));
    }

    if alias.is_none() {
        conds.extend(right_subset_conds.iter().map(|c| format!("( {} )", c)));
    }
    conds.extend(edge.from().polymorphic_exprs().iter().cloned());
    conds.extend(edge.to().polymorphic_exprs().iter().cloned());

    let right_table_name = match (&override_cte, &alias) {
        (Some(cte), Some(alias)) => format!("{} AS {}", force_quote(cte), force_quote(alias)),
        _ => qualified_table_name(&right_table.schema, &right_table.name),
    };

    format!(
        "{} JOIN {} ON {}",
        join_type.as_sql(),
        right_table_name,
        conds.join(" AND ")
    )
}

/// Assembles a deterministic WITH clause that orders CTEs by dependency: a
/// CTE depends on another when its body contains the other's quoted name.
/// Kahn's algorithm with alphabetical tie-breaking; an ordering cycle would
/// indicate a planner bug and falls back to alphabetical order.
pub(crate) fn build_with_clause(cte_defs: &BTreeMap<String, String>, recursive: bool) -> String {
    if cte_defs.is_empty() {
        return String::new();
    }

    let names = cte_defs.keys().cloned().collect_vec();

    let mut depends_on: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut in_degree: BTreeMap<&str, usize> = names.iter().map(|n| (n.as_str(), 0)).collect();
    for name in &names {
        let body = &cte_defs[name];
        for other in &names {
            if name == other {
                continue;
            }
            let needle = format!("\"{}\"", other);
            if body.contains(&needle) {
                depends_on.entry(name.as_str()).or_default().push(other.as_str());
                *in_degree.get_mut(name.as_str()).unwrap() += 1;
            }
        }
    }

    let mut zero = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&name, _)| name)
        .collect_vec();
    zero.sort_unstable();

    let mut ordered: Vec<&str> = Vec::with_capacity(names.len());
    while let Some(&name) = zero.first() {
        zero.remove(0);
        ordered.push(name);
        for (&dependent, dependencies) in &depends_on {
            if dependencies.contains(&name) {
                let degree = in_degree.get_mut(dependent).unwrap();
                *degree = degree.saturating_sub(1);
                if *degree == 0 && !ordered.contains(&dependent) && !zero.contains(&dependent) {
                    zero.push(dependent);
                    zero.sort_unstable();
                }
            }
        }
    }

    if ordered.len() != names.len() {
        ordered = names.iter().map(String::as_str).collect();
    }

    let mut sql = if recursive {
        "WITH RECURSIVE ".to_string()
    } else {
        "WITH ".to_string()
    };
    sql.push_join(
        ", ",
        ordered
            .iter()
            .map(|name| format!("\"{}\" AS ({})", name, cte_defs[*name])),
    );
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Table};

    #[test]
    fn shorten_keeps_short_names() {
        assert_eq!(shorten("public__users__ids"), "public__users__ids");
    }

    #[test]
    fn shorten_is_deterministic_and_bounded() {
        let long = "a".repeat(100);
        let first = shorten(&long);
        let second = shorten(&long);
        assert_eq!(first, second);
        assert!(first.len() <= MAX_IDENTIFIER_LEN);
        assert!(first.starts_with(&"a".repeat(40)));
        assert_eq!(first.len(), 40 + 1 + 10);
    }

    #[test]
    fn shorten_distinguishes_long_names_with_common_prefix() {
        let base = "very_long_schema_name__very_long_table_name_that_overflows".repeat(2);
        let first = shorten(&format!("{}_one", base));
        let second = shorten(&format!("{}_two", base));
        assert_ne!(first, second);
    }

    #[test]
    fn where_clause_without_conditions() {
        assert_eq!(generate_where_clause(&[]), "WHERE TRUE");
    }

    #[test]
    fn where_clause_wraps_each_condition() {
        let conds = vec!["active = true".to_string(), "age > 18".to_string()];
        assert_eq!(
            generate_where_clause(&conds),
            "WHERE ( active = true ) AND ( age > 18 ) AND TRUE"
        );
    }

    #[test]
    fn select_list_skips_generated_columns() {
        let mut table = Table::new("public", "users", 1);
        table.columns = vec![
            Column::new("id", "int4"),
            Column {
                is_generated: true,
                ..Column::new("search", "tsvector")
            },
            Column::new("email", "text"),
        ];

        assert_eq!(
            generate_select_all_columns(&table),
            r#"SELECT "public"."users"."id", "public"."users"."email""#
        );
    }

    #[test]
    fn with_clause_orders_by_dependency() {
        let mut defs = BTreeMap::new();
        defs.insert(
            "beta".to_string(),
            r#"SELECT 1 FROM "gamma" WHERE x"#.to_string(),
        );
        defs.insert("gamma".to_string(), "SELECT 2".to_string());
        defs.insert("alpha".to_string(), "SELECT 3".to_string());

        assert_eq!(
            build_with_clause(&defs, false),
            r#"WITH "alpha" AS (SELECT 3), "gamma" AS (SELECT 2), "beta" AS (SELECT 1 FROM "gamma" WHERE x)"#
        );
    }

    #[test]
    fn with_clause_cycle_falls_back_to_alphabetical() {
        let mut defs = BTreeMap::new();
        defs.insert("b".to_string(), r#"SELECT 1 FROM "a""#.to_string());
        defs.insert("a".to_string(), r#"SELECT 2 FROM "b""#.to_string());

        assert_eq!(
            build_with_clause(&defs, false),
            r#"WITH "a" AS (SELECT 2 FROM "b"), "b" AS (SELECT 1 FROM "a")"#
        );
    }
}
