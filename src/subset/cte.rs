use crate::models::Table;
use crate::quoting::{force_quote, qualified_table_name};
use crate::subset::component::Component;
use crate::subset::edge::Edge;
use crate::subset::graph::Graph;
use crate::subset::query_builder::{
    generate_select_primary_key, generate_where_clause, ids_cte_name,
};
use crate::{PgVeilError, Result};
use itertools::Itertools;
use std::collections::BTreeMap;

/// Accumulates the named CTEs of one generated query. Adding a name twice is
/// a no-op so a component reached through several paths is materialized once.
#[derive(Debug, Default)]
pub(crate) struct CteQuery {
    items: BTreeMap<String, String>,
}

impl CteQuery {
    pub(crate) fn new() -> Self {
        CteQuery::default()
    }

    pub(crate) fn add_item(&mut self, name: String, query: String) {
        // Skip duplicates to prevent "WITH query name ... specified more than once"
        self.items.entry(name).or_insert(query);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn defs(&self) -> &BTreeMap<String, String> {
        &self.items
    }

    /// Emits the ids CTE pair for one strongly connected component, rooted at
    /// `root`: the recursive fixpoint for the root, then a membership CTE for
    /// every other cycle member following its outgoing cycle edge.
    pub(crate) fn add_component(
        &mut self,
        graph: &Graph,
        component: &Component,
        root: usize,
        subset_conds: &BTreeMap<u32, Vec<String>>,
    ) -> Result<()> {
        let root_table = graph.table(root);

        if component.grouped_cycles().len() > 1 {
            return Err(PgVeilError::UnsupportedCycles {
                schema: root_table.schema.clone(),
                table: root_table.name.clone(),
            });
        }

        let cycle = component
            .cycle_starting_at(root)
            .ok_or_else(|| PgVeilError::TableNotInGraph {
                schema: root_table.schema.clone(),
                table: root_table.name.clone(),
            })?;

        self.add_item(
            ids_cte_name(root_table),
            fixpoint_cte_body(graph, root_table, &cycle, subset_conds),
        );

        for edge in &cycle[..cycle.len() - 1] {
            // Each middle member follows its own outgoing cycle edge, so the
            // membership chains all terminate at the root's recursive CTE.
            let member_table = graph.table(edge.to().table_idx());
            let member_edge = cycle
                .iter()
                .find(|e| e.from().table_idx() == edge.to().table_idx())
                .expect("cycle member without outgoing cycle edge");
            self.add_item(
                ids_cte_name(member_table),
                member_cte_body(graph, member_table, member_edge, subset_conds),
            );
        }

        Ok(())
    }
}

/// The recursive fixpoint over the cycle's primary keys. The base case is the
/// root's predicate-filtered rows; the recursive case walks the remaining
/// cycle edges through the real tables and re-applies the dropped edge (the
/// one entering the root) as a terminal join against the CTE itself.
fn fixpoint_cte_body(
    graph: &Graph,
    root_table: &Table,
    cycle: &[Edge],
    subset_conds: &BTreeMap<u32, Vec<String>>,
) -> String {
    let cte_name = ids_cte_name(root_table);
    let select_pk = generate_select_primary_key(root_table);
    let root_conds = conds_for(subset_conds, root_table.oid);

    let mut sql = format!(
        "{} FROM {} {}",
        select_pk,
        qualified_table_name(&root_table.schema, &root_table.name),
        generate_where_clause(root_conds),
    );

    sql.push_str(" UNION ");
    sql.push_str(&select_pk);
    sql.push_str(" FROM ");
    sql.push_str(&qualified_table_name(&root_table.schema, &root_table.name));

    for edge in &cycle[..cycle.len() - 1] {
        let left_table = graph.table(edge.from().table_idx());
        let right_table = graph.table(edge.to().table_idx());

        let mut on_conds: Vec<String> = (0..edge.from().keys().len())
            .map(|idx| {
                format!(
                    "{} = {}",
                    edge.from().key_reference(left_table, idx),
                    edge.to().key_reference(right_table, idx)
                )
            })
            .collect();
        on_conds.extend(
            conds_for(subset_conds, right_table.oid)
                .iter()
                .map(|c| format!("( {} )", c)),
        );
        on_conds.extend(edge.from().polymorphic_exprs().iter().cloned());
        on_conds.extend(edge.to().polymorphic_exprs().iter().cloned());

        sql.push_str(&format!(
            " JOIN {} ON {}",
            qualified_table_name(&right_table.schema, &right_table.name),
            on_conds.join(" AND ")
        ));
    }

    let dropped = &cycle[cycle.len() - 1];
    let dropped_from_table = graph.table(dropped.from().table_idx());
    let mut dropped_conds: Vec<String> = (0..dropped.from().keys().len())
        .map(|idx| {
            format!(
                "{} = {}.{}",
                dropped.from().key_reference(dropped_from_table, idx),
                force_quote(&cte_name),
                force_quote(&dropped.to().keys()[idx])
            )
        })
        .collect();
    dropped_conds.extend(dropped.from().polymorphic_exprs().iter().cloned());
    dropped_conds.extend(dropped.to().polymorphic_exprs().iter().cloned());

    sql.push_str(&format!(
        " JOIN {} ON {}",
        force_quote(&cte_name),
        dropped_conds.join(" AND ")
    ));

    sql
}

/// Membership select for a non-root cycle member: its rows whose outgoing
/// cycle edge lands on an id already reached.
fn member_cte_body(
    graph: &Graph,
    member_table: &Table,
    outgoing: &Edge,
    subset_conds: &BTreeMap<u32, Vec<String>>,
) -> String {
    let next_table = graph.table(outgoing.to().table_idx());
    let next_cte = ids_cte_name(next_table);

    let mut on_conds: Vec<String> = (0..outgoing.from().keys().len())
        .map(|idx| {
            format!(
                "{} = {}",
                outgoing.from().key_reference(member_table, idx),
                outgoing.to().key_reference(next_table, idx)
            )
        })
        .collect();
    on_conds.extend(outgoing.from().polymorphic_exprs().iter().cloned());
    on_conds.extend(outgoing.to().polymorphic_exprs().iter().cloned());

    let using_cols = next_table
        .primary_key
        .iter()
        .map(|key| force_quote(key))
        .join(", ");

    format!(
        "{} FROM {} JOIN {} ON {} JOIN {} USING ({}) {}",
        generate_select_primary_key(member_table),
        qualified_table_name(&member_table.schema, &member_table.name),
        qualified_table_name(&next_table.schema, &next_table.name),
        on_conds.join(" AND "),
        force_quote(&next_cte),
        using_cols,
        generate_where_clause(conds_for(subset_conds, member_table.oid)),
    )
}

/// Final projection of a cyclic target: the explicit column list restricted
/// to primary keys reached by the fixpoint.
pub(crate) fn generate_membership_predicate(target_table: &Table) -> String {
    let cte_name = ids_cte_name(target_table);

    let left_keys = target_table
        .primary_key
        .iter()
        .map(|key| crate::quoting::column_reference(&target_table.schema, &target_table.name, key))
        .join(",");
    let right_keys = target_table
        .primary_key
        .iter()
        .map(|key| format!("{}.{}", force_quote(&cte_name), force_quote(key)))
        .join(",");

    format!(
        "({}) IN (SELECT {} FROM {})",
        left_keys,
        right_keys,
        force_quote(&cte_name)
    )
}

fn conds_for(subset_conds: &BTreeMap<u32, Vec<String>>, oid: u32) -> &[String] {
    subset_conds.get(&oid).map(Vec::as_slice).unwrap_or(&[])
}
