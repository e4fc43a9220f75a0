use crate::models::Oid;
use crate::quoting::qualified_table_name;
use crate::subset::cte::{generate_membership_predicate, CteQuery};
use crate::subset::edge::Edge;
use crate::subset::graph::Graph;
use crate::subset::query_builder::{
    build_with_clause, generate_join_clause, generate_select_all_columns, generate_where_clause,
    JoinType,
};
use crate::{PgVeilError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Plans the per-table SELECT queries that yield a transitively closed,
/// referentially consistent subset. The graph and the predicate map are both
/// read-only; planning the same table twice produces byte-identical SQL.
pub struct SubsetPlanner<'a> {
    graph: &'a Graph,
    subset_conds: BTreeMap<Oid, Vec<String>>,
}

struct PlannedJoin<'a> {
    edge: &'a Edge,
    join_type: JoinType,
}

impl<'a> SubsetPlanner<'a> {
    pub fn new(graph: &'a Graph, subset_conds: BTreeMap<Oid, Vec<String>>) -> Self {
        SubsetPlanner {
            graph,
            subset_conds,
        }
    }

    pub fn build_table_query(&self, schema: &str, name: &str) -> Result<String> {
        let target = self
            .graph
            .find_table(schema, name)
            .ok_or_else(|| PgVeilError::TableNotInGraph {
                schema: schema.to_string(),
                table: name.to_string(),
            })?;
        self.plan(target)
    }

    fn plan(&self, target: usize) -> Result<String> {
        let target_table = self.graph.table(target);
        let target_component = self.graph.component_of(target);
        let target_is_cyclic = target_component.has_cycle();

        let mut ctes = CteQuery::new();
        let mut overridden: BTreeMap<Oid, String> = BTreeMap::new();

        if target_is_cyclic {
            ctes.add_component(self.graph, target_component, target, &self.subset_conds)?;
        }

        let joins = self.collect_joins(target, target_is_cyclic, &mut ctes, &mut overridden)?;

        let mut sql = String::new();
        if !ctes.is_empty() {
            sql.push_str(&build_with_clause(ctes.defs(), true));
            sql.push(' ');
        }

        sql.push_str(&generate_select_all_columns(target_table));
        sql.push_str(" FROM ");
        sql.push_str(&qualified_table_name(&target_table.schema, &target_table.name));

        for join in &joins {
            let left_table = self.graph.table(join.edge.from().table_idx());
            let right_table = self.graph.table(join.edge.to().table_idx());
            sql.push(' ');
            sql.push_str(&generate_join_clause(
                join.edge,
                join.join_type,
                left_table,
                right_table,
                self.conds_for(right_table.oid),
                &overridden,
            ));
        }

        sql.push(' ');
        if target_is_cyclic {
            sql.push_str("WHERE ");
            sql.push_str(&generate_membership_predicate(target_table));
        } else {
            sql.push_str(&generate_where_clause(self.conds_for(target_table.oid)));
        }

        Ok(sql)
    }

    /// Walks the target's foreign key closure and keeps the edges worth
    /// joining: an edge survives when the subtree behind it carries at least
    /// one predicate or lands on a cyclic component. Joins into cyclic
    /// components are overridden to the component's ids CTE and the walk does
    /// not descend past them; the component's own closure is encoded in its
    /// CTE group. Edges inside the target's own cycle are skipped entirely,
    /// the membership predicate covers them.
    fn collect_joins(
        &self,
        target: usize,
        target_is_cyclic: bool,
        ctes: &mut CteQuery,
        overridden: &mut BTreeMap<Oid, String>,
    ) -> Result<Vec<PlannedJoin<'a>>> {
        let mut visited: BTreeSet<usize> = BTreeSet::new();
        visited.insert(target);
        let mut out = Vec::new();
        self.visit_joins(
            target,
            target,
            target_is_cyclic,
            &mut visited,
            ctes,
            overridden,
            &mut out,
        )?;
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_joins(
        &self,
        current: usize,
        target: usize,
        target_is_cyclic: bool,
        visited: &mut BTreeSet<usize>,
        ctes: &mut CteQuery,
        overridden: &mut BTreeMap<Oid, String>,
        out: &mut Vec<PlannedJoin<'a>>,
    ) -> Result<bool> {
        let mut any_constraint = false;

        for edge in self.graph.edges_from(current) {
            let to = edge.to().table_idx();

            if target_is_cyclic
                && current == target
                && self.graph.component_of(target).contains(to)
            {
                continue;
            }
            if visited.contains(&to) {
                continue;
            }
            visited.insert(to);

            let to_table = self.graph.table(to);
            let to_component = self.graph.component_of(to);

            if to_component.has_cycle() {
                let root = *to_component.tables.first().expect("component without members");
                ctes.add_component(self.graph, to_component, root, &self.subset_conds)?;
                for &member in &to_component.tables {
                    let member_table = self.graph.table(member);
                    overridden.insert(
                        member_table.oid,
                        crate::subset::query_builder::ids_cte_name(member_table),
                    );
                }
                out.push(PlannedJoin {
                    edge,
                    join_type: join_type_for(edge.nullable(), true),
                });
                any_constraint = true;
                continue;
            }

            let mut subtree = Vec::new();
            let subtree_constrained = self.visit_joins(
                to,
                target,
                target_is_cyclic,
                visited,
                ctes,
                overridden,
                &mut subtree,
            )?;
            let to_has_conds = !self.conds_for(to_table.oid).is_empty();

            if to_has_conds || subtree_constrained {
                out.push(PlannedJoin {
                    edge,
                    join_type: join_type_for(edge.nullable(), to_has_conds),
                });
                out.append(&mut subtree);
                any_constraint = true;
            }
        }

        Ok(any_constraint)
    }

    fn conds_for(&self, oid: Oid) -> &[String] {
        self.subset_conds.get(&oid).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// INNER when the foreign key cannot be null and the referenced side is
/// actually constrained; LEFT otherwise.
fn join_type_for(nullable: bool, right_constrained: bool) -> JoinType {
    if !nullable && right_constrained {
        JoinType::Inner
    } else {
        JoinType::Left
    }
}
