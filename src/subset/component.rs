use crate::models::Table;
use crate::subset::edge::Edge;
use itertools::Itertools;
use std::collections::BTreeMap;

/// A strongly connected component of the foreign key graph: its member table
/// indices plus the edge multiset that closes the cycle. The planner consumes
/// the cycles to build the recursive fixpoint CTEs.
#[derive(Debug, Clone)]
pub struct Component {
    pub(crate) tables: Vec<usize>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) cycles: Vec<Vec<Edge>>,
}

impl Component {
    /// Builds the component from its member set. Edges are restricted to
    /// those with both endpoints inside the component and ordered by
    /// `(from.schema, from.name, from.oid, edge.id)` so everything derived
    /// from them is deterministic.
    pub(crate) fn new(mut tables: Vec<usize>, all_edges: &[Edge], table_set: &[Table]) -> Self {
        tables.sort_unstable();

        let member = |idx: usize| tables.binary_search(&idx).is_ok();

        let edges = all_edges
            .iter()
            .filter(|e| member(e.from().table_idx()) && member(e.to().table_idx()))
            .filter(|e| !e.is_self_referential() || genuine_self_cycle(e))
            .cloned()
            .sorted_by(|a, b| {
                let ta = &table_set[a.from().table_idx()];
                let tb = &table_set[b.from().table_idx()];
                (&ta.schema, &ta.name, ta.oid, a.id()).cmp(&(&tb.schema, &tb.name, tb.oid, b.id()))
            })
            .collect_vec();

        let cycles = find_simple_cycles(&tables, &edges);

        Component {
            tables,
            edges,
            cycles,
        }
    }

    pub(crate) fn has_cycle(&self) -> bool {
        !self.cycles.is_empty()
    }

    pub(crate) fn contains(&self, table_idx: usize) -> bool {
        self.tables.binary_search(&table_idx).is_ok()
    }

    /// Cycles grouped by their member-table signature. Query generation only
    /// supports a single group per component.
    pub(crate) fn grouped_cycles(&self) -> BTreeMap<Vec<usize>, Vec<&Vec<Edge>>> {
        let mut groups: BTreeMap<Vec<usize>, Vec<&Vec<Edge>>> = BTreeMap::new();
        for cycle in &self.cycles {
            let signature = cycle
                .iter()
                .map(|e| e.from().table_idx())
                .sorted_unstable()
                .dedup()
                .collect_vec();
            groups.entry(signature).or_default().push(cycle);
        }
        groups
    }

    /// The component's cycle rotated so it starts at `root`. `None` when the
    /// root is not on the cycle.
    pub(crate) fn cycle_starting_at(&self, root: usize) -> Option<Vec<Edge>> {
        let cycle = self.cycles.first()?;
        let start = cycle.iter().position(|e| e.from().table_idx() == root)?;
        let mut rotated = Vec::with_capacity(cycle.len());
        rotated.extend_from_slice(&cycle[start..]);
        rotated.extend_from_slice(&cycle[..start]);
        Some(rotated)
    }
}

/// A self-referential edge only closes a cycle when its key sides do not
/// overlap; a constraint equating a column with itself cannot make the table
/// reachable from new rows.
fn genuine_self_cycle(edge: &Edge) -> bool {
    edge.from()
        .keys()
        .iter()
        .all(|k| !edge.to().keys().contains(k))
}

/// Enumerates the simple cycles of the component, each reported once rooted
/// at its smallest member. Components of foreign key graphs are tiny, so the
/// straightforward path search is fine.
fn find_simple_cycles(tables: &[usize], edges: &[Edge]) -> Vec<Vec<Edge>> {
    let mut cycles = Vec::new();

    for (start_pos, &start) in tables.iter().enumerate() {
        let mut path: Vec<Edge> = Vec::new();
        let mut on_path = vec![false; tables.len()];
        search(
            start,
            start,
            start_pos,
            tables,
            edges,
            &mut path,
            &mut on_path,
            &mut cycles,
        );
    }

    cycles
}

#[allow(clippy::too_many_arguments)]
fn search(
    current: usize,
    start: usize,
    start_pos: usize,
    tables: &[usize],
    edges: &[Edge],
    path: &mut Vec<Edge>,
    on_path: &mut [bool],
    cycles: &mut Vec<Vec<Edge>>,
) {
    let current_pos = tables.binary_search(&current).unwrap();
    on_path[current_pos] = true;

    for edge in edges.iter().filter(|e| e.from().table_idx() == current) {
        let to = edge.to().table_idx();
        if to == start {
            let mut cycle = path.clone();
            cycle.push(edge.clone());
            cycles.push(cycle);
            continue;
        }
        let to_pos = tables.binary_search(&to).unwrap();
        // Restricting the walk to members above the start yields every cycle
        // exactly once, rooted at its smallest member.
        if to_pos <= start_pos || on_path[to_pos] {
            continue;
        }
        path.push(edge.clone());
        search(to, start, start_pos, tables, edges, path, on_path, cycles);
        path.pop();
    }

    on_path[current_pos] = false;
}
