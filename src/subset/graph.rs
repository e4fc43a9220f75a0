use crate::catalog_reader::ForeignKeyInfo;
use crate::models::{Oid, Table};
use crate::subset::component::Component;
use crate::subset::edge::{Edge, TableLink};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// Directed multigraph over the in-scope tables; edges are foreign key
/// constraints, including user-declared virtual ones. Built once per run and
/// read-only afterwards.
pub struct Graph {
    tables: Vec<Table>,
    edges: Vec<Edge>,
    /// Edge ids leaving each table, ordered by edge id.
    adjacency: Vec<Vec<usize>>,
    /// Edges entering each table, endpoints swapped, ordered by edge id.
    reversed: Vec<Vec<Edge>>,
    components: Vec<Component>,
    /// Table index -> index into `components`.
    component_of: Vec<usize>,
}

impl Graph {
    /// Builds the graph from the introspected table set and foreign key list.
    /// Constraints referencing tables outside the set contribute no edge.
    pub fn build(tables: Vec<Table>, foreign_keys: Vec<ForeignKeyInfo>) -> Graph {
        let index_by_oid: HashMap<Oid, usize> = tables
            .iter()
            .enumerate()
            .map(|(idx, t)| (t.oid, idx))
            .collect();

        let mut edges = Vec::with_capacity(foreign_keys.len());
        for fk in foreign_keys {
            let (Some(&from_idx), Some(&to_idx)) = (
                index_by_oid.get(&fk.source_table_oid),
                index_by_oid.get(&fk.target_table_oid),
            ) else {
                debug!(
                    constraint = %fk.constraint_name,
                    "skipping foreign key: endpoint table is not in scope"
                );
                continue;
            };

            let id = edges.len();
            edges.push(Edge::new(
                id,
                fk.constraint_name,
                TableLink::new(from_idx, fk.source_columns, fk.source_polymorphic_exprs),
                TableLink::new(to_idx, fk.target_columns, fk.target_polymorphic_exprs),
                fk.nullable,
            ));
        }

        let mut adjacency = vec![Vec::new(); tables.len()];
        let mut reversed = vec![Vec::new(); tables.len()];
        for edge in &edges {
            adjacency[edge.from().table_idx()].push(edge.id());
            reversed[edge.to().table_idx()].push(edge.reversed());
        }

        let sccs = strongly_connected_components(tables.len(), &adjacency, &edges);
        let mut component_of = vec![0; tables.len()];
        let components = sccs
            .into_iter()
            .enumerate()
            .map(|(component_idx, members)| {
                for &member in &members {
                    component_of[member] = component_idx;
                }
                Component::new(members, &edges, &tables)
            })
            .collect_vec();

        Graph {
            tables,
            edges,
            adjacency,
            reversed,
            components,
            component_of,
        }
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, idx: usize) -> &Table {
        &self.tables[idx]
    }

    pub fn edge(&self, id: usize) -> &Edge {
        &self.edges[id]
    }

    /// Edges leaving a table, in edge id order.
    pub fn edges_from(&self, table_idx: usize) -> impl Iterator<Item = &Edge> {
        self.adjacency[table_idx].iter().map(|&id| &self.edges[id])
    }

    /// The cached reverse view: edges entering a table, with `from` being the
    /// referenced side and `to` the referencing one.
    pub fn reversed_edges(&self, table_idx: usize) -> &[Edge] {
        &self.reversed[table_idx]
    }

    pub(crate) fn components(&self) -> &[Component] {
        &self.components
    }

    pub(crate) fn component_of(&self, table_idx: usize) -> &Component {
        &self.components[self.component_of[table_idx]]
    }

    /// Finds a table by name, tolerating the user having written the quoted
    /// form of either part.
    pub fn find_table(&self, schema: &str, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| {
            (t.name == name || t.name == format!("\"{}\"", name))
                && (t.schema == schema || t.schema == format!("\"{}\"", schema))
        })
    }

    /// Depth-first closure from a root: every edge reachable through forward
    /// foreign keys, in a visit order whose JOINs hit the keys in
    /// root-to-leaf direction. Each table is entered at most once.
    pub fn closure_from(&self, root: usize) -> Vec<&Edge> {
        let mut visited = vec![false; self.tables.len()];
        visited[root] = true;
        let mut out = Vec::new();
        self.closure_visit(root, &mut visited, &mut out);
        out
    }

    fn closure_visit<'a>(&'a self, idx: usize, visited: &mut [bool], out: &mut Vec<&'a Edge>) {
        for edge in self.edges_from(idx) {
            let to = edge.to().table_idx();
            if visited[to] {
                continue;
            }
            visited[to] = true;
            out.push(edge);
            self.closure_visit(to, visited, out);
        }
    }
}

/// Tarjan's algorithm, iterative so deep reference chains cannot overflow the
/// stack. Returns components in reverse topological order of the condensed
/// graph; callers only rely on membership.
fn strongly_connected_components(
    table_count: usize,
    adjacency: &[Vec<usize>],
    edges: &[Edge],
) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let mut index = vec![UNVISITED; table_count];
    let mut low_link = vec![0usize; table_count];
    let mut on_stack = vec![false; table_count];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut result: Vec<Vec<usize>> = Vec::new();

    // (node, next adjacency offset to examine)
    let mut work: Vec<(usize, usize)> = Vec::new();

    for start in 0..table_count {
        if index[start] != UNVISITED {
            continue;
        }
        work.push((start, 0));

        while let Some(&mut (node, ref mut offset)) = work.last_mut() {
            if *offset == 0 {
                index[node] = next_index;
                low_link[node] = next_index;
                next_index += 1;
                stack.push(node);
                on_stack[node] = true;
            }

            if let Some(&edge_id) = adjacency[node].get(*offset) {
                *offset += 1;
                let successor = edges[edge_id].to().table_idx();
                if index[successor] == UNVISITED {
                    work.push((successor, 0));
                } else if on_stack[successor] {
                    low_link[node] = low_link[node].min(index[successor]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                low_link[parent] = low_link[parent].min(low_link[node]);
            }

            if low_link[node] == index[node] {
                let mut members = Vec::new();
                loop {
                    let member = stack.pop().expect("tarjan stack underflow");
                    on_stack[member] = false;
                    members.push(member);
                    if member == node {
                        break;
                    }
                }
                result.push(members);
            }
        }
    }

    result
}
