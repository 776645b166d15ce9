//! Dependency graph with a deterministic topological sort.

/// Nodes plus "must come before" edges carrying a payload.
///
/// Sorting is stable: among nodes that are ready at the same time, the one
/// added first wins. When nothing is ready, a cycle is located by walking
/// back along incoming edges from the earliest remaining node, and broken at
/// its earliest member by removing the cycle edge into it. Payloads of removed
/// edges are handed back to the caller; edges outside cycles are never removed.
#[derive(Debug)]
pub(crate) struct DependencyGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<(usize, usize, E)>,
}

impl<N, E> DependencyGraph<N, E> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub(crate) fn add_node(&mut self, node: N) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// `from` must be emitted before `to`.
    pub(crate) fn add_edge(&mut self, from: usize, to: usize, payload: E) {
        self.edges.push((from, to, payload));
    }

    pub(crate) fn sort(self, mut on_cycle: impl FnMut(E)) -> Vec<N> {
        let count = self.nodes.len();
        let mut edges: Vec<Option<(usize, usize, E)>> = self.edges.into_iter().map(Some).collect();

        let mut in_degree = vec![0usize; count];
        for (_, to, _) in edges.iter().flatten() {
            in_degree[*to] += 1;
        }

        let mut done = vec![false; count];
        let mut order = Vec::with_capacity(count);

        while order.len() < count {
            let Some(node) = (0..count).find(|&i| !done[i] && in_degree[i] == 0) else {
                let Some((from, to)) = find_cycle_edge(&edges, &done) else {
                    break;
                };
                for slot in edges.iter_mut() {
                    if matches!(slot, Some((f, t, _)) if *f == from && *t == to)
                        && let Some((_, _, payload)) = slot.take()
                    {
                        in_degree[to] -= 1;
                        on_cycle(payload);
                    }
                }
                continue;
            };

            done[node] = true;
            order.push(node);

            for slot in edges.iter_mut() {
                if matches!(slot, Some((from, _, _)) if *from == node)
                    && let Some((_, to, _)) = slot.take()
                {
                    in_degree[to] -= 1;
                }
            }
        }

        let mut nodes: Vec<Option<N>> = self.nodes.into_iter().map(Some).collect();
        order.into_iter().filter_map(|i| nodes[i].take()).collect()
    }
}

/// Find a `(from, to)` pair on a cycle among the remaining nodes, where `to`
/// is the cycle's earliest node.
///
/// Only called when every remaining node still has an incoming edge, so the
/// walk back from any of them must revisit a node.
fn find_cycle_edge<E>(edges: &[Option<(usize, usize, E)>], done: &[bool]) -> Option<(usize, usize)> {
    let predecessor = |node: usize| {
        edges
            .iter()
            .flatten()
            .filter(|(_, to, _)| *to == node)
            .map(|(from, _, _)| *from)
            .min()
    };

    let start = (0..done.len()).find(|&i| !done[i])?;
    let mut path = vec![start];
    let mut current = start;
    let first = loop {
        let previous = predecessor(current)?;
        if let Some(pos) = path.iter().position(|&n| n == previous) {
            break pos;
        }
        path.push(previous);
        current = previous;
    };
    let cycle = &path[first..];

    // path[i + 1] precedes path[i]; the cycle closes from its first node back
    // to its last.
    let (at, &to) = cycle.iter().enumerate().min_by_key(|&(_, n)| *n)?;
    let from = cycle.get(at + 1).copied().unwrap_or(cycle[0]);
    Some((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_respects_edges() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.add_edge(c, a, ());
        graph.add_edge(b, c, ());

        let order = graph.sort(|_| panic!("no cycle expected"));
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_is_stable_without_edges() {
        let mut graph: DependencyGraph<_, ()> = DependencyGraph::new();
        for n in ["x", "y", "z"] {
            graph.add_node(n);
        }
        assert_eq!(graph.sort(|_| {}), vec!["x", "y", "z"]);
    }

    #[test]
    fn test_cycle_is_broken_at_earliest_node() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        graph.add_edge(a, b, "a->b");
        graph.add_edge(b, a, "b->a");

        let mut broken = Vec::new();
        let order = graph.sort(|e| broken.push(e));
        assert_eq!(order, vec!["a", "b"]);
        assert_eq!(broken, vec!["b->a"]);
    }

    #[test]
    fn test_edges_outside_the_cycle_are_kept() {
        let mut graph = DependencyGraph::new();
        let dependent = graph.add_node("dependent");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        graph.add_edge(b, dependent, "b->dependent");
        graph.add_edge(c, b, "c->b");
        graph.add_edge(b, c, "b->c");

        let mut broken = Vec::new();
        let order = graph.sort(|e| broken.push(e));
        assert_eq!(broken, vec!["c->b"]);
        assert_eq!(order, vec!["b", "dependent", "c"]);
    }

    #[test]
    fn test_parallel_cycle_edges_are_removed_together() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        graph.add_edge(b, a, "first");
        graph.add_edge(b, a, "second");
        graph.add_edge(a, b, "a->b");

        let mut broken = Vec::new();
        assert_eq!(graph.sort(|e| broken.push(e)), vec!["a", "b"]);
        assert_eq!(broken, vec!["first", "second"]);
    }

    #[test]
    fn test_self_edge_is_reported() {
        let mut graph = DependencyGraph::new();
        let a = graph.add_node("a");
        graph.add_edge(a, a, "self");

        let mut broken = Vec::new();
        assert_eq!(graph.sort(|e| broken.push(e)), vec!["a"]);
        assert_eq!(broken, vec!["self"]);
    }
}
