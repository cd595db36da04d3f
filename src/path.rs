use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::graph::StopGraph;

/// Shortest paths from one source, indexed by graph node. Unreachable nodes
/// stay `None`. `first_route` carries the route of the first edge leaving the
/// source along the chosen path; it is `None` for the source itself and for
/// paths that begin with a transfer edge.
#[derive(Debug)]
pub struct PathResult {
    pub seconds: Vec<Option<u32>>,
    pub first_route: Vec<Option<Arc<str>>>,
}

/// Dijkstra with first-edge route attribution.
///
/// The heap holds `(seconds, node)` pairs behind `Reverse`, so equal
/// distances pop in ascending node order; since node indices follow sorted
/// stop ids, ties resolve lexicographically by destination id and the
/// first-route assignment is reproducible. Relaxation is strict (`<`), so the
/// first settled predecessor at a given distance keeps the claim.
pub fn dijkstra_first_route(graph: &StopGraph, source: usize) -> PathResult {
    let mut seconds: Vec<Option<u32>> = vec![None; graph.len()];
    let mut first_route: Vec<Option<Arc<str>>> = vec![None; graph.len()];
    let mut heap: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::new();

    seconds[source] = Some(0);
    heap.push(Reverse((0, source)));

    while let Some(Reverse((distance, node))) = heap.pop() {
        if seconds[node] != Some(distance) {
            continue;
        }
        for edge in graph.edges(node) {
            let next = distance + edge.seconds;
            if seconds[edge.to].is_none_or(|old| next < old) {
                seconds[edge.to] = Some(next);
                first_route[edge.to] = if node == source {
                    edge.route.clone()
                } else {
                    first_route[node].clone()
                };
                heap.push(Reverse((next, edge.to)));
            }
        }
    }

    PathResult {
        seconds,
        first_route,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::models::StopRow;
    use crate::graph::StopCatalog;
    use crate::segments::WindowSegments;

    fn catalog(ids: &[&str]) -> StopCatalog {
        let mut catalog = StopCatalog::default();
        for (i, id) in ids.iter().enumerate() {
            catalog.observe(&StopRow {
                stop_id: Some(id.to_string()),
                stop_name: None,
                stop_lat: Some(format!("{}", 40.0 + i as f64 * 0.01)),
                stop_lon: Some("-73.99".to_string()),
                parent_station: None,
            });
        }
        catalog
    }

    fn segments(edges: &[(&str, &str, u32, Option<&str>)]) -> WindowSegments {
        let mut segments = WindowSegments::default();
        for (from, to, seconds, route) in edges {
            let edge = (Arc::from(*from), Arc::from(*to));
            segments.weights.insert(edge, *seconds);
            let edge = (Arc::from(*from), Arc::from(*to));
            segments.routes.insert(edge, route.map(Arc::from));
        }
        segments
    }

    #[test]
    fn distances_and_first_routes() {
        let catalog = catalog(&["A", "B", "C"]);
        let segments = segments(&[
            ("A", "B", 300, Some("Q")),
            ("B", "C", 240, Some("N")),
        ]);
        let graph = StopGraph::build(&catalog, &segments, 0);
        let a = graph.index_of("A").unwrap();
        let result = dijkstra_first_route(&graph, a);
        let b = graph.index_of("B").unwrap();
        let c = graph.index_of("C").unwrap();
        assert_eq!(result.seconds[a], Some(0));
        assert_eq!(result.seconds[b], Some(300));
        assert_eq!(result.seconds[c], Some(540));
        assert!(result.first_route[a].is_none());
        // Both hops inherit the first edge's route.
        assert_eq!(result.first_route[b].as_deref(), Some("Q"));
        assert_eq!(result.first_route[c].as_deref(), Some("Q"));
    }

    #[test]
    fn unreachable_stays_none() {
        let catalog = catalog(&["A", "B", "X"]);
        let segments = segments(&[("A", "B", 300, Some("Q"))]);
        let graph = StopGraph::build(&catalog, &segments, 0);
        let a = graph.index_of("A").unwrap();
        let x = graph.index_of("X").unwrap();
        let result = dijkstra_first_route(&graph, a);
        assert_eq!(result.seconds[x], None);
        assert!(result.first_route[x].is_none());
    }

    #[test]
    fn shorter_path_wins_attribution() {
        let catalog = catalog(&["A", "B", "C"]);
        // Direct A->C is slower than A->B->C.
        let segments = segments(&[
            ("A", "C", 900, Some("D")),
            ("A", "B", 120, Some("Q")),
            ("B", "C", 120, Some("N")),
        ]);
        let graph = StopGraph::build(&catalog, &segments, 0);
        let a = graph.index_of("A").unwrap();
        let c = graph.index_of("C").unwrap();
        let result = dijkstra_first_route(&graph, a);
        assert_eq!(result.seconds[c], Some(240));
        assert_eq!(result.first_route[c].as_deref(), Some("Q"));
    }
}
