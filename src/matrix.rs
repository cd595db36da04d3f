use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::graph::{StopCatalog, StopGraph};
use crate::path::dijkstra_first_route;
use crate::segments::WindowSegments;

/// Seconds to whole minutes, rounding half up.
pub fn round_minutes(seconds: u32) -> u32 {
    (seconds + 30) / 60
}

/// Compact per-window route table: the distinct dominant route ids, sorted,
/// so matrices and graphs can refer to routes by index.
#[derive(Debug, Default)]
pub struct RouteTable {
    ids: Vec<Arc<str>>,
    index: HashMap<Arc<str>, usize>,
}

impl RouteTable {
    pub fn from_segments(segments: &WindowSegments) -> Self {
        let mut ids: Vec<Arc<str>> = segments
            .routes
            .values()
            .filter_map(|route| route.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort_unstable();
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self { ids, index }
    }

    pub fn ids(&self) -> &[Arc<str>] {
        &self.ids
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// All-pairs travel minutes between representative stops, with the
/// route-table index of the first edge out of the origin.
#[derive(Debug)]
pub struct TravelMatrix {
    pub minutes: Vec<Vec<Option<u32>>>,
    pub first_route: Vec<Vec<Option<usize>>>,
}

/// Runs one single-source solve per origin. Origins share nothing but the
/// immutable graph, so the rows fan out across threads; collect keeps them
/// in origin order.
pub fn build_matrix(graph: &StopGraph, rep_stops: &[usize], routes: &RouteTable) -> TravelMatrix {
    let rows: Vec<(Vec<Option<u32>>, Vec<Option<usize>>)> = rep_stops
        .par_iter()
        .map(|&source| {
            let result = dijkstra_first_route(graph, source);
            let mut minutes = Vec::with_capacity(rep_stops.len());
            let mut first_route = Vec::with_capacity(rep_stops.len());
            for &destination in rep_stops {
                match result.seconds[destination] {
                    None => {
                        minutes.push(None);
                        first_route.push(None);
                    }
                    Some(seconds) => {
                        minutes.push(Some(round_minutes(seconds)));
                        first_route.push(
                            result.first_route[destination]
                                .as_deref()
                                .and_then(|route| routes.index_of(route)),
                        );
                    }
                }
            }
            (minutes, first_route)
        })
        .collect();

    info!(origins = rep_stops.len(), "computed matrix rows");

    let mut matrix = TravelMatrix {
        minutes: Vec::with_capacity(rows.len()),
        first_route: Vec::with_capacity(rows.len()),
    };
    for (minutes, first_route) in rows {
        matrix.minutes.push(minutes);
        matrix.first_route.push(first_route);
    }
    matrix
}

/// Harmonic centrality of one matrix row: `Σ 1/m` over positive minutes.
/// Unreachable cells contribute nothing, so an isolated origin scores zero.
pub fn harmonic_row(row: &[Option<u32>]) -> f64 {
    row.iter()
        .flatten()
        .filter(|&&m| m > 0)
        .map(|&m| 1.0 / f64::from(m))
        .sum()
}

/// Median of the positive minutes in a row; `None` when nothing is reachable.
pub fn median_minutes_row(row: &[Option<u32>]) -> Option<f64> {
    let mut values: Vec<u32> = row.iter().flatten().copied().filter(|&m| m > 0).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let n = values.len();
    if n % 2 == 1 {
        Some(f64::from(values[n / 2]))
    } else {
        Some(f64::from(values[n / 2 - 1] + values[n / 2]) / 2.0)
    }
}

/// Harmonic centrality recomputed on a graph whose transfer edges carry an
/// extra fixed penalty. Neighborhoods that depend on transfers to reach the
/// network drop visibly under this metric.
pub fn penalized_harmonic(
    catalog: &StopCatalog,
    segments: &WindowSegments,
    penalized_transfer_seconds: u32,
    rep_stops: &[usize],
) -> Vec<f64> {
    let graph = StopGraph::build(catalog, segments, penalized_transfer_seconds);
    rep_stops
        .par_iter()
        .map(|&source| {
            let result = dijkstra_first_route(&graph, source);
            let row: Vec<Option<u32>> = rep_stops
                .iter()
                .map(|&destination| result.seconds[destination].map(round_minutes))
                .collect();
            harmonic_row(&row)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::models::StopRow;

    fn catalog(stops: &[(&str, Option<&str>)]) -> StopCatalog {
        let mut catalog = StopCatalog::default();
        for (i, (id, parent)) in stops.iter().enumerate() {
            catalog.observe(&StopRow {
                stop_id: Some(id.to_string()),
                stop_name: None,
                stop_lat: Some(format!("{}", 40.70 + i as f64 * 0.01)),
                stop_lon: Some("-73.99".to_string()),
                parent_station: parent.map(str::to_string),
            });
        }
        catalog
    }

    fn two_stop_segments() -> WindowSegments {
        let mut segments = WindowSegments::default();
        segments
            .weights
            .insert((Arc::from("A"), Arc::from("B")), 300);
        segments
            .routes
            .insert((Arc::from("A"), Arc::from("B")), Some(Arc::from("Q")));
        segments
            .weights
            .insert((Arc::from("B"), Arc::from("A")), 300);
        segments
            .routes
            .insert((Arc::from("B"), Arc::from("A")), Some(Arc::from("Q")));
        segments
    }

    #[test]
    fn round_minutes_is_half_up() {
        assert_eq!(round_minutes(0), 0);
        assert_eq!(round_minutes(29), 0);
        assert_eq!(round_minutes(30), 1);
        assert_eq!(round_minutes(300), 5);
        assert_eq!(round_minutes(330), 6);
    }

    #[test]
    fn matrix_diagonal_is_zero() {
        let catalog = catalog(&[("A", None), ("B", None)]);
        let segments = two_stop_segments();
        let graph = StopGraph::build(&catalog, &segments, 0);
        let routes = RouteTable::from_segments(&segments);
        let reps = vec![graph.index_of("A").unwrap(), graph.index_of("B").unwrap()];
        let matrix = build_matrix(&graph, &reps, &routes);
        assert_eq!(matrix.minutes[0][0], Some(0));
        assert_eq!(matrix.minutes[1][1], Some(0));
        assert_eq!(matrix.minutes[0][1], Some(5));
        assert_eq!(matrix.first_route[0][0], None);
        assert_eq!(matrix.first_route[0][1], Some(0));
    }

    #[test]
    fn unreachable_cells_are_none() {
        let catalog = catalog(&[("A", None), ("B", None), ("X", None)]);
        let segments = two_stop_segments();
        let graph = StopGraph::build(&catalog, &segments, 0);
        let routes = RouteTable::from_segments(&segments);
        let reps = vec![
            graph.index_of("A").unwrap(),
            graph.index_of("B").unwrap(),
            graph.index_of("X").unwrap(),
        ];
        let matrix = build_matrix(&graph, &reps, &routes);
        assert_eq!(matrix.minutes[0][2], None);
        assert_eq!(matrix.minutes[2][0], None);
        assert_eq!(matrix.minutes[2][2], Some(0));
        assert_eq!(harmonic_row(&matrix.minutes[2]), 0.0);
    }

    #[test]
    fn centrality_rows() {
        assert!((harmonic_row(&[Some(0), Some(5), None, Some(10)]) - 0.3).abs() < 1e-12);
        assert_eq!(median_minutes_row(&[Some(0), None]), None);
        assert_eq!(median_minutes_row(&[Some(0), Some(5), Some(7), None]), Some(6.0));
        assert_eq!(median_minutes_row(&[Some(3), Some(5), Some(7)]), Some(5.0));
    }

    #[test]
    fn harmonic_is_monotone_in_transfer_penalty() {
        let catalog = catalog(&[("A", Some("P")), ("B", Some("P")), ("C", None)]);
        let mut segments = WindowSegments::default();
        segments
            .weights
            .insert((Arc::from("B"), Arc::from("C")), 300);
        segments
            .routes
            .insert((Arc::from("B"), Arc::from("C")), Some(Arc::from("Q")));
        let graph = StopGraph::build(&catalog, &segments, 120);
        let reps = vec![
            graph.index_of("A").unwrap(),
            graph.index_of("B").unwrap(),
            graph.index_of("C").unwrap(),
        ];
        let mut last = f64::INFINITY;
        for penalty in [0u32, 120, 240, 600] {
            let scores = penalized_harmonic(&catalog, &segments, 120 + penalty, &reps);
            let total: f64 = scores.iter().sum();
            assert!(total <= last + 1e-12);
            last = total;
        }
    }
}
