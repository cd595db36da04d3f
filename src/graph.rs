use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::feed::models::{RouteRow, StopRow};
use crate::segments::WindowSegments;
use crate::shared::Coordinate;

/// A physical stop from the feed. Stops sharing a `parent` form a station
/// complex inside which transfers are modeled as fixed-cost edges.
#[derive(Debug, Clone)]
pub struct Stop {
    pub id: Arc<str>,
    pub name: Arc<str>,
    pub coordinate: Coordinate,
    pub parent: Option<Arc<str>>,
}

/// All stops of a feed in file order, with id lookup and the parent-complex
/// membership lists. Rows without a parseable coordinate are dropped.
#[derive(Debug, Default)]
pub struct StopCatalog {
    stops: Vec<Stop>,
    by_id: HashMap<Arc<str>, usize>,
    complexes: IndexMap<Arc<str>, Vec<Arc<str>>>,
}

impl StopCatalog {
    pub fn observe(&mut self, row: &StopRow) {
        let Some(id) = row.stop_id.as_deref().filter(|s| !s.is_empty()) else {
            return;
        };
        let Some(latitude) = row.stop_lat.as_deref().and_then(|v| v.trim().parse().ok()) else {
            return;
        };
        let Some(longitude) = row.stop_lon.as_deref().and_then(|v| v.trim().parse().ok()) else {
            return;
        };
        let id: Arc<str> = Arc::from(id);
        let name: Arc<str> = match row.stop_name.as_deref().filter(|s| !s.is_empty()) {
            Some(name) => Arc::from(name),
            None => id.clone(),
        };
        let parent: Option<Arc<str>> = row
            .parent_station
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Arc::from);
        if let Some(parent) = &parent {
            self.complexes
                .entry(parent.clone())
                .or_default()
                .push(id.clone());
        }
        self.by_id.insert(id.clone(), self.stops.len());
        self.stops.push(Stop {
            id,
            name,
            coordinate: Coordinate::new(latitude, longitude),
            parent,
        });
    }

    pub fn get(&self, id: &str) -> Option<&Stop> {
        self.by_id.get(id).map(|&i| &self.stops[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Stops in feed-file order.
    pub fn iter(&self) -> impl Iterator<Item = &Stop> {
        self.stops.iter()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn id_set(&self) -> HashSet<Arc<str>> {
        self.stops.iter().map(|s| s.id.clone()).collect()
    }

    /// Parent id -> member stop ids, in feed-file order.
    pub fn complexes(&self) -> &IndexMap<Arc<str>, Vec<Arc<str>>> {
        &self.complexes
    }
}

/// Display metadata for a route. The short name falls back to the long name
/// and then the id; colors are normalized to `#`-prefixed hex strings.
#[derive(Debug, Clone)]
pub struct RouteMeta {
    pub id: Arc<str>,
    pub short_name: String,
    pub color: Option<String>,
    pub text_color: Option<String>,
}

#[derive(Debug, Default)]
pub struct RouteCatalog {
    by_id: HashMap<Arc<str>, RouteMeta>,
}

fn normalize_color(raw: Option<&str>) -> Option<String> {
    let raw = raw.map(str::trim).filter(|c| !c.is_empty())?;
    if raw.starts_with('#') {
        Some(raw.to_string())
    } else {
        Some(format!("#{raw}"))
    }
}

impl RouteCatalog {
    pub fn observe(&mut self, row: &RouteRow) {
        let Some(id) = row.route_id.as_deref().filter(|r| !r.is_empty()) else {
            return;
        };
        let id: Arc<str> = Arc::from(id);
        let short = row
            .route_short_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let long = row
            .route_long_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let short_name = short.or(long).unwrap_or(id.as_ref()).to_string();
        self.by_id.insert(
            id.clone(),
            RouteMeta {
                id,
                short_name,
                color: normalize_color(row.route_color.as_deref()),
                text_color: normalize_color(row.route_text_color.as_deref()),
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&RouteMeta> {
        self.by_id.get(id)
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub to: usize,
    pub seconds: u32,
    pub route: Option<Arc<str>>,
}

/// Immutable weighted multigraph over every catalog stop for one window.
///
/// Node indices are assigned in ascending stop-id order, so an index
/// comparison is a lexicographic id comparison; the path solver leans on
/// that for deterministic tie-breaking. Adjacency lists hold transit edges
/// in first-observed segment order followed by transfer edges in complex
/// order, which fixes the relaxation order as well.
#[derive(Debug)]
pub struct StopGraph {
    ids: Vec<Arc<str>>,
    index: HashMap<Arc<str>, usize>,
    adjacency: Vec<Vec<Edge>>,
}

impl StopGraph {
    pub fn build(catalog: &StopCatalog, segments: &WindowSegments, transfer_seconds: u32) -> Self {
        let mut ids: Vec<Arc<str>> = catalog.iter().map(|s| s.id.clone()).collect();
        ids.sort_unstable();
        let index: HashMap<Arc<str>, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let mut adjacency: Vec<Vec<Edge>> = vec![Vec::new(); ids.len()];

        for ((from, to), &seconds) in &segments.weights {
            if seconds == 0 {
                continue;
            }
            let (Some(&u), Some(&v)) = (index.get(from), index.get(to)) else {
                continue;
            };
            adjacency[u].push(Edge {
                to: v,
                seconds,
                route: segments.routes.get(&(from.clone(), to.clone())).cloned().flatten(),
            });
        }

        if transfer_seconds > 0 {
            for children in catalog.complexes().values() {
                if children.len() < 2 {
                    continue;
                }
                for from in children {
                    for to in children {
                        if from == to {
                            continue;
                        }
                        let (Some(&u), Some(&v)) = (index.get(from), index.get(to)) else {
                            continue;
                        };
                        adjacency[u].push(Edge {
                            to: v,
                            seconds: transfer_seconds,
                            route: None,
                        });
                    }
                }
            }
        }

        Self {
            ids,
            index,
            adjacency,
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn id(&self, index: usize) -> &Arc<str> {
        &self.ids[index]
    }

    pub fn edges(&self, index: usize) -> &[Edge] {
        &self.adjacency[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::models::StopRow;

    fn stop_row(id: &str, lat: &str, lon: &str, parent: Option<&str>) -> StopRow {
        StopRow {
            stop_id: Some(id.to_string()),
            stop_name: Some(format!("{id} station")),
            stop_lat: Some(lat.to_string()),
            stop_lon: Some(lon.to_string()),
            parent_station: parent.map(str::to_string),
        }
    }

    #[test]
    fn catalog_drops_unlocatable_rows() {
        let mut catalog = StopCatalog::default();
        catalog.observe(&stop_row("A", "40.70", "-73.99", None));
        catalog.observe(&stop_row("bad", "not-a-number", "-73.99", None));
        catalog.observe(&StopRow {
            stop_id: None,
            stop_name: None,
            stop_lat: Some("40.7".into()),
            stop_lon: Some("-73.9".into()),
            parent_station: None,
        });
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("A"));
    }

    #[test]
    fn transfer_edges_cover_every_ordered_pair() {
        let mut catalog = StopCatalog::default();
        catalog.observe(&stop_row("A", "40.70", "-73.99", Some("P")));
        catalog.observe(&stop_row("B", "40.71", "-73.98", Some("P")));
        catalog.observe(&stop_row("C", "40.72", "-73.97", None));
        let graph = StopGraph::build(&catalog, &WindowSegments::default(), 120);
        let a = graph.index_of("A").unwrap();
        let b = graph.index_of("B").unwrap();
        let c = graph.index_of("C").unwrap();
        assert_eq!(graph.edges(a).len(), 1);
        assert_eq!(graph.edges(a)[0].to, b);
        assert_eq!(graph.edges(a)[0].seconds, 120);
        assert!(graph.edges(a)[0].route.is_none());
        assert_eq!(graph.edges(b).len(), 1);
        assert!(graph.edges(c).is_empty());
    }

    #[test]
    fn route_catalog_normalizes_display_fields() {
        let mut catalog = RouteCatalog::default();
        catalog.observe(&RouteRow {
            route_id: Some("Q".into()),
            route_short_name: Some("".into()),
            route_long_name: Some("Broadway Express".into()),
            route_color: Some("FCCC0A".into()),
            route_text_color: Some("#000000".into()),
        });
        let meta = catalog.get("Q").unwrap();
        assert_eq!(meta.short_name, "Broadway Express");
        assert_eq!(meta.color.as_deref(), Some("#FCCC0A"));
        assert_eq!(meta.text_color.as_deref(), Some("#000000"));
    }

    #[test]
    fn zero_transfer_seconds_disables_transfers() {
        let mut catalog = StopCatalog::default();
        catalog.observe(&stop_row("A", "40.70", "-73.99", Some("P")));
        catalog.observe(&stop_row("B", "40.71", "-73.98", Some("P")));
        let graph = StopGraph::build(&catalog, &WindowSegments::default(), 0);
        assert!(graph.edges(0).is_empty());
        assert!(graph.edges(1).is_empty());
    }
}
