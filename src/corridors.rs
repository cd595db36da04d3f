use indexmap::IndexMap;
use serde::Serialize;

use crate::config::AtlasConfig;
use crate::shared::{Coordinate, round_to};

/// Origin/destination view shared by tract neighborhoods and derived
/// regions, so the same scoring pass serves both layers.
#[derive(Debug, Clone)]
pub struct CorridorNode {
    pub id: String,
    pub name: String,
    pub borough: String,
    pub centroid: Option<Coordinate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HubInfo {
    pub key: String,
    pub label: String,
    pub id: String,
    pub name: String,
    pub centroid: [f64; 2],
}

#[derive(Debug, Clone, Serialize)]
pub struct CorridorEntry {
    pub hub: String,
    pub origin_id: String,
    pub origin_name: String,
    pub origin_borough: String,
    pub hub_id: String,
    pub hub_name: String,
    pub hub_borough: String,
    pub minutes: u32,
    pub distance_km: f64,
    pub km_per_min: Option<f64>,
    pub expected_minutes: Option<f64>,
    pub minutes_saved: Option<f64>,
    pub first_line: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HubLists {
    pub top_underrated: Vec<CorridorEntry>,
    pub top_speed: Vec<CorridorEntry>,
}

#[derive(Debug, Serialize)]
pub struct CorridorReport {
    pub max_minutes: u32,
    pub expected_speed_km_per_min: f64,
    pub hubs: IndexMap<String, HubInfo>,
    pub corridors: IndexMap<String, HubLists>,
}

// Coarse outlines used only when borough metadata is missing: corridors keep
// their tri-borough focus by excluding origins that fall inside these shapes.
// Vertex lists are (lon, lat).

const MANHATTAN_OUTLINE: [[f64; 2]; 17] = [
    [-74.018, 40.701],
    [-74.015, 40.720],
    [-74.010, 40.740],
    [-74.004, 40.760],
    [-73.998, 40.780],
    [-73.986, 40.800],
    [-73.962, 40.835],
    [-73.944, 40.868],
    [-73.928, 40.880],
    [-73.922, 40.868],
    [-73.928, 40.835],
    [-73.940, 40.805],
    [-73.948, 40.780],
    [-73.957, 40.755],
    [-73.970, 40.735],
    [-73.985, 40.720],
    [-74.005, 40.705],
];

const STATEN_ISLAND_OUTLINE: [[f64; 2]; 4] = [
    [-74.255, 40.510],
    [-74.255, 40.650],
    [-74.070, 40.650],
    [-74.070, 40.510],
];

const BRONX_OUTLINE: [[f64; 2]; 4] = [
    [-73.935, 40.785],
    [-73.935, 40.915],
    [-73.765, 40.915],
    [-73.765, 40.785],
];

fn point_in_outline(lat: f64, lon: f64, outline: &[[f64; 2]]) -> bool {
    let n = outline.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    for i in 0..n {
        let [x1, y1] = outline[i];
        let [x2, y2] = outline[(i + 1) % n];
        if (y1 > lat) != (y2 > lat) && lon < (x2 - x1) * (lat - y1) / (y2 - y1 + 1e-12) + x1 {
            inside = !inside;
        }
    }
    inside
}

pub fn in_manhattan_outline(lat: f64, lon: f64) -> bool {
    point_in_outline(lat, lon, &MANHATTAN_OUTLINE)
}

pub fn in_staten_island_outline(lat: f64, lon: f64) -> bool {
    point_in_outline(lat, lon, &STATEN_ISLAND_OUTLINE)
}

pub fn in_bronx_outline(lat: f64, lon: f64) -> bool {
    point_in_outline(lat, lon, &BRONX_OUTLINE)
}

fn nearest_node_index(nodes: &[CorridorNode], anchor: &Coordinate) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, node) in nodes.iter().enumerate() {
        let Some(centroid) = node.centroid else {
            continue;
        };
        let distance = centroid.haversine_m(anchor);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((index, distance));
        }
    }
    best.map(|(index, _)| index)
}

/// True when an origin participates in corridor scoring: named Brooklyn or
/// Queens, or — lacking borough metadata — outside the coarse Manhattan,
/// Bronx and Staten Island outlines.
fn origin_allowed(node: &CorridorNode) -> bool {
    let borough = node.borough.trim().to_lowercase();
    if !borough.is_empty() {
        return borough == "brooklyn" || borough == "queens";
    }
    let Some(centroid) = node.centroid else {
        return false;
    };
    let (lat, lon) = (centroid.latitude, centroid.longitude);
    !(in_manhattan_outline(lat, lon) || in_bronx_outline(lat, lon) || in_staten_island_outline(lat, lon))
}

fn make_entry(
    config: &AtlasConfig,
    nodes: &[CorridorNode],
    minutes: &[Vec<Option<u32>>],
    first_route: &[Vec<Option<usize>>],
    route_short: &[String],
    origin: usize,
    hub_key: &str,
    hub: usize,
) -> Option<CorridorEntry> {
    let m = minutes[origin][hub]?;
    if m == 0 || m > config.max_minutes {
        return None;
    }
    let origin_centroid = nodes[origin].centroid?;
    let hub_centroid = nodes[hub].centroid?;
    let distance_km = origin_centroid.haversine_km(&hub_centroid);
    if !distance_km.is_finite() {
        return None;
    }
    let first_line = first_route[origin][hub].and_then(|index| route_short.get(index).cloned());
    let km_per_min = distance_km / f64::from(m);
    let expected_minutes = (config.expected_speed_km_per_min > 0.0)
        .then(|| distance_km / config.expected_speed_km_per_min);
    let minutes_saved = expected_minutes.map(|expected| expected - f64::from(m));
    Some(CorridorEntry {
        hub: hub_key.to_string(),
        origin_id: nodes[origin].id.clone(),
        origin_name: nodes[origin].name.clone(),
        origin_borough: nodes[origin].borough.clone(),
        hub_id: nodes[hub].id.clone(),
        hub_name: nodes[hub].name.clone(),
        hub_borough: nodes[hub].borough.clone(),
        minutes: m,
        distance_km: round_to(distance_km, 2),
        km_per_min: Some(round_to(km_per_min, 3)),
        expected_minutes: expected_minutes.map(|v| round_to(v, 1)),
        minutes_saved: minutes_saved.map(|v| round_to(v, 1)),
        first_line,
    })
}

/// Scores every allowed (origin, hub) pair and emits two descending top-N
/// lists per hub. Sorts are stable over the origin ordinal order, so the
/// report is deterministic run over run.
pub fn compute(
    config: &AtlasConfig,
    nodes: &[CorridorNode],
    minutes: &[Vec<Option<u32>>],
    first_route: &[Vec<Option<usize>>],
    route_short: &[String],
) -> CorridorReport {
    let mut hubs = IndexMap::new();
    let mut hub_indices: IndexMap<String, usize> = IndexMap::new();
    for anchor in &config.hubs {
        let Some(index) = nearest_node_index(nodes, &anchor.coordinate) else {
            continue;
        };
        let node = &nodes[index];
        let centroid = node.centroid.expect("nearest node has a centroid");
        hub_indices.insert(anchor.key.clone(), index);
        hubs.insert(
            anchor.key.clone(),
            HubInfo {
                key: anchor.key.clone(),
                label: anchor.label.clone(),
                id: node.id.clone(),
                name: node.name.clone(),
                centroid: [centroid.latitude, centroid.longitude],
            },
        );
    }

    let cap = config.top_n.min(200);
    let mut corridors = IndexMap::new();
    for (hub_key, &hub_index) in &hub_indices {
        let mut rows = Vec::new();
        for origin in 0..nodes.len() {
            if origin == hub_index || nodes[origin].centroid.is_none() {
                continue;
            }
            if !origin_allowed(&nodes[origin]) {
                continue;
            }
            if let Some(entry) = make_entry(
                config,
                nodes,
                minutes,
                first_route,
                route_short,
                origin,
                hub_key,
                hub_index,
            ) {
                rows.push(entry);
            }
        }

        let mut top_underrated: Vec<CorridorEntry> = rows
            .iter()
            .filter(|entry| entry.minutes_saved.is_some())
            .cloned()
            .collect();
        top_underrated.sort_by(|a, b| {
            (b.minutes_saved, b.distance_km)
                .partial_cmp(&(a.minutes_saved, a.distance_km))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        top_underrated.truncate(cap);

        let mut top_speed: Vec<CorridorEntry> = rows
            .iter()
            .filter(|entry| entry.km_per_min.is_some())
            .cloned()
            .collect();
        top_speed.sort_by(|a, b| {
            (b.km_per_min, b.distance_km)
                .partial_cmp(&(a.km_per_min, a.distance_km))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        top_speed.truncate(cap);

        corridors.insert(
            hub_key.clone(),
            HubLists {
                top_underrated,
                top_speed,
            },
        );
    }

    CorridorReport {
        max_minutes: config.max_minutes,
        expected_speed_km_per_min: config.expected_speed_km_per_min,
        hubs,
        corridors,
    }
}
