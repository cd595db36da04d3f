use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value as Json;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use tracing::info;

use crate::corridors::CorridorReport;
use crate::micro::{DerivedRegion, MicroCell, Station, Tract};
use crate::shared::{Profile, round_to};

/// RFC 3339 UTC timestamp shared by every document of one batch run.
pub fn generated_at() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowMeta {
    pub id: String,
    pub label: String,
}

impl From<Profile> for WindowMeta {
    fn from(profile: Profile) -> Self {
        Self {
            id: profile.id().to_string(),
            label: profile.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StopDoc {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub parent_station: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteDoc {
    pub id: String,
    pub short_name: String,
    pub color: Option<String>,
    pub text_color: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodDoc {
    pub id: String,
    pub name: String,
    pub borough: String,
    pub centroid: [f64; 2],
    pub stop_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNeighborhoodDoc {
    pub id: String,
    pub name: String,
    pub borough: String,
    pub centroid: [f64; 2],
    pub stop_id: String,
    pub stop_index: Option<usize>,
}

/// `graph_<profile>.json`: the stop-level graph a viewer needs to draw and
/// route. Edges are `[from_index, to_index, minutes, route_index|null]`.
/// Generic over the neighborhood payload; the derived variant swaps in
/// region entries while keeping stops, routes and edges.
#[derive(Debug, Serialize)]
pub struct GraphDoc<N: Serialize> {
    pub generated_at: String,
    pub window: WindowMeta,
    pub stops: Vec<StopDoc>,
    pub routes: Vec<RouteDoc>,
    pub edges: Vec<(usize, usize, u32, Option<usize>)>,
    pub neighborhoods: Vec<N>,
}

#[derive(Debug, Serialize)]
pub struct MetricDoc {
    pub label: String,
    pub higher_is_better: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_penalty_minutes: Option<f64>,
    pub scores: Vec<Option<f64>>,
}

impl MetricDoc {
    pub fn harmonic(scores: &[f64]) -> Self {
        Self {
            label: "Harmonic".to_string(),
            higher_is_better: true,
            transfer_penalty_minutes: None,
            scores: scores.iter().map(|&s| Some(round_to(s, 6))).collect(),
        }
    }

    pub fn median_minutes(scores: &[Option<f64>]) -> Self {
        Self {
            label: "Median minutes".to_string(),
            higher_is_better: false,
            transfer_penalty_minutes: None,
            scores: scores.iter().map(|s| s.map(|v| round_to(v, 3))).collect(),
        }
    }

    pub fn transfer_penalized(penalty_minutes: f64, scores: Vec<Option<f64>>) -> Self {
        Self {
            label: "Transfer-penalized".to_string(),
            higher_is_better: true,
            transfer_penalty_minutes: Some(penalty_minutes),
            scores: scores
                .into_iter()
                .map(|s| s.map(|v| round_to(v, 6)))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsDoc {
    pub harmonic: MetricDoc,
    pub median_minutes: MetricDoc,
    pub transfer_penalized: MetricDoc,
}

#[derive(Debug, Serialize)]
pub struct CentralityDoc {
    pub default: &'static str,
    pub metrics: MetricsDoc,
}

impl CentralityDoc {
    pub fn new(metrics: MetricsDoc) -> Self {
        Self {
            default: "harmonic",
            metrics,
        }
    }
}

/// `matrix_<profile>.json`, generic over the neighborhood payload so the
/// derived stage can reuse it with region entries.
#[derive(Debug, Serialize)]
pub struct MatrixDoc<N: Serialize> {
    pub generated_at: String,
    pub window: WindowMeta,
    pub neighborhoods: Vec<N>,
    pub routes: Vec<RouteDoc>,
    pub minutes: Vec<Vec<Option<u32>>>,
    pub first_route: Vec<Vec<Option<usize>>>,
    pub centrality: CentralityDoc,
}

/// Derived-region entry used by `matrix_<profile>_derived.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RegionDoc {
    pub id: String,
    pub name: String,
    pub borough: String,
    pub centroid: [f64; 2],
    pub name_confidence: f64,
    pub aliases: Vec<String>,
    pub anchor_station: String,
    pub anchor_station_lat: f64,
    pub anchor_station_lon: f64,
    pub representative_tract_id: Option<String>,
    pub tract_weights: IndexMap<String, f64>,
}

impl RegionDoc {
    pub fn new(region: &DerivedRegion, stations: &[Station]) -> Self {
        let station = &stations[region.station];
        Self {
            id: region.id.clone(),
            name: region.name.clone(),
            borough: region.borough.clone(),
            centroid: [region.centroid.latitude, region.centroid.longitude],
            name_confidence: round_to(region.name_confidence, 3),
            aliases: region.aliases.clone(),
            anchor_station: station.name.to_string(),
            anchor_station_lat: station.coordinate.latitude,
            anchor_station_lon: station.coordinate.longitude,
            representative_tract_id: region.representative_tract.clone(),
            tract_weights: region.tract_weights.clone(),
        }
    }
}

/// Neighborhood entry of `graph_<profile>_derived.json`.
#[derive(Debug, Clone, Serialize)]
pub struct DerivedGraphNeighborhoodDoc {
    pub id: String,
    pub name: String,
    pub borough: String,
    pub centroid: [f64; 2],
    pub stop_id: Option<String>,
    pub name_confidence: f64,
    pub aliases: Vec<String>,
    pub anchor_station: String,
}

#[derive(Debug, Serialize)]
pub struct WindowCorridors {
    pub window: WindowMeta,
    #[serde(flatten)]
    pub report: CorridorReport,
}

/// `teleport_corridors.json` / `teleport_corridors_derived.json`.
#[derive(Debug, Serialize)]
pub struct CorridorsDoc {
    pub generated_at: String,
    pub windows: IndexMap<String, WindowCorridors>,
}

/// Micro-cell FeatureCollection (`micro_units.geojson`).
pub fn micro_units_collection(
    cells: &[MicroCell],
    tracts: &[Tract],
    stations: &[Station],
) -> FeatureCollection {
    let features = cells
        .iter()
        .map(|cell| {
            let tract = &tracts[cell.tract];
            let station = &stations[cell.station];
            let mut properties = JsonObject::new();
            let micro_id = cell.micro_id();
            properties.insert("atlas_id".into(), Json::String(micro_id.clone()));
            properties.insert("micro_id".into(), Json::String(micro_id));
            properties.insert("tract_id".into(), Json::String(tract.id.clone()));
            properties.insert("tract_name".into(), Json::String(tract.name.clone()));
            properties.insert("borough".into(), Json::String(tract.borough.clone()));
            properties.insert("coverage".into(), json_f64(round_to(cell.coverage, 4)));
            properties.insert("area_km2".into(), json_f64(round_to(cell.area_km2, 6)));
            properties.insert("station_id".into(), Json::String(station.id.to_string()));
            properties.insert(
                "station_name".into(),
                Json::String(station.name.to_string()),
            );
            properties.insert(
                "scalars".into(),
                Json::Object(
                    cell.scalars
                        .iter()
                        .map(|(k, &v)| (k.clone(), json_f64(v)))
                        .collect(),
                ),
            );
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Polygon(vec![cell.ring()]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Derived-region FeatureCollection (`derived_regions.geojson`): one
/// MultiPolygon of grid cells per region.
pub fn derived_regions_collection(
    regions: &[DerivedRegion],
    cells: &[MicroCell],
    stations: &[Station],
) -> FeatureCollection {
    let features = regions
        .iter()
        .map(|region| {
            let station = &stations[region.station];
            let polygons: Vec<Vec<Vec<Vec<f64>>>> = region
                .cell_indices
                .iter()
                .map(|&index| vec![cells[index].ring()])
                .collect();
            let mut properties = JsonObject::new();
            properties.insert("atlas_id".into(), Json::String(region.id.clone()));
            properties.insert("primary_name".into(), Json::String(region.name.clone()));
            properties.insert("name".into(), Json::String(region.name.clone()));
            properties.insert(
                "aliases".into(),
                Json::Array(region.aliases.iter().cloned().map(Json::String).collect()),
            );
            properties.insert(
                "name_confidence".into(),
                json_f64(round_to(region.name_confidence, 3)),
            );
            properties.insert("borough".into(), Json::String(region.borough.clone()));
            properties.insert(
                "anchor_station".into(),
                Json::String(station.name.to_string()),
            );
            properties.insert("station_id".into(), Json::String(station.id.to_string()));
            properties.insert(
                "anchor_station_lat".into(),
                json_f64(station.coordinate.latitude),
            );
            properties.insert(
                "anchor_station_lon".into(),
                json_f64(station.coordinate.longitude),
            );
            properties.insert(
                "representative_tract_id".into(),
                region
                    .representative_tract
                    .clone()
                    .map(Json::String)
                    .unwrap_or(Json::Null),
            );
            properties.insert(
                "tract_weights".into(),
                Json::Object(
                    region
                        .tract_weights
                        .iter()
                        .map(|(k, &v)| (k.clone(), json_f64(v)))
                        .collect(),
                ),
            );
            properties.insert(
                "scalars".into(),
                Json::Object(
                    region
                        .scalars
                        .iter()
                        .map(|(k, &v)| (k.clone(), json_f64(v)))
                        .collect(),
                ),
            );
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::MultiPolygon(polygons))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn json_f64(value: f64) -> Json {
    serde_json::Number::from_f64(value)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

/// Serializes a document compactly into `<dir>/<name>`.
pub fn write_document<T: Serialize>(dir: &Path, name: &str, value: &T) -> io::Result<()> {
    let path = dir.join(name);
    let file = File::create(&path)?;
    serde_json::to_writer(BufWriter::new(file), value).map_err(io::Error::other)?;
    info!(path = %path.display(), "wrote document");
    Ok(())
}
