use geojson::{FeatureCollection, GeoJson, JsonObject};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AtlasConfig;
use crate::corridors::{self, CorridorNode};
use crate::derived;
use crate::feed::{self, Feed};
use crate::graph::{RouteCatalog, Stop, StopCatalog, StopGraph};
use crate::matrix::{self, RouteTable, round_minutes};
use crate::micro::{self, Station};
use crate::naming::{self, Gazetteer};
use crate::output::{
    self, CentralityDoc, CorridorsDoc, GraphDoc, GraphNeighborhoodDoc, MatrixDoc, MetricDoc,
    MetricsDoc, NeighborhoodDoc, RegionDoc, RouteDoc, StopDoc, WindowCorridors, WindowMeta,
};
use crate::regions::{self, Neighborhood};
use crate::scalars;
use crate::segments::{SegmentAggregator, WindowSegments};
use crate::service::{ServiceSets, TripFilter};
use crate::shared::Profile;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Feed(#[from] feed::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("neighborhoods GeoJSON has no features")]
    EmptyFeatures,
    #[error(transparent)]
    Region(#[from] regions::Error),
    #[error("no stations found for derived regions")]
    NoStations,
    #[error("no tri-borough tracts found")]
    NoTracts,
    #[error("no micro-units created")]
    NoMicroUnits,
}

impl Error {
    /// Process exit code for front-ends: `2` for missing inputs, empty
    /// feature sets and unmatched neighborhoods, `1` for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Feed(feed::Error::MissingTable(_))
            | Error::EmptyFeatures
            | Error::Region(_)
            | Error::NoStations
            | Error::NoTracts
            | Error::NoMicroUnits => 2,
            Error::Io(err) if err.kind() == std::io::ErrorKind::NotFound => 2,
            _ => 1,
        }
    }
}

/// Summary of one batch run.
#[derive(Debug)]
pub struct RunReport {
    pub windows_built: Vec<&'static str>,
    pub neighborhoods: usize,
    pub micro_cells: usize,
    pub derived_regions: usize,
}

/// Per-window artifacts the derived stage re-projects.
struct WindowArtifacts {
    profile: Profile,
    graph_doc: GraphDoc<GraphNeighborhoodDoc>,
    matrix_doc: MatrixDoc<NeighborhoodDoc>,
}

/// Runs the whole batch: feed aggregation, per-window graphs and matrices,
/// corridor reports, the micro-unit tessellation with derived regions and
/// naming, and the derived re-projections. Every document from the external
/// contract is written under `config.out_dir`.
pub fn run(config: &AtlasConfig) -> Result<RunReport, Error> {
    let feed = Feed::open(&config.feed_path)?;
    run_with_feed(config, feed)
}

/// Same as [`run`] but over an already-opened archive, so callers (and
/// tests) can feed in-memory zips.
pub fn run_with_feed<R: Read + Seek>(
    config: &AtlasConfig,
    mut feed: Feed<R>,
) -> Result<RunReport, Error> {
    fs::create_dir_all(&config.out_dir)?;
    let generated_at = output::generated_at();

    let (mut collection, neighborhoods, artifacts) =
        build_matrix_stage(config, &mut feed, &generated_at)?;
    let (micro_cells, derived_regions) =
        build_derived_stage(config, &generated_at, &mut collection, &artifacts)?;

    Ok(RunReport {
        windows_built: artifacts.iter().map(|a| a.profile.id()).collect(),
        neighborhoods: neighborhoods.len(),
        micro_cells,
        derived_regions,
    })
}

fn load_feature_collection(path: &Path) -> Result<FeatureCollection, Error> {
    let raw = fs::read_to_string(path)?;
    let geojson: GeoJson = raw.parse()?;
    Ok(FeatureCollection::try_from(geojson)?)
}

fn build_matrix_stage<R: Read + Seek>(
    config: &AtlasConfig,
    feed: &mut Feed<R>,
    generated_at: &str,
) -> Result<(FeatureCollection, Vec<Neighborhood>, Vec<WindowArtifacts>), Error> {
    feed.require_tables()?;

    let mut stop_catalog = StopCatalog::default();
    feed.stream_stops(|row| stop_catalog.observe(&row))?;
    info!(stops = stop_catalog.len(), "loaded stops");

    let mut route_catalog = RouteCatalog::default();
    feed.stream_routes(|row| route_catalog.observe(&row))?;

    let mut service_sets = ServiceSets::default();
    feed.stream_calendar(|row| service_sets.observe(&row))?;

    let mut trip_filter = TripFilter::new(&service_sets);
    let mut trip_routes: HashMap<Arc<str>, Arc<str>> = HashMap::new();
    feed.stream_trips(|row| {
        let Some(trip_id) = row.trip_id.as_deref().filter(|t| !t.is_empty()) else {
            return;
        };
        let trip_id: Arc<str> = Arc::from(trip_id);
        trip_filter.observe(&trip_id, row.service_id.as_deref(), &service_sets);
        if let Some(route_id) = row.route_id.as_deref().filter(|r| !r.is_empty()) {
            trip_routes.insert(trip_id, Arc::from(route_id));
        }
    })?;

    let known_stops = stop_catalog.id_set();
    let mut aggregator =
        SegmentAggregator::new(&config.profiles, &trip_filter, &known_stops, &trip_routes);
    feed.stream_stop_times(|row| aggregator.observe(&row))?;
    let (mut windows, active_stops) = aggregator.finish();

    let mut collection = load_feature_collection(&config.neighborhoods_path)?;
    if collection.features.is_empty() {
        return Err(Error::EmptyFeatures);
    }

    // Representative stops come from the active network when there is one.
    // With activity the candidates are sorted by id; without, feed order.
    let match_stops: Vec<&Stop> = if active_stops.is_empty() {
        stop_catalog.iter().collect()
    } else {
        let mut ids: Vec<&Arc<str>> = active_stops.iter().collect();
        ids.sort_unstable();
        ids.iter().filter_map(|id| stop_catalog.get(id.as_ref())).collect()
    };

    let neighborhoods = regions::extract(&mut collection, &match_stops)?;
    info!(neighborhoods = neighborhoods.len(), "matched neighborhoods");
    output::write_document(&config.out_dir, "neighborhoods.geojson", &collection)?;

    // The graph document's stop table is always sorted by id.
    let graph_stops: Vec<&Stop> = if active_stops.is_empty() {
        let mut stops: Vec<&Stop> = stop_catalog.iter().collect();
        stops.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        stops
    } else {
        let mut ids: Vec<&Arc<str>> = active_stops.iter().collect();
        ids.sort_unstable();
        ids.iter().filter_map(|id| stop_catalog.get(id.as_ref())).collect()
    };

    let transfer_seconds = config.transfer_seconds();
    let penalty_seconds = config.transfer_penalty_seconds();

    let mut artifacts = Vec::with_capacity(config.profiles.len());
    let mut teleport_windows: IndexMap<String, WindowCorridors> = IndexMap::new();

    for &profile in &config.profiles {
        let segments = windows.remove(&profile).unwrap_or_default();
        let graph = StopGraph::build(&stop_catalog, &segments, transfer_seconds);
        let route_table = RouteTable::from_segments(&segments);
        let route_docs: Vec<RouteDoc> = route_table
            .ids()
            .iter()
            .map(|id| {
                let meta = route_catalog.get(id);
                RouteDoc {
                    id: id.to_string(),
                    short_name: meta
                        .map(|m| m.short_name.clone())
                        .unwrap_or_else(|| id.to_string()),
                    color: meta.and_then(|m| m.color.clone()),
                    text_color: meta.and_then(|m| m.text_color.clone()),
                }
            })
            .collect();

        let rep_stops: Vec<usize> = neighborhoods
            .iter()
            .map(|n| {
                graph
                    .index_of(&n.stop_id)
                    .expect("representative stop is a catalog stop")
            })
            .collect();

        let travel = matrix::build_matrix(&graph, &rep_stops, &route_table);
        let harmonic: Vec<f64> = travel.minutes.iter().map(|r| matrix::harmonic_row(r)).collect();
        let median: Vec<Option<f64>> = travel
            .minutes
            .iter()
            .map(|r| matrix::median_minutes_row(r))
            .collect();
        let penalized = matrix::penalized_harmonic(
            &stop_catalog,
            &segments,
            transfer_seconds + penalty_seconds,
            &rep_stops,
        );

        let graph_doc = build_graph_doc(
            generated_at,
            profile,
            &graph_stops,
            &segments,
            &stop_catalog,
            transfer_seconds,
            &route_table,
            &route_docs,
            &neighborhoods,
        );
        output::write_document(
            &config.out_dir,
            &format!("graph_{}.json", profile.id()),
            &graph_doc,
        )?;

        let matrix_doc = MatrixDoc {
            generated_at: generated_at.to_string(),
            window: WindowMeta::from(profile),
            neighborhoods: neighborhoods
                .iter()
                .map(|n| NeighborhoodDoc {
                    id: n.id.clone(),
                    name: n.name.clone(),
                    borough: n.borough.clone(),
                    centroid: [n.centroid.latitude, n.centroid.longitude],
                    stop_id: n.stop_id.to_string(),
                })
                .collect(),
            routes: route_docs.clone(),
            minutes: travel.minutes,
            first_route: travel.first_route,
            centrality: CentralityDoc::new(MetricsDoc {
                harmonic: MetricDoc::harmonic(&harmonic),
                median_minutes: MetricDoc::median_minutes(&median),
                transfer_penalized: MetricDoc::transfer_penalized(
                    config.transfer_penalty_minutes,
                    penalized.into_iter().map(Some).collect(),
                ),
            }),
        };
        output::write_document(
            &config.out_dir,
            &format!("matrix_{}.json", profile.id()),
            &matrix_doc,
        )?;

        let nodes: Vec<CorridorNode> = neighborhoods
            .iter()
            .map(|n| CorridorNode {
                id: n.id.clone(),
                name: n.name.clone(),
                borough: n.borough.clone(),
                centroid: Some(n.centroid),
            })
            .collect();
        let route_short: Vec<String> = route_docs.iter().map(|r| r.short_name.clone()).collect();
        let report = corridors::compute(
            config,
            &nodes,
            &matrix_doc.minutes,
            &matrix_doc.first_route,
            &route_short,
        );
        teleport_windows.insert(
            profile.id().to_string(),
            WindowCorridors {
                window: WindowMeta::from(profile),
                report,
            },
        );

        artifacts.push(WindowArtifacts {
            profile,
            graph_doc,
            matrix_doc,
        });
    }

    output::write_document(
        &config.out_dir,
        "teleport_corridors.json",
        &CorridorsDoc {
            generated_at: generated_at.to_string(),
            windows: teleport_windows,
        },
    )?;

    Ok((collection, neighborhoods, artifacts))
}

#[allow(clippy::too_many_arguments)]
fn build_graph_doc(
    generated_at: &str,
    profile: Profile,
    graph_stops: &[&Stop],
    segments: &WindowSegments,
    catalog: &StopCatalog,
    transfer_seconds: u32,
    route_table: &RouteTable,
    route_docs: &[RouteDoc],
    neighborhoods: &[Neighborhood],
) -> GraphDoc<GraphNeighborhoodDoc> {
    let stop_index: HashMap<&str, usize> = graph_stops
        .iter()
        .enumerate()
        .map(|(i, stop)| (stop.id.as_ref(), i))
        .collect();

    let mut edges: Vec<(usize, usize, u32, Option<usize>)> = Vec::new();
    for ((from, to), &seconds) in &segments.weights {
        let (Some(&u), Some(&v)) = (stop_index.get(from.as_ref()), stop_index.get(to.as_ref()))
        else {
            continue;
        };
        let route = segments
            .routes
            .get(&(from.clone(), to.clone()))
            .cloned()
            .flatten()
            .and_then(|route| route_table.index_of(&route));
        edges.push((u, v, round_minutes(seconds), route));
    }
    if transfer_seconds > 0 {
        let transfer_minutes = round_minutes(transfer_seconds);
        for children in catalog.complexes().values() {
            if children.len() < 2 {
                continue;
            }
            let present: Vec<usize> = children
                .iter()
                .filter_map(|id| stop_index.get(id.as_ref()).copied())
                .collect();
            for &u in &present {
                for &v in &present {
                    if u != v {
                        edges.push((u, v, transfer_minutes, None));
                    }
                }
            }
        }
    }

    GraphDoc {
        generated_at: generated_at.to_string(),
        window: WindowMeta::from(profile),
        stops: graph_stops
            .iter()
            .map(|stop| StopDoc {
                id: stop.id.to_string(),
                name: stop.name.to_string(),
                lat: stop.coordinate.latitude,
                lon: stop.coordinate.longitude,
                parent_station: stop.parent.as_ref().map(|p| p.to_string()),
            })
            .collect(),
        routes: route_docs.to_vec(),
        edges,
        neighborhoods: neighborhoods
            .iter()
            .map(|n| GraphNeighborhoodDoc {
                id: n.id.clone(),
                name: n.name.clone(),
                borough: n.borough.clone(),
                centroid: [n.centroid.latitude, n.centroid.longitude],
                stop_id: n.stop_id.to_string(),
                stop_index: stop_index.get(n.stop_id.as_ref()).copied(),
            })
            .collect(),
    }
}

fn build_derived_stage(
    config: &AtlasConfig,
    generated_at: &str,
    collection: &mut FeatureCollection,
    artifacts: &[WindowArtifacts],
) -> Result<(usize, usize), Error> {
    let tracts = micro::collect_tracts(collection);
    if tracts.is_empty() {
        return Err(Error::NoTracts);
    }

    let Some(first) = artifacts.first() else {
        return Err(Error::NoStations);
    };
    let stations = stations_from_docs(&first.graph_doc.stops);
    if stations.is_empty() {
        return Err(Error::NoStations);
    }

    let claims = micro::tessellate(&tracts, config.grid_step);
    if claims.is_empty() {
        return Err(Error::NoMicroUnits);
    }

    let scalars_dir = config
        .scalars_dir
        .clone()
        .or_else(|| {
            config
                .neighborhoods_path
                .parent()
                .map(Path::to_path_buf)
        })
        .unwrap_or_default();

    let mut scalar_maps: IndexMap<String, HashMap<String, f64>> = IndexMap::new();
    scalar_maps.insert(
        "population".to_string(),
        scalars::load_population_map(collection, &scalars_dir),
    );
    let housing = scalars::load_scalar_csv(
        &scalars_dir.join("scalars_housing_units.csv"),
        &["housing_units", "value"],
    );
    if !housing.is_empty() {
        scalar_maps.insert("housing_units".to_string(), housing);
    }
    let jobs = scalars::load_scalar_csv(&scalars_dir.join("scalars_jobs.csv"), &["jobs", "value"]);
    if !jobs.is_empty() {
        scalar_maps.insert("jobs".to_string(), jobs);
    }

    stamp_scalars(collection, &scalar_maps);
    output::write_document(&config.out_dir, "neighborhoods.geojson", collection)?;

    let cells = micro::finalize_cells(claims, &stations, &tracts, &scalar_maps);
    let mut derived_regions = micro::coalesce(&cells, &stations, &tracts);

    let gazetteer = load_gazetteer(config);
    naming::assign_names(
        &mut derived_regions,
        &cells,
        &tracts,
        &stations,
        gazetteer.as_ref(),
    );
    naming::dedup_names(&mut derived_regions, &stations);

    output::write_document(
        &config.out_dir,
        "micro_units.geojson",
        &output::micro_units_collection(&cells, &tracts, &stations),
    )?;
    output::write_document(
        &config.out_dir,
        "derived_regions.geojson",
        &output::derived_regions_collection(&derived_regions, &cells, &stations),
    )?;

    let mut teleport_windows: IndexMap<String, WindowCorridors> = IndexMap::new();
    for artifact in artifacts {
        let matrix_doc = &artifact.matrix_doc;
        let tract_ids: Vec<String> = matrix_doc
            .neighborhoods
            .iter()
            .map(|n| n.id.clone())
            .collect();
        let projection = derived::project(
            &derived_regions,
            &tract_ids,
            &matrix_doc.minutes,
            &matrix_doc.first_route,
            &matrix_doc.centrality.metrics.transfer_penalized.scores,
        );

        let region_docs: Vec<RegionDoc> = derived_regions
            .iter()
            .map(|region| RegionDoc::new(region, &stations))
            .collect();
        let harmonic: Vec<f64> = projection
            .minutes
            .iter()
            .map(|r| matrix::harmonic_row(r))
            .collect();
        let median: Vec<Option<f64>> = projection
            .minutes
            .iter()
            .map(|r| matrix::median_minutes_row(r))
            .collect();

        let derived_matrix_doc = MatrixDoc {
            generated_at: matrix_doc.generated_at.clone(),
            window: matrix_doc.window.clone(),
            neighborhoods: region_docs.clone(),
            routes: matrix_doc.routes.clone(),
            minutes: projection.minutes,
            first_route: projection.first_route,
            centrality: CentralityDoc::new(MetricsDoc {
                harmonic: MetricDoc::harmonic(&harmonic),
                median_minutes: MetricDoc::median_minutes(&median),
                transfer_penalized: MetricDoc::transfer_penalized(
                    config.transfer_penalty_minutes,
                    projection.transfer_penalized,
                ),
            }),
        };
        output::write_document(
            &config.out_dir,
            &format!("matrix_{}_derived.json", artifact.profile.id()),
            &derived_matrix_doc,
        )?;

        let derived_graph_doc = GraphDoc {
            generated_at: artifact.graph_doc.generated_at.clone(),
            window: artifact.graph_doc.window.clone(),
            stops: artifact.graph_doc.stops.clone(),
            routes: artifact.graph_doc.routes.clone(),
            edges: artifact.graph_doc.edges.clone(),
            neighborhoods: derived::graph_neighborhoods(
                &derived_regions,
                &stations,
                &artifact.graph_doc.stops,
            ),
        };
        output::write_document(
            &config.out_dir,
            &format!("graph_{}_derived.json", artifact.profile.id()),
            &derived_graph_doc,
        )?;

        let nodes: Vec<CorridorNode> = region_docs
            .iter()
            .map(|doc| CorridorNode {
                id: doc.id.clone(),
                name: doc.name.clone(),
                borough: doc.borough.clone(),
                centroid: Some(crate::shared::Coordinate::new(
                    doc.centroid[0],
                    doc.centroid[1],
                )),
            })
            .collect();
        let route_short: Vec<String> = derived_matrix_doc
            .routes
            .iter()
            .map(|r| r.short_name.clone())
            .collect();
        let report = corridors::compute(
            config,
            &nodes,
            &derived_matrix_doc.minutes,
            &derived_matrix_doc.first_route,
            &route_short,
        );
        teleport_windows.insert(
            artifact.profile.id().to_string(),
            WindowCorridors {
                window: matrix_doc.window.clone(),
                report,
            },
        );
    }

    if !teleport_windows.is_empty() {
        output::write_document(
            &config.out_dir,
            "teleport_corridors_derived.json",
            &CorridorsDoc {
                generated_at: generated_at.to_string(),
                windows: teleport_windows,
            },
        )?;
    }

    Ok((cells.len(), derived_regions.len()))
}

/// Station anchors from a graph document's stop table: the parent complex
/// when present, the stop itself otherwise; first occurrence wins.
fn stations_from_docs(stops: &[StopDoc]) -> Vec<Station> {
    let mut stations = Vec::new();
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    for stop in stops {
        let id = stop.parent_station.clone().unwrap_or_else(|| stop.id.clone());
        if !seen.insert(id.clone()) {
            continue;
        }
        stations.push(Station {
            id: Arc::from(id.as_str()),
            name: Arc::from(stop.name.as_str()),
            coordinate: crate::shared::Coordinate::new(stop.lat, stop.lon),
        });
    }
    stations
}

/// Writes resolved scalars into each feature's `scalars` property, keyed by
/// the feature's atlas id.
fn stamp_scalars(
    collection: &mut FeatureCollection,
    scalar_maps: &IndexMap<String, HashMap<String, f64>>,
) {
    for (index, feature) in collection.features.iter_mut().enumerate() {
        let id = match feature
            .properties
            .as_ref()
            .and_then(|props| props.get("atlas_id"))
            .and_then(|v| v.as_str())
        {
            Some(id) => id.to_string(),
            None => regions::pick_id(feature.properties.as_ref(), index),
        };
        let mut scalars = feature
            .properties
            .as_ref()
            .and_then(|props| props.get("scalars"))
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        for (key, map) in scalar_maps {
            if let Some(&value) = map.get(&id)
                && let Some(number) = serde_json::Number::from_f64(value)
            {
                scalars.insert(key.clone(), Json::Number(number));
            }
        }
        if !scalars.is_empty() {
            feature
                .properties
                .get_or_insert_with(JsonObject::new)
                .insert("scalars".to_string(), Json::Object(scalars));
        }
    }
}

fn load_gazetteer(config: &AtlasConfig) -> Option<Gazetteer> {
    let path: PathBuf = match &config.gazetteer_path {
        Some(path) => path.clone(),
        None => config
            .neighborhoods_path
            .parent()?
            .join("neighborhoods_gazetteer.geojson"),
    };
    if !path.exists() {
        info!("no gazetteer at {}; derived names fall back to stations", path.display());
        return None;
    }
    match load_feature_collection(&path) {
        Ok(collection) => {
            let gazetteer = Gazetteer::from_collection(&collection);
            (!gazetteer.is_empty()).then_some(gazetteer)
        }
        Err(err) => {
            warn!("ignoring unreadable gazetteer {}: {err}", path.display());
            None
        }
    }
}
