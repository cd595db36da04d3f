use geojson::FeatureCollection;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::regions::{pick_borough, pick_id, pick_name};
use crate::shared::{
    Bounds, Coordinate, cell_area_km2, geometry_bounds, point_in_polygon, polygons_of, slugify,
};

/// A tract participating in the tessellation: a tri-borough input feature
/// with its geometry and bounds.
#[derive(Debug)]
pub struct Tract {
    pub id: String,
    pub name: String,
    pub borough: String,
    pub geometry: geojson::Value,
    pub bounds: Bounds,
}

pub fn is_tri_borough(name: &str) -> bool {
    matches!(
        name.trim().to_lowercase().as_str(),
        "manhattan" | "brooklyn" | "queens"
    )
}

/// Collects the tri-borough tracts from the neighborhoods collection. Ids are
/// recomputed with the same picker the matrix stage used, so both layers
/// agree on tract identity.
pub fn collect_tracts(collection: &FeatureCollection) -> Vec<Tract> {
    let mut tracts = Vec::new();
    for (index, feature) in collection.features.iter().enumerate() {
        let id = pick_id(feature.properties.as_ref(), index);
        let name = match pick_name(feature.properties.as_ref()) {
            name if name.is_empty() => id.clone(),
            name => name,
        };
        let borough = pick_borough(feature.properties.as_ref());
        if !is_tri_borough(&borough) {
            continue;
        }
        let Some(geometry) = feature.geometry.as_ref() else {
            continue;
        };
        let Some(bounds) = geometry_bounds(&geometry.value) else {
            continue;
        };
        tracts.push(Tract {
            id,
            name,
            borough,
            geometry: geometry.value.clone(),
            bounds,
        });
    }
    tracts
}

/// A station anchor: the parent complex when a stop has one, the stop itself
/// otherwise. First occurrence fixes name and position.
#[derive(Debug, Clone)]
pub struct Station {
    pub id: Arc<str>,
    pub name: Arc<str>,
    pub coordinate: Coordinate,
}

/// One grid cell claimed by its dominant tract.
#[derive(Debug)]
pub struct MicroCell {
    pub col: usize,
    pub row: usize,
    pub lon0: f64,
    pub lat0: f64,
    pub lon1: f64,
    pub lat1: f64,
    /// Sampled fraction of the cell inside the claiming tract.
    pub coverage: f64,
    pub tract: usize,
    /// Approximate planar area, already weighted by coverage.
    pub area_km2: f64,
    pub station: usize,
    pub scalars: IndexMap<String, f64>,
}

impl MicroCell {
    pub fn center(&self) -> Coordinate {
        Coordinate::new((self.lat0 + self.lat1) * 0.5, (self.lon0 + self.lon1) * 0.5)
    }

    pub fn micro_id(&self) -> String {
        format!("cell-{}-{}", self.col, self.row)
    }

    pub fn ring(&self) -> Vec<Vec<f64>> {
        vec![
            vec![self.lon0, self.lat0],
            vec![self.lon1, self.lat0],
            vec![self.lon1, self.lat1],
            vec![self.lon0, self.lat1],
            vec![self.lon0, self.lat0],
        ]
    }
}

const SAMPLE_OFFSETS: [f64; 3] = [0.2, 0.5, 0.8];

struct Claim {
    col: usize,
    row: usize,
    lon0: f64,
    lat0: f64,
    lon1: f64,
    lat1: f64,
    coverage: f64,
    tract: usize,
}

/// Tessellates the union of tract bounds into `step`-degree cells and
/// assigns each cell to the tract covering the most of its 3×3 sample grid.
/// Competing claims keep the higher coverage; equal coverage keeps the
/// earlier tract, so cell ownership is reproducible.
pub fn tessellate(tracts: &[Tract], step: f64) -> Vec<CellClaim> {
    let mut global = Bounds::empty();
    for tract in tracts {
        global.union(&tract.bounds);
    }
    let cols = ((global.max_x - global.min_x) / step).ceil() as i64;
    let rows = ((global.max_y - global.min_y) / step).ceil() as i64;

    let mut claims: IndexMap<(usize, usize), Claim> = IndexMap::new();
    for (tract_index, tract) in tracts.iter().enumerate() {
        let polygons = polygons_of(&tract.geometry);
        if polygons.is_empty() {
            continue;
        }
        let col0 = (((tract.bounds.min_x - global.min_x) / step).floor() as i64).max(0);
        let col1 = (((tract.bounds.max_x - global.min_x) / step).floor() as i64).min(cols - 1);
        let row0 = (((tract.bounds.min_y - global.min_y) / step).floor() as i64).max(0);
        let row1 = (((tract.bounds.max_y - global.min_y) / step).floor() as i64).min(rows - 1);

        for col in col0..=col1 {
            for row in row0..=row1 {
                let lon0 = global.min_x + col as f64 * step;
                let lat0 = global.min_y + row as f64 * step;
                let lon1 = lon0 + step;
                let lat1 = lat0 + step;
                let mut inside = 0u32;
                for ox in SAMPLE_OFFSETS {
                    for oy in SAMPLE_OFFSETS {
                        let lon = lon0 + (lon1 - lon0) * ox;
                        let lat = lat0 + (lat1 - lat0) * oy;
                        if polygons
                            .iter()
                            .any(|rings| point_in_polygon(lon, lat, rings))
                        {
                            inside += 1;
                        }
                    }
                }
                let coverage = f64::from(inside) / 9.0;
                if coverage <= 0.0 {
                    continue;
                }
                let key = (col as usize, row as usize);
                let replace = claims
                    .get(&key)
                    .is_none_or(|existing| coverage > existing.coverage);
                if replace {
                    claims.insert(
                        key,
                        Claim {
                            col: key.0,
                            row: key.1,
                            lon0,
                            lat0,
                            lon1,
                            lat1,
                            coverage,
                            tract: tract_index,
                        },
                    );
                }
            }
        }
    }
    info!(cells = claims.len(), "tessellated micro-cells");
    claims.into_values().map(CellClaim).collect()
}

/// Opaque claim produced by [`tessellate`], consumed by [`finalize_cells`].
pub struct CellClaim(Claim);

/// Turns raw claims into finished micro-cells: coverage-weighted areas,
/// nearest-station anchors, and tract scalars apportioned by each cell's
/// share of its tract's covered area.
pub fn finalize_cells(
    claims: Vec<CellClaim>,
    stations: &[Station],
    tracts: &[Tract],
    scalar_maps: &IndexMap<String, HashMap<String, f64>>,
) -> Vec<MicroCell> {
    let mut tract_area: HashMap<usize, f64> = HashMap::new();
    let mut areas = Vec::with_capacity(claims.len());
    for CellClaim(claim) in &claims {
        let area = cell_area_km2(claim.lon0, claim.lat0, claim.lon1, claim.lat1) * claim.coverage;
        *tract_area.entry(claim.tract).or_insert(0.0) += area;
        areas.push(area);
    }

    let mut cells = Vec::with_capacity(claims.len());
    for (CellClaim(claim), area) in claims.into_iter().zip(areas) {
        let center = Coordinate::new(
            (claim.lat0 + claim.lat1) * 0.5,
            (claim.lon0 + claim.lon1) * 0.5,
        );
        let mut nearest: Option<(usize, f64)> = None;
        for (index, station) in stations.iter().enumerate() {
            let distance = center.haversine_km(&station.coordinate);
            if nearest.is_none_or(|(_, best)| distance < best) {
                nearest = Some((index, distance));
            }
        }
        let Some((station, _)) = nearest else {
            continue;
        };

        let tract_id = &tracts[claim.tract].id;
        let covered = tract_area.get(&claim.tract).copied().unwrap_or(0.0);
        let mut scalars = IndexMap::new();
        for (key, map) in scalar_maps {
            if let Some(&value) = map.get(tract_id)
                && covered > 0.0
            {
                scalars.insert(key.clone(), value * (area / covered));
            }
        }

        cells.push(MicroCell {
            col: claim.col,
            row: claim.row,
            lon0: claim.lon0,
            lat0: claim.lat0,
            lon1: claim.lon1,
            lat1: claim.lat1,
            coverage: claim.coverage,
            tract: claim.tract,
            area_km2: area,
            station,
            scalars,
        });
    }
    cells
}

/// Micro-cells coalesced under one station anchor.
#[derive(Debug)]
pub struct DerivedRegion {
    pub id: String,
    pub station: usize,
    pub cell_indices: Vec<usize>,
    pub centroid: Coordinate,
    pub area_km2: f64,
    pub borough: String,
    /// Normalized area share per contributing tract id; sums to one.
    pub tract_weights: IndexMap<String, f64>,
    pub representative_tract: Option<String>,
    pub scalars: IndexMap<String, f64>,
    pub name: String,
    pub aliases: Vec<String>,
    pub name_confidence: f64,
}

/// Groups cells by their anchor station and aggregates region attributes:
/// area-weighted centroid, majority borough, normalized tract weights,
/// summed scalars. Naming happens afterwards.
pub fn coalesce(cells: &[MicroCell], stations: &[Station], tracts: &[Tract]) -> Vec<DerivedRegion> {
    struct Group {
        station: usize,
        cell_indices: Vec<usize>,
        area: f64,
        lon_weighted: f64,
        lat_weighted: f64,
        borough_area: IndexMap<String, f64>,
        tract_area: IndexMap<String, f64>,
        scalars: IndexMap<String, f64>,
    }

    let mut groups: IndexMap<String, Group> = IndexMap::new();
    for (index, cell) in cells.iter().enumerate() {
        let station = &stations[cell.station];
        let region_id = format!("station-{}-{}", slugify(&station.name), station.id);
        let group = groups.entry(region_id).or_insert_with(|| Group {
            station: cell.station,
            cell_indices: Vec::new(),
            area: 0.0,
            lon_weighted: 0.0,
            lat_weighted: 0.0,
            borough_area: IndexMap::new(),
            tract_area: IndexMap::new(),
            scalars: IndexMap::new(),
        });
        let center = cell.center();
        group.cell_indices.push(index);
        group.area += cell.area_km2;
        group.lon_weighted += center.longitude * cell.area_km2;
        group.lat_weighted += center.latitude * cell.area_km2;
        let tract = &tracts[cell.tract];
        *group.borough_area.entry(tract.borough.clone()).or_insert(0.0) += cell.area_km2;
        *group.tract_area.entry(tract.id.clone()).or_insert(0.0) += cell.area_km2;
        for (key, value) in &cell.scalars {
            *group.scalars.entry(key.clone()).or_insert(0.0) += value;
        }
    }

    let mut regions = Vec::with_capacity(groups.len());
    for (id, group) in groups {
        if group.area <= 0.0 {
            continue;
        }
        let centroid = Coordinate::new(
            group.lat_weighted / group.area,
            group.lon_weighted / group.area,
        );
        let borough = argmax_key(&group.borough_area).unwrap_or_default();
        let representative_tract = argmax_key(&group.tract_area);
        let total: f64 = group.tract_area.values().sum();
        let tract_weights = if total > 0.0 {
            group
                .tract_area
                .iter()
                .map(|(k, v)| (k.clone(), v / total))
                .collect()
        } else {
            IndexMap::new()
        };
        regions.push(DerivedRegion {
            id,
            station: group.station,
            cell_indices: group.cell_indices,
            centroid,
            area_km2: group.area,
            borough,
            tract_weights,
            representative_tract,
            scalars: group.scalars,
            name: String::new(),
            aliases: Vec::new(),
            name_confidence: 0.2,
        });
    }
    info!(regions = regions.len(), "coalesced derived regions");
    regions
}

/// First key holding the maximum value, in insertion order.
fn argmax_key(map: &IndexMap<String, f64>) -> Option<String> {
    let mut best: Option<(&String, f64)> = None;
    for (key, &value) in map {
        if best.is_none_or(|(_, b)| value > b) {
            best = Some((key, value));
        }
    }
    best.map(|(key, _)| key.clone())
}
