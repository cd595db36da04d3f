use geojson::FeatureCollection;
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

use crate::naming::normalize_name_tokens;
use crate::regions::pick_id;
use crate::shared::geometry_bounds;

const POPULATION_PROP_KEYS: [&str; 7] = [
    "population",
    "pop",
    "POPULATION",
    "POP",
    "Pop",
    "TotalPop",
    "TOTALPOP",
];
const CSV_ID_KEYS: [&str; 5] = ["atlas_id", "id", "nta", "NTACode", "nta2020"];
const POPULATION_CSV_ID_KEYS: [&str; 4] = ["atlas_id", "id", "nta", "NTACode"];

const DEMOGRAPHICS_FILE: &str = "nta_demographics.csv";
const DEMOGRAPHICS_NAME_COLUMN: &str =
    "Geographic Area - Neighborhood Tabulation Area (NTA)* Name";
const DEMOGRAPHICS_POP_COLUMNS: [&str; 2] =
    ["Total Population 2010 Number", "Total Population 2000 Number"];

/// Numeric parse tolerant of thousands separators.
fn parse_numeric(value: &str) -> Option<f64> {
    let value: f64 = value.trim().replace(',', "").parse().ok()?;
    value.is_finite().then_some(value)
}

fn json_numeric(value: &Json) -> Option<f64> {
    match value {
        Json::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Json::String(s) => parse_numeric(s),
        _ => None,
    }
}

/// Loads a `{atlas_id, <key>}` scalar CSV. A missing file is an empty map;
/// unreadable rows are dropped.
pub fn load_scalar_csv(path: &Path, value_keys: &[&str]) -> HashMap<String, f64> {
    load_csv_map(path, &CSV_ID_KEYS, value_keys)
}

fn load_csv_map(path: &Path, id_keys: &[&str], value_keys: &[&str]) -> HashMap<String, f64> {
    let mut values = HashMap::new();
    let Ok(mut reader) = csv::Reader::from_path(path) else {
        return values;
    };
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(_) => return values,
    };
    let column = |name: &str| headers.iter().position(|h| h == name);
    let id_columns: Vec<usize> = id_keys.iter().filter_map(|k| column(k)).collect();
    let value_columns: Vec<usize> = value_keys.iter().filter_map(|k| column(k)).collect();
    for record in reader.records().flatten() {
        let Some(id) = id_columns
            .iter()
            .filter_map(|&c| record.get(c))
            .map(str::trim)
            .find(|v| !v.is_empty())
        else {
            continue;
        };
        let Some(value) = value_columns
            .iter()
            .filter_map(|&c| record.get(c))
            .find_map(parse_numeric)
        else {
            continue;
        };
        values.insert(id.to_string(), value);
    }
    if !values.is_empty() {
        info!(path = %path.display(), rows = values.len(), "loaded scalar csv");
    }
    values
}

/// Feature area for distribution weighting: a `shape_area` property when
/// present, otherwise the bounding-box area in squared degrees. Only the
/// relative shares matter.
fn feature_area(properties: Option<&geojson::JsonObject>, geometry: Option<&geojson::Geometry>) -> f64 {
    if let Some(value) = properties.and_then(|props| props.get("shape_area"))
        && let Some(area) = json_numeric(value).filter(|v| *v > 0.0)
    {
        return area;
    }
    geometry
        .and_then(|geometry| geometry_bounds(&geometry.value))
        .map(|b| ((b.max_x - b.min_x) * (b.max_y - b.min_y)).abs())
        .unwrap_or(0.0)
}

/// Resolves per-tract population: GeoJSON properties first, then the
/// `scalars_population.csv` override, then a demographics table matched by
/// normalized name tokens (`shared / union` overlap, 0.35 floor) with the
/// matched value distributed across features by area share, and finally a
/// borough-density estimate for whatever remains.
pub fn load_population_map(
    collection: &FeatureCollection,
    scalars_dir: &Path,
) -> HashMap<String, f64> {
    let mut population: HashMap<String, f64> = HashMap::new();

    for (index, feature) in collection.features.iter().enumerate() {
        let id = pick_id(feature.properties.as_ref(), index);
        let Some(props) = feature.properties.as_ref() else {
            continue;
        };
        for key in POPULATION_PROP_KEYS {
            if let Some(value) = props.get(key).and_then(json_numeric) {
                population.insert(id, value);
                break;
            }
        }
    }

    for (id, value) in load_csv_map(
        &scalars_dir.join("scalars_population.csv"),
        &POPULATION_CSV_ID_KEYS,
        &["population", "pop", "value"],
    ) {
        population.insert(id, value);
    }

    let demographics = load_demographics(&scalars_dir.join(DEMOGRAPHICS_FILE));
    if !demographics.is_empty() {
        distribute_by_name(collection, &demographics, &mut population);
        density_fallback(collection, &mut population);
    }

    population
}

struct DemographicsEntry {
    tokens: HashSet<String>,
    population: f64,
}

fn load_demographics(path: &Path) -> Vec<(String, DemographicsEntry)> {
    let mut entries = Vec::new();
    let Ok(mut reader) = csv::Reader::from_path(path) else {
        return entries;
    };
    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(_) => return entries,
    };
    let name_column = headers.iter().position(|h| h == DEMOGRAPHICS_NAME_COLUMN);
    let pop_columns: Vec<usize> = DEMOGRAPHICS_POP_COLUMNS
        .iter()
        .filter_map(|k| headers.iter().position(|h| h == *k))
        .collect();
    let Some(name_column) = name_column else {
        return entries;
    };
    for record in reader.records().flatten() {
        let Some(name) = record.get(name_column).map(str::trim).filter(|n| !n.is_empty())
        else {
            continue;
        };
        let Some(population) = pop_columns
            .iter()
            .filter_map(|&c| record.get(c))
            .find_map(parse_numeric)
        else {
            continue;
        };
        let tokens: HashSet<String> = normalize_name_tokens(name).into_iter().collect();
        if tokens.is_empty() {
            continue;
        }
        entries.push((name.to_string(), DemographicsEntry { tokens, population }));
    }
    entries
}

/// Matches unresolved features against the demographics table by token
/// overlap. Unlike the station-name overlap in naming, this score divides by
/// the token union; the matcher wants whole-name similarity, not part
/// containment.
fn distribute_by_name(
    collection: &FeatureCollection,
    demographics: &[(String, DemographicsEntry)],
    population: &mut HashMap<String, f64>,
) {
    struct Match {
        id: String,
        area: f64,
    }
    let mut groups: HashMap<&str, (f64, Vec<Match>)> = HashMap::new();

    for (index, feature) in collection.features.iter().enumerate() {
        let id = pick_id(feature.properties.as_ref(), index);
        if population.contains_key(&id) {
            continue;
        }
        let name = feature
            .properties
            .as_ref()
            .and_then(|props| {
                ["ntaname", "name", "label", "neighborhood"]
                    .iter()
                    .find_map(|k| props.get(*k))
                    .and_then(|v| v.as_str())
            })
            .unwrap_or("");
        let tokens: HashSet<String> = normalize_name_tokens(name).into_iter().collect();
        if tokens.is_empty() {
            continue;
        }
        let mut best: Option<(&str, f64, f64)> = None;
        for (gname, entry) in demographics {
            let shared = tokens.intersection(&entry.tokens).count();
            if shared == 0 {
                continue;
            }
            let union = tokens.union(&entry.tokens).count();
            let score = shared as f64 / union as f64;
            if best.is_none_or(|(_, _, b)| score > b) {
                best = Some((gname, entry.population, score));
            }
        }
        if let Some((gname, pop_value, score)) = best
            && score >= 0.35
        {
            let area = feature_area(feature.properties.as_ref(), feature.geometry.as_ref());
            let group = groups.entry(gname).or_insert((pop_value, Vec::new()));
            group.1.push(Match { id, area });
            debug!(feature = name, matched = gname, score, "demographics name match");
        }
    }

    for (_, (pop_value, matches)) in groups {
        let total_area: f64 = matches.iter().map(|m| m.area.max(0.0)).sum();
        let count = matches.len().max(1);
        for m in &matches {
            if population.contains_key(&m.id) {
                continue;
            }
            let value = if total_area > 0.0 && m.area > 0.0 {
                pop_value * (m.area / total_area)
            } else {
                pop_value / count as f64
            };
            population.insert(m.id.clone(), value);
        }
    }
}

/// Estimates the remaining features from borough population density, falling
/// back to the overall density when a borough has no resolved area.
fn density_fallback(collection: &FeatureCollection, population: &mut HashMap<String, f64>) {
    let borough_of = |feature: &geojson::Feature| -> String {
        feature
            .properties
            .as_ref()
            .and_then(|props| {
                ["boroname", "borough"]
                    .iter()
                    .find_map(|k| props.get(*k))
                    .and_then(|v| v.as_str())
            })
            .unwrap_or("")
            .to_string()
    };

    let mut borough_totals: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for (index, feature) in collection.features.iter().enumerate() {
        let id = pick_id(feature.properties.as_ref(), index);
        let area = feature_area(feature.properties.as_ref(), feature.geometry.as_ref());
        let Some(&value) = population.get(&id) else {
            continue;
        };
        if area <= 0.0 {
            continue;
        }
        let entry = borough_totals.entry(borough_of(feature)).or_insert((0.0, 0.0));
        entry.0 += value;
        entry.1 += area;
    }

    let overall_pop: f64 = borough_totals.values().map(|(p, _)| p).sum();
    let overall_area: f64 = borough_totals.values().map(|(_, a)| a).sum();
    let overall_density = (overall_area > 0.0).then(|| overall_pop / overall_area);

    for (index, feature) in collection.features.iter().enumerate() {
        let id = pick_id(feature.properties.as_ref(), index);
        if population.contains_key(&id) {
            continue;
        }
        let area = feature_area(feature.properties.as_ref(), feature.geometry.as_ref());
        if area <= 0.0 {
            continue;
        }
        let density = borough_totals
            .get(&borough_of(feature))
            .filter(|(_, a)| *a > 0.0)
            .map(|(p, a)| p / a)
            .or(overall_density);
        if let Some(density) = density.filter(|d| d.is_finite()) {
            population.insert(id, density * area);
        }
    }
}
