use geojson::FeatureCollection;
use indexmap::IndexMap;
use std::collections::HashSet;

use crate::micro::{DerivedRegion, MicroCell, Station, Tract};
use crate::regions::prop_string;
use crate::shared::{compass_label, point_in_geometry};

// Directional qualifiers carry no identity; "North Williamsburg" and
// "Williamsburg" should collide on the same token set.
const DIRECTION_TOKENS: [&str; 10] = [
    "north", "south", "east", "west", "central", "upper", "lower", "mid", "midtown", "downtown",
];

const GAZETTEER_NAME_KEYS: [&str; 5] = ["name", "ntaname", "cdtaname", "neighborhood", "label"];

/// Splits a compound display name (`A-B-C`, `A / B`, `A & B`, `A and B`)
/// into its parts, de-duplicated case-insensitively in order. A name with no
/// separators yields itself.
pub fn split_compound_name(name: &str) -> Vec<String> {
    if name.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut seen = HashSet::new();
    for chunk in name.replace('&', "/").replace(" and ", "/").split('/') {
        for part in chunk.split('-') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let key = part.to_lowercase();
            if seen.insert(key) {
                parts.push(part.to_string());
            }
        }
    }
    if parts.is_empty() {
        parts.push(name.to_string());
    }
    parts
}

/// Normalizes a name for token overlap: lowercase, parenthesized content
/// stripped, `st`/`ft` expanded, directional qualifiers removed, split on
/// non-alphanumerics.
pub fn normalize_name_tokens(name: &str) -> Vec<String> {
    if name.is_empty() {
        return Vec::new();
    }
    let lowered = name.to_lowercase().replace('&', " and ");
    let mut cleaned = String::with_capacity(lowered.len());
    let mut in_parens = false;
    for ch in lowered.chars() {
        match ch {
            '(' => in_parens = true,
            ')' => {
                in_parens = false;
                cleaned.push(' ');
            }
            _ if in_parens => {}
            _ if ch.is_ascii_alphanumeric() => cleaned.push(ch),
            _ => cleaned.push(' '),
        }
    }
    cleaned
        .split_whitespace()
        .map(|token| match token {
            "st" => "saint",
            "ft" => "fort",
            other => other,
        })
        .filter(|token| !DIRECTION_TOKENS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Optional overlay of authoritative named polygons.
#[derive(Debug, Default)]
pub struct Gazetteer {
    entries: Vec<(String, geojson::Value)>,
}

impl Gazetteer {
    pub fn from_collection(collection: &FeatureCollection) -> Self {
        let mut entries = Vec::new();
        for feature in &collection.features {
            let Some(name) = prop_string(feature.properties.as_ref(), &GAZETTEER_NAME_KEYS) else {
                continue;
            };
            let Some(geometry) = feature.geometry.as_ref() else {
                continue;
            };
            entries.push((name, geometry.value.clone()));
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry containing the point, in file order.
    pub fn name_for_point(&self, lon: f64, lat: f64) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, geometry)| point_in_geometry(lon, lat, geometry))
            .map(|(name, _)| name.as_str())
    }
}

/// Accumulates covered area per gazetteer name over a region's cells.
fn region_name_areas(
    region: &DerivedRegion,
    cells: &[MicroCell],
    gazetteer: &Gazetteer,
) -> IndexMap<String, f64> {
    let mut areas: IndexMap<String, f64> = IndexMap::new();
    for &cell_index in &region.cell_indices {
        let cell = &cells[cell_index];
        let center = cell.center();
        if let Some(name) = gazetteer.name_for_point(center.longitude, center.latitude) {
            *areas.entry(name.to_string()).or_insert(0.0) += cell.area_km2;
        }
    }
    areas
}

/// Chooses each region's primary name.
///
/// Phase 1 overlays the gazetteer: a dominant name wins outright at half the
/// area; a compound name yields the part aligned with the station when their
/// token overlap (`shared / part`) reaches 0.5; two names above a quarter
/// each combine as `A / B`. Phase 2 falls back to a part of the dominant
/// tract's compound name that appears in the station name. Phase 3 anchors
/// on the station itself with the floor confidence, so a primary name always
/// exists.
pub fn assign_names(
    regions: &mut [DerivedRegion],
    cells: &[MicroCell],
    tracts: &[Tract],
    stations: &[Station],
    gazetteer: Option<&Gazetteer>,
) {
    for region in regions.iter_mut() {
        let station_name = stations[region.station].name.to_string();
        let first_cell = &cells[region.cell_indices[0]];
        let tract_name = tracts[first_cell.tract].name.clone();

        let mut primary: Option<String> = None;
        let mut confidence = 0.2;
        let mut aliases: Vec<String> = Vec::new();

        if let Some(gazetteer) = gazetteer {
            let areas = region_name_areas(region, cells, gazetteer);
            if !areas.is_empty() {
                let total: f64 = areas.values().sum();
                let mut ranked: Vec<(&String, f64)> =
                    areas.iter().map(|(name, &area)| (name, area)).collect();
                ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                let (top_name, top_area) = (ranked[0].0.clone(), ranked[0].1);
                let top_frac = if total > 0.0 { top_area / total } else { 0.0 };

                // A compound gazetteer name like "A-B-C" whose part matches
                // the station keeps the finer-grained part.
                let parts = split_compound_name(&top_name);
                let station_tokens: HashSet<String> =
                    normalize_name_tokens(&station_name).into_iter().collect();
                if parts.len() > 1 && !station_tokens.is_empty() {
                    let mut best: Option<(&String, f64)> = None;
                    for part in &parts {
                        let part_tokens: HashSet<String> =
                            normalize_name_tokens(part).into_iter().collect();
                        if part_tokens.is_empty() {
                            continue;
                        }
                        let shared = part_tokens.intersection(&station_tokens).count();
                        if shared == 0 {
                            continue;
                        }
                        let score = shared as f64 / part_tokens.len() as f64;
                        if best.is_none_or(|(_, b)| score > b) {
                            best = Some((part, score));
                        }
                    }
                    if let Some((part, score)) = best
                        && score >= 0.5
                    {
                        primary = Some(part.clone());
                        confidence = top_frac.max(0.35);
                        aliases = std::iter::once(top_name.clone())
                            .chain(
                                ranked
                                    .iter()
                                    .skip(1)
                                    .take(3)
                                    .map(|(name, _)| (*name).clone())
                                    .filter(|name| *name != top_name),
                            )
                            .collect();
                    }
                }
                if primary.is_none() && top_frac >= 0.5 {
                    primary = Some(top_name.clone());
                    confidence = top_frac;
                    aliases = ranked
                        .iter()
                        .skip(1)
                        .take(3)
                        .map(|(name, _)| (*name).clone())
                        .collect();
                } else if primary.is_none()
                    && ranked.len() > 1
                    && top_frac >= 0.25
                    && total > 0.0
                    && ranked[1].1 / total >= 0.25
                {
                    primary = Some(format!("{top_name} / {}", ranked[1].0));
                    confidence = top_frac;
                    aliases = ranked
                        .iter()
                        .skip(2)
                        .take(2)
                        .map(|(name, _)| (*name).clone())
                        .collect();
                }
            }
        }

        let primary = primary.unwrap_or_else(|| {
            // A part of the dominant tract's compound name that appears in
            // the station name beats the bare anchor fallback.
            let matched = split_compound_name(&tract_name)
                .into_iter()
                .find(|part| station_name.to_lowercase().contains(&part.to_lowercase()));
            match matched {
                Some(part) => {
                    confidence = 0.35;
                    aliases = vec![tract_name.clone()];
                    part
                }
                None => {
                    confidence = 0.2;
                    aliases = vec![station_name.clone(), tract_name.clone()];
                    format!("{station_name} area")
                }
            }
        });

        region.name = primary;
        region.name_confidence = confidence;
        region.aliases = aliases;
    }
}

fn normalized_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn push_alias(region: &mut DerivedRegion, alias: &str) {
    if alias.is_empty() {
        return;
    }
    let mut aliases = vec![alias.to_string()];
    aliases.extend(
        region
            .aliases
            .drain(..)
            .filter(|a| !a.is_empty() && a != alias),
    );
    region.aliases = aliases;
}

fn duplicate_keys(regions: &[DerivedRegion]) -> IndexMap<String, usize> {
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for region in regions {
        let key = normalized_key(&region.name);
        if !key.is_empty() {
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

/// Makes region names pairwise distinct in three passes, each touching only
/// the names still colliding: append the anchor station, then an 8-way
/// compass direction from the station toward the region centroid, then an
/// ordinal in stable id order. Each pass pushes the prior name to aliases.
pub fn dedup_names(regions: &mut [DerivedRegion], stations: &[Station]) {
    let counts = duplicate_keys(regions);
    for region in regions.iter_mut() {
        let key = normalized_key(&region.name);
        if key.is_empty() || counts.get(&key).copied().unwrap_or(0) <= 1 {
            continue;
        }
        let station_name = stations[region.station].name.to_string();
        if station_name.is_empty() {
            continue;
        }
        let old = region.name.clone();
        region.name = format!("{old} · {station_name}");
        push_alias(region, &old);
    }

    let counts = duplicate_keys(regions);
    for region in regions.iter_mut() {
        let key = normalized_key(&region.name);
        if key.is_empty() || counts.get(&key).copied().unwrap_or(0) <= 1 {
            continue;
        }
        let station = &stations[region.station];
        let Some(direction) = compass_label(
            region.centroid.latitude,
            region.centroid.longitude,
            station.coordinate.latitude,
            station.coordinate.longitude,
        ) else {
            continue;
        };
        let old = region.name.clone();
        region.name = format!("{old} · {direction}");
        push_alias(region, &old);
    }

    let counts = duplicate_keys(regions);
    let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (index, region) in regions.iter().enumerate() {
        let key = normalized_key(&region.name);
        if !key.is_empty() && counts.get(&key).copied().unwrap_or(0) > 1 {
            groups.entry(key).or_default().push(index);
        }
    }
    for (_, mut members) in groups {
        members.sort_by(|&a, &b| regions[a].id.cmp(&regions[b].id));
        for (ordinal, &index) in members.iter().enumerate() {
            let region = &mut regions[index];
            let old = region.name.clone();
            region.name = format!("{old} · {}", ordinal + 1);
            push_alias(region, &old);
        }
    }
}
