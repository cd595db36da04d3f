use std::collections::HashMap;

use crate::micro::{DerivedRegion, Station};
use crate::output::{DerivedGraphNeighborhoodDoc, StopDoc};
use crate::shared::{Coordinate, round_to};

/// Tract-level matrices re-projected onto derived regions.
#[derive(Debug)]
pub struct DerivedProjection {
    pub minutes: Vec<Vec<Option<u32>>>,
    pub first_route: Vec<Vec<Option<usize>>>,
    pub transfer_penalized: Vec<Option<f64>>,
}

/// Projects `minutes[T][T]` onto `minutes'[R][R]` by averaging twice with
/// each region's tract weights: first across origin tracts per destination
/// tract, then across destination tracts. Cells with no defined contributor
/// stay `null`. `first_route'` reads the representative-tract pair, and the
/// transfer-penalized scores are row-weighted averages of the tract scores.
pub fn project(
    regions: &[DerivedRegion],
    tract_ids: &[String],
    minutes: &[Vec<Option<u32>>],
    first_route: &[Vec<Option<usize>>],
    transfer_penalized: &[Option<f64>],
) -> DerivedProjection {
    let tract_index: HashMap<&str, usize> = tract_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut region_weights: Vec<Vec<(usize, f64)>> = Vec::with_capacity(regions.len());
    let mut rep_indices: Vec<Option<usize>> = Vec::with_capacity(regions.len());
    for region in regions {
        let mut weights: Vec<(usize, f64)> = Vec::new();
        let mut total = 0.0;
        for (tract_id, &weight) in &region.tract_weights {
            let Some(&index) = tract_index.get(tract_id.as_str()) else {
                continue;
            };
            weights.push((index, weight));
            total += weight;
        }
        if total > 0.0 {
            for (_, weight) in &mut weights {
                *weight /= total;
            }
        }
        region_weights.push(weights);
        rep_indices.push(
            region
                .representative_tract
                .as_deref()
                .and_then(|id| tract_index.get(id).copied()),
        );
    }

    let tract_count = tract_ids.len();
    let region_count = regions.len();

    // Weighted origin rows, still indexed by destination tract.
    let mut row_avg: Vec<Vec<Option<f64>>> = Vec::with_capacity(region_count);
    for weights in &region_weights {
        let mut row = vec![None; tract_count];
        for (destination, slot) in row.iter_mut().enumerate() {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for &(origin, weight) in weights {
                let Some(m) = minutes.get(origin).and_then(|r| r.get(destination)).copied().flatten()
                else {
                    continue;
                };
                numerator += weight * f64::from(m);
                denominator += weight;
            }
            if denominator > 0.0 {
                *slot = Some(numerator / denominator);
            }
        }
        row_avg.push(row);
    }

    let mut derived_minutes = Vec::with_capacity(region_count);
    for origin in 0..region_count {
        let mut row = Vec::with_capacity(region_count);
        for destination in 0..region_count {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for &(tract, weight) in &region_weights[destination] {
                let Some(m) = row_avg[origin][tract] else {
                    continue;
                };
                numerator += weight * m;
                denominator += weight;
            }
            row.push((denominator > 0.0).then(|| (numerator / denominator).round() as u32));
        }
        derived_minutes.push(row);
    }

    let mut derived_first_route = Vec::with_capacity(region_count);
    for origin in 0..region_count {
        let mut row = Vec::with_capacity(region_count);
        for destination in 0..region_count {
            let value = match (rep_indices[origin], rep_indices[destination]) {
                (Some(rep_o), Some(rep_d)) => first_route
                    .get(rep_o)
                    .and_then(|r| r.get(rep_d))
                    .copied()
                    .flatten(),
                _ => None,
            };
            row.push(value);
        }
        derived_first_route.push(row);
    }

    let derived_tp: Vec<Option<f64>> = region_weights
        .iter()
        .map(|weights| {
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for &(tract, weight) in weights {
                let Some(score) = transfer_penalized.get(tract).copied().flatten() else {
                    continue;
                };
                numerator += weight * score;
                denominator += weight;
            }
            (denominator > 0.0).then(|| round_to(numerator / denominator, 6))
        })
        .collect();

    DerivedProjection {
        minutes: derived_minutes,
        first_route: derived_first_route,
        transfer_penalized: derived_tp,
    }
}

/// Derived-graph neighborhood entries: each region routed through the stop
/// nearest its centroid.
pub fn graph_neighborhoods(
    regions: &[DerivedRegion],
    stations: &[Station],
    stops: &[StopDoc],
) -> Vec<DerivedGraphNeighborhoodDoc> {
    regions
        .iter()
        .map(|region| {
            let centroid = region.centroid;
            let mut nearest: Option<(&StopDoc, f64)> = None;
            for stop in stops {
                let distance = centroid.haversine_km(&Coordinate::new(stop.lat, stop.lon));
                if nearest.is_none_or(|(_, best)| distance < best) {
                    nearest = Some((stop, distance));
                }
            }
            DerivedGraphNeighborhoodDoc {
                id: region.id.clone(),
                name: region.name.clone(),
                borough: region.borough.clone(),
                centroid: [centroid.latitude, centroid.longitude],
                stop_id: nearest.map(|(stop, _)| stop.id.clone()),
                name_confidence: round_to(region.name_confidence, 3),
                aliases: region.aliases.clone(),
                anchor_station: stations[region.station].name.to_string(),
            }
        })
        .collect()
}
