use geojson::{FeatureCollection, JsonObject};
use serde_json::Value as Json;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::graph::Stop;
use crate::shared::{Coordinate, geometry_centroid, slugify};

// Property keys recognized across the common neighborhood datasets, in
// preference order.
pub const ID_KEYS: [&str; 6] = ["NTACode", "nta_code", "nta", "id", "GEOID", "geoid"];
pub const NAME_KEYS: [&str; 5] = ["NTAName", "nta_name", "name", "neighborhood", "ntaname"];
pub const BOROUGH_KEYS: [&str; 5] = ["boroname", "BoroName", "boro_name", "borough", "Borough"];

#[derive(Error, Debug)]
pub enum Error {
    #[error("neighborhood {0:?} could not be matched to a stop")]
    Unmatched(String),
}

/// An input polygon attached to the network through its representative stop.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    pub id: String,
    pub name: String,
    pub borough: String,
    pub centroid: Coordinate,
    pub stop_id: Arc<str>,
}

/// First non-empty property among `keys`, stringified. Empty strings, zero
/// and `null` all count as absent.
pub fn prop_string(properties: Option<&JsonObject>, keys: &[&str]) -> Option<String> {
    let properties = properties?;
    for key in keys {
        match properties.get(*key) {
            Some(Json::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Json::Number(n)) if n.as_f64() != Some(0.0) => return Some(n.to_string()),
            Some(Json::Bool(true)) => return Some("true".to_string()),
            _ => {}
        }
    }
    None
}

/// Stable identifier for a feature: a recognized id property, otherwise a
/// slug of the name suffixed with the 1-based feature ordinal.
pub fn pick_id(properties: Option<&JsonObject>, index: usize) -> String {
    if let Some(id) = prop_string(properties, &ID_KEYS) {
        return id;
    }
    let name = prop_string(properties, &["NTAName", "nta_name", "name"])
        .unwrap_or_else(|| format!("Neighborhood {}", index + 1));
    format!("{}-{}", slugify(&name), index + 1)
}

pub fn pick_name(properties: Option<&JsonObject>) -> String {
    prop_string(properties, &NAME_KEYS).unwrap_or_default()
}

pub fn pick_borough(properties: Option<&JsonObject>) -> String {
    prop_string(properties, &BOROUGH_KEYS).unwrap_or_default()
}

/// Builds the neighborhood list and stamps each feature's chosen id back
/// into its properties as `atlas_id`, so the published GeoJSON and every
/// matrix row agree on identity.
///
/// Features without usable geometry are skipped (they keep their ordinal for
/// id purposes but receive no stamp). Id collisions get a `-<idx>` suffix.
pub fn extract(
    collection: &mut FeatureCollection,
    stop_list: &[&Stop],
) -> Result<Vec<Neighborhood>, Error> {
    let mut neighborhoods = Vec::with_capacity(collection.features.len());
    let mut seen_ids = std::collections::HashSet::new();

    for (index, feature) in collection.features.iter_mut().enumerate() {
        let mut id = pick_id(feature.properties.as_ref(), index);
        if seen_ids.contains(&id) {
            id = format!("{}-{}", id, index + 1);
        }
        seen_ids.insert(id.clone());

        let Some(centroid) = feature
            .geometry
            .as_ref()
            .and_then(|geometry| geometry_centroid(&geometry.value))
        else {
            debug!(index, "skipped feature without usable geometry");
            continue;
        };

        let mut nearest: Option<(&Stop, f64)> = None;
        for stop in stop_list {
            let distance = centroid.haversine_m(&stop.coordinate);
            if nearest.is_none_or(|(_, best)| distance < best) {
                nearest = Some((stop, distance));
            }
        }

        let name = match pick_name(feature.properties.as_ref()) {
            name if name.is_empty() => id.clone(),
            name => name,
        };
        let borough = pick_borough(feature.properties.as_ref());

        let Some((stop, _)) = nearest else {
            return Err(Error::Unmatched(name));
        };

        feature
            .properties
            .get_or_insert_with(JsonObject::new)
            .insert("atlas_id".to_string(), Json::String(id.clone()));

        neighborhoods.push(Neighborhood {
            id,
            name,
            borough,
            centroid,
            stop_id: stop.id.clone(),
        });
    }

    Ok(neighborhoods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geojson::{Feature, Geometry, Value};

    fn props(pairs: &[(&str, Json)]) -> JsonObject {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn square(lat: f64, lon: f64, half: f64) -> Geometry {
        Geometry::new(Value::Polygon(vec![vec![
            vec![lon - half, lat - half],
            vec![lon + half, lat - half],
            vec![lon + half, lat + half],
            vec![lon - half, lat + half],
            vec![lon - half, lat - half],
        ]]))
    }

    fn stop(id: &str, lat: f64, lon: f64) -> Stop {
        Stop {
            id: Arc::from(id),
            name: Arc::from(id),
            coordinate: Coordinate::new(lat, lon),
            parent: None,
        }
    }

    #[test]
    fn id_preference_order() {
        let p = props(&[
            ("GEOID", Json::String("36047".into())),
            ("NTACode", Json::String("BK73".into())),
        ]);
        assert_eq!(pick_id(Some(&p), 0), "BK73");

        let p = props(&[("name", Json::String("Greenpoint".into()))]);
        assert_eq!(pick_id(Some(&p), 2), "greenpoint-3");

        assert_eq!(pick_id(None, 0), "neighborhood-1-1");
    }

    #[test]
    fn empty_and_zero_properties_are_absent() {
        let p = props(&[
            ("NTACode", Json::String("".into())),
            ("nta", Json::Number(0.into())),
            ("id", Json::String("x1".into())),
        ]);
        assert_eq!(prop_string(Some(&p), &ID_KEYS).as_deref(), Some("x1"));
    }

    #[test]
    fn extract_matches_nearest_stop_and_stamps_atlas_id() {
        let stops = [stop("A", 40.70, -73.99), stop("B", 40.72, -73.98)];
        let stop_refs: Vec<&Stop> = stops.iter().collect();
        let mut collection = FeatureCollection {
            bbox: None,
            features: vec![
                Feature {
                    bbox: None,
                    geometry: Some(square(40.70, -73.99, 0.001)),
                    id: None,
                    properties: Some(props(&[("name", Json::String("Near A".into()))])),
                    foreign_members: None,
                },
                Feature {
                    bbox: None,
                    geometry: Some(square(40.72, -73.98, 0.001)),
                    id: None,
                    properties: Some(props(&[("name", Json::String("Near B".into()))])),
                    foreign_members: None,
                },
            ],
            foreign_members: None,
        };
        let neighborhoods = extract(&mut collection, &stop_refs).unwrap();
        assert_eq!(neighborhoods.len(), 2);
        assert_eq!(neighborhoods[0].stop_id.as_ref(), "A");
        assert_eq!(neighborhoods[1].stop_id.as_ref(), "B");
        let stamped = collection.features[0]
            .properties
            .as_ref()
            .unwrap()
            .get("atlas_id")
            .unwrap();
        assert_eq!(stamped, &Json::String(neighborhoods[0].id.clone()));
    }

    #[test]
    fn duplicate_ids_get_ordinal_suffix() {
        let stops = [stop("A", 40.70, -73.99)];
        let stop_refs: Vec<&Stop> = stops.iter().collect();
        let feature = |name: &str| Feature {
            bbox: None,
            geometry: Some(square(40.70, -73.99, 0.001)),
            id: None,
            properties: Some(props(&[("NTACode", Json::String(name.into()))])),
            foreign_members: None,
        };
        let mut collection = FeatureCollection {
            bbox: None,
            features: vec![feature("BK01"), feature("BK01")],
            foreign_members: None,
        };
        let neighborhoods = extract(&mut collection, &stop_refs).unwrap();
        assert_eq!(neighborhoods[0].id, "BK01");
        assert_eq!(neighborhoods[1].id, "BK01-2");
    }

    #[test]
    fn no_stops_is_an_error() {
        let mut collection = FeatureCollection {
            bbox: None,
            features: vec![Feature {
                bbox: None,
                geometry: Some(square(40.70, -73.99, 0.001)),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            foreign_members: None,
        };
        assert!(extract(&mut collection, &[]).is_err());
    }
}
