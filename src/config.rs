use std::path::PathBuf;

use crate::shared::{Coordinate, Profile};

/// A named point whose nearest neighborhood becomes a corridor destination.
#[derive(Debug, Clone)]
pub struct HubAnchor {
    pub key: String,
    pub label: String,
    pub coordinate: Coordinate,
}

impl HubAnchor {
    pub fn new(key: &str, label: &str, latitude: f64, longitude: f64) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            coordinate: Coordinate::new(latitude, longitude),
        }
    }
}

/// The nine default hub anchors. Picking the nearest neighborhood centroid
/// to each point avoids brittle bounding-box assumptions and keeps every hub
/// defined even when the input polygons shift between dataset vintages.
pub fn default_hub_anchors() -> Vec<HubAnchor> {
    vec![
        HubAnchor::new("midtown", "Midtown", 40.754, -73.984),
        HubAnchor::new("downtown", "Downtown", 40.707, -74.011),
        HubAnchor::new("williamsburg", "Williamsburg", 40.711, -73.958),
        HubAnchor::new("downtown_bk", "Downtown BK", 40.692, -73.985),
        HubAnchor::new("lic", "LIC", 40.744, -73.949),
        HubAnchor::new("hudson_yards", "Hudson Yards", 40.754, -74.002),
        HubAnchor::new("greenpoint", "Greenpoint", 40.729, -73.955),
        HubAnchor::new("bushwick", "Bushwick", 40.695, -73.918),
        HubAnchor::new("astoria", "Astoria", 40.764, -73.923),
    ]
}

/// Batch configuration. Paths name the three inputs and the output
/// directory; the remaining knobs default to the atlas conventions.
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    /// Zipped transit feed.
    pub feed_path: PathBuf,
    /// Neighborhoods GeoJSON FeatureCollection.
    pub neighborhoods_path: PathBuf,
    /// Optional gazetteer GeoJSON. When unset, a
    /// `neighborhoods_gazetteer.geojson` sibling of the neighborhoods file
    /// is used if present.
    pub gazetteer_path: Option<PathBuf>,
    /// Directory holding optional scalar CSVs. Defaults to the
    /// neighborhoods file's directory.
    pub scalars_dir: Option<PathBuf>,
    /// Output directory for every document.
    pub out_dir: PathBuf,
    /// Fixed transfer minutes within a parent station complex.
    pub transfer_minutes: f64,
    /// Grid cell side in degrees for the micro-unit tessellation.
    pub grid_step: f64,
    /// Profiles to build; order is preserved in the outputs.
    pub profiles: Vec<Profile>,
    /// Extra minutes added to transfer edges for the penalized centrality.
    pub transfer_penalty_minutes: f64,
    /// Corridor entries above this travel time are discarded.
    pub max_minutes: u32,
    /// Corridor list cap (hard-capped at 200).
    pub top_n: usize,
    /// Straight-line speed a trip is expected to beat, in km per minute.
    pub expected_speed_km_per_min: f64,
    pub hubs: Vec<HubAnchor>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            feed_path: PathBuf::new(),
            neighborhoods_path: PathBuf::new(),
            gazetteer_path: None,
            scalars_dir: None,
            out_dir: PathBuf::new(),
            transfer_minutes: 2.0,
            grid_step: 0.004,
            profiles: Profile::ALL.to_vec(),
            transfer_penalty_minutes: 4.0,
            max_minutes: 180,
            top_n: 180,
            expected_speed_km_per_min: 0.25,
            hubs: default_hub_anchors(),
        }
    }
}

impl AtlasConfig {
    pub fn transfer_seconds(&self) -> u32 {
        (self.transfer_minutes * 60.0).round().max(0.0) as u32
    }

    pub fn transfer_penalty_seconds(&self) -> u32 {
        (self.transfer_penalty_minutes * 60.0).round().max(0.0) as u32
    }
}
