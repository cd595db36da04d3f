use std::io::{Cursor, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;

/// Builds an in-memory feed archive from `(table, csv)` pairs.
pub fn feed_zip(tables: &[(&str, &str)]) -> Cursor<Vec<u8>> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in tables {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap()
}

/// A GeoJSON feature with a square polygon centered on `(lat, lon)`.
pub fn square_feature(name: &str, borough: &str, lat: f64, lon: f64, half: f64) -> serde_json::Value {
    serde_json::json!({
        "type": "Feature",
        "properties": { "name": name, "boroname": borough },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [lon - half, lat - half],
                [lon + half, lat - half],
                [lon + half, lat + half],
                [lon - half, lat + half],
                [lon - half, lat - half],
            ]],
        },
    })
}

pub fn write_feature_collection(path: &Path, features: &[serde_json::Value]) {
    let collection = serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    });
    std::fs::write(path, serde_json::to_string(&collection).unwrap()).unwrap();
}

pub fn read_json(path: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}
