//! Tessera precomputes a static travel-time atlas over an urban transit
//! network. From a zipped transit feed and a set of neighborhood polygons it
//! derives, per time-of-day window, a stop-level weighted multigraph, an
//! all-pairs travel-time matrix between neighborhood representatives,
//! centrality metrics, and scored "hub corridors". A second layer tessellates
//! the covered area into grid micro-cells, coalesces them into
//! station-anchored regions, names those regions against an optional
//! gazetteer, and re-projects the matrices onto them.
//!
//! The crate is a batch library: [`pipeline::run`] consumes the inputs once
//! and writes immutable JSON/GeoJSON documents for downstream viewers.
//!
//! # Example
//! ```ignore
//! use tessera::config::AtlasConfig;
//! use tessera::pipeline;
//!
//! let config = AtlasConfig {
//!     feed_path: "data/raw/subway_gtfs.zip".into(),
//!     neighborhoods_path: "data/raw/neighborhoods.geojson".into(),
//!     out_dir: "site/data".into(),
//!     ..AtlasConfig::default()
//! };
//! let report = pipeline::run(&config)?;
//! println!("windows built: {}", report.windows_built.len());
//! # Ok::<(), tessera::pipeline::Error>(())
//! ```

pub mod config;
pub mod corridors;
pub mod derived;
pub mod feed;
pub mod graph;
pub mod matrix;
pub mod micro;
pub mod naming;
pub mod output;
pub mod path;
pub mod pipeline;
pub mod regions;
pub mod scalars;
pub mod segments;
pub mod service;
pub mod shared;
