use geojson::{PolygonType, Value};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 point. All geometry in this crate is treated as planar lon/lat;
/// the regions covered are small enough that reprojection would only move
/// every downstream scalar without changing any ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn haversine_m(&self, other: &Self) -> f64 {
        let phi1 = self.latitude.to_radians();
        let phi2 = other.latitude.to_radians();
        let dphi = (other.latitude - self.latitude).to_radians();
        let dlambda = (other.longitude - self.longitude).to_radians();
        let a = (dphi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }

    pub fn haversine_km(&self, other: &Self) -> f64 {
        self.haversine_m(other) * (EARTH_RADIUS_KM / EARTH_RADIUS_M)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Lon/lat bounding box (`min_x`/`max_x` are longitudes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn extend(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn union(&mut self, other: &Bounds) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    pub fn is_valid(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }
}

/// Iterates the polygons of a geometry: one for `Polygon`, each member for
/// `MultiPolygon`, nothing otherwise.
pub fn polygons_of(value: &Value) -> Vec<&PolygonType> {
    match value {
        Value::Polygon(polygon) => vec![polygon],
        Value::MultiPolygon(polygons) => polygons.iter().collect(),
        _ => Vec::new(),
    }
}

/// Ray-cast containment against a single ring. The `(yi > y) != (yj > y)`
/// test keeps the boundary half-open, so adjacent rings never both claim a
/// point on their shared edge.
pub fn point_in_ring(lon: f64, lat: f64, ring: &[Vec<f64>]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i][0], ring[i][1]);
        let (xj, yj) = (ring[j][0], ring[j][1]);
        let dy = yj - yi;
        let dy = if dy == 0.0 { 1e-9 } else { dy };
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / dy + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Containment in a polygon: inside the outer ring, outside every hole.
pub fn point_in_polygon(lon: f64, lat: f64, rings: &PolygonType) -> bool {
    let Some(outer) = rings.first() else {
        return false;
    };
    if !point_in_ring(lon, lat, outer) {
        return false;
    }
    for hole in &rings[1..] {
        if point_in_ring(lon, lat, hole) {
            return false;
        }
    }
    true
}

/// Containment in any polygon of a geometry.
pub fn point_in_geometry(lon: f64, lat: f64, value: &Value) -> bool {
    polygons_of(value)
        .iter()
        .any(|rings| point_in_polygon(lon, lat, rings))
}

/// Bounding box over every ring vertex of a geometry.
pub fn geometry_bounds(value: &Value) -> Option<Bounds> {
    let mut bounds = Bounds::empty();
    for polygon in polygons_of(value) {
        for ring in polygon {
            for position in ring {
                if position.len() < 2 {
                    continue;
                }
                bounds.extend(position[0], position[1]);
            }
        }
    }
    bounds.is_valid().then_some(bounds)
}

/// Centroid as the unweighted mean of all ring vertices (the point itself
/// for a `Point`). Closed rings count their closing vertex again, matching
/// the atlas convention that representative stops are picked against.
pub fn geometry_centroid(value: &Value) -> Option<Coordinate> {
    if let Value::Point(position) = value {
        if position.len() >= 2 {
            return Some(Coordinate::new(position[1], position[0]));
        }
        return None;
    }
    let mut count = 0usize;
    let mut lat = 0.0;
    let mut lon = 0.0;
    for polygon in polygons_of(value) {
        for ring in polygon {
            for position in ring {
                if position.len() < 2 {
                    continue;
                }
                lon += position[0];
                lat += position[1];
                count += 1;
            }
        }
    }
    if count == 0 {
        return None;
    }
    let count = count as f64;
    Some(Coordinate::new(lat / count, lon / count))
}

/// Approximate planar area of a lon/lat-aligned cell in km², using the
/// equirectangular scale at the cell's mid latitude. Downstream weights
/// depend on this exact formula; a geodesic routine is not a drop-in.
pub fn cell_area_km2(lon0: f64, lat0: f64, lon1: f64, lat1: f64) -> f64 {
    let lat_c = (lat0 + lat1) * 0.5;
    let km_lat = 111.32 * (lat1 - lat0);
    let km_lon = 111.32 * lat_c.to_radians().cos() * (lon1 - lon0);
    (km_lat * km_lon).abs()
}

const COMPASS: [&str; 8] = ["E", "NE", "N", "NW", "W", "SW", "S", "SE"];

/// 8-way compass direction from `(from_lat, from_lon)` toward
/// `(to_lat, to_lon)`, in 45° bins starting at east. `None` when the points
/// coincide (within 1e-6 degrees) or any coordinate is non-finite.
pub fn compass_label(
    to_lat: f64,
    to_lon: f64,
    from_lat: f64,
    from_lon: f64,
) -> Option<&'static str> {
    if ![to_lat, to_lon, from_lat, from_lon]
        .iter()
        .all(|v| v.is_finite())
    {
        return None;
    }
    let dx = to_lon - from_lon;
    let dy = to_lat - from_lat;
    if dx.abs() < 1e-6 && dy.abs() < 1e-6 {
        return None;
    }
    let angle = dy.atan2(dx).to_degrees();
    let index = ((angle + 22.5).rem_euclid(360.0) / 45.0).floor() as usize;
    Some(COMPASS[index.min(7)])
}

#[test]
fn haversine_test() {
    let a = Coordinate::new(40.70, -73.99);
    let b = Coordinate::new(40.72, -73.98);
    let d = a.haversine_m(&b);
    // ~2.4 km between the two fixture stops.
    assert!(d > 2_000.0 && d < 2_800.0);
    assert!((a.haversine_km(&b) - d / 1000.0).abs() < 1e-9);
}

#[test]
fn ring_containment_test() {
    let ring = vec![
        vec![0.0, 0.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
        vec![0.0, 1.0],
        vec![0.0, 0.0],
    ];
    assert!(point_in_ring(0.5, 0.5, &ring));
    assert!(!point_in_ring(1.5, 0.5, &ring));
    assert!(!point_in_ring(0.5, -0.1, &ring));
}

#[test]
fn hole_subtraction_test() {
    let rings = vec![
        vec![
            vec![0.0, 0.0],
            vec![4.0, 0.0],
            vec![4.0, 4.0],
            vec![0.0, 4.0],
            vec![0.0, 0.0],
        ],
        vec![
            vec![1.0, 1.0],
            vec![3.0, 1.0],
            vec![3.0, 3.0],
            vec![1.0, 3.0],
            vec![1.0, 1.0],
        ],
    ];
    assert!(point_in_polygon(0.5, 0.5, &rings));
    assert!(!point_in_polygon(2.0, 2.0, &rings));
}

#[test]
fn centroid_test() {
    let value = Value::Polygon(vec![vec![
        vec![0.0, 0.0],
        vec![2.0, 0.0],
        vec![2.0, 2.0],
        vec![0.0, 2.0],
    ]]);
    let c = geometry_centroid(&value).unwrap();
    assert_eq!(c.latitude, 1.0);
    assert_eq!(c.longitude, 1.0);
}

#[test]
fn bounds_test() {
    let value = Value::MultiPolygon(vec![
        vec![vec![vec![0.0, 0.0], vec![1.0, 2.0], vec![-1.0, 1.0]]],
        vec![vec![vec![3.0, -1.0], vec![2.0, 0.5]]],
    ]);
    let b = geometry_bounds(&value).unwrap();
    assert_eq!((b.min_x, b.min_y, b.max_x, b.max_y), (-1.0, -1.0, 3.0, 2.0));
}

#[test]
fn compass_test() {
    assert_eq!(compass_label(0.0, 1.0, 0.0, 0.0), Some("E"));
    assert_eq!(compass_label(1.0, 1.0, 0.0, 0.0), Some("NE"));
    assert_eq!(compass_label(-1.0, 0.0, 0.0, 0.0), Some("S"));
    assert_eq!(compass_label(0.0, -1.0, 0.0, 0.0), Some("W"));
    assert_eq!(compass_label(0.0, 0.0, 0.0, 0.0), None);
}

#[test]
fn cell_area_test() {
    // One 0.004° cell near the equator is ~0.198 km².
    let area = cell_area_km2(0.0, 0.0, 0.004, 0.004);
    assert!((area - 0.004 * 0.004 * 111.32 * 111.32).abs() < 1e-9);
}
