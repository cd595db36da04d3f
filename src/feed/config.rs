/// Table names inside the feed archive. The defaults follow the usual
/// transit-feed convention.
pub struct Config {
    pub stops_path: String,
    pub trips_path: String,
    pub stop_times_path: String,
    pub routes_path: String,
    pub calendar_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stops_path: "stops.txt".into(),
            trips_path: "trips.txt".into(),
            stop_times_path: "stop_times.txt".into(),
            routes_path: "routes.txt".into(),
            calendar_path: "calendar.txt".into(),
        }
    }
}
