use serde::Deserialize;

// Row models keep raw strings for every field a real feed can mangle:
// coordinates, times and sequence numbers are parsed (and dropped) at the
// aggregation layer so one bad value never aborts a table stream.

#[derive(Debug, Clone, Deserialize)]
pub struct StopRow {
    #[serde(default)]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub stop_name: Option<String>,
    #[serde(default)]
    pub stop_lat: Option<String>,
    #[serde(default)]
    pub stop_lon: Option<String>,
    #[serde(default)]
    pub parent_station: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripRow {
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopTimeRow {
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRow {
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub route_short_name: Option<String>,
    #[serde(default)]
    pub route_long_name: Option<String>,
    #[serde(default)]
    pub route_color: Option<String>,
    #[serde(default)]
    pub route_text_color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarRow {
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub monday: Option<String>,
    #[serde(default)]
    pub tuesday: Option<String>,
    #[serde(default)]
    pub wednesday: Option<String>,
    #[serde(default)]
    pub thursday: Option<String>,
    #[serde(default)]
    pub friday: Option<String>,
    #[serde(default)]
    pub saturday: Option<String>,
    #[serde(default)]
    pub sunday: Option<String>,
}

impl CalendarRow {
    fn flag(value: &Option<String>) -> bool {
        value.as_deref() == Some("1")
    }

    pub fn weekdays_active(&self) -> [bool; 5] {
        [
            Self::flag(&self.monday),
            Self::flag(&self.tuesday),
            Self::flag(&self.wednesday),
            Self::flag(&self.thursday),
            Self::flag(&self.friday),
        ]
    }

    pub fn saturday_active(&self) -> bool {
        Self::flag(&self.saturday)
    }

    pub fn sunday_active(&self) -> bool {
        Self::flag(&self.sunday)
    }
}
