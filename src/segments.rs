use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

use crate::feed::models::StopTimeRow;
use crate::service::TripFilter;
use crate::shared::{Profile, parse_feed_time};

pub type StopPair = (Arc<str>, Arc<str>);

/// Per-window directed segments reduced from the event stream: median travel
/// seconds and dominant route per ordered stop pair, in first-observed order.
#[derive(Debug, Default)]
pub struct WindowSegments {
    pub weights: IndexMap<StopPair, u32>,
    pub routes: IndexMap<StopPair, Option<Arc<str>>>,
}

struct TripState {
    sequence: i64,
    stop: Arc<str>,
    departure: u32,
}

/// Streams stop-time events into per-window segment samples.
///
/// No grouping by trip is assumed: some feeds interleave trips freely.
/// Minimal state is kept per trip id and an edge is accepted only when the
/// sequence number increments by exactly one; anything else resets the chain.
/// That keeps the pass O(events) on arbitrarily shuffled files, and a doubt
/// never becomes a false edge.
pub struct SegmentAggregator<'a> {
    profiles: &'a [Profile],
    filter: &'a TripFilter,
    known_stops: &'a HashSet<Arc<str>>,
    trip_routes: &'a HashMap<Arc<str>, Arc<str>>,
    samples: HashMap<Profile, IndexMap<StopPair, Vec<u32>>>,
    route_counts: HashMap<Profile, IndexMap<StopPair, IndexMap<Option<Arc<str>>, u32>>>,
    state: HashMap<Arc<str>, TripState>,
    active_stops: HashSet<Arc<str>>,
}

impl<'a> SegmentAggregator<'a> {
    pub fn new(
        profiles: &'a [Profile],
        filter: &'a TripFilter,
        known_stops: &'a HashSet<Arc<str>>,
        trip_routes: &'a HashMap<Arc<str>, Arc<str>>,
    ) -> Self {
        let samples = profiles.iter().map(|p| (*p, IndexMap::new())).collect();
        let route_counts = profiles.iter().map(|p| (*p, IndexMap::new())).collect();
        Self {
            profiles,
            filter,
            known_stops,
            trip_routes,
            samples,
            route_counts,
            state: HashMap::new(),
            active_stops: HashSet::new(),
        }
    }

    pub fn observe(&mut self, row: &StopTimeRow) {
        let Some(trip_id) = row.trip_id.as_deref().filter(|t| !t.is_empty()) else {
            return;
        };
        let Some(stop_id) = row.stop_id.as_deref().filter(|s| !s.is_empty()) else {
            // A row without a stop cannot extend or restart the chain.
            self.state.remove(trip_id);
            return;
        };
        let stop = self.known_stops.get(stop_id).cloned();
        if let Some(stop) = &stop {
            self.active_stops.insert(stop.clone());
        }

        let arrival = row.arrival_time.as_deref().and_then(parse_feed_time);
        let departure = row.departure_time.as_deref().and_then(parse_feed_time);
        let sequence: Option<i64> = row
            .stop_sequence
            .as_deref()
            .and_then(|s| s.trim().parse().ok());
        let Some(sequence) = sequence else {
            // Without a sequence number segments cannot be connected safely.
            self.state.remove(trip_id);
            return;
        };

        let mut observed: Option<(StopPair, u32, u32)> = None;
        if let Some(prev) = self.state.get(trip_id)
            && sequence == prev.sequence + 1
            && let Some(arrival) = arrival
        {
            let seconds = i64::from(arrival) - i64::from(prev.departure);
            if seconds > 0
                && seconds < 3600
                && let (Some(from), Some(to)) = (self.known_stops.get(prev.stop.as_ref()), &stop)
            {
                observed = Some(((from.clone(), to.clone()), prev.departure, seconds as u32));
            }
        }
        if let Some((edge, prev_departure, seconds)) = observed {
            self.record(trip_id, edge, prev_departure, seconds);
        }

        let Some(departure) = departure else {
            // The chain cannot continue without a departure time.
            self.state.remove(trip_id);
            return;
        };
        let trip_key: Arc<str> = match self.state.remove_entry(trip_id) {
            Some((key, _)) => key,
            None => Arc::from(trip_id),
        };
        let stop: Arc<str> = stop.unwrap_or_else(|| Arc::from(stop_id));
        self.state.insert(
            trip_key,
            TripState {
                sequence,
                stop,
                departure,
            },
        );
    }

    fn record(&mut self, trip_id: &str, edge: StopPair, departure: u32, seconds: u32) {
        for profile in self.profiles {
            if !profile.contains(departure) {
                continue;
            }
            if !self.filter.allows(*profile, trip_id) {
                continue;
            }
            self.samples
                .get_mut(profile)
                .expect("profile map prebuilt")
                .entry(edge.clone())
                .or_default()
                .push(seconds);
            let route = self.trip_routes.get(trip_id).cloned();
            *self
                .route_counts
                .get_mut(profile)
                .expect("profile map prebuilt")
                .entry(edge.clone())
                .or_default()
                .entry(route)
                .or_insert(0) += 1;
        }
    }

    pub fn finish(mut self) -> (HashMap<Profile, WindowSegments>, HashSet<Arc<str>>) {
        let mut out = HashMap::new();
        for profile in self.profiles {
            let samples = self.samples.remove(profile).unwrap_or_default();
            let counts = self.route_counts.remove(profile).unwrap_or_default();
            let mut segments = WindowSegments::default();
            for (edge, values) in samples {
                // Median damps outliers from dwell and schedule quirks.
                segments.weights.insert(edge, median(&values));
            }
            for (edge, counter) in counts {
                segments.routes.insert(edge, dominant_route(&counter));
            }
            info!(
                profile = profile.id(),
                edges = segments.weights.len(),
                "aggregated segment edges"
            );
            out.insert(*profile, segments);
        }
        (out, self.active_stops)
    }
}

/// Median of a non-empty sample list; an even count truncates the midpoint
/// mean toward zero.
fn median(values: &[u32]) -> u32 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2
    }
}

/// First-inserted maximum, so repeated runs over the same feed pick the same
/// route on ties.
fn dominant_route(counter: &IndexMap<Option<Arc<str>>, u32>) -> Option<Arc<str>> {
    let mut best: Option<(&Option<Arc<str>>, u32)> = None;
    for (route, count) in counter {
        if best.is_none_or(|(_, c)| *count > c) {
            best = Some((route, *count));
        }
    }
    best.and_then(|(route, _)| route.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(trip: &str, stop: &str, seq: &str, arr: &str, dep: &str) -> StopTimeRow {
        StopTimeRow {
            trip_id: Some(trip.to_string()),
            stop_id: Some(stop.to_string()),
            arrival_time: Some(arr.to_string()),
            departure_time: Some(dep.to_string()),
            stop_sequence: Some(seq.to_string()),
        }
    }

    fn stops(ids: &[&str]) -> HashSet<Arc<str>> {
        ids.iter().map(|id| Arc::from(*id)).collect()
    }

    #[test]
    fn consecutive_rows_form_a_segment() {
        let profiles = [Profile::WeekdayAm];
        let filter = TripFilter::passthrough();
        let known = stops(&["A", "B"]);
        let routes = HashMap::new();
        let mut agg = SegmentAggregator::new(&profiles, &filter, &known, &routes);
        agg.observe(&row("t1", "A", "1", "07:00:00", "07:00:00"));
        agg.observe(&row("t1", "B", "2", "07:05:00", "07:05:00"));
        let (windows, active) = agg.finish();
        let segments = &windows[&Profile::WeekdayAm];
        let edge = (Arc::from("A"), Arc::from("B"));
        assert_eq!(segments.weights.get(&edge), Some(&300));
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn out_of_order_sequence_is_rejected() {
        let profiles = [Profile::WeekdayAm];
        let filter = TripFilter::passthrough();
        let known = stops(&["A", "B", "C"]);
        let routes = HashMap::new();
        let mut agg = SegmentAggregator::new(&profiles, &filter, &known, &routes);
        agg.observe(&row("t1", "B", "2", "07:05:00", "07:05:00"));
        agg.observe(&row("t1", "A", "1", "07:00:00", "07:00:00"));
        // Sequence went backwards: no B->A edge, and the chain restarts at A.
        agg.observe(&row("t1", "C", "2", "07:04:00", "07:04:00"));
        let (windows, _) = agg.finish();
        let segments = &windows[&Profile::WeekdayAm];
        assert_eq!(segments.weights.len(), 1);
        let edge = (Arc::from("A"), Arc::from("C"));
        assert_eq!(segments.weights.get(&edge), Some(&240));
    }

    #[test]
    fn gap_in_sequence_is_rejected() {
        let profiles = [Profile::WeekdayAm];
        let filter = TripFilter::passthrough();
        let known = stops(&["A", "B"]);
        let routes = HashMap::new();
        let mut agg = SegmentAggregator::new(&profiles, &filter, &known, &routes);
        agg.observe(&row("t1", "A", "1", "07:00:00", "07:00:00"));
        agg.observe(&row("t1", "B", "3", "07:05:00", "07:05:00"));
        let (windows, _) = agg.finish();
        assert!(windows[&Profile::WeekdayAm].weights.is_empty());
    }

    #[test]
    fn missing_departure_resets_the_chain() {
        let profiles = [Profile::WeekdayAm];
        let filter = TripFilter::passthrough();
        let known = stops(&["A", "B", "C"]);
        let routes = HashMap::new();
        let mut agg = SegmentAggregator::new(&profiles, &filter, &known, &routes);
        agg.observe(&row("t1", "A", "1", "07:00:00", "07:00:00"));
        agg.observe(&StopTimeRow {
            trip_id: Some("t1".into()),
            stop_id: Some("B".into()),
            arrival_time: Some("07:05:00".into()),
            departure_time: None,
            stop_sequence: Some("2".into()),
        });
        // A->B is still observed; B->C is not, the chain died at B.
        agg.observe(&row("t1", "C", "3", "07:09:00", "07:09:00"));
        let (windows, _) = agg.finish();
        let segments = &windows[&Profile::WeekdayAm];
        assert_eq!(segments.weights.len(), 1);
        assert!(segments.weights.contains_key(&(Arc::from("A"), Arc::from("B"))));
    }

    #[test]
    fn departure_outside_every_window_is_ignored() {
        let profiles = [Profile::WeekdayAm];
        let filter = TripFilter::passthrough();
        let known = stops(&["A", "B"]);
        let routes = HashMap::new();
        let mut agg = SegmentAggregator::new(&profiles, &filter, &known, &routes);
        agg.observe(&row("t1", "A", "1", "03:00:00", "03:00:00"));
        agg.observe(&row("t1", "B", "2", "03:05:00", "03:05:00"));
        let (windows, active) = agg.finish();
        assert!(windows[&Profile::WeekdayAm].weights.is_empty());
        // Activity is still recorded even outside the windows.
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn hour_long_segments_are_dropped() {
        let profiles = [Profile::Weekend];
        let filter = TripFilter::passthrough();
        let known = stops(&["A", "B"]);
        let routes = HashMap::new();
        let mut agg = SegmentAggregator::new(&profiles, &filter, &known, &routes);
        agg.observe(&row("t1", "A", "1", "10:00:00", "10:00:00"));
        agg.observe(&row("t1", "B", "2", "11:00:00", "11:00:00"));
        let (windows, _) = agg.finish();
        assert!(windows[&Profile::Weekend].weights.is_empty());
    }

    #[test]
    fn median_test() {
        assert_eq!(median(&[300]), 300);
        assert_eq!(median(&[100, 300, 200]), 200);
        assert_eq!(median(&[100, 301]), 200);
    }

    #[test]
    fn dominant_route_prefers_first_on_ties() {
        let mut counter: IndexMap<Option<Arc<str>>, u32> = IndexMap::new();
        counter.insert(Some(Arc::from("Q")), 2);
        counter.insert(Some(Arc::from("N")), 2);
        assert_eq!(dominant_route(&counter).as_deref(), Some("Q"));
        counter.insert(Some(Arc::from("N")), 3);
        assert_eq!(dominant_route(&counter).as_deref(), Some("N"));
    }
}
