use std::collections::HashSet;
use std::sync::Arc;

use crate::feed::models::CalendarRow;
use crate::shared::Profile;

/// Service-ids classified from calendar rows.
///
/// A row counts as weekday-only when Mon–Fri are all active and both weekend
/// days are inactive; weekend-only when at least one weekend day is active
/// and no weekday is. Everything else is ignored. Service semantics vary
/// wildly across feeds (calendar_dates, holiday patterns), so an empty class
/// deliberately means "no restriction" rather than "no service" — broad
/// coverage beats strict day-of-week correctness for a typical-time atlas.
#[derive(Debug, Default)]
pub struct ServiceSets {
    weekday: HashSet<String>,
    weekend: HashSet<String>,
}

impl ServiceSets {
    pub fn observe(&mut self, row: &CalendarRow) {
        let Some(service_id) = row.service_id.as_deref().filter(|s| !s.is_empty()) else {
            return;
        };
        let weekdays = row.weekdays_active();
        let all_weekdays = weekdays.iter().all(|&d| d);
        let any_weekday = weekdays.iter().any(|&d| d);
        let saturday = row.saturday_active();
        let sunday = row.sunday_active();

        if all_weekdays && !saturday && !sunday {
            self.weekday.insert(service_id.to_string());
        }
        if (saturday || sunday) && !any_weekday {
            self.weekend.insert(service_id.to_string());
        }
    }

    pub fn restricts_weekday(&self) -> bool {
        !self.weekday.is_empty()
    }

    pub fn restricts_weekend(&self) -> bool {
        !self.weekend.is_empty()
    }

    pub fn weekday_contains(&self, service_id: &str) -> bool {
        self.weekday.contains(service_id)
    }

    pub fn weekend_contains(&self, service_id: &str) -> bool {
        self.weekend.contains(service_id)
    }
}

/// Per-profile allowed-trip sets resolved from [`ServiceSets`].
///
/// `None` means pass-through (no calendar, or an empty service class). A
/// present set restricts even when empty: a feed whose calendar names
/// weekday services but whose trips never reference them contributes no
/// weekday segments.
#[derive(Debug, Default)]
pub struct TripFilter {
    weekday: Option<HashSet<Arc<str>>>,
    weekend: Option<HashSet<Arc<str>>>,
}

impl TripFilter {
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn new(sets: &ServiceSets) -> Self {
        Self {
            weekday: sets.restricts_weekday().then(HashSet::new),
            weekend: sets.restricts_weekend().then(HashSet::new),
        }
    }

    pub fn observe(&mut self, trip_id: &Arc<str>, service_id: Option<&str>, sets: &ServiceSets) {
        if let Some(allowed) = &mut self.weekday
            && service_id.is_some_and(|sid| sets.weekday_contains(sid))
        {
            allowed.insert(trip_id.clone());
        }
        if let Some(allowed) = &mut self.weekend
            && service_id.is_some_and(|sid| sets.weekend_contains(sid))
        {
            allowed.insert(trip_id.clone());
        }
    }

    pub fn allows(&self, profile: Profile, trip_id: &str) -> bool {
        let set = if profile.is_weekend() {
            &self.weekend
        } else {
            &self.weekday
        };
        set.as_ref().is_none_or(|allowed| allowed.contains(trip_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::models::CalendarRow;

    fn row(service_id: &str, days: [&str; 7]) -> CalendarRow {
        CalendarRow {
            service_id: Some(service_id.to_string()),
            monday: Some(days[0].to_string()),
            tuesday: Some(days[1].to_string()),
            wednesday: Some(days[2].to_string()),
            thursday: Some(days[3].to_string()),
            friday: Some(days[4].to_string()),
            saturday: Some(days[5].to_string()),
            sunday: Some(days[6].to_string()),
        }
    }

    #[test]
    fn weekday_classification() {
        let mut sets = ServiceSets::default();
        sets.observe(&row("wk", ["1", "1", "1", "1", "1", "0", "0"]));
        sets.observe(&row("sat", ["0", "0", "0", "0", "0", "1", "0"]));
        sets.observe(&row("mixed", ["1", "1", "1", "1", "1", "1", "1"]));
        assert!(sets.weekday_contains("wk"));
        assert!(!sets.weekday_contains("mixed"));
        assert!(sets.weekend_contains("sat"));
        assert!(!sets.weekend_contains("mixed"));
    }

    #[test]
    fn partial_week_is_neither() {
        let mut sets = ServiceSets::default();
        sets.observe(&row("mwf", ["1", "0", "1", "0", "1", "0", "0"]));
        assert!(!sets.restricts_weekday());
        assert!(!sets.restricts_weekend());
    }

    #[test]
    fn empty_sets_pass_through() {
        let filter = TripFilter::new(&ServiceSets::default());
        assert!(filter.allows(Profile::WeekdayAm, "anything"));
        assert!(filter.allows(Profile::Weekend, "anything"));
    }

    #[test]
    fn present_set_restricts() {
        let mut sets = ServiceSets::default();
        sets.observe(&row("wk", ["1", "1", "1", "1", "1", "0", "0"]));
        let mut filter = TripFilter::new(&sets);
        let t1: Arc<str> = Arc::from("t1");
        filter.observe(&t1, Some("wk"), &sets);
        filter.observe(&Arc::from("t2"), Some("other"), &sets);
        assert!(filter.allows(Profile::WeekdayAm, "t1"));
        assert!(!filter.allows(Profile::WeekdayPm, "t2"));
        // Weekend class is empty, so the weekend window stays pass-through.
        assert!(filter.allows(Profile::Weekend, "t2"));
    }
}
