use crate::calendar::{Calendar, date_key, month_key, start_of_month};
use crate::index::EntryIndex;
use crate::timeline::{TimelineWindow, WindowState};
use chrono::{Datelike, Local, Months, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_BADGE_CAP: usize = 5;

/// Distinct track types logged on a day, in order of first appearance.
pub fn track_types_for_day(index: &EntryIndex, date_key: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    index
        .entries_on(date_key)
        .iter()
        .filter(|entry| seen.insert(entry.track_type_id.as_str()))
        .map(|entry| entry.track_type_id.clone())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBadges {
    pub track_type_ids: Vec<String>,
    pub overflow: usize,
}

/// Up to `cap` distinct track types for a day. `overflow` counts the distinct
/// track types left over, not entries, so a day with many entries of one
/// type never reports overflow. A renderer that counts raw entries past the
/// cap will show a larger number than this.
pub fn day_badges(index: &EntryIndex, date_key: &str, cap: usize) -> DayBadges {
    let mut track_type_ids = track_types_for_day(index, date_key);
    let overflow = track_type_ids.len().saturating_sub(cap);
    track_type_ids.truncate(cap);
    DayBadges {
        track_type_ids,
        overflow,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackActivity {
    pub count: usize,
    pub distinct_dates: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthActivity {
    pub month: String,
    pub by_track_type: BTreeMap<String, TrackActivity>,
}

impl MonthActivity {
    /// Activity for one track type; zero and empty when nothing was logged.
    pub fn for_track_type(&self, track_type_id: &str) -> TrackActivity {
        self.by_track_type.get(track_type_id).cloned().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.by_track_type.values().map(|activity| activity.count).sum()
    }
}

pub fn month_activity(index: &EntryIndex, month: NaiveDate) -> MonthActivity {
    let month = month_key(start_of_month(month));
    let mut by_track_type: BTreeMap<String, TrackActivity> = BTreeMap::new();
    for entry in index.entries_in_month(&month) {
        let activity = by_track_type.entry(entry.track_type_id.clone()).or_default();
        activity.count += 1;
        activity.distinct_dates.insert(entry.date.clone());
    }
    MonthActivity { month, by_track_type }
}

/// Entries of a track type dated on or after `since` (inclusive).
pub fn rolling_count(index: &EntryIndex, track_type_id: &str, since: &str) -> usize {
    index.count_since(track_type_id, since)
}

/// Same day one calendar month earlier, clamped to the month's last day.
pub fn past_month_cutoff(today: NaiveDate) -> String {
    date_key(today.checked_sub_months(Months::new(1)).unwrap_or(NaiveDate::MIN))
}

pub fn past_year_cutoff(today: NaiveDate) -> String {
    date_key(today.checked_sub_months(Months::new(12)).unwrap_or(NaiveDate::MIN))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub track_type_id: String,
    pub label: String,
    pub color: String,
    pub past_month: usize,
    pub past_year: usize,
}

pub fn build_activity_summary(index: &EntryIndex) -> Vec<ActivitySummary> {
    build_activity_summary_at(Local::now().date_naive(), index)
}

pub fn build_activity_summary_at(today: NaiveDate, index: &EntryIndex) -> Vec<ActivitySummary> {
    let month_cutoff = past_month_cutoff(today);
    let year_cutoff = past_year_cutoff(today);
    index
        .track_types()
        .iter()
        .map(|track_type| ActivitySummary {
            track_type_id: track_type.id.clone(),
            label: track_type.label.clone(),
            color: track_type.color.clone(),
            past_month: rolling_count(index, &track_type.id, &month_cutoff),
            past_year: rolling_count(index, &track_type.id, &year_cutoff),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayCell {
    pub date: String,
    pub day: u32,
    pub in_month: bool,
    pub is_today: bool,
    pub entry_count: usize,
    pub badges: DayBadges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthCalendar {
    pub month: String,
    pub weekdays: Vec<String>,
    pub days: Vec<DayCell>,
}

pub fn build_month_calendar(index: &EntryIndex, calendar: &Calendar, month: NaiveDate, badge_cap: usize) -> MonthCalendar {
    build_month_calendar_at(Local::now().date_naive(), index, calendar, month, badge_cap)
}

pub fn build_month_calendar_at(
    today: NaiveDate,
    index: &EntryIndex,
    calendar: &Calendar,
    month: NaiveDate,
    badge_cap: usize,
) -> MonthCalendar {
    let month = start_of_month(month);
    let days = calendar
        .month_grid(month)
        .into_iter()
        .map(|day| {
            let key = date_key(day);
            DayCell {
                day: day.day(),
                in_month: start_of_month(day) == month,
                is_today: day == today,
                entry_count: index.entries_on(&key).len(),
                badges: day_badges(index, &key, badge_cap),
                date: key,
            }
        })
        .collect();

    MonthCalendar {
        month: month_key(month),
        weekdays: calendar.weekday_labels().iter().map(ToString::to_string).collect(),
        days,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineView {
    pub months: Vec<MonthActivity>,
    pub can_extend_backward: bool,
    pub state: WindowState,
    pub scroll_to: Option<String>,
}

/// Year-view rows for every loaded month. `scroll_to` is whatever the caller
/// took from the window's one-shot signal.
pub fn build_timeline(index: &EntryIndex, window: &TimelineWindow, scroll_to: Option<NaiveDate>) -> TimelineView {
    TimelineView {
        months: window
            .months()
            .into_iter()
            .map(|month| month_activity(index, month))
            .collect(),
        can_extend_backward: window.can_extend_backward(),
        state: window.state(),
        scroll_to: scroll_to.map(month_key),
    }
}
