use crate::models::{Entry, TrackType};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// In-memory snapshot of one user's entries and track types.
///
/// Entries are bucketed by date key, so iteration is always ascending by
/// date and, within a day, in the order entries arrived. Date keys are
/// zero-padded, which makes string order and calendar order the same.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    by_date: BTreeMap<String, Vec<Entry>>,
    dates_by_id: HashMap<String, String>,
    by_track_type: HashMap<String, BTreeSet<(String, String)>>,
    track_types: Vec<TrackType>,
}

impl EntryIndex {
    /// Builds a fresh index. Nothing from any previous snapshot survives.
    pub fn from_snapshot(entries: Vec<Entry>, track_types: Vec<TrackType>) -> Self {
        let mut index = Self {
            track_types,
            ..Self::default()
        };
        for entry in entries {
            index.insert_entry(entry);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.dates_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates_by_id.is_empty()
    }

    /// All entries, ascending by date.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.by_date.values().flatten()
    }

    pub fn entry(&self, id: &str) -> Option<&Entry> {
        let date = self.dates_by_id.get(id)?;
        self.by_date.get(date)?.iter().find(|entry| entry.id == id)
    }

    pub fn entries_on(&self, date_key: &str) -> &[Entry] {
        self.by_date.get(date_key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Entries whose date key starts with `month_key` (`YYYY-MM`).
    pub fn entries_in_month<'a>(&'a self, month_key: &'a str) -> impl Iterator<Item = &'a Entry> {
        self.by_date
            .range::<str, _>((Bound::Included(month_key), Bound::Unbounded))
            .take_while(move |(date, _)| date.starts_with(month_key))
            .flat_map(|(_, entries)| entries)
    }

    /// Entries dated on or after `since`.
    pub fn entries_since<'a>(&'a self, since: &str) -> impl Iterator<Item = &'a Entry> {
        self.by_date
            .range::<str, _>((Bound::Included(since), Bound::Unbounded))
            .flat_map(|(_, entries)| entries)
    }

    pub fn entries_for_track_type<'a>(&'a self, track_type_id: &str) -> impl Iterator<Item = &'a Entry> {
        self.by_track_type
            .get(track_type_id)
            .into_iter()
            .flatten()
            .filter_map(|(_, id)| self.entry(id))
    }

    /// Number of entries of one track type dated on or after `since`.
    pub fn count_since(&self, track_type_id: &str, since: &str) -> usize {
        self.by_track_type.get(track_type_id).map_or(0, |keys| {
            keys.range((since.to_string(), String::new())..).count()
        })
    }

    pub fn earliest_date(&self) -> Option<&str> {
        self.by_date.keys().next().map(String::as_str)
    }

    pub fn track_types(&self) -> &[TrackType] {
        &self.track_types
    }

    pub fn track_type(&self, id: &str) -> Option<&TrackType> {
        self.track_types.iter().find(|track_type| track_type.id == id)
    }

    /// Adds an entry after any others already on the same day. An entry with
    /// the same id is replaced instead.
    pub fn insert_entry(&mut self, entry: Entry) {
        if self.dates_by_id.contains_key(&entry.id) {
            self.replace_entry(entry);
            return;
        }
        self.link(&entry);
        self.by_date.entry(entry.date.clone()).or_default().push(entry);
    }

    /// Swaps in a new version of an existing entry. It keeps its slot when the
    /// date is unchanged and moves to the end of its new day otherwise.
    /// Returns false when the id was unknown, in which case it is inserted.
    pub fn replace_entry(&mut self, entry: Entry) -> bool {
        let Some(old_date) = self.dates_by_id.get(&entry.id).cloned() else {
            self.insert_entry(entry);
            return false;
        };

        if old_date == entry.date {
            let previous = self
                .by_date
                .get_mut(&old_date)
                .and_then(|day| day.iter_mut().find(|existing| existing.id == entry.id))
                .map(|slot| std::mem::replace(slot, entry.clone()));
            if let Some(previous) = previous {
                self.unlink(&previous);
                self.link(&entry);
                return true;
            }
        }

        self.remove_entry(&entry.id);
        self.insert_entry(entry);
        true
    }

    pub fn remove_entry(&mut self, id: &str) -> Option<Entry> {
        let date = self.dates_by_id.get(id)?.clone();
        let day = self.by_date.get_mut(&date)?;
        let position = day.iter().position(|entry| entry.id == id)?;
        let removed = day.remove(position);
        if day.is_empty() {
            self.by_date.remove(&date);
        }
        self.unlink(&removed);
        Some(removed)
    }

    pub fn push_track_type(&mut self, track_type: TrackType) {
        if !self.replace_track_type(track_type.clone()) {
            self.track_types.push(track_type);
        }
    }

    pub fn replace_track_type(&mut self, track_type: TrackType) -> bool {
        match self.track_types.iter_mut().find(|existing| existing.id == track_type.id) {
            Some(slot) => {
                *slot = track_type;
                true
            }
            None => false,
        }
    }

    pub fn remove_track_type(&mut self, id: &str) -> Option<TrackType> {
        let position = self.track_types.iter().position(|track_type| track_type.id == id)?;
        Some(self.track_types.remove(position))
    }

    fn link(&mut self, entry: &Entry) {
        self.dates_by_id.insert(entry.id.clone(), entry.date.clone());
        self.by_track_type
            .entry(entry.track_type_id.clone())
            .or_default()
            .insert((entry.date.clone(), entry.id.clone()));
    }

    fn unlink(&mut self, entry: &Entry) {
        self.dates_by_id.remove(&entry.id);
        if let Some(keys) = self.by_track_type.get_mut(&entry.track_type_id) {
            keys.remove(&(entry.date.clone(), entry.id.clone()));
            if keys.is_empty() {
                self.by_track_type.remove(&entry.track_type_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewEntry;

    fn entry(id: &str, date: &str, track_type_id: &str) -> Entry {
        NewEntry::new(date, track_type_id).into_entry(id.to_string())
    }

    fn ids<'a>(entries: impl Iterator<Item = &'a Entry>) -> Vec<&'a str> {
        entries.map(|entry| entry.id.as_str()).collect()
    }

    fn sample() -> EntryIndex {
        EntryIndex::from_snapshot(
            vec![
                entry("3", "2024-02-01", "A"),
                entry("1", "2024-01-05", "A"),
                entry("2", "2024-01-05", "B"),
                entry("4", "2023-12-31", "B"),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn iterates_in_date_order() {
        let index = sample();
        assert_eq!(ids(index.entries()), ["4", "1", "2", "3"]);
        assert_eq!(index.earliest_date(), Some("2023-12-31"));
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn lookups_by_day_month_and_since() {
        let index = sample();
        assert_eq!(ids(index.entries_on("2024-01-05").iter()), ["1", "2"]);
        assert!(index.entries_on("2024-01-06").is_empty());
        assert_eq!(ids(index.entries_in_month("2024-01")), ["1", "2"]);
        assert_eq!(ids(index.entries_since("2024-01-05")), ["1", "2", "3"]);
        assert_eq!(ids(index.entries_for_track_type("A")), ["1", "3"]);
        assert_eq!(index.count_since("B", "2024-01-01"), 1);
        assert_eq!(index.count_since("B", "0000-00-00"), 2);
        assert_eq!(index.count_since("missing", "0000-00-00"), 0);
    }

    #[test]
    fn replace_keeps_slot_on_same_day() {
        let mut index = sample();
        let mut updated = entry("1", "2024-01-05", "C");
        updated.note = Some("edited".into());
        assert!(index.replace_entry(updated));
        assert_eq!(ids(index.entries_on("2024-01-05").iter()), ["1", "2"]);
        assert_eq!(index.count_since("A", "0000-00-00"), 1);
        assert_eq!(index.count_since("C", "0000-00-00"), 1);
    }

    #[test]
    fn replace_moves_entry_between_days() {
        let mut index = sample();
        index.replace_entry(entry("1", "2024-03-01", "A"));
        assert_eq!(ids(index.entries_on("2024-01-05").iter()), ["2"]);
        assert_eq!(ids(index.entries()), ["4", "2", "3", "1"]);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn remove_cleans_every_lookup() {
        let mut index = sample();
        assert!(index.remove_entry("4").is_some());
        assert!(index.remove_entry("4").is_none());
        assert_eq!(index.earliest_date(), Some("2024-01-05"));
        assert!(index.entry("4").is_none());
        assert_eq!(index.count_since("B", "0000-00-00"), 1);
    }

    #[test]
    fn snapshot_replaces_prior_state() {
        let index = sample();
        assert!(index.entry("1").is_some());
        let index = EntryIndex::from_snapshot(vec![entry("9", "2025-01-01", "Z")], Vec::new());
        assert_eq!(ids(index.entries()), ["9"]);
        assert!(index.entry("1").is_none());
    }
}
