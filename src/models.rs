use crate::stats::TimelineView;
use crate::timeline::Extension;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub type UserId = String;

/// Field name -> placeholder value, in the order the user defined them.
pub type MetadataSchema = IndexMap<String, String>;
pub type EntryMetadata = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Count,
    Duration,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[default]
    Minutes,
    Hours,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackType {
    pub id: String,
    pub label: String,
    pub color: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<DurationUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataSchema>,
}

impl TrackType {
    pub fn normalized(mut self) -> Self {
        if self.metadata.as_ref().is_some_and(IndexMap::is_empty) {
            self.metadata = None;
        }
        self
    }

    /// Label for the numeric input of an entry form.
    pub fn value_input_label(&self) -> String {
        match self.value_type {
            ValueType::Duration => match self.duration_unit.unwrap_or_default() {
                DurationUnit::Hours => "Duration (hours)".to_string(),
                DurationUnit::Minutes => "Duration (minutes)".to_string(),
            },
            ValueType::Count => match self.value_unit.as_deref() {
                Some(unit) if !unit.is_empty() => format!("Count ({unit})"),
                _ => "Count".to_string(),
            },
            ValueType::Boolean => "Value".to_string(),
        }
    }

    /// Display form of an entry value, e.g. `30 min` or `5 cigarettes`.
    pub fn format_value(&self, value: f64) -> String {
        match self.value_type {
            ValueType::Duration => {
                let unit = match self.duration_unit.unwrap_or_default() {
                    DurationUnit::Hours => "hr",
                    DurationUnit::Minutes => "min",
                };
                format!("{value} {unit}")
            }
            ValueType::Count => match self.value_unit.as_deref() {
                Some(unit) if !unit.is_empty() => format!("{value} {unit}"),
                _ => value.to_string(),
            },
            ValueType::Boolean => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub date: String,
    pub track_type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

impl Entry {
    pub fn normalized(mut self) -> Self {
        if self.metadata.as_ref().is_some_and(BTreeMap::is_empty) {
            self.metadata = None;
        }
        self
    }

    pub fn display_value(&self, track_type: &TrackType) -> Option<String> {
        self.value.map(|value| track_type.format_value(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub date: String,
    pub track_type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

impl NewEntry {
    pub fn new(date: impl Into<String>, track_type_id: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            track_type_id: track_type_id.into(),
            value: None,
            note: None,
            metadata: None,
        }
    }

    pub fn into_entry(self, id: String) -> Entry {
        Entry {
            id,
            date: self.date,
            track_type_id: self.track_type_id,
            value: self.value,
            note: self.note,
            metadata: self.metadata,
        }
        .normalized()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrackType {
    pub label: String,
    pub color: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<DurationUnit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MetadataSchema>,
}

impl NewTrackType {
    pub fn new(label: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: color.into(),
            value_type: ValueType::default(),
            value_unit: None,
            duration_unit: None,
            metadata: None,
        }
    }

    pub fn into_track_type(self, id: String) -> TrackType {
        TrackType {
            id,
            label: self.label,
            color: self.color,
            value_type: self.value_type,
            value_unit: self.value_unit,
            duration_unit: self.duration_unit,
            metadata: self.metadata,
        }
        .normalized()
    }
}

/// Distinguishes an explicit `null` (`Some(None)`) from an omitted field (`None`).
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update of an entry. Outer `None` leaves a field alone; for the
/// optional fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_type_id: Option<String>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub note: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Option<EntryMetadata>>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.date.is_none()
            && self.track_type_id.is_none()
            && self.value.is_none()
            && self.note.is_none()
            && self.metadata.is_none()
    }

    pub fn apply(&self, entry: &mut Entry) {
        if let Some(date) = &self.date {
            entry.date.clone_from(date);
        }
        if let Some(track_type_id) = &self.track_type_id {
            entry.track_type_id.clone_from(track_type_id);
        }
        if let Some(value) = self.value {
            entry.value = value;
        }
        if let Some(note) = &self.note {
            entry.note.clone_from(note);
        }
        if let Some(metadata) = &self.metadata {
            entry.metadata = metadata.clone().filter(|map| !map.is_empty());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackTypePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value_unit: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<Option<DurationUnit>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Option<MetadataSchema>>,
}

impl TrackTypePatch {
    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.color.is_none()
            && self.value_type.is_none()
            && self.value_unit.is_none()
            && self.duration_unit.is_none()
            && self.metadata.is_none()
    }

    pub fn apply(&self, track_type: &mut TrackType) {
        if let Some(label) = &self.label {
            track_type.label.clone_from(label);
        }
        if let Some(color) = &self.color {
            track_type.color.clone_from(color);
        }
        if let Some(value_type) = self.value_type {
            track_type.value_type = value_type;
        }
        if let Some(value_unit) = &self.value_unit {
            track_type.value_unit.clone_from(value_unit);
        }
        if let Some(duration_unit) = self.duration_unit {
            track_type.duration_unit = duration_unit;
        }
        if let Some(metadata) = &self.metadata {
            track_type.metadata = metadata.clone().filter(|map| !map.is_empty());
        }
    }
}

/// Serialized form consumed by the export-to-file collaborator. Field names
/// must stay stable for re-import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub entries: Vec<Entry>,
    pub track_types: Vec<TrackType>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct TargetMonthRequest {
    pub month: String,
}

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    pub date: Option<String>,
    pub month: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub user_id: Option<UserId>,
    pub load_state: String,
    pub error: Option<String>,
    pub entry_count: usize,
    pub track_type_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct ExtendResponse {
    pub extension: Extension,
    pub timeline: TimelineView,
}
