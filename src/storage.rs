use crate::models::{Entry, EntryPatch, NewEntry, NewTrackType, TrackType, TrackTypePatch, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("{0}")]
    Backend(String),
}

/// Row storage scoped per user. Every call names the user it acts for and
/// must only ever touch that user's rows.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Entries ordered by date ascending.
    async fn fetch_entries(&self, user_id: &str) -> Result<Vec<Entry>, StoreError>;

    async fn fetch_track_types(&self, user_id: &str) -> Result<Vec<TrackType>, StoreError>;

    async fn create_entry(&self, user_id: &str, entry: NewEntry) -> Result<Entry, StoreError>;

    async fn patch_entry(&self, user_id: &str, id: &str, patch: &EntryPatch) -> Result<Entry, StoreError>;

    /// Succeeds whether or not the row existed.
    async fn delete_entry(&self, user_id: &str, id: &str) -> Result<(), StoreError>;

    async fn create_track_type(&self, user_id: &str, track_type: NewTrackType) -> Result<TrackType, StoreError>;

    async fn patch_track_type(&self, user_id: &str, id: &str, patch: &TrackTypePatch) -> Result<TrackType, StoreError>;

    /// Also removes the user's entries of that type.
    async fn delete_track_type(&self, user_id: &str, id: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRows {
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub track_types: Vec<TrackType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub users: BTreeMap<UserId, UserRows>,
}

/// A [`RemoteStore`] kept in process and, when given a path, mirrored to a
/// JSON file after every write.
#[derive(Debug)]
pub struct LocalStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::with_data(StoreData::default())
    }

    pub fn with_data(data: StoreData) -> Self {
        Self {
            path: None,
            data: Mutex::new(data),
        }
    }

    pub async fn open(path: PathBuf) -> Result<Self, std::io::Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = load_data(&path).await;
        Ok(Self {
            path: Some(path),
            data: Mutex::new(data),
        })
    }

    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }

    async fn read<T>(&self, user_id: &str, f: impl FnOnce(&UserRows) -> T) -> T {
        let data = self.data.lock().await;
        match data.users.get(user_id) {
            Some(rows) => f(rows),
            None => f(&UserRows::default()),
        }
    }

    /// Applies `f` to a copy of the user's rows and only keeps the result once
    /// it has been written out.
    async fn write<T, F>(&self, user_id: &str, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut UserRows) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let result = f(next.users.entry(user_id.to_string()).or_default())?;
        if let Some(path) = &self.path {
            persist_data(path, &next).await?;
        }
        *data = next;
        Ok(result)
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn fetch_entries(&self, user_id: &str) -> Result<Vec<Entry>, StoreError> {
        let mut entries = self.read(user_id, |rows| rows.entries.clone()).await;
        entries.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(entries)
    }

    async fn fetch_track_types(&self, user_id: &str) -> Result<Vec<TrackType>, StoreError> {
        Ok(self.read(user_id, |rows| rows.track_types.clone()).await)
    }

    async fn create_entry(&self, user_id: &str, entry: NewEntry) -> Result<Entry, StoreError> {
        let created = entry.into_entry(new_id());
        self.write(user_id, |rows| {
            if !rows.track_types.iter().any(|track_type| track_type.id == created.track_type_id) {
                return Err(StoreError::Backend(format!(
                    "track type {} does not exist",
                    created.track_type_id
                )));
            }
            rows.entries.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn patch_entry(&self, user_id: &str, id: &str, patch: &EntryPatch) -> Result<Entry, StoreError> {
        self.write(user_id, |rows| {
            if let Some(track_type_id) = &patch.track_type_id {
                if !rows.track_types.iter().any(|track_type| &track_type.id == track_type_id) {
                    return Err(StoreError::Backend(format!("track type {track_type_id} does not exist")));
                }
            }
            let entry = rows
                .entries
                .iter_mut()
                .find(|entry| entry.id == id)
                .ok_or(StoreError::NotFound)?;
            patch.apply(entry);
            Ok(entry.clone())
        })
        .await
    }

    async fn delete_entry(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        self.write(user_id, |rows| {
            rows.entries.retain(|entry| entry.id != id);
            Ok(())
        })
        .await
    }

    async fn create_track_type(&self, user_id: &str, track_type: NewTrackType) -> Result<TrackType, StoreError> {
        let created = track_type.into_track_type(new_id());
        self.write(user_id, |rows| {
            rows.track_types.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn patch_track_type(&self, user_id: &str, id: &str, patch: &TrackTypePatch) -> Result<TrackType, StoreError> {
        self.write(user_id, |rows| {
            let track_type = rows
                .track_types
                .iter_mut()
                .find(|track_type| track_type.id == id)
                .ok_or(StoreError::NotFound)?;
            patch.apply(track_type);
            Ok(track_type.clone())
        })
        .await
    }

    async fn delete_track_type(&self, user_id: &str, id: &str) -> Result<(), StoreError> {
        self.write(user_id, |rows| {
            rows.track_types.retain(|track_type| track_type.id != id);
            rows.entries.retain(|entry| entry.track_type_id != id);
            Ok(())
        })
        .await
    }
}

fn new_id() -> String {
    Uuid::now_v7().to_string()
}

pub async fn load_data(path: &Path) -> StoreData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to parse data file: {err}");
                StoreData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            StoreData::default()
        }
    }
}

pub async fn persist_data(path: &Path, data: &StoreData) -> Result<(), StoreError> {
    let payload = serde_json::to_vec_pretty(data).map_err(|err| StoreError::Backend(err.to_string()))?;
    fs::write(path, payload).await.map_err(|err| {
        error!(path = %path.display(), "failed to write data file: {err}");
        StoreError::Backend(err.to_string())
    })?;
    debug!(path = %path.display(), users = data.users.len(), "persisted store");
    Ok(())
}
