use crate::calendar::parse_date;
use crate::errors::TrackerError;
use crate::index::EntryIndex;
use crate::models::{
    Entry, EntryPatch, ExportSnapshot, NewEntry, NewTrackType, TrackType, TrackTypePatch, UserId,
};
use crate::storage::{RemoteStore, StoreError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Labels of the track types an earlier release seeded for every new user.
pub const LEGACY_TRACK_TYPE_LABELS: [&str; 3] = ["Drinking", "Smoking", "Workout"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

impl LoadState {
    pub fn label(&self) -> &'static str {
        match self {
            LoadState::Idle => "idle",
            LoadState::Loading => "loading",
            LoadState::Loaded => "loaded",
            LoadState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Another load was already in flight; this call did nothing.
    AlreadyLoading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackTypeDeletion {
    Deleted,
    /// The user's last track type is never removed.
    KeptLastTrackType,
}

/// Owns the signed-in user's cached data and is the only thing that writes
/// to the remote store.
///
/// Mutations are not serialized against each other. Each reads the index
/// when it starts and applies its own result in one write-locked step, so a
/// reader never sees half of an update. Nothing is applied optimistically:
/// the index changes only after the store has accepted the write.
pub struct MutationCoordinator {
    store: Arc<dyn RemoteStore>,
    request_timeout: Duration,
    session: RwLock<Option<UserId>>,
    index: RwLock<EntryIndex>,
    load_state: RwLock<LoadState>,
    loading: AtomicBool,
    track_type_deletion: Mutex<()>,
}

struct BusyFlag<'a>(&'a AtomicBool);

impl Drop for BusyFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MutationCoordinator {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            session: RwLock::new(None),
            index: RwLock::new(EntryIndex::default()),
            load_state: RwLock::new(LoadState::Idle),
            loading: AtomicBool::new(false),
            track_type_deletion: Mutex::new(()),
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub async fn session(&self) -> Option<UserId> {
        self.session.read().await.clone()
    }

    /// Switches to `user_id`, drops whatever was cached for the previous
    /// user and loads the new one.
    pub async fn sign_in(&self, user_id: impl Into<UserId>) -> Result<LoadOutcome, TrackerError> {
        let user_id = user_id.into();
        {
            let mut session = self.session.write().await;
            if session.as_deref() != Some(user_id.as_str()) {
                *self.index.write().await = EntryIndex::default();
                *self.load_state.write().await = LoadState::Idle;
            }
            *session = Some(user_id.clone());
        }
        info!(user_id = %user_id, "signed in");
        self.load().await
    }

    pub async fn sign_out(&self) {
        let mut session = self.session.write().await;
        if let Some(user_id) = session.take() {
            info!(user_id = %user_id, "signed out");
        }
        *self.index.write().await = EntryIndex::default();
        *self.load_state.write().await = LoadState::Idle;
    }

    pub async fn load_state(&self) -> LoadState {
        self.load_state.read().await.clone()
    }

    /// Runs `f` against the current index under a read lock.
    pub async fn read<T>(&self, f: impl FnOnce(&EntryIndex) -> T) -> T {
        f(&*self.index.read().await)
    }

    pub async fn snapshot(&self) -> EntryIndex {
        self.index.read().await.clone()
    }

    /// Fetches entries and track types for the signed-in user and replaces
    /// the index with them. If either fetch fails the previous index stays
    /// as it was and the load state records the failure.
    pub async fn load(&self) -> Result<LoadOutcome, TrackerError> {
        let user_id = self.require_session().await?;
        if self.loading.swap(true, Ordering::AcqRel) {
            debug!(user_id = %user_id, "load already in flight");
            return Ok(LoadOutcome::AlreadyLoading);
        }
        let _busy = BusyFlag(&self.loading);

        let mut user_id = user_id;
        loop {
            *self.load_state.write().await = LoadState::Loading;
            info!(user_id = %user_id, "loading entries and track types");

            let (entries, track_types) = match self.fetch_snapshot(&user_id).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!(user_id = %user_id, "load failed: {err}");
                    *self.load_state.write().await = LoadState::Failed(err.to_string());
                    return Err(TrackerError::Remote(err.to_string()));
                }
            };

            let session = self.session.read().await;
            match session.as_deref() {
                Some(current) if current == user_id => {
                    info!(
                        user_id = %user_id,
                        entries = entries.len(),
                        track_types = track_types.len(),
                        "load finished"
                    );
                    *self.index.write().await = EntryIndex::from_snapshot(entries, track_types);
                    *self.load_state.write().await = LoadState::Loaded;
                    return Ok(LoadOutcome::Loaded);
                }
                // Another account signed in while fetching; its own load
                // collapsed into this one, so fetch again for it.
                Some(current) => {
                    debug!(stale = %user_id, current, "session changed during load, refetching");
                    user_id = current.to_string();
                }
                None => return Err(TrackerError::NotAuthenticated),
            }
        }
    }

    async fn fetch_snapshot(&self, user_id: &str) -> Result<(Vec<Entry>, Vec<TrackType>), StoreError> {
        let (entries, track_types) = tokio::try_join!(
            self.call(self.store.fetch_entries(user_id)),
            self.call(self.store.fetch_track_types(user_id)),
        )?;
        let mut entries: Vec<Entry> = entries.into_iter().map(Entry::normalized).collect();
        let track_types: Vec<TrackType> = track_types.into_iter().map(TrackType::normalized).collect();

        if !is_legacy_seed(&track_types) {
            return Ok((entries, track_types));
        }

        info!(user_id = %user_id, "removing legacy default track types");
        // A failure part way through leaves the earlier deletions in place.
        // The next load then sees fewer than three defaults and keeps the rest.
        for track_type in &track_types {
            match self.call(self.store.delete_track_type(user_id, &track_type.id)).await {
                Ok(()) | Err(StoreError::NotFound) => {
                    info!(user_id = %user_id, id = %track_type.id, label = %track_type.label, "deleted legacy track type");
                }
                Err(err) => {
                    warn!(user_id = %user_id, id = %track_type.id, "legacy track type cleanup stopped: {err}");
                    return Err(err);
                }
            }
        }
        entries.retain(|entry| !track_types.iter().any(|track_type| track_type.id == entry.track_type_id));
        Ok((entries, Vec::new()))
    }

    pub async fn add_entry(&self, entry: NewEntry) -> Result<Entry, TrackerError> {
        let user_id = self.require_session().await?;
        parse_date(&entry.date)?;
        if entry.track_type_id.is_empty() {
            return Err(TrackerError::InvalidInput("entry needs a track type".into()));
        }

        let created = self
            .call(self.store.create_entry(&user_id, entry))
            .await
            .map_err(|err| remote_failure("add entry", err))?;
        debug!(id = %created.id, date = %created.date, "entry created");

        let local = created.clone();
        self.apply(&user_id, move |index| index.insert_entry(local)).await;
        Ok(created)
    }

    /// Fields missing from `patch` stay as they are; `Some(None)` clears one.
    pub async fn update_entry(&self, id: &str, patch: EntryPatch) -> Result<Entry, TrackerError> {
        let user_id = self.require_session().await?;
        if let Some(date) = &patch.date {
            parse_date(date)?;
        }
        if patch.is_empty() {
            return self
                .read(|index| index.entry(id).cloned())
                .await
                .ok_or_else(|| TrackerError::entry_not_found(id));
        }

        let updated = match self.call(self.store.patch_entry(&user_id, id, &patch)).await {
            Ok(entry) => entry.normalized(),
            Err(StoreError::NotFound) => return Err(TrackerError::entry_not_found(id)),
            Err(err) => return Err(remote_failure("update entry", err)),
        };

        let local = updated.clone();
        self.apply(&user_id, move |index| {
            index.replace_entry(local);
        })
        .await;
        Ok(updated)
    }

    /// Deleting an id that is already gone succeeds.
    pub async fn delete_entry(&self, id: &str) -> Result<(), TrackerError> {
        let user_id = self.require_session().await?;
        match self.call(self.store.delete_entry(&user_id, id)).await {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(err) => return Err(remote_failure("delete entry", err)),
        }
        self.apply(&user_id, |index| {
            index.remove_entry(id);
        })
        .await;
        Ok(())
    }

    pub async fn add_track_type(&self, track_type: NewTrackType) -> Result<TrackType, TrackerError> {
        let user_id = self.require_session().await?;
        validate_label(&track_type.label)?;

        let created = self
            .call(self.store.create_track_type(&user_id, track_type))
            .await
            .map_err(|err| remote_failure("add track type", err))?;
        debug!(id = %created.id, label = %created.label, "track type created");

        let local = created.clone();
        self.apply(&user_id, move |index| index.push_track_type(local)).await;
        Ok(created)
    }

    pub async fn update_track_type(&self, id: &str, patch: TrackTypePatch) -> Result<TrackType, TrackerError> {
        let user_id = self.require_session().await?;
        if let Some(label) = &patch.label {
            validate_label(label)?;
        }
        if patch.is_empty() {
            return self
                .read(|index| index.track_type(id).cloned())
                .await
                .ok_or_else(|| TrackerError::track_type_not_found(id));
        }

        let updated = match self.call(self.store.patch_track_type(&user_id, id, &patch)).await {
            Ok(track_type) => track_type.normalized(),
            Err(StoreError::NotFound) => return Err(TrackerError::track_type_not_found(id)),
            Err(err) => return Err(remote_failure("update track type", err)),
        };

        let local = updated.clone();
        self.apply(&user_id, move |index| index.push_track_type(local)).await;
        Ok(updated)
    }

    /// Removes a track type and its entries, unless it is the last one left.
    pub async fn delete_track_type(&self, id: &str) -> Result<TrackTypeDeletion, TrackerError> {
        let user_id = self.require_session().await?;
        let _serialized = self.track_type_deletion.lock().await;

        let remaining = self.read(|index| index.track_types().len()).await;
        if remaining <= 1 {
            info!(user_id = %user_id, id, "refusing to delete the last track type");
            return Ok(TrackTypeDeletion::KeptLastTrackType);
        }

        match self.call(self.store.delete_track_type(&user_id, id)).await {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(err) => return Err(remote_failure("delete track type", err)),
        }

        self.apply(&user_id, |index| {
            index.remove_track_type(id);
            let orphaned: Vec<String> = index
                .entries_for_track_type(id)
                .map(|entry| entry.id.clone())
                .collect();
            for entry_id in orphaned {
                index.remove_entry(&entry_id);
            }
        })
        .await;
        Ok(TrackTypeDeletion::Deleted)
    }

    pub async fn export(&self) -> ExportSnapshot {
        self.export_at(Utc::now()).await
    }

    pub async fn export_at(&self, exported_at: DateTime<Utc>) -> ExportSnapshot {
        self.read(|index| ExportSnapshot {
            entries: index.entries().cloned().collect(),
            track_types: index.track_types().to_vec(),
            exported_at,
        })
        .await
    }

    async fn require_session(&self) -> Result<UserId, TrackerError> {
        self.session.read().await.clone().ok_or(TrackerError::NotAuthenticated)
    }

    /// Applies a confirmed remote change, unless the user signed out or
    /// switched accounts while the request was in flight.
    async fn apply(&self, user_id: &str, f: impl FnOnce(&mut EntryIndex)) {
        let session = self.session.read().await;
        if session.as_deref() != Some(user_id) {
            debug!(user_id, "session changed, dropping remote result");
            return;
        }
        f(&mut *self.index.write().await);
    }

    async fn call<T>(&self, request: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Backend(format!(
                "request timed out after {}ms",
                self.request_timeout.as_millis()
            ))),
        }
    }
}

/// True for exactly the three legacy defaults, in any order, untouched.
fn is_legacy_seed(track_types: &[TrackType]) -> bool {
    if track_types.len() != LEGACY_TRACK_TYPE_LABELS.len() {
        return false;
    }
    let mut labels: Vec<&str> = track_types.iter().map(|track_type| track_type.label.as_str()).collect();
    labels.sort_unstable();
    labels == LEGACY_TRACK_TYPE_LABELS
}

fn validate_label(label: &str) -> Result<(), TrackerError> {
    if label.trim().is_empty() {
        return Err(TrackerError::InvalidInput("track type label must not be empty".into()));
    }
    Ok(())
}

fn remote_failure(action: &'static str, err: StoreError) -> TrackerError {
    warn!(action, "remote call failed: {err}");
    TrackerError::Remote(err.to_string())
}
