use crate::calendar::{month_key, parse_date, parse_month};
use crate::coordinator::{LoadState, TrackTypeDeletion};
use crate::errors::{AppError, TrackerError};
use crate::models::{
    DeleteResponse, EntriesQuery, Entry, EntryPatch, ExportSnapshot, ExtendResponse, NewEntry, NewTrackType,
    SessionRequest, StatusResponse, TargetMonthRequest, TrackType, TrackTypePatch, UserId,
};
use crate::state::AppState;
use crate::stats::{build_activity_summary_at, build_month_calendar_at, build_timeline, ActivitySummary, MonthCalendar, TimelineView};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Local, NaiveDate};

pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SessionRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let user_id = payload.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::bad_request("userId must not be empty"));
    }

    state.reset_timeline().await;
    state.coordinator.sign_in(user_id).await?;
    Ok(Json(status(&state).await))
}

pub async fn sign_out(State(state): State<AppState>) -> StatusCode {
    state.coordinator.sign_out().await;
    state.reset_timeline().await;
    StatusCode::NO_CONTENT
}

pub async fn reload(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    state.coordinator.load().await?;
    Ok(Json(status(&state).await))
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(status(&state).await)
}

pub async fn list_entries(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<Vec<Entry>>, AppError> {
    signed_in(&state).await?;
    let entries = match (query.date, query.month) {
        (Some(_), Some(_)) => return Err(AppError::bad_request("pass either date or month, not both")),
        (Some(date), None) => {
            parse_date(&date)?;
            state.coordinator.read(|index| index.entries_on(&date).to_vec()).await
        }
        (None, Some(month)) => {
            let month = month_key(parse_month(&month)?);
            state
                .coordinator
                .read(|index| index.entries_in_month(&month).cloned().collect())
                .await
        }
        (None, None) => state.coordinator.read(|index| index.entries().cloned().collect()).await,
    };
    Ok(Json(entries))
}

pub async fn create_entry(
    State(state): State<AppState>,
    Json(payload): Json<NewEntry>,
) -> Result<(StatusCode, Json<Entry>), AppError> {
    let entry = state.coordinator.add_entry(payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<EntryPatch>,
) -> Result<Json<Entry>, AppError> {
    Ok(Json(state.coordinator.update_entry(&id, patch).await?))
}

pub async fn delete_entry(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    state.coordinator.delete_entry(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_track_types(State(state): State<AppState>) -> Result<Json<Vec<TrackType>>, AppError> {
    signed_in(&state).await?;
    Ok(Json(state.coordinator.read(|index| index.track_types().to_vec()).await))
}

pub async fn create_track_type(
    State(state): State<AppState>,
    Json(payload): Json<NewTrackType>,
) -> Result<(StatusCode, Json<TrackType>), AppError> {
    let track_type = state.coordinator.add_track_type(payload).await?;
    Ok((StatusCode::CREATED, Json(track_type)))
}

pub async fn update_track_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TrackTypePatch>,
) -> Result<Json<TrackType>, AppError> {
    Ok(Json(state.coordinator.update_track_type(&id, patch).await?))
}

pub async fn delete_track_type(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let deleted = match state.coordinator.delete_track_type(&id).await? {
        TrackTypeDeletion::Deleted => true,
        TrackTypeDeletion::KeptLastTrackType => false,
    };
    Ok(Json(DeleteResponse { deleted }))
}

pub async fn get_calendar(
    State(state): State<AppState>,
    Path(month): Path<String>,
) -> Result<Json<MonthCalendar>, AppError> {
    signed_in(&state).await?;
    let month = parse_month(&month)?;
    let today = today();
    let view = state
        .coordinator
        .read(|index| build_month_calendar_at(today, index, &state.calendar, month, state.badge_cap))
        .await;
    Ok(Json(view))
}

pub async fn get_timeline(State(state): State<AppState>) -> Result<Json<TimelineView>, AppError> {
    signed_in(&state).await?;
    let view = state
        .with_timeline(today(), |index, window| {
            let scroll_to = window.take_scroll_target();
            build_timeline(index, window, scroll_to)
        })
        .await
        .map_err(AppError::internal)?;
    Ok(Json(view))
}

pub async fn extend_timeline(State(state): State<AppState>) -> Result<Json<ExtendResponse>, AppError> {
    signed_in(&state).await?;
    let response = state
        .with_timeline(today(), |index, window| {
            let extension = window.extend_backward();
            let scroll_to = window.take_scroll_target();
            ExtendResponse {
                extension,
                timeline: build_timeline(index, window, scroll_to),
            }
        })
        .await
        .map_err(AppError::internal)?;
    Ok(Json(response))
}

pub async fn settle_timeline(State(state): State<AppState>) -> Result<Json<TimelineView>, AppError> {
    signed_in(&state).await?;
    let view = state
        .with_timeline(today(), |index, window| {
            window.finish_extension();
            build_timeline(index, window, None)
        })
        .await
        .map_err(AppError::internal)?;
    Ok(Json(view))
}

pub async fn target_timeline(
    State(state): State<AppState>,
    Json(payload): Json<TargetMonthRequest>,
) -> Result<Json<ExtendResponse>, AppError> {
    signed_in(&state).await?;
    let target = parse_month(payload.month.trim())?;
    let response = state
        .with_timeline(today(), |index, window| {
            let extension = window.retarget(target);
            let scroll_to = window.take_scroll_target();
            ExtendResponse {
                extension,
                timeline: build_timeline(index, window, scroll_to),
            }
        })
        .await
        .map_err(AppError::internal)?;
    Ok(Json(response))
}

pub async fn get_activities(State(state): State<AppState>) -> Result<Json<Vec<ActivitySummary>>, AppError> {
    signed_in(&state).await?;
    let today = today();
    let summary = state
        .coordinator
        .read(|index| build_activity_summary_at(today, index))
        .await;
    Ok(Json(summary))
}

pub async fn export(State(state): State<AppState>) -> Result<Json<ExportSnapshot>, AppError> {
    signed_in(&state).await?;
    Ok(Json(state.coordinator.export().await))
}

async fn signed_in(state: &AppState) -> Result<UserId, AppError> {
    Ok(state.coordinator.session().await.ok_or(TrackerError::NotAuthenticated)?)
}

async fn status(state: &AppState) -> StatusResponse {
    let load_state = state.coordinator.load_state().await;
    let (entry_count, track_type_count) = state
        .coordinator
        .read(|index| (index.len(), index.track_types().len()))
        .await;
    StatusResponse {
        user_id: state.coordinator.session().await,
        load_state: load_state.label().to_string(),
        error: match load_state {
            LoadState::Failed(message) => Some(message),
            _ => None,
        },
        entry_count,
        track_type_count,
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
