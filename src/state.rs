use crate::calendar::{Calendar, parse_date};
use crate::config::Config;
use crate::coordinator::MutationCoordinator;
use crate::errors::ParseError;
use crate::index::EntryIndex;
use crate::timeline::TimelineWindow;
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<MutationCoordinator>,
    pub timeline: Arc<Mutex<Option<TimelineWindow>>>,
    pub calendar: Calendar,
    pub badge_cap: usize,
}

impl AppState {
    pub fn new(coordinator: Arc<MutationCoordinator>, config: &Config) -> Self {
        Self {
            coordinator,
            timeline: Arc::new(Mutex::new(None)),
            calendar: config.calendar(),
            badge_cap: config.badge_cap,
        }
    }

    /// Forgets the scroll window, e.g. after the signed-in user changed.
    pub async fn reset_timeline(&self) {
        *self.timeline.lock().await = None;
    }

    /// Runs `f` with the current index and a timeline window that is built
    /// on first use and afterwards re-anchored to `today` and widened to
    /// cover the oldest entry.
    pub async fn with_timeline<T>(
        &self,
        today: NaiveDate,
        f: impl FnOnce(&EntryIndex, &mut TimelineWindow) -> T,
    ) -> Result<T, ParseError> {
        let mut timeline = self.timeline.lock().await;
        self.coordinator
            .read(|index| {
                let earliest = index.earliest_date().map(parse_date).transpose()?;
                let window = match timeline.take() {
                    Some(mut window) => {
                        window.reanchor(today);
                        if let Some(earliest) = earliest {
                            window.include_history(earliest);
                        }
                        window
                    }
                    None => TimelineWindow::new(today, earliest, None),
                };
                Ok(f(index, timeline.insert(window)))
            })
            .await
    }
}
