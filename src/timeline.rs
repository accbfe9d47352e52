use crate::calendar::{months_between, parse_date, shift_months, start_of_month};
use crate::errors::ParseError;
use crate::index::EntryIndex;
use chrono::NaiveDate;
use serde::Serialize;

pub const MONTHS_PER_PAGE: i32 = 12;
pub const MAX_YEARS_BACK: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowState {
    Idle,
    Extending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Extension {
    Extended { added: usize },
    /// A previous extension has not been settled by the view yet.
    Busy,
    AtLimit,
}

/// The contiguous run of months a scrolling calendar has materialized,
/// ending at the current month and growing only backwards.
///
/// Prepending never reorders months that are already loaded; the view keeps
/// its place by restoring `old_top + (new_height - old_height)` after
/// re-rendering and then calling [`TimelineWindow::finish_extension`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineWindow {
    earliest: NaiveDate,
    current: NaiveDate,
    state: WindowState,
    scroll_target: Option<NaiveDate>,
}

impl TimelineWindow {
    /// Starts one page before the earlier of the oldest entry's month and
    /// `target`, so a deep-linked month is on screen without loading more.
    pub fn new(today: NaiveDate, earliest_entry: Option<NaiveDate>, target: Option<NaiveDate>) -> Self {
        let current = start_of_month(today);
        let anchor = [Some(current), earliest_entry, target]
            .into_iter()
            .flatten()
            .map(start_of_month)
            .min()
            .unwrap_or(current);

        let mut window = Self {
            earliest: current,
            current,
            state: WindowState::Idle,
            scroll_target: None,
        };
        window.earliest = window.clamp_to_limit(shift_months(anchor, -MONTHS_PER_PAGE));
        window.scroll_target = target.map(|month| window.clamp_to_loaded(month));
        window
    }

    pub fn from_index(index: &EntryIndex, today: NaiveDate, target: Option<NaiveDate>) -> Result<Self, ParseError> {
        let earliest_entry = index.earliest_date().map(parse_date).transpose()?;
        Ok(Self::new(today, earliest_entry, target))
    }

    pub fn earliest_month(&self) -> NaiveDate {
        self.earliest
    }

    pub fn current_month(&self) -> NaiveDate {
        self.current
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    /// Loaded month starts, oldest first, ending at the current month.
    pub fn months(&self) -> Vec<NaiveDate> {
        (0..self.len())
            .map(|offset| shift_months(self.earliest, offset as i32))
            .collect()
    }

    pub fn len(&self) -> usize {
        usize::try_from(months_between(self.earliest, self.current) + 1).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, month: NaiveDate) -> bool {
        let month = start_of_month(month);
        self.earliest <= month && month <= self.current
    }

    /// Oldest month the window may ever reach.
    pub fn limit(&self) -> NaiveDate {
        shift_months(self.current, -MAX_YEARS_BACK * 12)
    }

    pub fn can_extend_backward(&self) -> bool {
        self.earliest > self.limit()
    }

    /// Prepends one page of months. Repeated triggers while the previous
    /// extension is unsettled, or at the limit, change nothing.
    pub fn extend_backward(&mut self) -> Extension {
        if self.state == WindowState::Extending {
            return Extension::Busy;
        }
        if !self.can_extend_backward() {
            return Extension::AtLimit;
        }
        let added = self.prepend_pages(1);
        self.state = WindowState::Extending;
        Extension::Extended { added }
    }

    /// Called by the view once it has re-rendered and restored its scroll offset.
    pub fn finish_extension(&mut self) {
        self.state = WindowState::Idle;
    }

    /// Makes sure `target`'s month is loaded, prepending whole pages if
    /// needed, and arms the one-shot scroll signal for it. A target inside
    /// the window reports `Extended { added: 0 }`. A target that would need
    /// more months while an extension is unsettled reports `Busy` and
    /// changes nothing.
    pub fn retarget(&mut self, target: NaiveDate) -> Extension {
        let month = self.clamp_to_limit(start_of_month(target)).min(self.current);
        if month >= self.earliest {
            self.scroll_target = Some(month);
            return Extension::Extended { added: 0 };
        }
        if self.state == WindowState::Extending {
            return Extension::Busy;
        }
        let missing = months_between(month, self.earliest);
        let pages = (missing + MONTHS_PER_PAGE - 1) / MONTHS_PER_PAGE;
        let added = self.prepend_pages(pages);
        self.state = WindowState::Extending;
        self.scroll_target = Some(month);
        Extension::Extended { added }
    }

    /// Consumes the pending scroll signal. A second call returns `None`.
    pub fn take_scroll_target(&mut self) -> Option<NaiveDate> {
        self.scroll_target.take()
    }

    pub fn pending_scroll_target(&self) -> Option<NaiveDate> {
        self.scroll_target
    }

    /// Moves the anchor forward when the real month has rolled over since
    /// the window was built. Returns true when it moved.
    pub fn reanchor(&mut self, today: NaiveDate) -> bool {
        let month = start_of_month(today);
        if month <= self.current {
            return false;
        }
        self.current = month;
        true
    }

    /// Widens the window after a reload surfaced an older entry, keeping one
    /// page of lead-in before it. Never shrinks.
    pub fn include_history(&mut self, earliest_entry: NaiveDate) {
        let wanted = self.clamp_to_limit(shift_months(earliest_entry, -MONTHS_PER_PAGE));
        if wanted < self.earliest {
            self.earliest = wanted;
        }
    }

    fn prepend_pages(&mut self, pages: i32) -> usize {
        let previous = self.earliest;
        self.earliest = self.clamp_to_limit(shift_months(previous, -MONTHS_PER_PAGE * pages));
        usize::try_from(months_between(self.earliest, previous)).unwrap_or(0)
    }

    fn clamp_to_limit(&self, month: NaiveDate) -> NaiveDate {
        month.max(self.limit())
    }

    fn clamp_to_loaded(&self, month: NaiveDate) -> NaiveDate {
        start_of_month(month).clamp(self.earliest, self.current)
    }
}
