/// Category checkpoint definitions
///
/// A category moves through `NotStarted -> Paginating -> Done`. Only the page
/// number and the done flag are persisted; `NotStarted` is the absence of a
/// saved state.
use std::fmt;

/// Where a category is in its crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryPhase {
    /// No state has been saved yet
    NotStarted,

    /// Pages are being walked; `pageno` is the next page to process
    Paginating,

    /// Every page was processed
    Done,
}

impl CategoryPhase {
    /// Converts the phase to the string used in statistics output
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Paginating => "paginating",
            Self::Done => "done",
        }
    }

    /// Parses a phase from its string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "paginating" => Some(Self::Paginating),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

impl fmt::Display for CategoryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Resumable progress of one category on one crawl date
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryState {
    pub site: String,
    /// Sanitized category name
    pub category_name: String,
    pub date: String,
    /// Next listing page to process (1-based)
    pub pageno: u32,
    pub done: bool,
}

impl CategoryState {
    /// Creates a fresh state starting at `start_page`
    pub fn new(site: &str, category_name: &str, date: &str, start_page: u32) -> Self {
        Self {
            site: site.to_string(),
            category_name: super::sanitize_name(category_name),
            date: date.to_string(),
            pageno: start_page.max(1),
            done: false,
        }
    }

    /// Moves to the next page after the current one was fully processed
    pub fn advance(&mut self) {
        self.pageno += 1;
    }

    /// Marks the category finished
    pub fn finish(&mut self) {
        self.done = true;
    }

    pub fn phase(&self) -> CategoryPhase {
        if self.done {
            CategoryPhase::Done
        } else {
            CategoryPhase::Paginating
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_starts_paginating() {
        let state = CategoryState::new("acorn", "Outdoor>Tents", "20240105", 1);
        assert_eq!(state.category_name, "Outdoor_Tents");
        assert_eq!(state.pageno, 1);
        assert_eq!(state.phase(), CategoryPhase::Paginating);
    }

    #[test]
    fn test_start_page_is_at_least_one() {
        let state = CategoryState::new("acorn", "Tents", "20240105", 0);
        assert_eq!(state.pageno, 1);
    }

    #[test]
    fn test_advance_and_finish() {
        let mut state = CategoryState::new("acorn", "Tents", "20240105", 3);
        state.advance();
        state.advance();
        assert_eq!(state.pageno, 5);

        state.finish();
        assert!(state.done);
        assert_eq!(state.phase(), CategoryPhase::Done);
    }

    #[test]
    fn test_phase_db_string_round_trip() {
        for phase in [
            CategoryPhase::NotStarted,
            CategoryPhase::Paginating,
            CategoryPhase::Done,
        ] {
            assert_eq!(CategoryPhase::from_db_string(phase.to_db_string()), Some(phase));
        }
        assert_eq!(CategoryPhase::from_db_string("bogus"), None);
    }
}
