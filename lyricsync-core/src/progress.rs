//! Progress counters and log of a bulk lyrics sync run.

/// Value of `completed` while no run is in flight
pub const IDLE: i64 = -1;

const SUCCESS_MARKER: &str = "\u{2705}";
const FAILURE_MARKER: &str = "\u{274C}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Success,
    Failure,
}

/// One line of the sync log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLogEntry {
    pub status: SyncStatus,
    pub artist: String,
    pub title: String,
    pub reason: Option<String>,
}

impl SyncLogEntry {
    pub fn success(artist: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Success,
            artist: artist.into(),
            title: title.into(),
            reason: None,
        }
    }

    pub fn failure(
        artist: impl Into<String>,
        title: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: SyncStatus::Failure,
            artist: artist.into(),
            title: title.into(),
            reason: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn render(&self) -> String {
        match (self.status, &self.reason) {
            (SyncStatus::Success, _) | (SyncStatus::Failure, None) => {
                format!("{} {} - {}", self.marker(), self.artist, self.title)
            }
            (SyncStatus::Failure, Some(reason)) => {
                format!("{} {} - {}: {}", self.marker(), self.artist, self.title, reason)
            }
        }
    }

    const fn marker(&self) -> &'static str {
        match self.status {
            SyncStatus::Success => SUCCESS_MARKER,
            SyncStatus::Failure => FAILURE_MARKER,
        }
    }
}

/// Outcome of a finished run, delivered through the completion signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

/// Counters and log shared between the aggregation task and pollers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub completed: i64,
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub log: Vec<SyncLogEntry>,
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self {
            completed: IDLE,
            total: 0,
            success: 0,
            failure: 0,
            log: Vec::new(),
        }
    }
}

impl SyncProgress {
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.completed != IDLE
    }

    /// Reset counters for a run over `total` tracks
    pub fn start(&mut self, total: usize) {
        self.completed = 0;
        self.total = total;
        self.success = 0;
        self.failure = 0;
        self.log.clear();
    }

    pub fn track_completed(&mut self) {
        self.completed += 1;
    }

    pub fn record(&mut self, entry: SyncLogEntry) {
        match entry.status {
            SyncStatus::Success => self.success += 1,
            SyncStatus::Failure => self.failure += 1,
        }
        self.log.push(entry);
    }

    /// Return to idle, yielding the counters of the finished run
    pub fn finish(&mut self) -> SyncSummary {
        let summary = self.summary();
        *self = Self::default();
        summary
    }

    #[must_use]
    pub const fn summary(&self) -> SyncSummary {
        SyncSummary {
            total: self.total,
            success: self.success,
            failure: self.failure,
        }
    }

    /// Render the log newest first, one entry per line
    #[must_use]
    pub fn render_log(&self) -> String {
        self.log
            .iter()
            .rev()
            .map(SyncLogEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
