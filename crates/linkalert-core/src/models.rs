use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A normalized `domain + path` referring URL, e.g. `"site.com/blog/2012/01"`.
pub type CandidateLink = String;

/// Tracked profiles: profile id → display name.
pub type ProfileNames = BTreeMap<String, String>;

/// Newly discovered links for one run, grouped by profile id.
pub type RunResult = BTreeMap<String, Vec<CandidateLink>>;

/// One aggregated traffic row as returned by the analytics provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrafficRow {
    pub source_domain: String,
    pub referral_path: String,
    pub visit_count: u64,
}

impl RawTrafficRow {
    pub fn new(
        source_domain: impl Into<String>,
        referral_path: impl Into<String>,
        visit_count: u64,
    ) -> Self {
        Self {
            source_domain: source_domain.into(),
            referral_path: referral_path.into(),
            visit_count,
        }
    }
}

/// Inclusive date range queried in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    /// Compute the window for a run happening on `today`.
    ///
    /// The window always ends yesterday. A missing checkpoint starts the window
    /// `bootstrap_days` before today. Returns `None` when the window would be
    /// empty (checkpoint later than yesterday). A bootstrap reaching past the
    /// earliest representable date starts there instead.
    pub fn for_run(
        checkpoint: Option<NaiveDate>,
        today: NaiveDate,
        bootstrap_days: u32,
    ) -> Option<Self> {
        let start = checkpoint.unwrap_or_else(|| {
            today
                .checked_sub_days(Days::new(u64::from(bootstrap_days)))
                .unwrap_or(NaiveDate::MIN)
        });
        let end = today.checked_sub_days(Days::new(1))?;
        (end >= start).then_some(Self { start, end })
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Per-recipient outcome of one notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    /// (recipient, error message)
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A profile whose discovery failed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileFailure {
    pub profile_id: String,
    pub error: String,
    pub retryable: bool,
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Nothing to do: the window is empty or no profiles are tracked.
    Skipped,
    /// Every profile succeeded and the checkpoint advanced.
    Completed,
    /// At least one profile failed; the checkpoint was left untouched.
    PartiallyFailed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Skipped => "skipped",
            RunStatus::Completed => "completed",
            RunStatus::PartiallyFailed => "partially_failed",
        }
    }
}

/// Outcome of one coordinator execution.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub window: Option<Window>,
    /// Profiles attempted in this run, successful or not.
    pub profiles_processed: usize,
    pub profiles_failed: usize,
    pub total_new_links: usize,
    pub failures: Vec<ProfileFailure>,
    /// Present only when a digest was sent.
    pub delivery: Option<DeliveryReport>,
    /// The checkpoint stored at the end of the run, if it was advanced.
    pub checkpoint_advanced_to: Option<NaiveDate>,
}

impl RunSummary {
    pub fn skipped(run_id: Uuid, window: Option<Window>) -> Self {
        Self {
            run_id,
            status: RunStatus::Skipped,
            window,
            profiles_processed: 0,
            profiles_failed: 0,
            total_new_links: 0,
            failures: Vec::new(),
            delivery: None,
            checkpoint_advanced_to: None,
        }
    }

    pub fn profiles_succeeded(&self) -> usize {
        self.profiles_processed - self.profiles_failed
    }
}
