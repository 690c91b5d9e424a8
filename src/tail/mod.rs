//! Live tailing of a CI job trace.
//!
//! A tail session repeatedly fetches the full trace of one job through a
//! [`TraceSource`], writes only the bytes that were not shown yet, and stops
//! once the job reaches a terminal status. Everything here is independent of
//! how the job was chosen or how the source talks to the build service.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod emitter;
mod error;
mod fetcher;
mod session;

pub use emitter::Emitter;
pub use error::{FetchError, TailError};
pub use fetcher::{GitLabTraceSource, TraceSource};
pub use session::{tail_job, TailSummary};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_TRANSIENT_RETRIES: u32 = 5;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(500);
const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(8);

/// Numeric job identifier. Always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct JobId(NonZeroU64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job id must be a positive integer, got '{0}'")]
pub struct InvalidJobId(pub String);

impl JobId {
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl TryFrom<u64> for JobId {
    type Error = InvalidJobId;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| InvalidJobId(value.to_string()))
    }
}

impl From<JobId> for u64 {
    fn from(id: JobId) -> Self {
        id.get()
    }
}

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| InvalidJobId(s.to_string()))
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The job being tailed and the project it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReference {
    pub project: String,
    pub job_id: JobId,
}

impl JobReference {
    pub fn new(project: impl Into<String>, job_id: JobId) -> Self {
        Self {
            project: project.into(),
            job_id,
        }
    }
}

impl fmt::Display for JobReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.project, self.job_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    WaitingForResource,
    Preparing,
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Scheduled,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// No further trace output is expected once a job is in one of these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Canceled | JobStatus::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::WaitingForResource => "waiting_for_resource",
            JobStatus::Preparing => "preparing",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Skipped => "skipped",
            JobStatus::Manual => "manual",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full trace body known at fetch time, plus the job status seen with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSnapshot {
    pub body: Vec<u8>,
    pub status: JobStatus,
}

impl TraceSnapshot {
    pub fn new(body: impl Into<Vec<u8>>, status: JobStatus) -> Self {
        Self {
            body: body.into(),
            status,
        }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }
}

/// Knobs for a tail session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailOptions {
    /// Wait between two polls of a job that is still active.
    pub poll_interval: Duration,
    /// Consecutive transient fetch failures tolerated before giving up.
    pub max_transient_retries: u32,
    /// Upper bound for one fetch round-trip. A fetch that runs longer counts
    /// as a transient failure.
    pub fetch_timeout: Duration,
    pub retry_initial_interval: Duration,
    pub retry_max_interval: Duration,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_transient_retries: DEFAULT_MAX_TRANSIENT_RETRIES,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            retry_initial_interval: RETRY_INITIAL_INTERVAL,
            retry_max_interval: RETRY_MAX_INTERVAL,
        }
    }
}

impl TailOptions {
    pub(crate) fn retry_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_initial_interval)
            .with_multiplier(2.0)
            .with_randomization_factor(0.2)
            .with_max_interval(self.retry_max_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_rejects_zero() {
        assert!(JobId::new(0).is_none());
        assert!("0".parse::<JobId>().is_err());
        assert!(JobId::try_from(0u64).is_err());
    }

    #[test]
    fn job_id_parses_positive_numbers() {
        let id: JobId = " 224356863 ".parse().unwrap();
        assert_eq!(id.get(), 224356863);
        assert_eq!(id.to_string(), "224356863");
    }

    #[test]
    fn job_id_rejects_garbage() {
        let err = "abc".parse::<JobId>().unwrap_err();
        assert!(err.to_string().contains("positive integer"));
        assert!("-4".parse::<JobId>().is_err());
    }

    #[test]
    fn job_id_deserializes_from_number() {
        let id: JobId = serde_json::from_str("42").unwrap();
        assert_eq!(id.get(), 42);
        assert!(serde_json::from_str::<JobId>("0").is_err());
    }

    #[test]
    fn terminal_statuses() {
        for status in [
            JobStatus::Success,
            JobStatus::Failed,
            JobStatus::Canceled,
            JobStatus::Skipped,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Manual,
            JobStatus::Created,
            JobStatus::Unknown,
        ] {
            assert!(!status.is_terminal(), "{status} should not be terminal");
        }
    }

    #[test]
    fn status_deserializes_snake_case_and_unknown_values() {
        let status: JobStatus = serde_json::from_str("\"waiting_for_resource\"").unwrap();
        assert_eq!(status, JobStatus::WaitingForResource);
        let status: JobStatus = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(status, JobStatus::Unknown);
    }

    #[test]
    fn job_reference_display() {
        let job = JobReference::new("group/project", JobId::new(7).unwrap());
        assert_eq!(job.to_string(), "group/project#7");
    }
}
