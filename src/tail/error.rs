use std::io;

use thiserror::Error;

use super::JobId;

/// Failure of a single trace fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("{message}")]
    Transient { message: String },
}

impl FetchError {
    pub fn transient(message: impl Into<String>) -> Self {
        FetchError::Transient {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

/// Why a tail session stopped without the job reaching a terminal status.
///
/// Every variant carries the job and the number of trace bytes that had been
/// written when the session ended.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("job {job_id} no longer exists (stopped after {offset} bytes)")]
    NotFound {
        job_id: JobId,
        offset: usize,
        #[source]
        source: FetchError,
    },

    #[error("not authorized to read job {job_id} (stopped after {offset} bytes)")]
    Unauthorized {
        job_id: JobId,
        offset: usize,
        #[source]
        source: FetchError,
    },

    #[error("trace request for job {job_id} was rejected (stopped after {offset} bytes)")]
    Rejected {
        job_id: JobId,
        offset: usize,
        #[source]
        source: FetchError,
    },

    #[error(
        "trace stream for job {job_id} interrupted after {attempts} consecutive failed fetches (stopped after {offset} bytes)"
    )]
    StreamInterrupted {
        job_id: JobId,
        offset: usize,
        attempts: u32,
        #[source]
        last_error: FetchError,
    },

    #[error("tracing job {job_id} was cancelled after {offset} bytes")]
    Cancelled { job_id: JobId, offset: usize },

    #[error("failed to write trace output for job {job_id} at byte {offset}")]
    Output {
        job_id: JobId,
        offset: usize,
        #[source]
        source: io::Error,
    },
}

impl TailError {
    /// Maps a fetch failure that ends the session onto the session error.
    ///
    /// A transient failure only ends up here once retrying is over, so it is
    /// reported as an interrupted stream after a single attempt.
    pub(crate) fn from_fatal(job_id: JobId, offset: usize, source: FetchError) -> Self {
        match source {
            FetchError::NotFound { .. } => TailError::NotFound {
                job_id,
                offset,
                source,
            },
            FetchError::Unauthorized { .. } => TailError::Unauthorized {
                job_id,
                offset,
                source,
            },
            FetchError::Rejected { .. } => TailError::Rejected {
                job_id,
                offset,
                source,
            },
            FetchError::Transient { .. } => TailError::StreamInterrupted {
                job_id,
                offset,
                attempts: 1,
                last_error: source,
            },
        }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            TailError::NotFound { job_id, .. }
            | TailError::Unauthorized { job_id, .. }
            | TailError::Rejected { job_id, .. }
            | TailError::StreamInterrupted { job_id, .. }
            | TailError::Cancelled { job_id, .. }
            | TailError::Output { job_id, .. } => *job_id,
        }
    }

    /// Trace bytes written before the session stopped.
    pub fn offset(&self) -> usize {
        match self {
            TailError::NotFound { offset, .. }
            | TailError::Unauthorized { offset, .. }
            | TailError::Rejected { offset, .. }
            | TailError::StreamInterrupted { offset, .. }
            | TailError::Cancelled { offset, .. }
            | TailError::Output { offset, .. } => *offset,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TailError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobId {
        JobId::new(11).unwrap()
    }

    #[test]
    fn fatal_errors_keep_their_kind() {
        let err = TailError::from_fatal(
            job(),
            5,
            FetchError::NotFound {
                message: "404 Not found".into(),
            },
        );
        assert!(matches!(err, TailError::NotFound { offset: 5, .. }));

        let err = TailError::from_fatal(
            job(),
            0,
            FetchError::Unauthorized {
                message: "401".into(),
            },
        );
        assert!(matches!(err, TailError::Unauthorized { .. }));

        let err = TailError::from_fatal(
            job(),
            3,
            FetchError::Rejected {
                status: 422,
                message: "unprocessable".into(),
            },
        );
        assert!(matches!(err, TailError::Rejected { offset: 3, .. }));
    }

    #[test]
    fn transient_failure_is_never_reported_as_rejected() {
        let err = TailError::from_fatal(job(), 9, FetchError::transient("connection reset"));
        match err {
            TailError::StreamInterrupted {
                offset,
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(offset, 9);
                assert_eq!(attempts, 1);
                assert!(last_error.is_transient());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn messages_include_job_and_offset() {
        let err = TailError::StreamInterrupted {
            job_id: job(),
            offset: 128,
            attempts: 6,
            last_error: FetchError::transient("connection reset"),
        };
        let message = err.to_string();
        assert!(message.contains("job 11"));
        assert!(message.contains("128 bytes"));
        assert!(message.contains("6 consecutive"));
        assert_eq!(err.offset(), 128);
        assert_eq!(err.job_id(), job());
    }
}
