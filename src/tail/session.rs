use std::io::Write;
use std::time::Duration;

use backoff::backoff::Backoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    Emitter, FetchError, JobReference, JobStatus, TailError, TailOptions, TraceSnapshot,
    TraceSource,
};

/// How a tail session ended when the job reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailSummary {
    pub status: JobStatus,
    pub bytes_written: usize,
    /// Successful fetches, including a final confirmation fetch.
    pub polls: u32,
    pub restarts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Polling,
    Draining,
    Done,
}

/// Streams the trace of `job` into `sink` until the job finishes.
///
/// Returns once a terminal status has been observed and the remaining
/// trace has been written. Fatal fetch errors, an exhausted transient retry
/// budget, a failing sink, or `cancel` end the session early with an error.
pub async fn tail_job<S, W>(
    source: &S,
    job: &JobReference,
    sink: W,
    options: &TailOptions,
    cancel: CancellationToken,
) -> Result<TailSummary, TailError>
where
    S: TraceSource + ?Sized,
    W: Write,
{
    TailSession {
        source,
        job,
        options,
        cancel,
        emitter: Emitter::new(sink),
        phase: Phase::Polling,
        seen_active: false,
        final_status: None,
        polls: 0,
    }
    .run()
    .await
}

struct TailSession<'a, S: ?Sized, W> {
    source: &'a S,
    job: &'a JobReference,
    options: &'a TailOptions,
    cancel: CancellationToken,
    emitter: Emitter<W>,
    phase: Phase,
    seen_active: bool,
    final_status: Option<JobStatus>,
    polls: u32,
}

impl<S, W> TailSession<'_, S, W>
where
    S: TraceSource + ?Sized,
    W: Write,
{
    async fn run(mut self) -> Result<TailSummary, TailError> {
        debug!(job = %self.job, "tracing job");
        loop {
            self.phase = match self.phase {
                Phase::Polling => self.poll().await?,
                Phase::Draining => self.drain().await?,
                Phase::Done => return Ok(self.summary()),
            };
        }
    }

    async fn poll(&mut self) -> Result<Phase, TailError> {
        let snapshot = self.fetch().await?;
        self.emit(&snapshot)?;

        if !snapshot.status.is_terminal() {
            self.seen_active = true;
            self.pause(self.options.poll_interval).await?;
            return Ok(Phase::Polling);
        }

        self.final_status = Some(snapshot.status);
        // A job that was already finished on the first fetch has a complete
        // trace; only a transition observed while polling can leave the body
        // behind the status.
        if self.seen_active && !self.source.status_precedes_body() {
            debug!(job = %self.job, status = %snapshot.status, "job finished, confirming trace");
            Ok(Phase::Draining)
        } else {
            Ok(Phase::Done)
        }
    }

    async fn drain(&mut self) -> Result<Phase, TailError> {
        let snapshot = self.fetch().await?;
        self.emit(&snapshot)?;
        if snapshot.status.is_terminal() {
            self.final_status = Some(snapshot.status);
        }
        Ok(Phase::Done)
    }

    /// One successful fetch, retrying transient failures with backoff.
    async fn fetch(&mut self) -> Result<TraceSnapshot, TailError> {
        let mut backoff = self.options.retry_backoff();
        let mut failures = 0u32;

        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancelled()),
                result = tokio::time::timeout(self.options.fetch_timeout, self.source.fetch(self.job)) => result,
            };

            let err = match attempt {
                Ok(Ok(snapshot)) => {
                    self.polls += 1;
                    debug!(
                        job = %self.job,
                        status = %snapshot.status,
                        len = snapshot.len(),
                        "fetched trace"
                    );
                    return Ok(snapshot);
                }
                Ok(Err(err)) => err,
                Err(_) => FetchError::transient(format!(
                    "fetch timed out after {}",
                    format_duration(self.options.fetch_timeout)
                )),
            };

            if !err.is_transient() {
                return Err(TailError::from_fatal(self.job.job_id, self.offset(), err));
            }

            failures += 1;
            if failures > self.options.max_transient_retries {
                return Err(TailError::StreamInterrupted {
                    job_id: self.job.job_id,
                    offset: self.offset(),
                    attempts: failures,
                    last_error: err,
                });
            }

            let delay = backoff
                .next_backoff()
                .unwrap_or(self.options.retry_max_interval);
            warn!(
                job = %self.job,
                attempt = failures,
                max = self.options.max_transient_retries,
                "fetching trace failed, retrying in {}: {err}",
                format_duration(delay)
            );
            self.pause(delay).await?;
        }
    }

    fn emit(&mut self, snapshot: &TraceSnapshot) -> Result<(), TailError> {
        let offset = self.offset();
        self.emitter
            .emit(snapshot)
            .map_err(|source| TailError::Output {
                job_id: self.job.job_id,
                offset,
                source,
            })
    }

    async fn pause(&self, delay: Duration) -> Result<(), TailError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.cancelled()),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn cancelled(&self) -> TailError {
        debug!(job = %self.job, offset = self.offset(), "trace cancelled");
        TailError::Cancelled {
            job_id: self.job.job_id,
            offset: self.offset(),
        }
    }

    fn offset(&self) -> usize {
        self.emitter.cursor().bytes_written()
    }

    fn summary(&self) -> TailSummary {
        let summary = TailSummary {
            // Done is only reachable after a terminal snapshot.
            status: self.final_status.unwrap_or(JobStatus::Unknown),
            bytes_written: self.offset(),
            polls: self.polls,
            restarts: self.emitter.restarts(),
        };
        info!(
            job = %self.job,
            status = %summary.status,
            bytes = summary.bytes_written,
            polls = summary.polls,
            restarts = summary.restarts,
            "trace complete"
        );
        summary
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
