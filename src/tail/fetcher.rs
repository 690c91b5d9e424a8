use async_trait::async_trait;
use tracing::debug;

use crate::gitlab::{self, JobSummary};
use crate::http::ApiClient;

use super::{FetchError, JobReference, TraceSnapshot};

/// Something that can return the current trace of a job.
#[async_trait]
pub trait TraceSource: Send + Sync {
    /// Returns the whole trace known so far together with the job status.
    async fn fetch(&self, job: &JobReference) -> Result<TraceSnapshot, FetchError>;

    /// Whether the status of a snapshot was read before its body.
    ///
    /// When true, a snapshot with a terminal status already holds the
    /// complete trace. When false, the body may predate the status and the
    /// session confirms with one more fetch.
    fn status_precedes_body(&self) -> bool {
        true
    }
}

/// Reads job status and trace from the GitLab jobs API.
pub struct GitLabTraceSource {
    client: ApiClient,
    retries: Option<RetryLookup>,
}

/// Where to look for newer attempts of the traced job.
struct RetryLookup {
    pipeline_id: u64,
    name: String,
}

impl GitLabTraceSource {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            retries: None,
        }
    }

    /// Follows retries of `job`: every fetch reads the newest job with the
    /// same name in its pipeline. A retried job's log starts over, which the
    /// session handles as a restart.
    pub fn following_retries(mut self, job: &JobSummary) -> Self {
        self.retries = job.pipeline.as_ref().map(|pipeline| RetryLookup {
            pipeline_id: pipeline.id,
            name: job.name.clone(),
        });
        self
    }

    async fn current_attempt(&self, job: &JobReference) -> Result<JobSummary, FetchError> {
        if let Some(lookup) = &self.retries {
            let jobs =
                gitlab::list_pipeline_jobs(&self.client, &job.project, lookup.pipeline_id).await?;
            if let Some(latest) = gitlab::newest_attempt(&jobs, &lookup.name) {
                if latest.id != job.job_id {
                    debug!(job = %job, attempt = %latest.id, "following retried job");
                }
                return Ok(latest.clone());
            }
        }
        gitlab::get_job(&self.client, &job.project, job.job_id).await
    }
}

#[async_trait]
impl TraceSource for GitLabTraceSource {
    async fn fetch(&self, job: &JobReference) -> Result<TraceSnapshot, FetchError> {
        // Status first: a terminal status guarantees the trace read after it
        // is final.
        let attempt = self.current_attempt(job).await?;
        let body = gitlab::get_job_trace(&self.client, &job.project, attempt.id).await?;
        Ok(TraceSnapshot::new(body, attempt.status))
    }
}
