use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::http::ApiClient;
use crate::tail::{FetchError, JobId, JobStatus};

const PIPELINE_JOBS_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub pipeline: Option<Pipeline>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    #[serde(default)]
    pub status: Option<String>,
}

/// The latest attempt of the job called `name`.
///
/// Retrying a job creates a new job with the same name and a higher id in
/// the same pipeline.
pub fn newest_attempt<'a>(jobs: &'a [JobSummary], name: &str) -> Option<&'a JobSummary> {
    jobs.iter()
        .filter(|job| job.name == name)
        .max_by_key(|job| job.id)
}

fn project_path(project: &str) -> String {
    format!("/projects/{}", encode(project))
}

pub async fn get_job(
    client: &ApiClient,
    project: &str,
    job_id: JobId,
) -> Result<JobSummary, FetchError> {
    let path = format!("{}/jobs/{job_id}", project_path(project));
    client.get(&path).await
}

pub async fn get_job_trace(
    client: &ApiClient,
    project: &str,
    job_id: JobId,
) -> Result<Vec<u8>, FetchError> {
    let path = format!("{}/jobs/{job_id}/trace", project_path(project));
    client.get_bytes(&path).await
}

/// Most recent pipeline for `branch`, if any.
pub async fn latest_pipeline(
    client: &ApiClient,
    project: &str,
    branch: &str,
) -> Result<Option<Pipeline>, FetchError> {
    let path = format!(
        "{}/pipelines?ref={}&sort=desc&order_by=id&per_page=1&page=1",
        project_path(project),
        encode(branch)
    );
    let pipelines: Vec<Pipeline> = client.get(&path).await?;
    Ok(pipelines.into_iter().next())
}

pub async fn list_pipeline_jobs(
    client: &ApiClient,
    project: &str,
    pipeline_id: u64,
) -> Result<Vec<JobSummary>, FetchError> {
    let path = format!(
        "{}/pipelines/{pipeline_id}/jobs?per_page={PIPELINE_JOBS_PAGE_SIZE}",
        project_path(project)
    );
    client.get(&path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_paths_are_url_encoded() {
        assert_eq!(project_path("group/sub/app"), "/projects/group%2Fsub%2Fapp");
        assert_eq!(project_path("278964"), "/projects/278964");
    }

    #[test]
    fn job_summary_ignores_extra_fields() {
        let json = r#"{
            "id": 224356863,
            "name": "rspec",
            "status": "running",
            "stage": "test",
            "pipeline": {"id": 9, "sha": "abc"},
            "web_url": "https://gitlab.com/group/app/-/jobs/224356863"
        }"#;
        let job: JobSummary = serde_json::from_str(json).unwrap();
        assert_eq!(job.id.get(), 224356863);
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.pipeline.as_ref().map(|p| p.id), Some(9));
        assert_eq!(
            job.web_url.as_deref(),
            Some("https://gitlab.com/group/app/-/jobs/224356863")
        );
    }

    fn summary(id: u64, name: &str, status: JobStatus) -> JobSummary {
        JobSummary {
            id: JobId::new(id).unwrap(),
            name: name.to_string(),
            status,
            pipeline: None,
            web_url: None,
        }
    }

    #[test]
    fn newest_attempt_picks_the_highest_id_with_the_same_name() {
        let jobs = [
            summary(8, "rspec", JobStatus::Running),
            summary(5, "lint", JobStatus::Success),
            summary(7, "rspec", JobStatus::Failed),
            summary(9, "rspec 2/2", JobStatus::Pending),
        ];
        let latest = newest_attempt(&jobs, "rspec").unwrap();
        assert_eq!(latest.id.get(), 8);
        assert_eq!(latest.status, JobStatus::Running);
        assert!(newest_attempt(&jobs, "deploy").is_none());
    }

    #[test]
    fn pipeline_status_is_optional() {
        let pipeline: Pipeline =
            serde_json::from_str(r#"{"id": 3, "ref": "main", "status": "running"}"#).unwrap();
        assert_eq!(pipeline.status.as_deref(), Some("running"));
        let pipeline: Pipeline = serde_json::from_str(r#"{"id": 4}"#).unwrap();
        assert_eq!(pipeline.status, None);
    }
}
