use std::sync::OnceLock;

use anyhow::{anyhow, bail, Result};
use regex::Regex;

use crate::gitlab::JobSummary;
use crate::tail::JobId;

/// Label shown for a job in the picker: `name (id) - status`.
pub fn job_label(job: &JobSummary) -> String {
    format!("{} ({}) - {}", job.name, job.id, job.status)
}

/// Pulls the job id back out of a label built by [`job_label`].
///
/// Job names may contain parentheses themselves, so only the trailing
/// `(id) - status` part is considered.
pub fn parse_job_label(label: &str) -> Option<JobId> {
    static LABEL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = LABEL_RE
        .get_or_init(|| Regex::new(r"\((\d+)\) - [a-z_]+\s*$").ok())
        .as_ref()?;
    re.captures(label)?.get(1)?.as_str().parse().ok()
}

/// Chooses the job to trace.
///
/// `pick` receives the labels and returns the chosen one, or `None` when
/// nothing was chosen, in which case the first job is used.
pub fn select_job<F>(jobs: &[JobSummary], pick: F) -> Result<JobId>
where
    F: FnOnce(&[String]) -> Result<Option<String>>,
{
    let Some(first) = jobs.first() else {
        bail!("no jobs to select from");
    };

    let labels: Vec<String> = jobs.iter().map(job_label).collect();
    match pick(&labels)? {
        Some(label) => {
            let id = parse_job_label(&label)
                .ok_or_else(|| anyhow!("could not read a job id from '{label}'"))?;
            if !jobs.iter().any(|job| job.id == id) {
                bail!("job {id} is not part of this pipeline");
            }
            Ok(id)
        }
        None => Ok(first.id),
    }
}
