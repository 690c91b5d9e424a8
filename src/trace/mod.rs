use std::io::{self, IsTerminal};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use dialoguer::console::style;
use tokio_util::sync::CancellationToken;

use crate::{
    args::BaseArgs,
    config::{self, Config},
    context::{resolve_command_context, CommandContext},
    gitlab,
    tail::{self, GitLabTraceSource, JobId, JobReference, TailOptions, TailSummary},
    ui::{fuzzy_select, print_command_status, with_spinner, CommandStatus},
};

pub mod git;
mod select;

use select::select_job;

#[derive(Debug, Clone, Args)]
pub struct TraceArgs {
    /// Job to trace (prompts for a job of the latest pipeline when omitted)
    #[arg(value_name = "JOB_ID")]
    job_id: Option<JobId>,

    /// Branch whose latest pipeline is searched (default: current branch)
    #[arg(short = 'b', long)]
    branch: Option<String>,

    /// Milliseconds between polls while the job is active
    #[arg(
        long,
        env = "GLT_POLL_INTERVAL_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval_ms: Option<u64>,

    /// Consecutive failed fetches tolerated before giving up
    #[arg(long, env = "GLT_MAX_TRANSIENT_RETRIES")]
    max_transient_retries: Option<u32>,

    /// Seconds before a single fetch is abandoned and retried
    #[arg(
        long,
        env = "GLT_FETCH_TIMEOUT_SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    fetch_timeout_secs: Option<u64>,
}

impl TraceArgs {
    /// Flags and env vars first, then config files, then defaults.
    fn tail_options(&self, config: &Config) -> TailOptions {
        let defaults = TailOptions::default();
        TailOptions {
            poll_interval: self
                .poll_interval_ms
                .or(config.poll_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_transient_retries: self
                .max_transient_retries
                .or(config.max_transient_retries)
                .unwrap_or(defaults.max_transient_retries),
            fetch_timeout: self
                .fetch_timeout_secs
                .or(config.fetch_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch_timeout),
            ..defaults
        }
    }
}

pub async fn run(base: BaseArgs, args: TraceArgs) -> Result<()> {
    let config = config::load()?;
    let options = args.tail_options(&config);
    let ctx = resolve_command_context(&base, &config, options.fetch_timeout)?;

    let job_id = match args.job_id {
        Some(id) => id,
        None => match pick_job_from_branch(&ctx, args.branch.as_deref()).await? {
            Some(id) => id,
            None => return Ok(()),
        },
    };

    let job = with_spinner(
        "Loading job...",
        gitlab::get_job(&ctx.client, &ctx.project, job_id),
    )
    .await
    .with_context(|| format!("failed to load job {job_id} in {}", ctx.project))?;
    eprintln!(
        "\n{} {} - {}",
        style(&job.name).bold(),
        style(format!("(#{})", job.id)).dim(),
        job.status
    );
    if let Some(url) = &job.web_url {
        eprintln!("{}", style(url).dim());
    }
    eprintln!();

    let reference = JobReference::new(ctx.project.clone(), job.id);
    let source = GitLabTraceSource::new(ctx.client.clone()).following_retries(&job);

    let cancel = CancellationToken::new();
    let ctrlc_cancel = cancel.clone();
    let ctrlc_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrlc_cancel.cancel();
        }
    });

    let result = tail::tail_job(&source, &reference, io::stdout(), &options, cancel).await;
    ctrlc_task.abort();

    match result {
        Ok(summary) if base.json => {
            eprintln!("{}", summary_json(&reference, &summary));
            Ok(())
        }
        Ok(summary) => {
            print_command_status(
                summary.status.into(),
                &format!("Job {} finished with status {}", reference.job_id, summary.status),
            );
            Ok(())
        }
        Err(err) if err.is_cancelled() => {
            print_command_status(
                CommandStatus::Warning,
                &format!(
                    "Stopped tracing job {} after {} bytes",
                    err.job_id(),
                    err.offset()
                ),
            );
            Ok(())
        }
        Err(err) => {
            // Keep the error off the last line of a partial trace.
            if err.offset() > 0 {
                eprintln!();
            }
            Err(err.into())
        }
    }
}

/// Machine-readable outcome of a finished trace, printed with `--json`.
fn summary_json(reference: &JobReference, summary: &TailSummary) -> serde_json::Value {
    serde_json::json!({
        "project": reference.project,
        "job_id": reference.job_id,
        "status": summary.status,
        "bytes_written": summary.bytes_written,
        "polls": summary.polls,
        "restarts": summary.restarts,
    })
}

/// Finds the latest pipeline on the branch and asks which job to follow.
///
/// Returns `None` when the branch has no pipeline.
async fn pick_job_from_branch(
    ctx: &CommandContext,
    branch: Option<&str>,
) -> Result<Option<JobId>> {
    let branch = match branch {
        Some(b) => b.to_string(),
        None => git::current_branch()?,
    };

    eprintln!("\nSearching for latest pipeline on {branch}...");
    let pipeline = with_spinner(
        "Loading pipelines...",
        gitlab::latest_pipeline(&ctx.client, &ctx.project, &branch),
    )
    .await
    .with_context(|| format!("failed to list pipelines for {}", ctx.project))?;

    let Some(pipeline) = pipeline else {
        print_command_status(
            CommandStatus::Warning,
            &format!("No pipeline running or available on branch {branch}"),
        );
        return Ok(None);
    };

    match &pipeline.status {
        Some(status) => eprintln!("Getting jobs for pipeline {} ({status})...\n", pipeline.id),
        None => eprintln!("Getting jobs for pipeline {}...\n", pipeline.id),
    }
    let jobs = with_spinner(
        "Loading jobs...",
        gitlab::list_pipeline_jobs(&ctx.client, &ctx.project, pipeline.id),
    )
    .await
    .with_context(|| format!("failed to list jobs of pipeline {}", pipeline.id))?;
    if jobs.is_empty() {
        bail!("pipeline {} has no jobs to trace", pipeline.id);
    }

    let job_id = select_job(&jobs, |labels| {
        if !io::stdin().is_terminal() {
            tracing::debug!("stdin is not a TTY, tracing the first job");
            return Ok(None);
        }
        let choice = fuzzy_select("Select pipeline job to trace", labels)?;
        Ok(choice.and_then(|index| labels.get(index).cloned()))
    })?;

    Ok(Some(job_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    const OPTION_ENV_VARS: [&str; 3] = [
        "GLT_POLL_INTERVAL_MS",
        "GLT_MAX_TRANSIENT_RETRIES",
        "GLT_FETCH_TIMEOUT_SECS",
    ];

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        args: TraceArgs,
    }

    fn parse(argv: &[&str]) -> Result<TraceArgs, clap::Error> {
        Harness::try_parse_from(std::iter::once("glt").chain(argv.iter().copied()))
            .map(|h| h.args)
    }

    #[test]
    fn parses_job_id_and_branch() {
        let args = parse(&["224356863", "--branch", "main"]).unwrap();
        assert_eq!(args.job_id.map(JobId::get), Some(224356863));
        assert_eq!(args.branch.as_deref(), Some("main"));
    }

    #[test]
    fn rejects_zero_job_id() {
        assert!(parse(&["0"]).is_err());
        assert!(parse(&["--poll-interval-ms", "0"]).is_err());
    }

    #[test]
    #[serial]
    fn flags_override_config_which_overrides_defaults() {
        for key in OPTION_ENV_VARS {
            std::env::remove_var(key);
        }
        let config = Config {
            poll_interval_ms: Some(2500),
            max_transient_retries: Some(9),
            ..Default::default()
        };
        let args = parse(&["1", "--max-transient-retries", "2"]).unwrap();
        let options = args.tail_options(&config);

        assert_eq!(options.poll_interval, Duration::from_millis(2500));
        assert_eq!(options.max_transient_retries, 2);
        assert_eq!(options.fetch_timeout, TailOptions::default().fetch_timeout);
    }

    #[test]
    #[serial]
    fn env_vars_sit_between_flags_and_config() {
        for key in OPTION_ENV_VARS {
            std::env::remove_var(key);
        }
        std::env::set_var("GLT_FETCH_TIMEOUT_SECS", "4");
        let config = Config {
            fetch_timeout_secs: Some(60),
            ..Default::default()
        };
        let from_env = parse(&["1"]);
        let from_flag = parse(&["1", "--fetch-timeout-secs", "7"]);
        std::env::remove_var("GLT_FETCH_TIMEOUT_SECS");

        let options = from_env.unwrap().tail_options(&config);
        assert_eq!(options.fetch_timeout, Duration::from_secs(4));
        let options = from_flag.unwrap().tail_options(&config);
        assert_eq!(options.fetch_timeout, Duration::from_secs(7));
    }

    #[test]
    fn summary_json_reports_the_outcome() {
        let reference = JobReference::new("group/app", JobId::new(224356863).unwrap());
        let summary = TailSummary {
            status: tail::JobStatus::Failed,
            bytes_written: 2048,
            polls: 12,
            restarts: 1,
        };

        let value = summary_json(&reference, &summary);
        assert_eq!(
            value,
            serde_json::json!({
                "project": "group/app",
                "job_id": 224356863,
                "status": "failed",
                "bytes_written": 2048,
                "polls": 12,
                "restarts": 1,
            })
        );
    }
}
