use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::{
    args::{BaseArgs, DEFAULT_HOST},
    config::Config,
    http::ApiClient,
    trace::git,
};

/// Fallback token variable understood by most GitLab tooling.
const GITLAB_TOKEN_ENV: &str = "GITLAB_TOKEN";

pub struct CommandContext {
    pub client: ApiClient,
    pub project: String,
}

pub fn resolve_command_context(
    base: &BaseArgs,
    config: &Config,
    request_timeout: Duration,
) -> Result<CommandContext> {
    let host = base
        .host
        .clone()
        .or_else(|| config.host.clone())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let token = base
        .token
        .clone()
        .or_else(|| std::env::var(GITLAB_TOKEN_ENV).ok());
    if token.is_none() {
        debug!("no access token configured, only public projects are readable");
    }

    let client = ApiClient::new(&host, token.as_deref(), request_timeout)?;

    let project = match base.repo.clone().or_else(|| config.repo.clone()) {
        Some(p) => p,
        None => git::origin_project()
            .context("--repo required (or set GLT_REPO) outside a git checkout with an origin remote")?,
    };
    debug!(api = client.base_url(), %project, "resolved command context");

    Ok(CommandContext { client, project })
}
