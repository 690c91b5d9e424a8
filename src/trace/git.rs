use std::process::Command;

use anyhow::{bail, Context, Result};

fn git(args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .output()
        .with_context(|| format!("failed to run git {}", args.join(" ")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub fn current_branch() -> Result<String> {
    let branch = git(&["rev-parse", "--abbrev-ref", "HEAD"])
        .context("could not determine the current branch (use --branch)")?;
    if branch.is_empty() || branch == "HEAD" {
        bail!("HEAD is detached; pass --branch to choose a branch");
    }
    Ok(branch)
}

/// Project path of the `origin` remote, e.g. `group/sub/app`.
pub fn origin_project() -> Result<String> {
    let url = git(&["remote", "get-url", "origin"])?;
    match project_from_remote_url(&url) {
        Some(project) => Ok(project),
        None => bail!("could not read a project path from remote '{url}'"),
    }
}

/// Accepts `git@host:group/app.git`, `ssh://git@host:22/group/app.git`
/// and `https://host/group/app(.git)`.
pub fn project_from_remote_url(url: &str) -> Option<String> {
    let url = url.trim();
    let path = if let Some((_, rest)) = url.split_once("://") {
        rest.split_once('/')?.1
    } else {
        // scp-like syntax
        let (_, path) = url.split_once(':')?;
        path
    };

    let project = path
        .trim_matches('/')
        .trim_end_matches(".git")
        .trim_matches('/');
    if project.is_empty() || !project.contains('/') {
        return None;
    }
    Some(project.to_string())
}
