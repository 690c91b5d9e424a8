use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_HOST: &str = "https://gitlab.com";

#[derive(Debug, Clone, Args)]
pub struct BaseArgs {
    /// Output as JSON (for trace: the final summary, on stderr)
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// GitLab host (or via GLT_HOST) [default: https://gitlab.com]
    #[arg(long, env = "GLT_HOST", hide_env_values = true, global = true)]
    pub host: Option<String>,

    /// Personal access token (or via GLT_TOKEN / GITLAB_TOKEN)
    #[arg(long, env = "GLT_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Project path or ID, e.g. group/app (defaults to the origin remote)
    #[arg(short = 'R', long, env = "GLT_REPO", global = true)]
    pub repo: Option<String>,

    /// Path to a .env file to load before running commands.
    #[arg(long, env = "GLT_ENV_FILE", hide_env_values = true)]
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct CLIArgs<T: Args> {
    #[command(flatten)]
    pub base: BaseArgs,

    #[command(flatten)]
    pub args: T,
}
