use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use std::{
    env, fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::args::BaseArgs;
use crate::ui::{print_command_status, CommandStatus};

mod get;
mod list;
mod set;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_transient_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub const KNOWN_KEYS: &[&str] = &[
    "host",
    "repo",
    "poll_interval_ms",
    "max_transient_retries",
    "fetch_timeout_secs",
];

fn parse_positive<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr + Default + PartialOrd,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => bail!("{key} must be a positive integer, got '{value}'"),
    }
}

impl Config {
    pub fn get_field(&self, key: &str) -> Option<String> {
        match key {
            "host" => self.host.clone(),
            "repo" => self.repo.clone(),
            "poll_interval_ms" => self.poll_interval_ms.map(|v| v.to_string()),
            "max_transient_retries" => self.max_transient_retries.map(|v| v.to_string()),
            "fetch_timeout_secs" => self.fetch_timeout_secs.map(|v| v.to_string()),
            _ => None,
        }
    }

    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "host" => self.host = Some(value.to_string()),
            "repo" => self.repo = Some(value.to_string()),
            "poll_interval_ms" => self.poll_interval_ms = Some(parse_positive(key, value)?),
            "max_transient_retries" => {
                self.max_transient_retries = Some(value.trim().parse().map_err(|_| {
                    anyhow!("{key} must be a non-negative integer, got '{value}'")
                })?)
            }
            "fetch_timeout_secs" => self.fetch_timeout_secs = Some(parse_positive(key, value)?),
            _ => bail!("Unknown config key: {key}"),
        }
        Ok(())
    }

    pub fn unset_field(&mut self, key: &str) -> bool {
        match key {
            "host" => self.host = None,
            "repo" => self.repo = None,
            "poll_interval_ms" => self.poll_interval_ms = None,
            "max_transient_retries" => self.max_transient_retries = None,
            "fetch_timeout_secs" => self.fetch_timeout_secs = None,
            _ => return false,
        }
        true
    }

    pub fn non_empty_fields(&self) -> Vec<(&'static str, String)> {
        KNOWN_KEYS
            .iter()
            .filter_map(|&key| self.get_field(key).map(|v| (key, v)))
            .collect()
    }

    fn merge(&self, other: &Config) -> Config {
        let mut extra = self.extra.clone();
        extra.extend(other.extra.clone());
        Config {
            host: other.host.clone().or_else(|| self.host.clone()),
            repo: other.repo.clone().or_else(|| self.repo.clone()),
            poll_interval_ms: other.poll_interval_ms.or(self.poll_interval_ms),
            max_transient_retries: other.max_transient_retries.or(self.max_transient_retries),
            fetch_timeout_secs: other.fetch_timeout_secs.or(self.fetch_timeout_secs),
            extra,
        }
    }
}

pub fn global_config_dir() -> Result<PathBuf> {
    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("glt"));
    }
    dirs::home_dir()
        .map(|path| path.join(".config").join("glt"))
        .ok_or_else(|| anyhow!("$HOME not configured."))
}

pub fn global_path() -> Result<PathBuf> {
    Ok(global_config_dir()?.join("config.json"))
}

pub fn load_file(path: &Path) -> Config {
    let file_contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Config::default(),
        Err(e) => {
            print_command_status(
                CommandStatus::Warning,
                &format!("could not read {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    let config: Config = match serde_json::from_str(&file_contents) {
        Ok(c) => c,
        Err(e) => {
            print_command_status(
                CommandStatus::Warning,
                &format!("could not parse {}: {e}", path.display()),
            );
            return Config::default();
        }
    };

    for key in config.extra.keys() {
        print_command_status(
            CommandStatus::Warning,
            &format!("unknown config key {} in {}", key, path.display()),
        );
    }

    tracing::debug!(path = %path.display(), "loaded config");
    config
}

pub fn load_global() -> Result<Config> {
    Ok(load_file(&global_path()?))
}

/// Global config overlaid with the nearest local `.glt/config.json`.
pub fn load() -> Result<Config> {
    let global = load_global().unwrap_or_default();
    let local = match local_path() {
        Some(p) => load_file(&p),
        None => Config::default(),
    };
    Ok(global.merge(&local))
}

pub fn save_file(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

pub fn find_local_config_dir() -> Option<PathBuf> {
    let start = std::env::current_dir().ok()?;
    find_local_config_dir_from(&start, dirs::home_dir().as_deref())
}

/// Walks up from `start` until a `.glt` directory, the git root or `home`.
fn find_local_config_dir_from(start: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let mut current_dir = start.to_path_buf();

    loop {
        if current_dir.join(".glt").is_dir() {
            return Some(current_dir.join(".glt"));
        }
        if current_dir.join(".git").exists() {
            return None;
        }
        if Some(current_dir.as_path()) == home {
            return None;
        }
        if !current_dir.pop() {
            return None;
        }
    }
}

pub fn local_path() -> Option<PathBuf> {
    find_local_config_dir().map(|dir| dir.join("config.json"))
}

pub enum WriteTarget {
    Global(PathBuf),
    Local(PathBuf),
}

pub fn write_target() -> Result<WriteTarget> {
    match local_path() {
        Some(p) => Ok(WriteTarget::Local(p)),
        None => Ok(WriteTarget::Global(global_path()?)),
    }
}

/// Resolve which config file to write based on --global/--local flags.
pub fn resolve_write_path(global: bool, local: bool) -> Result<PathBuf> {
    if global {
        global_path()
    } else if local {
        match local_path() {
            Some(p) => Ok(p),
            None => Ok(std::env::current_dir()?.join(".glt").join("config.json")),
        }
    } else {
        match write_target()? {
            WriteTarget::Local(p) | WriteTarget::Global(p) => Ok(p),
        }
    }
}

// --- CLI commands ---

#[derive(Debug, Clone, Args)]
pub struct ScopeArgs {
    /// Apply to global config (~/.config/glt/config.json)
    #[arg(long, short = 'g', conflicts_with = "local")]
    global: bool,

    /// Apply to local config (.glt/config.json)
    #[arg(long, short = 'l')]
    local: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommands>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommands {
    /// List config values
    List {
        #[command(flatten)]
        scope: ScopeArgs,
        /// Show config values grouped by source
        #[arg(long)]
        verbose: bool,
    },
    /// Get a config value
    Get {
        /// Config key (host, repo, poll_interval_ms, max_transient_retries, fetch_timeout_secs)
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Set a config value
    Set {
        /// Config key (host, repo, poll_interval_ms, max_transient_retries, fetch_timeout_secs)
        key: String,
        /// Value to set
        value: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
    /// Remove a config value
    Unset {
        /// Config key (host, repo, poll_interval_ms, max_transient_retries, fetch_timeout_secs)
        key: String,
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

fn validate_key(key: &str) -> Result<()> {
    if !KNOWN_KEYS.contains(&key) {
        bail!(
            "Unknown config key: {key}\nValid keys: {}",
            KNOWN_KEYS.join(", ")
        );
    }
    Ok(())
}

pub fn run(base: BaseArgs, args: ConfigArgs) -> Result<()> {
    match args.command {
        None => list::run(base, false, false, false),
        Some(ConfigCommands::List { scope, verbose }) => {
            list::run(base, scope.global, scope.local, verbose)
        }
        Some(ConfigCommands::Get { key, scope }) => {
            validate_key(&key)?;
            get::run(base, &key, scope.global, scope.local)
        }
        Some(ConfigCommands::Set { key, value, scope }) => {
            validate_key(&key)?;
            set::run(&key, &value, scope.global, scope.local)
        }
        Some(ConfigCommands::Unset { key, scope }) => {
            validate_key(&key)?;
            set::unset(&key, scope.global, scope.local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn merge_local_takes_precedence() {
        let global = Config {
            host: Some("https://gitlab.com".into()),
            poll_interval_ms: Some(2000),
            ..Default::default()
        };
        let local = Config {
            host: Some("https://gitlab.example.com".into()),
            repo: Some("group/app".into()),
            ..Default::default()
        };
        let merged = global.merge(&local);
        assert_eq!(merged.host.as_deref(), Some("https://gitlab.example.com"));
        assert_eq!(merged.repo.as_deref(), Some("group/app"));
        assert_eq!(merged.poll_interval_ms, Some(2000));
    }

    #[test]
    fn merge_both_none_stays_none() {
        let merged = Config::default().merge(&Config::default());
        assert_eq!(merged, Config::default());
    }

    #[test]
    fn set_field_validates_numbers() {
        let mut cfg = Config::default();
        cfg.set_field("poll_interval_ms", "1500").unwrap();
        assert_eq!(cfg.poll_interval_ms, Some(1500));

        assert!(cfg.set_field("poll_interval_ms", "0").is_err());
        assert!(cfg.set_field("fetch_timeout_secs", "soon").is_err());

        cfg.set_field("max_transient_retries", "0").unwrap();
        assert_eq!(cfg.max_transient_retries, Some(0));
        assert!(cfg.set_field("max_transient_retries", "-1").is_err());
    }

    #[test]
    fn unset_field_clears_value() {
        let mut cfg = Config {
            repo: Some("group/app".into()),
            ..Default::default()
        };
        assert!(cfg.unset_field("repo"));
        assert_eq!(cfg.repo, None);
        assert!(!cfg.unset_field("nope"));
    }

    #[test]
    fn non_empty_fields_follow_key_order() {
        let cfg = Config {
            fetch_timeout_secs: Some(10),
            host: Some("gitlab.com".into()),
            ..Default::default()
        };
        assert_eq!(
            cfg.non_empty_fields(),
            vec![
                ("host", "gitlab.com".to_string()),
                ("fetch_timeout_secs", "10".to_string())
            ]
        );
    }

    #[test]
    fn load_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_file(&tmp.path().join("nonexistent.json"));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let cfg = Config {
            repo: Some("group/app".into()),
            max_transient_retries: Some(2),
            ..Default::default()
        };
        save_file(&path, &cfg).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(!written.contains("host"));
        assert_eq!(load_file(&path), cfg);
    }

    #[test]
    fn unknown_keys_are_kept_in_extra() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.json");
        fs::write(&path, r#"{"repo": "group/app", "colour": "blue"}"#).unwrap();
        let cfg = load_file(&path);
        assert_eq!(cfg.repo.as_deref(), Some("group/app"));
        assert!(cfg.extra.contains_key("colour"));
    }

    #[test]
    fn local_dir_found_in_parent() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".glt")).unwrap();
        let nested = root.join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let found = find_local_config_dir_from(&nested, None);
        assert_eq!(found, Some(root.join(".glt")));
    }

    #[test]
    fn local_dir_search_stops_at_git_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".glt")).unwrap();
        let repo = root.join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert_eq!(find_local_config_dir_from(&repo, None), None);
    }

    #[test]
    fn validate_key_lists_known_keys() {
        let err = validate_key("colour").unwrap_err().to_string();
        assert!(err.contains("Unknown config key: colour"));
        assert!(err.contains("poll_interval_ms"));
    }
}
