//! Terminal configuration.
//!
//! Values are layered: command line, then `CHECKIN_*` environment variables
//! (a `.env` file is loaded into the environment first), then the TOML file,
//! then built-in defaults.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use checkin_core::{
    DispatchPolicy, MarkAttendedMethod, RemoteEndpoints, cooldown::DEFAULT_COOLDOWN,
    dispatch::{DEFAULT_DISPATCH_TIMEOUT, DEFAULT_PACING, DEFAULT_SWEEP_INTERVAL},
    remote::{DEFAULT_MARK_ATTENDED_PATH, DEFAULT_ROSTER_PATH},
};
use clap::Args;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/dev";
pub const DEFAULT_STATE_DIR: &str = "./checkin-state";
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_CONFIG_FILE: &str = "checkin.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config file {path} does not exist")]
    MissingConfig { path: PathBuf },

    #[error("failed to load .env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("{key}: invalid URL `{value}`: {source}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{key}: invalid duration `{value}`: {source}")]
    InvalidDuration {
        key: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("{key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Command-line overrides. Every field is optional; unset fields fall
/// through to the environment, the config file and the defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct CliOverrides {
    /// TOML configuration file (defaults to ./checkin.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the roster authority API
    #[arg(long)]
    pub api_base_url: Option<String>,

    /// Roster path under the base URL
    #[arg(long)]
    pub roster_path: Option<String>,

    /// Mark-attended path under the base URL; the id is appended
    #[arg(long)]
    pub mark_attended_path: Option<String>,

    /// HTTP method for mark-attended (put or post)
    #[arg(long)]
    pub mark_attended_method: Option<MarkAttendedMethod>,

    /// Directory holding the persisted roster, scans and pending queue
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Period between background sync sweeps (e.g. 30s)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub sweep_interval: Option<Duration>,

    /// Gap between consecutive requests within a sweep (e.g. 100ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub dispatch_pacing: Option<Duration>,

    /// Timeout for every request to the roster authority
    #[arg(long, value_parser = humantime::parse_duration)]
    pub request_timeout: Option<Duration>,

    /// Pause after each scan decision
    #[arg(long, value_parser = humantime::parse_duration)]
    pub cooldown: Option<Duration>,

    /// Period between reachability probes
    #[arg(long, value_parser = humantime::parse_duration)]
    pub probe_interval: Option<Duration>,

    /// Read decoded scans from this file instead of stdin
    #[arg(long)]
    pub input: Option<PathBuf>,
}

/// Raw configuration as written in the TOML file.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct FileConfig {
    pub api_base_url: Option<String>,
    pub roster_path: Option<String>,
    pub mark_attended_path: Option<String>,
    pub mark_attended_method: Option<MarkAttendedMethod>,
    pub state_dir: Option<PathBuf>,
    pub sweep_interval: Option<String>,
    pub dispatch_pacing: Option<String>,
    pub request_timeout: Option<String>,
    pub cooldown: Option<String>,
    pub probe_interval: Option<String>,
    pub input: Option<PathBuf>,
}

impl FileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Raw `CHECKIN_*` environment values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub roster_path: Option<String>,
    pub mark_attended_path: Option<String>,
    pub mark_attended_method: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub sweep_interval: Option<String>,
    pub dispatch_pacing: Option<String>,
    pub request_timeout: Option<String>,
    pub cooldown: Option<String>,
    pub probe_interval: Option<String>,
    pub input: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            config_path: var("CHECKIN_CONFIG_PATH").map(PathBuf::from),
            api_base_url: var("CHECKIN_API_BASE_URL"),
            roster_path: var("CHECKIN_ROSTER_PATH"),
            mark_attended_path: var("CHECKIN_MARK_ATTENDED_PATH"),
            mark_attended_method: var("CHECKIN_MARK_ATTENDED_METHOD"),
            state_dir: var("CHECKIN_STATE_DIR").map(PathBuf::from),
            sweep_interval: var("CHECKIN_SWEEP_INTERVAL"),
            dispatch_pacing: var("CHECKIN_DISPATCH_PACING"),
            request_timeout: var("CHECKIN_REQUEST_TIMEOUT"),
            cooldown: var("CHECKIN_COOLDOWN"),
            probe_interval: var("CHECKIN_PROBE_INTERVAL"),
            input: var("CHECKIN_INPUT").map(PathBuf::from),
        }
    }
}

/// Fully resolved settings for one terminal run.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalConfig {
    pub api_base_url: Url,
    pub roster_path: String,
    pub mark_attended_path: String,
    pub mark_attended_method: MarkAttendedMethod,
    pub state_dir: PathBuf,
    pub sweep_interval: Duration,
    pub dispatch_pacing: Duration,
    pub request_timeout: Duration,
    pub cooldown: Duration,
    pub probe_interval: Duration,
    /// `None` reads from stdin.
    pub input: Option<PathBuf>,
    /// Config file that contributed to this config, if any.
    pub config_path: Option<PathBuf>,
}

impl TerminalConfig {
    /// Load `.env`, gather the environment, read the config file and
    /// compose everything with `cli` on top.
    pub fn load(cli: &CliOverrides) -> Result<(Self, bool), ConfigError> {
        let env_file_loaded = dotenvy::dotenv().map(|_| true).or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err),
        })?;

        let env = EnvConfig::gather();
        let config = Self::from_sources(cli, &env)?;
        Ok((config, env_file_loaded))
    }

    /// Compose from explicit sources. The config file is located through
    /// `cli.config`, then `CHECKIN_CONFIG_PATH`, then [`DEFAULT_CONFIG_FILE`]
    /// in the working directory; only an explicitly named file must exist.
    pub fn from_sources(cli: &CliOverrides, env: &EnvConfig) -> Result<Self, ConfigError> {
        let explicit = cli.config.clone().or_else(|| env.config_path.clone());
        let (file, config_path) = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::MissingConfig { path }),
            Some(path) => (FileConfig::from_path(&path)?, Some(path)),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    (FileConfig::from_path(&fallback)?, Some(fallback))
                } else {
                    (FileConfig::default(), None)
                }
            }
        };

        Self::compose(cli, env, file, config_path)
    }

    pub fn compose(
        cli: &CliOverrides,
        env: &EnvConfig,
        file: FileConfig,
        config_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let base_url_raw = cli
            .api_base_url
            .clone()
            .or_else(|| env.api_base_url.clone())
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = parse_url("api_base_url", &base_url_raw)?;

        let mark_attended_method = match (cli.mark_attended_method, &env.mark_attended_method) {
            (Some(method), _) => method,
            (None, Some(raw)) => raw.parse().map_err(|message| ConfigError::Invalid {
                key: "mark_attended_method",
                message,
            })?,
            (None, None) => file.mark_attended_method.unwrap_or_default(),
        };

        let config = Self {
            api_base_url,
            roster_path: cli
                .roster_path
                .clone()
                .or_else(|| env.roster_path.clone())
                .or(file.roster_path)
                .unwrap_or_else(|| DEFAULT_ROSTER_PATH.to_string()),
            mark_attended_path: cli
                .mark_attended_path
                .clone()
                .or_else(|| env.mark_attended_path.clone())
                .or(file.mark_attended_path)
                .unwrap_or_else(|| DEFAULT_MARK_ATTENDED_PATH.to_string()),
            mark_attended_method,
            state_dir: cli
                .state_dir
                .clone()
                .or_else(|| env.state_dir.clone())
                .or(file.state_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            sweep_interval: layered_duration(
                "sweep_interval",
                cli.sweep_interval,
                env.sweep_interval.as_deref(),
                file.sweep_interval.as_deref(),
                DEFAULT_SWEEP_INTERVAL,
            )?,
            dispatch_pacing: layered_duration(
                "dispatch_pacing",
                cli.dispatch_pacing,
                env.dispatch_pacing.as_deref(),
                file.dispatch_pacing.as_deref(),
                DEFAULT_PACING,
            )?,
            request_timeout: layered_duration(
                "request_timeout",
                cli.request_timeout,
                env.request_timeout.as_deref(),
                file.request_timeout.as_deref(),
                DEFAULT_DISPATCH_TIMEOUT,
            )?,
            cooldown: layered_duration(
                "cooldown",
                cli.cooldown,
                env.cooldown.as_deref(),
                file.cooldown.as_deref(),
                DEFAULT_COOLDOWN,
            )?,
            probe_interval: layered_duration(
                "probe_interval",
                cli.probe_interval,
                env.probe_interval.as_deref(),
                file.probe_interval.as_deref(),
                DEFAULT_PROBE_INTERVAL,
            )?,
            input: cli.input.clone().or_else(|| env.input.clone()).or(file.input),
            config_path,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                key: "api_base_url",
                message: format!("unsupported scheme `{}`", self.api_base_url.scheme()),
            });
        }

        for (key, value) in [
            ("sweep_interval", self.sweep_interval),
            ("request_timeout", self.request_timeout),
            ("probe_interval", self.probe_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    key,
                    message: "must be greater than zero".into(),
                });
            }
        }

        if self.mark_attended_path.trim_matches('/').is_empty() {
            return Err(ConfigError::Invalid {
                key: "mark_attended_path",
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }

    pub fn endpoints(&self) -> RemoteEndpoints {
        let mut endpoints = RemoteEndpoints::new(self.api_base_url.clone());
        endpoints.roster_path = self.roster_path.clone();
        endpoints.mark_attended_path = self.mark_attended_path.clone();
        endpoints.mark_attended_method = self.mark_attended_method;
        endpoints.request_timeout = self.request_timeout;
        endpoints
    }

    pub fn dispatch_policy(&self) -> DispatchPolicy {
        DispatchPolicy {
            sweep_interval: self.sweep_interval,
            pacing: self.dispatch_pacing,
            call_timeout: self.request_timeout,
        }
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
        key,
        value: value.to_string(),
        source,
    })
}

fn parse_duration(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim()).map_err(|source| ConfigError::InvalidDuration {
        key,
        value: value.to_string(),
        source,
    })
}

fn layered_duration(
    key: &'static str,
    cli: Option<Duration>,
    env: Option<&str>,
    file: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    if let Some(value) = cli {
        return Ok(value);
    }
    match env.or(file) {
        Some(raw) => parse_duration(key, raw),
        None => Ok(default),
    }
}
