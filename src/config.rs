use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::cli::{ApiArgs, DaemonArgs, FixerArgs, RunOnceArgs, StoreArgs};
use crate::jobs::timezone_fixer::resolve_timezone;
use crate::jobs::FixerSettings;
use crate::scheduler::{CronSchedule, ScheduleParseError};

/// Startup validation failures. Nothing is scheduled when one occurs.
#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error(transparent)]
    InvalidSchedule(#[from] ScheduleParseError),

    #[error("Unknown target timezone '{0}'")]
    UnknownTimezone(String),

    #[error("Unknown schedule timezone '{0}'")]
    UnknownScheduleTimezone(String),

    #[error("Invalid Immich API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request timeout must be at least one second")]
    InvalidTimeout,

    #[error("Failed to read API key file {path}: {source}")]
    SecretRead {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Connection settings for the Immich API.
#[derive(Clone)]
pub(crate) struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ApiConfig {
    pub(crate) fn from_args(args: &ApiArgs) -> Result<Self, ConfigError> {
        let base_url = args
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::Missing("--api-url / IMMICH_API_URL"))?;
        Url::parse(base_url).map_err(|e| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let api_key = read_secret_or_env(&args.api_key_file, args.api_key.as_deref())?
            .ok_or(ConfigError::Missing(
                "--api-key / IMMICH_API_KEY or --api-key-file / IMMICH_API_KEY_FILE",
            ))?;

        if args.request_timeout == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        Ok(Self {
            base_url: base_url.to_string(),
            api_key,
            request_timeout: Duration::from_secs(args.request_timeout),
        })
    }
}

/// Everything needed to execute the jobs once.
#[derive(Debug, Clone)]
pub(crate) struct JobConfig {
    pub api: ApiConfig,
    pub checkpoint_dir: PathBuf,
    pub fixer: FixerSettings,
}

impl JobConfig {
    pub(crate) fn from_args(
        api: &ApiArgs,
        store: &StoreArgs,
        fixer: &FixerArgs,
    ) -> Result<Self, ConfigError> {
        let fixer = fixer_settings(fixer)?;
        Ok(Self {
            api: ApiConfig::from_args(api)?,
            checkpoint_dir: checkpoint_dir(store),
            fixer,
        })
    }
}

impl TryFrom<&RunOnceArgs> for JobConfig {
    type Error = ConfigError;

    fn try_from(args: &RunOnceArgs) -> Result<Self, Self::Error> {
        Self::from_args(&args.api, &args.store, &args.fixer)
    }
}

/// Settings for the long-running scheduled mode.
#[derive(Debug, Clone)]
pub(crate) struct DaemonConfig {
    pub job: JobConfig,
    pub schedule: CronSchedule,
    pub notify_systemd: bool,
}

impl DaemonConfig {
    pub(crate) fn from_args(args: &DaemonArgs) -> Result<Self, ConfigError> {
        let expr = args
            .schedule
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("--schedule / CRON_EXPRESSION"))?;
        let mut schedule = CronSchedule::parse(expr)?;
        if let Some(name) = non_empty(args.schedule_timezone.as_deref()) {
            let tz = resolve_timezone(&name)
                .map_err(|_| ConfigError::UnknownScheduleTimezone(name.clone()))?;
            schedule = schedule.in_zone(tz);
        }

        Ok(Self {
            job: JobConfig::from_args(&args.api, &args.store, &args.fixer)?,
            schedule,
            notify_systemd: args.notify_systemd,
        })
    }
}

pub(crate) fn checkpoint_dir(store: &StoreArgs) -> PathBuf {
    expand_tilde(&store.checkpoint_dir)
}

fn fixer_settings(args: &FixerArgs) -> Result<FixerSettings, ConfigError> {
    let target_timezone = args.target_timezone.trim().to_string();
    resolve_timezone(&target_timezone)
        .map_err(|_| ConfigError::UnknownTimezone(target_timezone.clone()))?;

    Ok(FixerSettings {
        target_timezone,
        library_id: non_empty(args.library_id.as_deref()),
        device_id: non_empty(args.device_id.as_deref()),
    })
}

/// Load `.env` from the working directory or a parent, if present.
///
/// Variables already set in the process environment are left untouched.
pub(crate) fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Resolve the API key: a readable secret file wins over the plain value.
///
/// A missing file falls back to `fallback`; any other read error is fatal so
/// a misconfigured mount is not silently replaced by a stale variable.
fn read_secret_or_env(path: &Path, fallback: Option<&str>) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let secret = contents.trim();
            if !secret.is_empty() {
                tracing::debug!(path = %path.display(), "Using API key from secret file");
                return Ok(Some(secret.to_string()));
            }
            tracing::warn!(path = %path.display(), "API key file is empty, ignoring it");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(ConfigError::SecretRead {
                path: path.to_path_buf(),
                source,
            })
        }
    }
    Ok(non_empty(fallback))
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use crate::scheduler::ScheduleZone;
    use clap::Parser;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("immich-jobs-rs")
            .join("config_tests")
            .join(name);
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn make_daemon_args(overrides: impl FnOnce(&mut DaemonArgs)) -> DaemonArgs {
        let cli = Cli::try_parse_from([
            "immich-jobs-rs",
            "--api-url",
            "http://immich:2283/api",
            "--api-key",
            "secret",
            "--api-key-file",
            "/nonexistent/immich_api_key",
            "--schedule",
            "*/10 * * * *",
        ])
        .unwrap();
        let Command::Daemon(mut args) = cli.effective_command() else {
            panic!("expected daemon");
        };
        overrides(&mut args);
        args
    }

    #[test]
    fn test_env_file_does_not_override_process_env() {
        let dir = scratch_dir("env_file");
        let path = dir.join(".env");
        std::fs::write(
            &path,
            "IMMICH_JOBS_ENV_FILE_ONLY=from-file\nIMMICH_JOBS_ENV_FILE_SHADOWED=from-file\n",
        )
        .unwrap();
        std::env::set_var("IMMICH_JOBS_ENV_FILE_SHADOWED", "from-process");

        dotenvy::from_path(&path).unwrap();
        assert_eq!(
            std::env::var("IMMICH_JOBS_ENV_FILE_ONLY").unwrap(),
            "from-file"
        );
        assert_eq!(
            std::env::var("IMMICH_JOBS_ENV_FILE_SHADOWED").unwrap(),
            "from-process"
        );
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/immich");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join("immich"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(expand_tilde("/data"), PathBuf::from("/data"));
        assert_eq!(expand_tilde("./"), PathBuf::from("./"));
    }

    #[test]
    fn test_daemon_config_from_args() {
        let cfg = DaemonConfig::from_args(&make_daemon_args(|_| {})).unwrap();
        assert_eq!(cfg.schedule.as_str(), "0 */10 * * * *");
        assert_eq!(cfg.job.api.base_url, "http://immich:2283/api");
        assert_eq!(cfg.job.api.api_key, "secret");
        assert_eq!(cfg.job.api.request_timeout, Duration::from_secs(30));
        assert_eq!(cfg.job.fixer.target_timezone, "Asia/Tokyo");
        assert!(!cfg.notify_systemd);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let cfg = DaemonConfig::from_args(&make_daemon_args(|_| {})).unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_missing_schedule() {
        let args = make_daemon_args(|a| a.schedule = None);
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::Missing(_))
        ));
        let args = make_daemon_args(|a| a.schedule = Some("  ".into()));
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_invalid_schedule() {
        let args = make_daemon_args(|a| a.schedule = Some("whenever".into()));
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::InvalidSchedule(_))
        ));
    }

    #[test]
    fn test_schedule_timezone() {
        let cfg = DaemonConfig::from_args(&make_daemon_args(|_| {})).unwrap();
        assert_eq!(cfg.schedule.zone(), ScheduleZone::Local);

        let args = make_daemon_args(|a| a.schedule_timezone = Some(" Europe/Berlin ".into()));
        let cfg = DaemonConfig::from_args(&args).unwrap();
        assert_eq!(
            cfg.schedule.zone(),
            ScheduleZone::Named(chrono_tz::Europe::Berlin)
        );

        let args = make_daemon_args(|a| a.schedule_timezone = Some("Mars/Olympus".into()));
        match DaemonConfig::from_args(&args) {
            Err(ConfigError::UnknownScheduleTimezone(tz)) => assert_eq!(tz, "Mars/Olympus"),
            other => panic!("expected UnknownScheduleTimezone, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_api_url_and_key() {
        let args = make_daemon_args(|a| a.api.api_url = None);
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::Missing(_))
        ));
        let args = make_daemon_args(|a| a.api.api_key = Some("   ".into()));
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn test_invalid_api_url() {
        let args = make_daemon_args(|a| a.api.api_url = Some("not a url".into()));
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_unknown_timezone() {
        let args = make_daemon_args(|a| a.fixer.target_timezone = "Mars/Olympus".into());
        match DaemonConfig::from_args(&args) {
            Err(ConfigError::UnknownTimezone(tz)) => assert_eq!(tz, "Mars/Olympus"),
            other => panic!("expected UnknownTimezone, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let args = make_daemon_args(|a| a.api.request_timeout = 0);
        assert!(matches!(
            DaemonConfig::from_args(&args),
            Err(ConfigError::InvalidTimeout)
        ));
    }

    #[test]
    fn test_blank_filters_are_dropped() {
        let args = make_daemon_args(|a| {
            a.fixer.library_id = Some("".into());
            a.fixer.device_id = Some(" phone ".into());
        });
        let cfg = DaemonConfig::from_args(&args).unwrap();
        assert_eq!(cfg.job.fixer.library_id, None);
        assert_eq!(cfg.job.fixer.device_id.as_deref(), Some("phone"));
    }

    #[test]
    fn test_secret_file_wins_over_env_value() {
        let dir = scratch_dir("secret_wins");
        let path = dir.join("immich_api_key");
        std::fs::write(&path, "  from-file\n").unwrap();

        let key = read_secret_or_env(&path, Some("from-env")).unwrap();
        assert_eq!(key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_missing_or_empty_secret_file_falls_back() {
        let dir = scratch_dir("secret_fallback");
        let missing = dir.join("absent");
        assert_eq!(
            read_secret_or_env(&missing, Some("from-env")).unwrap().as_deref(),
            Some("from-env")
        );

        let empty = dir.join("empty");
        std::fs::write(&empty, "\n").unwrap();
        assert_eq!(
            read_secret_or_env(&empty, Some("from-env")).unwrap().as_deref(),
            Some("from-env")
        );
        assert_eq!(read_secret_or_env(&empty, None).unwrap(), None);
    }

    #[test]
    fn test_unreadable_secret_path_is_an_error() {
        // A directory exists but cannot be read as a file.
        let dir = scratch_dir("secret_is_dir");
        assert!(matches!(
            read_secret_or_env(&dir, Some("from-env")),
            Err(ConfigError::SecretRead { .. })
        ));
    }
}
