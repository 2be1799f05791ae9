use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::jobs::timezone_fixer::{DEFAULT_TARGET_TIMEZONE, JOB_NAME};
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "immich-jobs-rs",
    version,
    about = "Scheduled maintenance jobs for an Immich photo server",
    args_conflicts_with_subcommands = true
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Daemon options, accepted without a subcommand
    #[command(flatten)]
    pub daemon: DaemonArgs,

    /// Log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value = "info", global = true)]
    pub log_level: LogLevel,
}

impl Cli {
    /// The subcommand to run; a bare invocation means `daemon`.
    pub(crate) fn effective_command(self) -> Command {
        self.command.unwrap_or(Command::Daemon(self.daemon))
    }
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Run jobs on a cron schedule until interrupted (default)
    Daemon(DaemonArgs),
    /// Run every job once and exit
    RunOnce(RunOnceArgs),
    /// Show stored checkpoints
    Status(StatusArgs),
    /// Clear a job's checkpoint so its next run replays full history
    ResetCheckpoint(ResetArgs),
}

/// Connection to the Immich server.
#[derive(Args, Debug, Clone)]
pub(crate) struct ApiArgs {
    /// Base URL of the Immich API, e.g. http://immich:2283/api
    #[arg(long, env = "IMMICH_API_URL")]
    pub api_url: Option<String>,

    /// API key. Prefer --api-key-file; values passed here show up in
    /// process listings.
    #[arg(long, env = "IMMICH_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// File holding the API key; takes precedence over --api-key when it exists
    #[arg(
        long,
        env = "IMMICH_API_KEY_FILE",
        default_value = "/run/secrets/immich_api_key"
    )]
    pub api_key_file: PathBuf,

    /// HTTP request timeout in seconds
    #[arg(long, env = "IMMICH_REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout: u64,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct StoreArgs {
    /// Directory holding last_created.json
    #[arg(long, env = "LAST_CREATED_DIR", default_value = "./")]
    pub checkpoint_dir: String,
}

/// Options of the timezone fixer job.
#[derive(Args, Debug, Clone)]
pub(crate) struct FixerArgs {
    /// IANA timezone that UTC-annotated capture times are rewritten into
    #[arg(long, env = "TARGET_TIMEZONE", default_value = DEFAULT_TARGET_TIMEZONE)]
    pub target_timezone: String,

    /// Only scan assets of this library
    #[arg(long, env = "IMMICH_LIBRARY_ID")]
    pub library_id: Option<String>,

    /// Only scan assets uploaded by this device
    #[arg(long, env = "IMMICH_DEVICE_ID")]
    pub device_id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct DaemonArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub fixer: FixerArgs,

    /// Cron expression: 5-field, seconds-first 6-field, or @hourly-style
    #[arg(long, env = "CRON_EXPRESSION")]
    pub schedule: Option<String>,

    /// IANA zone the schedule is evaluated in [default: process local time]
    #[arg(long, env = "CRON_TZ")]
    pub schedule_timezone: Option<String>,

    /// Send sd_notify READY/STATUS/STOPPING messages
    #[arg(long)]
    pub notify_systemd: bool,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct RunOnceArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub fixer: FixerArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub(crate) struct ResetArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Job whose checkpoint is cleared
    #[arg(long, default_value = JOB_NAME)]
    pub job: String,

    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}
