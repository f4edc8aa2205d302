//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

use crate::application::jobs::DEFAULT_REAP_INTERVAL;
use crate::domain::types::ConflictPolicy;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "snapback";
const ENV_PREFIX: &str = "SNAPBACK";
const DEFAULT_DATABASE_URL: &str = "sqlite://snapback.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_UNDO_TTL_SECS: u64 = 24 * 60 * 60;
const MAX_UNDO_TTL_SECS: u64 = 366 * 24 * 60 * 60;
const DEFAULT_LIST_LIMIT: u32 = 20;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the snapback binary.
#[derive(Debug, Parser)]
#[command(
    name = "snapback",
    version,
    about = "Snapshot-and-undo engine for business entities"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "SNAPBACK_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Apply embedded database migrations.
    Migrate(CommonOverrides),
    /// Print a user's live undo entries as JSON lines, newest first.
    List(ListArgs),
    /// Restore the entity captured by an undo entry.
    Undo(UndoArgs),
    /// Delete expired undo entries once.
    Reap(CommonOverrides),
    /// Run the expiry sweep periodically until interrupted.
    Reaper(ReaperArgs),
    /// Print the registered entity types.
    Types,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Owner of the entries.
    #[arg(long, value_name = "USER")]
    pub user: String,

    /// Maximum number of entries; 0 selects the configured default.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct UndoArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Owner of the entry.
    #[arg(long, value_name = "USER")]
    pub user: String,

    /// Identifier of the undo entry to apply.
    #[arg(value_name = "ENTRY_ID")]
    pub entry_id: Uuid,

    /// Override the conflict policy (last_write_wins|reject_newer).
    #[arg(long = "conflict-policy", value_name = "POLICY")]
    pub conflict_policy: Option<String>,

    /// Override the per-operation timeout.
    #[arg(long = "operation-timeout-seconds", value_name = "SECONDS")]
    pub operation_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ReaperArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Override the interval between sweeps.
    #[arg(long = "reaper-interval-seconds", value_name = "SECONDS")]
    pub interval_seconds: Option<u64>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub undo: UndoSettings,
    pub reaper: ReaperSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct UndoSettings {
    pub ttl: Duration,
    pub list_default_limit: NonZeroU32,
    /// Upper bound on a requested list limit; `None` honours any positive limit.
    pub list_max_limit: Option<NonZeroU32>,
    pub operation_timeout: Duration,
    pub conflict_policy: ConflictPolicy,
}

#[derive(Debug, Clone)]
pub struct ReaperSettings {
    pub interval: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_command_overrides(cli.command.as_ref());

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    undo: RawUndoSettings,
    reaper: RawReaperSettings,
}

impl RawSettings {
    fn apply_command_overrides(&mut self, command: Option<&Command>) {
        match command {
            Some(Command::Migrate(overrides)) | Some(Command::Reap(overrides)) => {
                self.apply_common_overrides(overrides)
            }
            Some(Command::List(args)) => self.apply_common_overrides(&args.overrides),
            Some(Command::Undo(args)) => self.apply_undo_overrides(args),
            Some(Command::Reaper(args)) => self.apply_reaper_overrides(args),
            Some(Command::Types) => {}
            None => self.apply_reaper_overrides(&ReaperArgs::default()),
        }
    }

    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_undo_overrides(&mut self, args: &UndoArgs) {
        self.apply_common_overrides(&args.overrides);
        if let Some(policy) = args.conflict_policy.as_ref() {
            self.undo.conflict_policy = Some(policy.clone());
        }
        if let Some(seconds) = args.operation_timeout_seconds {
            self.undo.operation_timeout_seconds = Some(seconds);
        }
    }

    fn apply_reaper_overrides(&mut self, args: &ReaperArgs) {
        self.apply_common_overrides(&args.overrides);
        if let Some(seconds) = args.interval_seconds {
            self.reaper.interval_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            undo,
            reaper,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let undo = build_undo_settings(undo)?;
        let reaper = build_reaper_settings(reaper)?;

        Ok(Self {
            logging,
            database,
            undo,
            reaper,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database
        .url
        .and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    if !url.starts_with("sqlite:") {
        return Err(LoadError::invalid(
            "database.url",
            format!("`{url}` is not a sqlite: URL"),
        ));
    }

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_undo_settings(undo: RawUndoSettings) -> Result<UndoSettings, LoadError> {
    let ttl_seconds = undo.ttl_seconds.unwrap_or(DEFAULT_UNDO_TTL_SECS);
    if ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "undo.ttl_seconds",
            "must be greater than zero",
        ));
    }
    if ttl_seconds > MAX_UNDO_TTL_SECS {
        return Err(LoadError::invalid(
            "undo.ttl_seconds",
            format!("must not exceed {MAX_UNDO_TTL_SECS}"),
        ));
    }

    let list_default_limit = non_zero_u32(
        undo.list_default_limit.unwrap_or(DEFAULT_LIST_LIMIT).into(),
        "undo.list_default_limit",
    )?;
    let list_max_limit = undo
        .list_max_limit
        .map(|max| non_zero_u32(max.into(), "undo.list_max_limit"))
        .transpose()?;
    if let Some(max) = list_max_limit.filter(|max| list_default_limit > *max) {
        return Err(LoadError::invalid(
            "undo.list_default_limit",
            format!("must not exceed undo.list_max_limit ({max})"),
        ));
    }

    let timeout_seconds = undo
        .operation_timeout_seconds
        .unwrap_or(DEFAULT_OPERATION_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "undo.operation_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let conflict_policy = match undo.conflict_policy {
        Some(value) => ConflictPolicy::from_str(&value)
            .map_err(|err| LoadError::invalid("undo.conflict_policy", err.to_string()))?,
        None => ConflictPolicy::default(),
    };

    Ok(UndoSettings {
        ttl: Duration::from_secs(ttl_seconds),
        list_default_limit,
        list_max_limit,
        operation_timeout: Duration::from_secs(timeout_seconds),
        conflict_policy,
    })
}

fn build_reaper_settings(reaper: RawReaperSettings) -> Result<ReaperSettings, LoadError> {
    let interval_seconds = reaper
        .interval_seconds
        .unwrap_or(DEFAULT_REAP_INTERVAL.as_secs());
    if interval_seconds == 0 {
        return Err(LoadError::invalid(
            "reaper.interval_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ReaperSettings {
        interval: Duration::from_secs(interval_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUndoSettings {
    ttl_seconds: Option<u64>,
    list_default_limit: Option<u32>,
    list_max_limit: Option<u32>,
    operation_timeout_seconds: Option<u64>,
    conflict_policy: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReaperSettings {
    interval_seconds: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
