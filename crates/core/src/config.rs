use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::deviations::WorkflowPolicy;
use crate::domain::case::IncentiveStatus;
use crate::incentive::IncentivePolicy;
use crate::roles::{RuleSet, RuleSetError};

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub incentive: IncentivePolicy,
    pub workflow: WorkflowPolicy,
    pub roles: RolesConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Debug, Default)]
pub struct RolesConfig {
    /// Designation rule file; the built-in table is used when unset.
    pub rules_path: Option<PathBuf>,
}

impl RolesConfig {
    pub fn load_rule_set(&self) -> Result<RuleSet, RuleSetError> {
        match &self.rules_path {
            Some(path) => RuleSet::load(path),
            None => Ok(RuleSet::builtin()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub rules_path: Option<PathBuf>,
    pub require_rejection_reason: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://incentive.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), port: 8080, graceful_shutdown_secs: 15 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("incentive.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(incentive) = patch.incentive {
            let policy = &mut self.incentive;
            let rates = [
                (incentive.secured_volume_rate_pct, &mut policy.secured_volume_rate_pct),
                (
                    incentive.secured_direct_volume_rate_pct,
                    &mut policy.secured_direct_volume_rate_pct,
                ),
                (incentive.unsecured_volume_rate_pct, &mut policy.unsecured_volume_rate_pct),
                (incentive.per_secured_case_rate, &mut policy.per_secured_case_rate),
                (incentive.per_unsecured_case_rate, &mut policy.per_unsecured_case_rate),
                (incentive.silver_threshold, &mut policy.silver_threshold),
                (incentive.gold_threshold, &mut policy.gold_threshold),
            ];
            for (patched, slot) in rates {
                if let Some(value) = patched {
                    *slot = value;
                }
            }
            if let Some(statuses) = incentive.provisional_statuses {
                policy.provisional_statuses = statuses;
            }
            if let Some(statuses) = incentive.final_statuses {
                policy.final_statuses = statuses;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(required) = workflow.require_rejection_reason {
                self.workflow.require_rejection_reason = required;
            }
            if let Some(size) = workflow.default_page_size {
                self.workflow.default_page_size = size;
            }
            if let Some(size) = workflow.max_page_size {
                self.workflow.max_page_size = size;
            }
        }

        if let Some(roles) = patch.roles {
            if let Some(rules_path) = roles.rules_path {
                self.roles.rules_path = Some(rules_path);
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("INCENTIVE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("INCENTIVE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("INCENTIVE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("INCENTIVE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("INCENTIVE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INCENTIVE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("INCENTIVE_SERVER_PORT") {
            self.server.port = parse_env("INCENTIVE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("INCENTIVE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("INCENTIVE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("INCENTIVE_LOGGING_LEVEL").or_else(|| read_env("INCENTIVE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INCENTIVE_LOGGING_FORMAT").or_else(|| read_env("INCENTIVE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        let policy = &mut self.incentive;
        let decimals = [
            ("INCENTIVE_SECURED_VOLUME_RATE_PCT", &mut policy.secured_volume_rate_pct),
            ("INCENTIVE_SECURED_DIRECT_VOLUME_RATE_PCT", &mut policy.secured_direct_volume_rate_pct),
            ("INCENTIVE_UNSECURED_VOLUME_RATE_PCT", &mut policy.unsecured_volume_rate_pct),
            ("INCENTIVE_PER_SECURED_CASE_RATE", &mut policy.per_secured_case_rate),
            ("INCENTIVE_PER_UNSECURED_CASE_RATE", &mut policy.per_unsecured_case_rate),
            ("INCENTIVE_SILVER_THRESHOLD", &mut policy.silver_threshold),
            ("INCENTIVE_GOLD_THRESHOLD", &mut policy.gold_threshold),
        ];
        for (key, slot) in decimals {
            if let Some(value) = read_env(key) {
                *slot = parse_env::<Decimal>(key, &value)?;
            }
        }
        if let Some(value) = read_env("INCENTIVE_PROVISIONAL_STATUSES") {
            policy.provisional_statuses = parse_statuses("INCENTIVE_PROVISIONAL_STATUSES", &value)?;
        }
        if let Some(value) = read_env("INCENTIVE_FINAL_STATUSES") {
            policy.final_statuses = parse_statuses("INCENTIVE_FINAL_STATUSES", &value)?;
        }

        if let Some(value) = read_env("INCENTIVE_WORKFLOW_REQUIRE_REJECTION_REASON") {
            self.workflow.require_rejection_reason =
                parse_env("INCENTIVE_WORKFLOW_REQUIRE_REJECTION_REASON", &value)?;
        }
        if let Some(value) = read_env("INCENTIVE_WORKFLOW_DEFAULT_PAGE_SIZE") {
            self.workflow.default_page_size =
                parse_env("INCENTIVE_WORKFLOW_DEFAULT_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("INCENTIVE_WORKFLOW_MAX_PAGE_SIZE") {
            self.workflow.max_page_size = parse_env("INCENTIVE_WORKFLOW_MAX_PAGE_SIZE", &value)?;
        }

        if let Some(value) = read_env("INCENTIVE_ROLES_RULES_PATH") {
            self.roles.rules_path = Some(PathBuf::from(value));
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(rules_path) = overrides.rules_path {
            self.roles.rules_path = Some(rules_path);
        }
        if let Some(required) = overrides.require_rejection_reason {
            self.workflow.require_rejection_reason = required;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_incentive(&self.incentive)?;
        validate_workflow(&self.workflow)?;
        validate_roles(&self.roles)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("incentive.toml"), PathBuf::from("config/incentive.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_incentive(policy: &IncentivePolicy) -> Result<(), ConfigError> {
    let non_negative = [
        ("incentive.secured_volume_rate_pct", policy.secured_volume_rate_pct),
        ("incentive.secured_direct_volume_rate_pct", policy.secured_direct_volume_rate_pct),
        ("incentive.unsecured_volume_rate_pct", policy.unsecured_volume_rate_pct),
        ("incentive.per_secured_case_rate", policy.per_secured_case_rate),
        ("incentive.per_unsecured_case_rate", policy.per_unsecured_case_rate),
        ("incentive.silver_threshold", policy.silver_threshold),
        ("incentive.gold_threshold", policy.gold_threshold),
    ];
    if let Some((key, _)) = non_negative.iter().find(|(_, value)| value.is_sign_negative()) {
        return Err(ConfigError::Validation(format!("{key} must not be negative")));
    }

    if policy.gold_threshold < policy.silver_threshold {
        return Err(ConfigError::Validation(
            "incentive.gold_threshold must be greater than or equal to incentive.silver_threshold"
                .to_string(),
        ));
    }

    if policy.provisional_statuses.is_empty() || policy.final_statuses.is_empty() {
        return Err(ConfigError::Validation(
            "incentive.provisional_statuses and incentive.final_statuses must name at least one status"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowPolicy) -> Result<(), ConfigError> {
    if workflow.max_page_size == 0 {
        return Err(ConfigError::Validation(
            "workflow.max_page_size must be greater than zero".to_string(),
        ));
    }

    if workflow.default_page_size == 0 || workflow.default_page_size > workflow.max_page_size {
        return Err(ConfigError::Validation(
            "workflow.default_page_size must be in range 1..=workflow.max_page_size".to_string(),
        ));
    }

    Ok(())
}

fn validate_roles(roles: &RolesConfig) -> Result<(), ConfigError> {
    if let Some(path) = &roles.rules_path {
        if !path.exists() {
            return Err(ConfigError::Validation(format!(
                "roles.rules_path `{}` does not exist; remove it to use the built-in rule table",
                path.display()
            )));
        }
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Comma-separated status list, e.g. `eligible,approved`.
fn parse_statuses(key: &str, value: &str) -> Result<Vec<IncentiveStatus>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|status| !status.is_empty())
        .map(|status| parse_env::<IncentiveStatus>(key, status))
        .collect()
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    incentive: Option<IncentivePatch>,
    workflow: Option<WorkflowPatch>,
    roles: Option<RolesPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct IncentivePatch {
    secured_volume_rate_pct: Option<Decimal>,
    secured_direct_volume_rate_pct: Option<Decimal>,
    unsecured_volume_rate_pct: Option<Decimal>,
    per_secured_case_rate: Option<Decimal>,
    per_unsecured_case_rate: Option<Decimal>,
    silver_threshold: Option<Decimal>,
    gold_threshold: Option<Decimal>,
    provisional_statuses: Option<Vec<IncentiveStatus>>,
    final_statuses: Option<Vec<IncentiveStatus>>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    require_rejection_reason: Option<bool>,
    default_page_size: Option<u32>,
    max_page_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RolesPatch {
    rules_path: Option<PathBuf>,
}
