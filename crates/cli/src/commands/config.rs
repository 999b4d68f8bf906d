use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use toml::Value;

use crate::commands::{load_config, to_data, CommandResult};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the source each value came from
/// (env > file > default).
pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key: &str, env_keys: &[&str]| {
        field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };
    let entry = |key: &'static str, value: String, env_keys: &[&str]| ConfigEntry {
        key,
        value,
        source: source(key, env_keys),
    };

    let incentive = &config.incentive;
    let rules_version = match config.roles.load_rule_set() {
        Ok(rule_set) => rule_set.version,
        Err(error) => {
            return CommandResult::failure("config", "rules_invalid", error.to_string(), 2)
        }
    };

    let entries = vec![
        entry("database.url", config.database.url.clone(), &["INCENTIVE_DATABASE_URL"]),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["INCENTIVE_DATABASE_MAX_CONNECTIONS"],
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["INCENTIVE_DATABASE_TIMEOUT_SECS"],
        ),
        entry(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["INCENTIVE_SERVER_BIND_ADDRESS"],
        ),
        entry("server.port", config.server.port.to_string(), &["INCENTIVE_SERVER_PORT"]),
        entry(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["INCENTIVE_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["INCENTIVE_LOGGING_LEVEL", "INCENTIVE_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["INCENTIVE_LOGGING_FORMAT", "INCENTIVE_LOG_FORMAT"],
        ),
        entry(
            "incentive.secured_volume_rate_pct",
            incentive.secured_volume_rate_pct.to_string(),
            &["INCENTIVE_SECURED_VOLUME_RATE_PCT"],
        ),
        entry(
            "incentive.secured_direct_volume_rate_pct",
            incentive.secured_direct_volume_rate_pct.to_string(),
            &["INCENTIVE_SECURED_DIRECT_VOLUME_RATE_PCT"],
        ),
        entry(
            "incentive.unsecured_volume_rate_pct",
            incentive.unsecured_volume_rate_pct.to_string(),
            &["INCENTIVE_UNSECURED_VOLUME_RATE_PCT"],
        ),
        entry(
            "incentive.per_secured_case_rate",
            incentive.per_secured_case_rate.to_string(),
            &["INCENTIVE_PER_SECURED_CASE_RATE"],
        ),
        entry(
            "incentive.per_unsecured_case_rate",
            incentive.per_unsecured_case_rate.to_string(),
            &["INCENTIVE_PER_UNSECURED_CASE_RATE"],
        ),
        entry(
            "incentive.silver_threshold",
            incentive.silver_threshold.to_string(),
            &["INCENTIVE_SILVER_THRESHOLD"],
        ),
        entry(
            "incentive.gold_threshold",
            incentive.gold_threshold.to_string(),
            &["INCENTIVE_GOLD_THRESHOLD"],
        ),
        entry(
            "incentive.provisional_statuses",
            join_statuses(&incentive.provisional_statuses),
            &["INCENTIVE_PROVISIONAL_STATUSES"],
        ),
        entry(
            "incentive.final_statuses",
            join_statuses(&incentive.final_statuses),
            &["INCENTIVE_FINAL_STATUSES"],
        ),
        entry(
            "workflow.require_rejection_reason",
            config.workflow.require_rejection_reason.to_string(),
            &["INCENTIVE_WORKFLOW_REQUIRE_REJECTION_REASON"],
        ),
        entry(
            "workflow.default_page_size",
            config.workflow.default_page_size.to_string(),
            &["INCENTIVE_WORKFLOW_DEFAULT_PAGE_SIZE"],
        ),
        entry(
            "workflow.max_page_size",
            config.workflow.max_page_size.to_string(),
            &["INCENTIVE_WORKFLOW_MAX_PAGE_SIZE"],
        ),
        entry(
            "roles.rules_path",
            config
                .roles
                .rules_path
                .as_deref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<builtin>".to_string()),
            &["INCENTIVE_ROLES_RULES_PATH"],
        ),
        ConfigEntry { key: "roles.rules_version", value: rules_version, source: "derived".into() },
    ];

    match to_data("config", &entries) {
        Ok(data) => CommandResult::success_with_data(
            "config",
            "effective config (source precedence: env > file > default)",
            Some(data),
        ),
        Err(failure) => failure,
    }
}

fn join_statuses(statuses: &[incentive_core::domain::case::IncentiveStatus]) -> String {
    statuses.iter().map(|status| status.as_str()).collect::<Vec<_>>().join(",")
}

fn detect_config_path() -> Option<PathBuf> {
    ["incentive.toml", "config/incentive.toml"].into_iter().map(PathBuf::from).find(|p| p.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
