use std::sync::Arc;

use axum::Router;
use incentive_core::config::{AppConfig, ConfigError, LoadOptions};
use incentive_core::deviations::DeviationWorkflow;
use incentive_core::incentive::IncentiveCalculator;
use incentive_core::roles::{RoleResolver, RuleSetError};
use incentive_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

use crate::api::{self, AppState};
use crate::audit::TracingAuditSink;
use crate::health;
use crate::services::{PortalServices, Repositories};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

impl Application {
    /// API routes plus `/health`.
    pub fn router(&self) -> Router {
        api::router(self.state.clone()).merge(health::router(self.db_pool.clone()))
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("designation rules could not be loaded: {0}")]
    Rules(#[from] RuleSetError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let rule_set = config.roles.load_rule_set()?;
    info!(
        event_name = "system.bootstrap.rules_loaded",
        correlation_id = "bootstrap",
        rules_version = %rule_set.version,
        rule_count = rule_set.rules.len(),
        "designation rules loaded"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let services = PortalServices::new(
        Repositories::sql(db_pool.clone()),
        RoleResolver::new(rule_set),
        DeviationWorkflow::new(config.workflow.clone()),
        IncentiveCalculator::new(config.incentive.clone()),
        Arc::new(TracingAuditSink),
    );

    Ok(Application { config, db_pool, state: AppState::new(services) })
}
