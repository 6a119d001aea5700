use std::sync::Arc;

use huddle_agent::llm::HttpLlmClient;
use huddle_agent::understanding::{EntityExtractor, IntentClassifier, LlmUnderstanding};
use huddle_agent::{AgentDirectory, Network, RuleBasedUnderstanding, SchedulingOrchestrator, SchedulingSettings};
use huddle_core::audit::{AuditSink, TracingAuditSink};
use huddle_core::clock::{Clock, SystemClock};
use huddle_core::config::{AppConfig, ConfigError, LlmProvider, LoadOptions};
use huddle_db::{connect_calendar, migrations, CalendarStore, DbPool, SqlCalendarStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub directory: AgentDirectory,
    pub calendar_pool: Option<DbPool>,
}

impl Application {
    pub fn network(&self) -> &Arc<Network> {
        self.directory.network()
    }

    pub async fn shutdown(self) {
        if let Some(pool) = self.calendar_pool {
            pool.close().await;
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("calendar database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("calendar database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client setup failed: {0}")]
    Llm(String),
}

impl BootstrapError {
    /// `(error_class, exit_code)` for command payloads.
    pub fn classify(&self) -> (&'static str, u8) {
        match self {
            Self::Config(_) => ("config_validation", 2),
            Self::DatabaseConnect(_) => ("db_connectivity", 4),
            Self::Migration(_) => ("migration", 5),
            Self::Llm(_) => ("llm_setup", 6),
        }
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        agents = config.agents.len(),
        "starting huddle bootstrap"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::in_zone(config.calendar.zone()));
    let network = Arc::new(Network::new(config.agents.clone(), clock.clone()));

    let (calendar, calendar_pool) = if config.calendar.enabled {
        let pool =
            connect_calendar(&config.calendar).await.map_err(BootstrapError::DatabaseConnect)?;
        migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
        info!(
            event_name = "system.bootstrap.calendar_connected",
            correlation_id = "bootstrap",
            "calendar store connected and migrated"
        );
        let store = Arc::new(SqlCalendarStore::new(pool.clone())) as Arc<dyn CalendarStore>;
        (Some(store), Some(pool))
    } else {
        info!(
            event_name = "system.bootstrap.calendar_disabled",
            correlation_id = "bootstrap",
            "calendar disabled, meetings are kept in agent mirrors only"
        );
        (None, None)
    };

    let (classifier, extractor) = match config.llm.provider {
        LlmProvider::Rules => {
            let rules = Arc::new(RuleBasedUnderstanding::new(&network.agent_ids(), clock.clone()));
            (
                rules.clone() as Arc<dyn IntentClassifier>,
                rules as Arc<dyn EntityExtractor>,
            )
        }
        LlmProvider::OpenAi | LlmProvider::Anthropic | LlmProvider::Ollama => {
            let client = HttpLlmClient::from_config(&config.llm)
                .map_err(|error| BootstrapError::Llm(error.to_string()))?;
            let llm = Arc::new(LlmUnderstanding::new(client, clock.clone()));
            (llm.clone() as Arc<dyn IntentClassifier>, llm as Arc<dyn EntityExtractor>)
        }
    };

    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let orchestrator = Arc::new(SchedulingOrchestrator::new(
        network,
        calendar,
        extractor,
        clock,
        SchedulingSettings::from_config(&config),
        audit.clone(),
    ));
    let directory = AgentDirectory::new(classifier, orchestrator, audit);

    Ok(Application { config, directory, calendar_pool })
}
