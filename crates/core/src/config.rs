use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::agent::{AgentId, AgentProfile};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub calendar: CalendarConfig,
    pub scheduling: SchedulingConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
    pub agents: Vec<AgentProfile>,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    /// When false the calendar store is never contacted and meetings live
    /// only in agent mirrors.
    pub enabled: bool,
    pub database_url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    pub timezone: String,
    pub attendee_domain: String,
}

impl CalendarConfig {
    /// The configured zone. Validation rejects names that do not resolve.
    pub fn zone(&self) -> Tz {
        self.timezone.trim().parse().unwrap_or(Tz::UTC)
    }
}

#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    pub default_duration_minutes: u32,
    pub list_max_results: u32,
    pub reschedule_lookahead: u32,
    pub cancel_lookahead: u32,
    pub allowed_roles: Vec<String>,
}

impl SchedulingConfig {
    pub fn is_allowed_role(&self, role: &str) -> bool {
        let role = role.trim().to_ascii_lowercase();
        self.allowed_roles.iter().any(|allowed| *allowed == role)
    }
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Offline keyword rules; no network access.
    Rules,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
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
    pub calendar_enabled: Option<bool>,
    pub calendar_database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
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

pub const DEFAULT_ALLOWED_ROLES: [&str; 4] = ["ceo", "marketing", "engineering", "design"];

pub fn default_roster() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new("ceo", "CEO", "Oversees the entire organization and strategy."),
        AgentProfile::new(
            "marketing",
            "Marketing Lead",
            "Handles marketing campaigns and market analysis.",
        ),
        AgentProfile::new(
            "engineering",
            "Engineering Lead",
            "Manages the technical team and codebase.",
        ),
        AgentProfile::new("design", "Design Lead", "Leads UI/UX design and product aesthetics."),
        AgentProfile::new(
            "hr",
            "Human Resources Lead",
            "Leads the team that handles all HR related tasks.",
        ),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            calendar: CalendarConfig {
                enabled: true,
                database_url: "sqlite://huddle-calendar.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                timezone: "UTC".to_string(),
                attendee_domain: "example.com".to_string(),
            },
            scheduling: SchedulingConfig {
                default_duration_minutes: 60,
                list_max_results: 10,
                reschedule_lookahead: 20,
                cancel_lookahead: 10,
                allowed_roles: DEFAULT_ALLOWED_ROLES.iter().map(|role| role.to_string()).collect(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Rules,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            agents: default_roster(),
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected rules|openai|anthropic|ollama)"
            ))),
        }
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("huddle.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents.iter().map(|agent| agent.id.clone()).collect()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(calendar) = patch.calendar {
            if let Some(enabled) = calendar.enabled {
                self.calendar.enabled = enabled;
            }
            if let Some(database_url) = calendar.database_url {
                self.calendar.database_url = database_url;
            }
            if let Some(max_connections) = calendar.max_connections {
                self.calendar.max_connections = max_connections;
            }
            if let Some(timeout_secs) = calendar.timeout_secs {
                self.calendar.timeout_secs = timeout_secs;
            }
            if let Some(timezone) = calendar.timezone {
                self.calendar.timezone = timezone;
            }
            if let Some(attendee_domain) = calendar.attendee_domain {
                self.calendar.attendee_domain = attendee_domain;
            }
        }

        if let Some(scheduling) = patch.scheduling {
            if let Some(minutes) = scheduling.default_duration_minutes {
                self.scheduling.default_duration_minutes = minutes;
            }
            if let Some(list_max_results) = scheduling.list_max_results {
                self.scheduling.list_max_results = list_max_results;
            }
            if let Some(reschedule_lookahead) = scheduling.reschedule_lookahead {
                self.scheduling.reschedule_lookahead = reschedule_lookahead;
            }
            if let Some(cancel_lookahead) = scheduling.cancel_lookahead {
                self.scheduling.cancel_lookahead = cancel_lookahead;
            }
            if let Some(allowed_roles) = scheduling.allowed_roles {
                self.scheduling.allowed_roles = normalize_roles(allowed_roles);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
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

        if let Some(agents) = patch.agents {
            self.agents = agents
                .into_iter()
                .map(|agent| {
                    let title = agent.title.unwrap_or_else(|| agent.id.clone());
                    AgentProfile::new(&agent.id, title, agent.description.unwrap_or_default())
                })
                .collect();
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("HUDDLE_CALENDAR_ENABLED") {
            self.calendar.enabled = parse_bool("HUDDLE_CALENDAR_ENABLED", &value)?;
        }
        if let Some(value) = read_env("HUDDLE_CALENDAR_DATABASE_URL") {
            self.calendar.database_url = value;
        }
        if let Some(value) = read_env("HUDDLE_CALENDAR_MAX_CONNECTIONS") {
            self.calendar.max_connections = parse_u32("HUDDLE_CALENDAR_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("HUDDLE_CALENDAR_TIMEOUT_SECS") {
            self.calendar.timeout_secs = parse_u64("HUDDLE_CALENDAR_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("HUDDLE_CALENDAR_TIMEZONE") {
            self.calendar.timezone = value;
        }
        if let Some(value) = read_env("HUDDLE_CALENDAR_ATTENDEE_DOMAIN") {
            self.calendar.attendee_domain = value;
        }

        if let Some(value) = read_env("HUDDLE_SCHEDULING_DEFAULT_DURATION_MINUTES") {
            self.scheduling.default_duration_minutes =
                parse_u32("HUDDLE_SCHEDULING_DEFAULT_DURATION_MINUTES", &value)?;
        }
        if let Some(value) = read_env("HUDDLE_SCHEDULING_LIST_MAX_RESULTS") {
            self.scheduling.list_max_results =
                parse_u32("HUDDLE_SCHEDULING_LIST_MAX_RESULTS", &value)?;
        }
        if let Some(value) = read_env("HUDDLE_SCHEDULING_RESCHEDULE_LOOKAHEAD") {
            self.scheduling.reschedule_lookahead =
                parse_u32("HUDDLE_SCHEDULING_RESCHEDULE_LOOKAHEAD", &value)?;
        }
        if let Some(value) = read_env("HUDDLE_SCHEDULING_CANCEL_LOOKAHEAD") {
            self.scheduling.cancel_lookahead =
                parse_u32("HUDDLE_SCHEDULING_CANCEL_LOOKAHEAD", &value)?;
        }
        if let Some(value) = read_env("HUDDLE_SCHEDULING_ALLOWED_ROLES") {
            self.scheduling.allowed_roles =
                normalize_roles(value.split(',').map(str::to_string).collect());
        }

        if let Some(value) = read_env("HUDDLE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("HUDDLE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("HUDDLE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("HUDDLE_LLM_MODEL") {
            self.llm.model = value;
        }

        let log_level = read_env("HUDDLE_LOGGING_LEVEL").or_else(|| read_env("HUDDLE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("HUDDLE_LOGGING_FORMAT").or_else(|| read_env("HUDDLE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(enabled) = overrides.calendar_enabled {
            self.calendar.enabled = enabled;
        }
        if let Some(database_url) = overrides.calendar_database_url {
            self.calendar.database_url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_calendar(&self.calendar)?;
        validate_scheduling(&self.scheduling)?;
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        validate_agents(&self.agents)?;
        Ok(())
    }
}

fn normalize_roles(roles: Vec<String>) -> Vec<String> {
    roles
        .into_iter()
        .map(|role| role.trim().to_ascii_lowercase())
        .filter(|role| !role.is_empty())
        .collect()
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("huddle.toml"), PathBuf::from("config/huddle.toml")]
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

fn validate_calendar(calendar: &CalendarConfig) -> Result<(), ConfigError> {
    let url = calendar.database_url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "calendar.database_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if calendar.max_connections == 0 {
        return Err(ConfigError::Validation(
            "calendar.max_connections must be greater than zero".to_string(),
        ));
    }

    if calendar.timeout_secs == 0 || calendar.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "calendar.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if calendar.timezone.trim().parse::<Tz>().is_err() {
        return Err(ConfigError::Validation(format!(
            "calendar.timezone `{}` is not an IANA zone name such as `UTC` or `Europe/Berlin`",
            calendar.timezone
        )));
    }

    let domain = calendar.attendee_domain.trim();
    if domain.is_empty() || domain.contains('@') || domain.contains(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "calendar.attendee_domain must be a bare domain such as `example.com`".to_string(),
        ));
    }

    Ok(())
}

fn validate_scheduling(scheduling: &SchedulingConfig) -> Result<(), ConfigError> {
    if scheduling.default_duration_minutes == 0 || scheduling.default_duration_minutes > 1440 {
        return Err(ConfigError::Validation(
            "scheduling.default_duration_minutes must be in range 1..=1440".to_string(),
        ));
    }

    for (key, value) in [
        ("scheduling.list_max_results", scheduling.list_max_results),
        ("scheduling.reschedule_lookahead", scheduling.reschedule_lookahead),
        ("scheduling.cancel_lookahead", scheduling.cancel_lookahead),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{key} must be greater than zero")));
        }
    }

    if scheduling.allowed_roles.is_empty() {
        return Err(ConfigError::Validation(
            "scheduling.allowed_roles must list at least one role".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.model.trim().is_empty() && llm.provider != LlmProvider::Rules {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::Rules => {}
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
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

fn validate_agents(agents: &[AgentProfile]) -> Result<(), ConfigError> {
    if agents.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[agents]] entry is required".to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for agent in agents {
        let id = agent.id.as_str();
        if id.is_empty() || id.contains(char::is_whitespace) || id.contains('@') {
            return Err(ConfigError::Validation(format!(
                "agent id `{id}` must be a non-empty single word without `@`"
            )));
        }
        if !seen.insert(id) {
            return Err(ConfigError::Validation(format!("agent id `{id}` is declared twice")));
        }
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    calendar: Option<CalendarPatch>,
    scheduling: Option<SchedulingPatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
    agents: Option<Vec<AgentPatch>>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    enabled: Option<bool>,
    database_url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    timezone: Option<String>,
    attendee_domain: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulingPatch {
    default_duration_minutes: Option<u32>,
    list_max_results: Option<u32>,
    reschedule_lookahead: Option<u32>,
    cancel_lookahead: Option<u32>,
    allowed_roles: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Deserialize)]
struct AgentPatch {
    id: String,
    title: Option<String>,
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use chrono_tz::Tz;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_offline() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| format!("defaults should validate: {err}"))?;

        ensure(config.llm.provider == LlmProvider::Rules, "default provider should be rules")?;
        ensure(config.scheduling.default_duration_minutes == 60, "default duration is 60")?;
        ensure(config.scheduling.is_allowed_role(" Marketing "), "roles compare case-insensitively")?;
        ensure(!config.scheduling.is_allowed_role("hr"), "hr is registered but not schedulable")?;
        ensure(config.agents.len() == 5, "default roster has five agents")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_HUDDLE_OPENAI_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("huddle.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "openai"
api_key = "${TEST_HUDDLE_OPENAI_KEY}"

[[agents]]
id = "ceo"
title = "CEO"

[[agents]]
id = "Design"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be loaded from environment",
            )?;
            ensure(config.agents.len() == 2, "configured roster replaces the default")?;
            ensure(config.agents[1].id.as_str() == "design", "agent ids are normalized")?;
            ensure(config.agents[1].title == "Design", "missing title falls back to the id")?;
            Ok(())
        })();

        clear_vars(&["TEST_HUDDLE_OPENAI_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HUDDLE_LOG_LEVEL", "warn");
        env::set_var("HUDDLE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["HUDDLE_LOG_LEVEL", "HUDDLE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HUDDLE_CALENDAR_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("HUDDLE_SCHEDULING_CANCEL_LOOKAHEAD", "25");
        env::set_var("HUDDLE_SCHEDULING_ALLOWED_ROLES", "CEO, design ,");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("huddle.toml");
            fs::write(
                &path,
                r#"
[calendar]
database_url = "sqlite://from-file.db"
timezone = "Europe/Berlin"

[scheduling]
cancel_lookahead = 3
list_max_results = 7

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    calendar_database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.calendar.database_url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.scheduling.cancel_lookahead == 25, "env should win over file")?;
            ensure(config.scheduling.list_max_results == 7, "file should win over defaults")?;
            ensure(config.calendar.timezone == "Europe/Berlin", "file timezone should apply")?;
            ensure(
                config.scheduling.allowed_roles == vec!["ceo".to_string(), "design".to_string()],
                "env role list should be normalized",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "HUDDLE_CALENDAR_DATABASE_URL",
            "HUDDLE_SCHEDULING_CANCEL_LOOKAHEAD",
            "HUDDLE_SCHEDULING_ALLOWED_ROLES",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HUDDLE_LLM_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["HUDDLE_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn unknown_timezone_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HUDDLE_CALENDAR_TIMEZONE", "Mars/Olympus_Mons");
        let rejected = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("calendar.timezone"), "error should name calendar.timezone")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("an unknown zone should not validate".to_string()),
        };

        env::set_var("HUDDLE_CALENDAR_TIMEZONE", "America/New_York");
        let accepted = match AppConfig::load(LoadOptions::default()) {
            Ok(config) => ensure(
                config.calendar.zone() == Tz::America__New_York,
                "named zone should resolve",
            ),
            Err(error) => Err(format!("valid zone rejected: {error}")),
        };

        clear_vars(&["HUDDLE_CALENDAR_TIMEZONE"]);
        rejected.and(accepted)
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HUDDLE_SCHEDULING_LIST_MAX_RESULTS", "ten");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "HUDDLE_SCHEDULING_LIST_MAX_RESULTS",
                "error should name the offending variable",
            ),
            _ => Err("expected an invalid env override error".to_string()),
        };

        clear_vars(&["HUDDLE_SCHEDULING_LIST_MAX_RESULTS"]);
        result
    }

    #[test]
    fn duplicate_agent_ids_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("huddle.toml");
        fs::write(&path, "[[agents]]\nid = \"ceo\"\n\n[[agents]]\nid = \"CEO\"\n")
            .map_err(|err| err.to_string())?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Err(ConfigError::Validation(message)) => {
                ensure(message.contains("declared twice"), "duplicate id should be named")
            }
            _ => Err("expected duplicate agent validation failure".to_string()),
        }
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("HUDDLE_LLM_PROVIDER", "openai");
        env::set_var("HUDDLE_LLM_API_KEY", "sk-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["HUDDLE_LLM_PROVIDER", "HUDDLE_LLM_API_KEY"]);
        result
    }
}
