use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use huddle_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source_of = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let llm_api_key = match &config.llm.api_key {
        Some(secret) => redact_secret(secret.expose_secret()),
        None => "<unset>".to_string(),
    };

    let fields: Vec<(&str, String, Vec<&str>)> = vec![
        ("calendar.enabled", config.calendar.enabled.to_string(), vec!["HUDDLE_CALENDAR_ENABLED"]),
        ("calendar.database_url", config.calendar.database_url.clone(), vec!["HUDDLE_CALENDAR_DATABASE_URL"]),
        (
            "calendar.max_connections",
            config.calendar.max_connections.to_string(),
            vec!["HUDDLE_CALENDAR_MAX_CONNECTIONS"],
        ),
        ("calendar.timeout_secs", config.calendar.timeout_secs.to_string(), vec!["HUDDLE_CALENDAR_TIMEOUT_SECS"]),
        ("calendar.timezone", config.calendar.timezone.clone(), vec!["HUDDLE_CALENDAR_TIMEZONE"]),
        (
            "calendar.attendee_domain",
            config.calendar.attendee_domain.clone(),
            vec!["HUDDLE_CALENDAR_ATTENDEE_DOMAIN"],
        ),
        (
            "scheduling.default_duration_minutes",
            config.scheduling.default_duration_minutes.to_string(),
            vec!["HUDDLE_SCHEDULING_DEFAULT_DURATION_MINUTES"],
        ),
        (
            "scheduling.list_max_results",
            config.scheduling.list_max_results.to_string(),
            vec!["HUDDLE_SCHEDULING_LIST_MAX_RESULTS"],
        ),
        (
            "scheduling.reschedule_lookahead",
            config.scheduling.reschedule_lookahead.to_string(),
            vec!["HUDDLE_SCHEDULING_RESCHEDULE_LOOKAHEAD"],
        ),
        (
            "scheduling.cancel_lookahead",
            config.scheduling.cancel_lookahead.to_string(),
            vec!["HUDDLE_SCHEDULING_CANCEL_LOOKAHEAD"],
        ),
        (
            "scheduling.allowed_roles",
            config.scheduling.allowed_roles.join(", "),
            vec!["HUDDLE_SCHEDULING_ALLOWED_ROLES"],
        ),
        ("llm.provider", format!("{:?}", config.llm.provider), vec!["HUDDLE_LLM_PROVIDER"]),
        ("llm.model", config.llm.model.clone(), vec!["HUDDLE_LLM_MODEL"]),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            vec!["HUDDLE_LLM_BASE_URL"],
        ),
        ("llm.api_key", llm_api_key, vec!["HUDDLE_LLM_API_KEY"]),
        ("logging.level", config.logging.level.clone(), vec!["HUDDLE_LOGGING_LEVEL", "HUDDLE_LOG_LEVEL"]),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            vec!["HUDDLE_LOGGING_FORMAT", "HUDDLE_LOG_FORMAT"],
        ),
        (
            "agents",
            config.agents.iter().map(|agent| agent.id.as_str()).collect::<Vec<_>>().join(", "),
            vec![],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        lines.push(render_line(key, &value, source_of(key, &env_keys)));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["huddle.toml", "config/huddle.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keep a provider prefix such as `sk-` and hide the rest.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_secret};

    #[test]
    fn secrets_keep_only_their_prefix() {
        assert_eq!(redact_secret("sk-live-abcdef"), "sk-***");
        assert_eq!(redact_secret("plainsecret"), "<redacted>");
        assert_eq!(redact_secret("  "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_into_nested_tables() {
        let doc: toml::Value = "[calendar]\ntimezone = \"UTC\"\n".parse().expect("valid toml");
        assert!(contains_path(&doc, "calendar.timezone"));
        assert!(!contains_path(&doc, "calendar.database_url"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
