use std::env;
use std::io::Cursor;
use std::sync::{Mutex, OnceLock};

use huddle_cli::bootstrap::bootstrap;
use huddle_cli::commands::{agents, chat, config, migrate, say};
use huddle_core::config::LoadOptions;
use serde_json::Value;

#[test]
fn migrate_applies_calendar_migrations_to_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("calendar.db").display());

    with_env(&[("HUDDLE_CALENDAR_DATABASE_URL", url.as_str())], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_is_a_noop_when_the_calendar_is_disabled() {
    with_env(&[("HUDDLE_CALENDAR_ENABLED", "false")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "calendar disabled; nothing to migrate");
    });
}

#[test]
fn migrate_reports_config_failures() {
    with_env(&[("HUDDLE_LLM_PROVIDER", "openai")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn say_schedules_a_local_meeting_offline() {
    with_env(&[("HUDDLE_CALENDAR_ENABLED", "false")], || {
        let result = say::run("ceo", "Schedule a meeting titled Sync with marketing tomorrow at 10:00");
        assert_eq!(result.exit_code, 0);
        assert!(
            result.output.starts_with("Response: Meeting 'Sync' scheduled locally"),
            "{}",
            result.output
        );
    });
}

#[test]
fn say_writes_to_the_calendar_store_when_enabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("calendar.db").display());

    with_env(&[("HUDDLE_CALENDAR_DATABASE_URL", url.as_str())], || {
        let created =
            say::run("design", "Schedule a meeting titled Review with engineering tomorrow at 11:00");
        assert_eq!(created.exit_code, 0);
        assert!(created.output.contains("Meeting 'Review' scheduled for"), "{}", created.output);

        let listed = say::run("engineering", "Show upcoming meetings");
        assert!(listed.output.contains("Response: Upcoming meetings:"), "{}", listed.output);
        assert!(listed.output.contains("Review on"), "{}", listed.output);
    });
}

#[test]
fn say_rejects_unknown_agents() {
    with_env(&[("HUDDLE_CALENDAR_ENABLED", "false")], || {
        let result = say::run("cfo", "hello");
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "unknown_agent");
    });
}

#[test]
fn chat_session_switches_agents_and_reads_inboxes() {
    with_env(&[("HUDDLE_CALENDAR_ENABLED", "false")], || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        let transcript = runtime.block_on(async {
            let app = bootstrap(LoadOptions::default()).await.expect("offline bootstrap");
            let input = Cursor::new(
                "Schedule a meeting titled Sync with marketing tomorrow at 10:00\n\
                 :agent marketing\n\
                 :inbox\n\
                 :mirror\n\
                 :quit\n\
                 never read\n",
            );
            let mut output = Vec::new();
            let turns = chat::run_session(&app, "ceo", input, &mut output).await.expect("session");
            assert_eq!(turns, 1);
            String::from_utf8(output).expect("utf8 transcript")
        });

        assert!(transcript.contains("Response: Meeting 'Sync' scheduled locally"), "{transcript}");
        assert!(transcript.contains("Now chatting as marketing."));
        assert!(transcript.contains("ceo: New meeting: 'Sync' scheduled by ceo"), "{transcript}");
        assert!(transcript.contains("(local only)"));
    });
}

#[test]
fn chat_session_refuses_unknown_agents() {
    with_env(&[("HUDDLE_CALENDAR_ENABLED", "false")], || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let app = bootstrap(LoadOptions::default()).await.expect("offline bootstrap");
            let result = chat::run_session(&app, "cfo", Cursor::new(""), Vec::new()).await;
            assert!(matches!(result, Err(chat::ChatError::UnknownAgent(agent)) if agent == "cfo"));
        });
    });
}

#[test]
fn agents_lists_the_roster_with_invitability() {
    with_env(&[], || {
        let result = agents::run();
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("- ceo (CEO): Oversees the entire organization and strategy. [meeting participant]"));
        assert!(result.output.contains("- hr (Human Resources Lead)"));
        assert!(result.output.contains("[not invitable]"));
    });
}

#[test]
fn config_attributes_sources_and_redacts_api_keys() {
    with_env(
        &[
            ("HUDDLE_LLM_PROVIDER", "openai"),
            ("HUDDLE_LLM_API_KEY", "sk-very-secret"),
            ("HUDDLE_LOG_LEVEL", "debug"),
        ],
        || {
            let output = config::run();
            assert!(output.contains("- llm.api_key = sk-*** (source: env (HUDDLE_LLM_API_KEY))"), "{output}");
            assert!(output.contains("- logging.level = debug (source: env (HUDDLE_LOG_LEVEL))"));
            assert!(output.contains("- calendar.timezone = UTC (source: default)"));
            assert!(!output.contains("very-secret"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HUDDLE_CALENDAR_ENABLED",
        "HUDDLE_CALENDAR_DATABASE_URL",
        "HUDDLE_CALENDAR_MAX_CONNECTIONS",
        "HUDDLE_CALENDAR_TIMEOUT_SECS",
        "HUDDLE_CALENDAR_TIMEZONE",
        "HUDDLE_CALENDAR_ATTENDEE_DOMAIN",
        "HUDDLE_SCHEDULING_DEFAULT_DURATION_MINUTES",
        "HUDDLE_SCHEDULING_LIST_MAX_RESULTS",
        "HUDDLE_SCHEDULING_RESCHEDULE_LOOKAHEAD",
        "HUDDLE_SCHEDULING_CANCEL_LOOKAHEAD",
        "HUDDLE_SCHEDULING_ALLOWED_ROLES",
        "HUDDLE_LLM_PROVIDER",
        "HUDDLE_LLM_API_KEY",
        "HUDDLE_LLM_BASE_URL",
        "HUDDLE_LLM_MODEL",
        "HUDDLE_LOGGING_LEVEL",
        "HUDDLE_LOGGING_FORMAT",
        "HUDDLE_LOG_LEVEL",
        "HUDDLE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
