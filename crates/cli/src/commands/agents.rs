use crate::commands::CommandResult;
use huddle_core::config::{AppConfig, LoadOptions};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "agents",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let mut lines = vec!["registered agents:".to_string()];
    for profile in &config.agents {
        let role = if config.scheduling.is_allowed_role(profile.id.as_str()) {
            "meeting participant"
        } else {
            "not invitable"
        };
        lines.push(format!("- {} ({}): {} [{role}]", profile.id, profile.title, profile.description));
    }
    CommandResult::lines(lines)
}
