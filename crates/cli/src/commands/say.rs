use huddle_core::config::{AppConfig, LoadOptions};
use huddle_core::domain::agent::AgentId;

use crate::bootstrap::bootstrap_with_config;
use crate::commands::{command_runtime, CommandResult};
use crate::logging::init_logging;

/// One turn for `agent`; prints the `Response:` lines.
pub fn run(agent: &str, text: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "say",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    let runtime = match command_runtime("say") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let app = match bootstrap_with_config(config).await {
            Ok(app) => app,
            Err(error) => {
                let (error_class, exit_code) = error.classify();
                return CommandResult::failure("say", error_class, error.to_string(), exit_code);
            }
        };

        let agent = AgentId::new(agent);
        let Some(agent_runtime) = app.directory.get(&agent) else {
            let known: Vec<String> =
                app.directory.agent_ids().iter().map(|id| id.to_string()).collect();
            return CommandResult::failure(
                "say",
                "unknown_agent",
                format!("agent `{agent}` is not registered (known: {})", known.join(", ")),
                2,
            );
        };

        let reply = agent_runtime.receive_message(text, "cli").await;
        app.shutdown().await;
        CommandResult::lines(reply.response_lines())
    })
}
