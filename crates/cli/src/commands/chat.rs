use std::io::{self, BufRead, Write};
use std::sync::Arc;

use huddle_agent::AgentRuntime;
use huddle_core::config::{AppConfig, LoadOptions};
use huddle_core::domain::agent::AgentId;
use thiserror::Error;

use crate::bootstrap::{bootstrap_with_config, Application};
use crate::commands::{command_runtime, CommandResult};
use crate::logging::init_logging;

const HELP: &str = "Commands: :agent <id>, :inbox, :mirror, :quit. Agents also answer `tasks`, `done <task-id>` and `assign <agent> <YYYY-MM-DD> [HH:MM] <title>`.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("agent `{0}` is not registered")]
    UnknownAgent(String),
    #[error("terminal i/o failed: {0}")]
    Io(#[from] io::Error),
}

pub fn run(agent: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config.logging);

    let runtime = match command_runtime("chat") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(async {
        let app = match bootstrap_with_config(config).await {
            Ok(app) => app,
            Err(error) => {
                let (error_class, exit_code) = error.classify();
                return CommandResult::failure("chat", error_class, error.to_string(), exit_code);
            }
        };

        let result = run_session(&app, agent, io::stdin().lock(), io::stdout().lock()).await;
        app.shutdown().await;

        match result {
            Ok(turns) => {
                CommandResult::success("chat", format!("session ended after {turns} message(s)"))
            }
            Err(error @ ChatError::UnknownAgent(_)) => {
                CommandResult::failure("chat", "unknown_agent", error.to_string(), 2)
            }
            Err(error) => CommandResult::failure("chat", "io", error.to_string(), 7),
        }
    })
}

/// Read messages line by line until `:quit` or end of input. Returns the
/// number of messages handed to agents.
pub async fn run_session<R, W>(
    app: &Application,
    agent: &str,
    mut input: R,
    mut output: W,
) -> Result<usize, ChatError>
where
    R: BufRead,
    W: Write,
{
    let mut current = resolve(app, agent).ok_or_else(|| ChatError::UnknownAgent(agent.to_string()))?;
    writeln!(output, "Chatting as {}. {HELP}", current.agent_id())?;

    let mut turns = 0;
    loop {
        write!(output, "{}> ", current.agent_id())?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match text {
            ":quit" | ":exit" => break,
            ":help" => writeln!(output, "{HELP}")?,
            ":inbox" => {
                let inbox = app.network().inbox(current.agent_id());
                if inbox.is_empty() {
                    writeln!(output, "  (inbox is empty)")?;
                }
                for message in inbox {
                    writeln!(
                        output,
                        "  [{}] {}: {}",
                        message.sent_at.format("%Y-%m-%d %H:%M"),
                        message.from,
                        message.text
                    )?;
                }
            }
            ":mirror" => {
                let mirror = app.network().mirror(current.agent_id());
                if mirror.is_empty() {
                    writeln!(output, "  (no meetings)")?;
                }
                for entry in mirror {
                    let marker = if entry.is_local_only() { " (local only)" } else { "" };
                    writeln!(output, "  - {}{marker}", entry.summary_text)?;
                }
            }
            command if command.starts_with(":agent") => {
                let next = command.trim_start_matches(":agent").trim();
                match resolve(app, next) {
                    Some(runtime) => {
                        current = runtime;
                        writeln!(output, "Now chatting as {}.", current.agent_id())?;
                    }
                    None => writeln!(output, "Unknown agent `{next}`.")?,
                }
            }
            message => {
                let reply = current.receive_message(message, "chat").await;
                turns += 1;
                for response in reply.response_lines() {
                    writeln!(output, "{response}")?;
                }
            }
        }
    }

    Ok(turns)
}

fn resolve(app: &Application, agent: &str) -> Option<Arc<AgentRuntime>> {
    app.directory.get(&AgentId::new(agent))
}
