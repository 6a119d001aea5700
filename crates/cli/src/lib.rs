pub mod bootstrap;
pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "huddle",
    about = "Huddle meeting-scheduling agents",
    long_about = "Talk to the huddle agents, inspect configuration and prepare the calendar store.",
    after_help = "Examples:\n  huddle chat --agent ceo\n  huddle say --agent marketing \"schedule a sync with design tomorrow at 10:00\"\n  huddle config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive session as one agent (:agent, :inbox, :mirror, :quit)")]
    Chat {
        #[arg(long, default_value = "ceo", help = "Agent id to speak as")]
        agent: String,
    },
    #[command(about = "Send one message as an agent and print the Response lines")]
    Say {
        #[arg(long, help = "Agent id to speak as")]
        agent: String,
        #[arg(required = true, num_args = 1.., help = "Message text")]
        text: Vec<String>,
    },
    #[command(about = "List the registered agents and whether they can be invited")]
    Agents,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Apply pending calendar-store migrations and return structured status output")]
    Migrate,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { agent } => commands::chat::run(&agent),
        Command::Say { agent, text } => commands::say::run(&agent, &text.join(" ")),
        Command::Agents => commands::agents::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Migrate => commands::migrate::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
