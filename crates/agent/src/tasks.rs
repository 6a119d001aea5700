//! Task quick commands.
//!
//! `tasks`, `done <task-id>` and `assign <agent> <YYYY-MM-DD> [HH:MM] <title>`
//! are answered directly, without intent classification.

use chrono::{NaiveDate, NaiveTime};

use huddle_core::domain::task::Task;

pub const DEFAULT_DUE_TIME: &str = "17:00";
pub const ASSIGN_USAGE: &str =
    "Usage: assign <agent> <YYYY-MM-DD> [HH:MM] <title>, for example `assign design 2026-03-12 Review mockups`.";
pub const DONE_USAGE: &str = "Usage: done <task-id>. Send `tasks` to see your task ids.";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskCommand {
    List,
    Complete { task_id: String },
    Assign { assignee: String, due_date: String, due_time: Option<String>, title: String },
    Invalid { usage: &'static str },
}

/// `None` means the text is not a task command and goes to the classifier.
pub fn parse_task_command(input: &str) -> Option<TaskCommand> {
    let mut parts = input.split_whitespace();
    let verb = parts.next()?.to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match verb.as_str() {
        "tasks" if args.is_empty() => Some(TaskCommand::List),
        "done" => Some(match args.as_slice() {
            [task_id] => TaskCommand::Complete { task_id: (*task_id).to_string() },
            _ => TaskCommand::Invalid { usage: DONE_USAGE },
        }),
        "assign" => Some(parse_assign(&args)),
        _ => None,
    }
}

fn parse_assign(args: &[&str]) -> TaskCommand {
    let invalid = TaskCommand::Invalid { usage: ASSIGN_USAGE };
    let [assignee, due_date, rest @ ..] = args else {
        return invalid;
    };
    if NaiveDate::parse_from_str(due_date, "%Y-%m-%d").is_err() {
        return invalid;
    }

    let (due_time, title_words) = match rest.split_first() {
        Some((time, words)) if NaiveTime::parse_from_str(time, "%H:%M").is_ok() => {
            (Some((*time).to_string()), words)
        }
        _ => (None, rest),
    };
    if title_words.is_empty() {
        return invalid;
    }

    TaskCommand::Assign {
        assignee: assignee.to_ascii_lowercase(),
        due_date: (*due_date).to_string(),
        due_time,
        title: title_words.join(" "),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    Listed { tasks: Vec<Task> },
    Completed { title: String },
    NotFound { task_id: String },
    Assigned { task: Task, reminder_event_id: Option<String> },
    Rejected { message: String },
    Usage(&'static str),
}

impl TaskOutcome {
    pub fn render(&self) -> Vec<String> {
        match self {
            Self::Listed { tasks } if tasks.is_empty() => vec!["No tasks assigned.".to_string()],
            Self::Listed { tasks } => {
                let mut lines = vec!["Tasks:".to_string()];
                lines.extend(tasks.iter().map(|task| {
                    format!(
                        "  - [{}] {} (due {}, {} priority, id {})",
                        if task.is_completed() { "x" } else { " " },
                        task.title,
                        task.due_date.format("%Y-%m-%d %H:%M"),
                        task.priority,
                        task.id.0
                    )
                }));
                lines
            }
            Self::Completed { title } => vec![format!("Task '{title}' marked as completed.")],
            Self::NotFound { task_id } => vec![format!("No task '{task_id}' is assigned to you.")],
            Self::Assigned { task, reminder_event_id } => {
                let mut lines = vec![format!(
                    "Task '{}' assigned to {}, due {} at {}.",
                    task.title,
                    task.assigned_to,
                    task.due_date.format("%Y-%m-%d"),
                    task.due_date.format("%H:%M")
                )];
                if reminder_event_id.is_some() {
                    lines.push("Reminder added to the calendar.".to_string());
                }
                lines
            }
            Self::Rejected { message } => vec![message.clone()],
            Self::Usage(usage) => vec![(*usage).to_string()],
        }
    }
}
