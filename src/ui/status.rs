use dialoguer::console::style;

use crate::tail::JobStatus;

pub enum CommandStatus {
    Success,
    Error,
    Warning,
}

impl From<JobStatus> for CommandStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Success => CommandStatus::Success,
            JobStatus::Failed => CommandStatus::Error,
            _ => CommandStatus::Warning,
        }
    }
}

pub fn print_command_status(status: CommandStatus, message: &str) {
    let indicator = match &status {
        CommandStatus::Success => style("✓").green(),
        CommandStatus::Error => style("✗").red(),
        CommandStatus::Warning => style("!").yellow(),
    };

    eprintln!("{indicator} {message}");
}
