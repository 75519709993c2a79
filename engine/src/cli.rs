//! CLI interface for Deskpilot
//!
//! Commands and global flags, defined with clap's derive API.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::task::Priority;

/// Deskpilot desktop agent
///
/// Lets a language model drive this desktop through typed mouse, keyboard
/// and screenshot actions. Press Ctrl-C to take over from the agent.
#[derive(Parser, Debug)]
#[command(name = "deskpilot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a task until it completes, fails or needs help
    Run {
        /// What the agent should do
        description: String,

        /// Model to use instead of the configured default
        #[arg(long)]
        model: Option<String>,

        /// Task priority
        #[arg(long, value_enum, default_value = "medium")]
        priority: PriorityArg,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List the computer tools offered to the model
    Tools,
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityArg {
    Low,
    Medium,
    High,
    Urgent,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => Priority::Low,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::High => Priority::High,
            PriorityArg::Urgent => Priority::Urgent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["deskpilot", "run", "open the calculator"]);
        match cli.command {
            Command::Run {
                description,
                model,
                priority,
            } => {
                assert_eq!(description, "open the calculator");
                assert!(model.is_none());
                assert_eq!(priority, PriorityArg::Medium);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(!cli.json);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_run_with_options() {
        let cli = Cli::parse_from([
            "deskpilot",
            "--json",
            "run",
            "file the report",
            "--model",
            "claude-x",
            "--priority",
            "urgent",
        ]);
        assert!(cli.json);
        match cli.command {
            Command::Run {
                model, priority, ..
            } => {
                assert_eq!(model.as_deref(), Some("claude-x"));
                assert_eq!(Priority::from(priority), Priority::Urgent);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["deskpilot", "tools", "--log", "debug", "--config", "/tmp/c.toml"]);
        assert!(matches!(cli.command, Command::Tools));
        assert_eq!(cli.log.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_config_show() {
        let cli = Cli::parse_from(["deskpilot", "config", "show"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));
    }

    #[test]
    fn test_bad_priority_rejected() {
        assert!(Cli::try_parse_from(["deskpilot", "run", "x", "--priority", "whenever"]).is_err());
    }
}
