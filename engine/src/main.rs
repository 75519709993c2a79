// Deskpilot desktop agent
// Main entry point for the deskpilot binary

use clap::Parser;
use deskpilot_engine::cli::{Cli, Command, ConfigAction};
use deskpilot_engine::config::Config;
use deskpilot_engine::handlers::{handle_config_show, handle_run, handle_tools, OutputFormat};
use deskpilot_engine::telemetry::init_telemetry_with;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log overrides the configured level; RUST_LOG overrides both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with(log_level, config.core.log_format);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::info!("Deskpilot v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Run {
            description,
            model,
            priority,
        } => {
            tracing::info!("Executing task: {}", description);
            handle_run(description, model, priority.into(), &config, format).await
        }

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
        },

        Command::Tools => handle_tools(format),
    }
}
