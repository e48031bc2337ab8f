use anyhow::Result;
use clap::Parser;
use teams_helper::{
    app,
    cli::{handle_control_command, handle_devices_command, handle_token_command, Cli, CliCommand},
    config::Config,
    logs,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("teams-helper {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(CliCommand::Devices) => {
            logs::init(cli.verbose, None);
            handle_devices_command()
        }
        Some(CliCommand::Token(args)) => handle_token_command(args),
        Some(
            command @ (CliCommand::Status
            | CliCommand::Start
            | CliCommand::Stop
            | CliCommand::OpenFolder
            | CliCommand::AutoRecord(_)),
        ) => handle_control_command(command).await,
        Some(CliCommand::Run) | None => {
            let config = Config::load()?;
            logs::init(cli.verbose, Some(&config.recording.output_dir));
            app::run_service(config).await
        }
    }
}
