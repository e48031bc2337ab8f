//! Subcommand handlers.

pub mod args;
pub mod control;

pub use args::{AutoRecordCliArgs, Cli, CliCommand, TokenCliArgs, TokenCommand};

use anyhow::Result;
use serde_json::Value;

use crate::audio::list_input_devices;
use crate::config::Config;
use crate::global;
use crate::protocol::TokenStore;
use control::ControlClient;

pub fn handle_devices_command() -> Result<()> {
    let devices = list_input_devices()?;
    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    let config = Config::load()?;
    println!("Capture devices:\n");
    for device in devices {
        let format = match (device.sample_rate, device.channels, &device.sample_format) {
            (Some(rate), Some(channels), Some(sample_format)) => {
                format!("{} Hz, {} ch, {}", rate, channels, sample_format)
            }
            _ => "format unavailable".to_string(),
        };
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  {}{} - {}", device.name, marker, format);
    }

    println!();
    println!("Microphone match: '{}'", config.audio.microphone_device);
    println!("System audio match: '{}'", config.audio.system_device);
    Ok(())
}

/// Show only the first and last few characters of a token.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

pub fn handle_token_command(args: TokenCliArgs) -> Result<()> {
    let path = global::token_file()?;
    let store = TokenStore::load(&path);

    match args.command {
        TokenCommand::Show => {
            let state = store.snapshot();
            println!("Token file: {}", path.display());
            match state.access_token.as_deref() {
                Some(token) => println!("Access token: {}", mask_token(token)),
                None => println!("Access token: none (not paired)"),
            }
            if state.refresh_token.is_some() {
                println!("Refresh token: stored");
            }
        }
        TokenCommand::Clear => {
            store.clear()?;
            println!("Stored token removed. Approve teams-helper in the meeting client on next start.");
        }
    }
    Ok(())
}

pub async fn handle_control_command(command: CliCommand) -> Result<()> {
    let config = Config::load()?;
    let client = ControlClient::new(config.api.port);

    match command {
        CliCommand::Status => {
            let status = client.status().await?;
            println!(
                "Meeting client: {}",
                if status.connected { "connected" } else { "not connected" }
            );
            if status.recording {
                println!(
                    "Recording: {} ({}s)",
                    status.output_path.unwrap_or_default(),
                    status.duration_seconds.unwrap_or(0)
                );
            } else {
                println!("Recording: idle");
            }
            println!(
                "Record all meetings: {}",
                if status.auto_record { "on" } else { "off" }
            );
            if let Some(error) = status.last_error {
                println!("Last error: {}", error);
            }
        }
        CliCommand::Start => print_message(client.start().await?),
        CliCommand::Stop => print_message(client.stop().await?),
        CliCommand::OpenFolder => {
            let response = client.open_folder().await?;
            println!("Opened {}", response["path"].as_str().unwrap_or_default());
        }
        CliCommand::AutoRecord(args) => {
            let response = client.set_auto_record(args.state == "on").await?;
            println!(
                "Record all meetings: {}",
                if response["auto_record"].as_bool() == Some(true) { "on" } else { "off" }
            );
        }
        _ => {}
    }
    Ok(())
}

fn print_message(response: Value) {
    let message = response["message"].as_str().unwrap_or("Done");
    match response["output_path"].as_str() {
        Some(path) => println!("{}: {}", message, path),
        None => println!("{}", message),
    }
}
