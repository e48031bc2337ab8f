use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "teams-helper")]
#[command(about = "Records meetings automatically from the local meeting client", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the service (the default when no subcommand is given)
    Run,
    /// Print version information
    Version,
    /// List capture devices and their native formats
    Devices,
    /// Inspect or forget the stored pairing token
    Token(TokenCliArgs),
    /// Show the recording status of the running service
    Status,
    /// Start recording the current meeting
    Start,
    /// Stop the current recording
    Stop,
    /// Open the recording folder
    OpenFolder,
    /// Turn automatic recording of every meeting on or off
    AutoRecord(AutoRecordCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct TokenCliArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Show whether a token is stored (the value is masked)
    Show,
    /// Delete the stored token; the meeting client will ask to pair again
    Clear,
}

#[derive(ClapArgs, Debug)]
pub struct AutoRecordCliArgs {
    #[arg(value_parser = ["on", "off"])]
    pub state: String,
}
