use clap::{Parser, Subcommand};

/// RankGate — promotion approval gateway for Roblox groups
#[derive(Parser)]
#[command(name = "rankgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
}
