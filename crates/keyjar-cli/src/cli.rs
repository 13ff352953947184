use clap::{Parser, Subcommand};

/// CLI surface definition. Every key operation goes through `KeyManager`.
#[derive(Parser, Debug)]
#[command(
    name = "keyjar",
    about = "Local API key manager, encrypted at rest",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to launching the TUI when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Launch the interactive key browser (press Esc to exit).
    Tui,
    /// Print version and exit.
    Version,
    /// Load the key file and check that every stored key decrypts.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Store a new API key.
    Add {
        /// Service the key belongs to (must not already exist).
        service: String,
        /// The API key. Read from the first line of stdin when omitted.
        #[arg(long)]
        key: Option<String>,
    },
    /// List stored service names.
    List {
        /// Only show services containing this text (case-insensitive).
        #[arg(long, short)]
        search: Option<String>,
    },
    /// Print the decrypted key for a service.
    Show { service: String },
    /// Delete the key for a service.
    Delete { service: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
