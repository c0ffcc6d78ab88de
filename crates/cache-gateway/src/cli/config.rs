use clap::Subcommand;

/// Ambient config tooling: inspect the resolved config without starting
/// anything. Neither subcommand requires the management endpoint to be
/// running.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and print any warnings/errors found.
    Validate,
    /// Parse the config file and print the resolved values.
    Show,
}
