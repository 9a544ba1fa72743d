use clap::{Args, Parser, Subcommand};

/// Operator CLI for the address-validation layer.
#[derive(Debug, Parser)]
#[command(name = "adval", version, about = "Address validation resilience layer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate one address through the configured providers.
    Validate(ValidateArgs),
    /// Show per-provider health and cache occupancy.
    Providers(ProvidersArgs),
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Street line, e.g. "1 Infinite Loop".
    #[arg(long)]
    pub street: String,

    /// Secondary line (unit/suite).
    #[arg(long)]
    pub secondary: Option<String>,

    #[arg(long)]
    pub city: Option<String>,

    /// 2-letter state code.
    #[arg(long)]
    pub state: String,

    /// ZIP code.
    #[arg(long)]
    pub zip: Option<String>,

    /// Try this provider first (usps, smarty, google).
    #[arg(long)]
    pub provider: Option<String>,

    /// Dispatch mode override (waterfall, hedged).
    #[arg(long)]
    pub mode: Option<String>,
}

#[derive(Debug, Args)]
pub struct ProvidersArgs {}
