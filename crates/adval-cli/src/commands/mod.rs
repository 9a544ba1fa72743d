mod providers;
mod validate;

use adval_core::OrchestratorBuilder;
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub async fn run(cli: &Cli) -> Result<Value, CliError> {
    let orchestrator = OrchestratorBuilder::from_env()?.build()?;

    match &cli.command {
        Command::Validate(args) => validate::run(args, &orchestrator).await,
        Command::Providers(args) => providers::run(args, &orchestrator),
    }
}
