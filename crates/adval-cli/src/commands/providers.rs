use adval_core::Orchestrator;
use serde_json::Value;

use crate::cli::ProvidersArgs;
use crate::error::CliError;

pub fn run(args: &ProvidersArgs, orchestrator: &Orchestrator) -> Result<Value, CliError> {
    let _ = args;
    Ok(serde_json::to_value(orchestrator.health())?)
}
