use adval_core::{Orchestrator, ValidateOptions, ValidationInput};
use serde_json::Value;

use crate::cli::ValidateArgs;
use crate::error::CliError;

pub async fn run(args: &ValidateArgs, orchestrator: &Orchestrator) -> Result<Value, CliError> {
    let mut input = ValidationInput::new(&args.street, &args.state)?;
    if let Some(secondary) = &args.secondary {
        input = input.with_secondary(secondary);
    }
    if let Some(city) = &args.city {
        input = input.with_city(city);
    }
    if let Some(zip) = &args.zip {
        input = input.with_postal_code(zip);
    }

    let options = ValidateOptions {
        preferred_provider: args
            .provider
            .as_deref()
            .map(str::parse)
            .transpose()?,
        mode: args.mode.as_deref().map(str::parse).transpose()?,
    };

    let result = orchestrator.validate_address(&input, options).await;
    Ok(serde_json::to_value(result)?)
}
