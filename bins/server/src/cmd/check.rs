use mqtt2db_engine::Plan;

use crate::config::{self, CheckArgs};
use crate::error::ServerError;

/// Validate the configuration and print what `run` would do. Connects to nothing.
pub fn run(args: CheckArgs) -> Result<(), ServerError> {
    let config = config::load(&args.config)?;
    let warnings = config.validate()?;
    for warning in &warnings {
        tracing::warn!(%warning, "config");
    }
    let plan = Plan::build(&config, warnings);
    println!("{}", plan.to_json()?);
    Ok(())
}
