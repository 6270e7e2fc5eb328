//! `hookcache config` - print the effective configuration.

use anyhow::Result;

use crate::cli::settings::Settings;
use crate::exit_codes::EXIT_SUCCESS;

pub fn run(settings: &Settings) -> Result<i32> {
    if let Err(e) = settings.security.validate() {
        tracing::warn!(error = %e, "security config is not usable");
    }
    if let Err(e) = settings.coordinator.validate() {
        tracing::warn!(error = %e, "coordinator config is not usable");
    }
    print!("{}", serde_yaml::to_string(&settings.redacted())?);
    Ok(EXIT_SUCCESS)
}
