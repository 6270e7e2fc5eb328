//! `hookcache verify` - run a stored delivery through the validator.

use std::collections::HashMap;

use anyhow::{Context, Result};
use hookcache_security::{ClientInfo, WebhookValidator};

use crate::cli::args::VerifyArgs;
use crate::cli::settings::Settings;
use crate::exit_codes::{EXIT_REJECTED, EXIT_SUCCESS};

pub fn run(args: VerifyArgs, settings: &Settings) -> Result<i32> {
    let validator =
        WebhookValidator::new(settings.security.clone()).context("invalid security config")?;

    let payload = std::fs::read(&args.file)
        .with_context(|| format!("failed to read payload: {}", args.file.display()))?;
    let headers = HashMap::from([(args.header_name.to_ascii_lowercase(), args.signature)]);

    let mut client = ClientInfo::new(args.ip, args.user_agent);
    if let Some(ts) = args.timestamp_ms {
        client = client.with_timestamp_ms(ts);
    }

    let result = validator.validate(&payload, &headers, &client);
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(if result.valid {
        EXIT_SUCCESS
    } else {
        EXIT_REJECTED
    })
}
