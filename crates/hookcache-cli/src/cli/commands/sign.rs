//! `hookcache sign` - compute the signature header for a payload.

use anyhow::{Context, Result};
use hookcache_security::{sign, SignatureAlgorithm};

use crate::cli::args::SignArgs;
use crate::cli::settings::Settings;
use crate::exit_codes::EXIT_SUCCESS;

pub fn run(args: SignArgs, settings: &Settings) -> Result<i32> {
    let algorithm = SignatureAlgorithm::parse(&args.algorithm)
        .with_context(|| format!("unsupported algorithm: {}", args.algorithm))?;
    let secret = &settings.security.hmac_secret;
    if secret.is_empty() {
        anyhow::bail!("no HMAC secret configured (set HOOKCACHE_WEBHOOK_SECRET or security.hmac_secret)");
    }

    let payload = std::fs::read(&args.file)
        .with_context(|| format!("failed to read payload: {}", args.file.display()))?;
    let value = sign(secret.as_bytes(), &payload, algorithm)?;

    println!("{}", value);
    Ok(EXIT_SUCCESS)
}
