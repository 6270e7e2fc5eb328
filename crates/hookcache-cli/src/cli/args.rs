use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hookcache",
    version,
    about = "Sign and verify workflow-platform webhooks; inspect cache coordinator settings"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,

    /// YAML file with `security` and `coordinator` sections (default: environment)
    #[arg(long, global = true, env = "HOOKCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the signature header value for a payload file
    Sign(SignArgs),
    /// Run the full validator against a payload file
    Verify(VerifyArgs),
    /// Print the effective configuration (secret redacted)
    Config,
    /// Print the page catalog
    Catalog(CatalogArgs),
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Payload file (raw request body)
    pub file: PathBuf,

    /// HMAC algorithm: sha256, sha384 or sha512
    #[arg(long, short, default_value = "sha256")]
    pub algorithm: String,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Payload file (raw request body)
    pub file: PathBuf,

    /// Signature header value, `algorithm=hexdigest`
    #[arg(long, short)]
    pub signature: String,

    /// Header the signature arrived in
    #[arg(long, default_value = "x-hub-signature-256")]
    pub header_name: String,

    /// Client IP the delivery came from
    #[arg(long, default_value = "127.0.0.1")]
    pub ip: String,

    /// Client user agent
    #[arg(long, default_value = "hookcache-cli")]
    pub user_agent: String,

    /// Delivery timestamp in Unix millis (default: now)
    #[arg(long)]
    pub timestamp_ms: Option<i64>,
}

#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Only list the widgets of this page
    #[arg(long)]
    pub page: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_defaults() {
        let cli = Cli::try_parse_from([
            "hookcache",
            "verify",
            "body.json",
            "--signature",
            "sha256=00",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Text);
        let Command::Verify(args) = cli.cmd else {
            panic!("expected verify");
        };
        assert_eq!(args.header_name, "x-hub-signature-256");
        assert_eq!(args.ip, "127.0.0.1");
        assert_eq!(args.timestamp_ms, None);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "hookcache",
            "sign",
            "body.json",
            "--algorithm",
            "sha512",
            "--log-format",
            "json",
            "--config",
            "hookcache.yaml",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("hookcache.yaml")));
        assert!(matches!(cli.cmd, Command::Sign(ref a) if a.algorithm == "sha512"));
    }

    #[test]
    fn test_verify_requires_signature() {
        assert!(Cli::try_parse_from(["hookcache", "verify", "body.json"]).is_err());
    }
}
