use super::args::*;
use super::settings::Settings;

pub mod catalog;
pub mod config;
pub mod sign;
pub mod verify;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let settings = Settings::load(cli.config.as_deref())?;
    match cli.cmd {
        Command::Sign(args) => sign::run(args, &settings),
        Command::Verify(args) => verify::run(args, &settings),
        Command::Config => config::run(&settings),
        Command::Catalog(args) => catalog::run(args, &settings),
    }
}
