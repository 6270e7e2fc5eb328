//! `hookcache catalog` - print the page catalog.

use anyhow::Result;

use crate::cli::args::CatalogArgs;
use crate::cli::settings::Settings;
use crate::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};

pub fn run(args: CatalogArgs, settings: &Settings) -> Result<i32> {
    let catalog = &settings.coordinator.catalog;
    match args.page {
        Some(page) => {
            if !catalog.contains_page(&page) {
                eprintln!("unknown page: {}", page);
                return Ok(EXIT_ERROR);
            }
            for widget in catalog.widgets(&page) {
                println!("{}", widget);
            }
        }
        None => print!("{}", serde_yaml::to_string(catalog)?),
    }
    Ok(EXIT_SUCCESS)
}
