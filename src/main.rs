use chrono::Local;
use kindle_clippings::config::Config;
use kindle_clippings::db::SqliteStore;
use kindle_clippings::export::{dump_json, export_library};
use kindle_clippings::parser::{parse_clippings_with, LogListener};
use kindle_clippings::reading::read_clippings;
use std::path::Path;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SqliteStore::open(Path::new(&config.database_path))?;
    log::info!("Database found at {}. Analyzing clippings file...", config.database_path);

    let text = read_clippings(Path::new(&config.clippings_file))?;
    let library = parse_clippings_with(&text, &mut LogListener);
    log::info!(
        "Parsed {} highlight(s) across {} book(s)",
        library.highlight_count(),
        library.len()
    );

    let stats = export_library(
        &mut store,
        &library,
        &config.export,
        Local::now().naive_local(),
    );

    dump_json(&library, Path::new(&config.json_output))?;

    log::info!(
        "Transfer complete: {} created, {} updated, {} unchanged, {} failed",
        stats.created,
        stats.updated,
        stats.unchanged,
        stats.failed
    );

    Ok(())
}
