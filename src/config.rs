use crate::export::ExportOptions;
use clap::{ArgAction, Parser};

const DEFAULT_CLIPPINGS_FILE: &str = "My Clippings.txt";
const DEFAULT_DATABASE_PATH: &str = "./clippings.db";
const DEFAULT_JSON_OUTPUT: &str = "my_kindle_clippings.json";

#[derive(Parser, Debug)]
#[command(name = "kindle-clippings")]
#[command(about = "Sync Kindle clippings into a document database")]
pub struct CliArgs {
    /// Path to the "My Clippings.txt" export
    pub clippings_file: Option<String>,

    /// Path to the SQLite database file
    #[arg(short, long)]
    pub database_path: Option<String>,

    /// Where to write the JSON dump of all parsed clippings
    #[arg(short, long)]
    pub json_output: Option<String>,

    /// Include "Page" and "Location" in the stored highlights
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub enable_location: bool,

    /// Include "Date Added" in the stored highlights
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub enable_highlight_date: bool,

    /// Store each clipping as its own quote block
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub separate_blocks: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub clippings_file: String,
    pub database_path: String,
    pub json_output: String,
    pub export: ExportOptions,
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    EmptyPath(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyPath(name) => write!(f, "{} must not be empty", name),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let cli = CliArgs::parse();
        Self::from_args(cli, |key| std::env::var(key).ok())
    }

    fn from_args(
        cli: CliArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let clippings_file = resolve(
            cli.clippings_file,
            env("CLIPPINGS_FILE"),
            DEFAULT_CLIPPINGS_FILE,
            "clippings file",
        )?;
        let database_path = resolve(
            cli.database_path,
            env("DATABASE_PATH"),
            DEFAULT_DATABASE_PATH,
            "database path",
        )?;
        let json_output = resolve(
            cli.json_output,
            env("JSON_OUTPUT"),
            DEFAULT_JSON_OUTPUT,
            "JSON output path",
        )?;

        Ok(Config {
            clippings_file,
            database_path,
            json_output,
            export: ExportOptions {
                enable_location: cli.enable_location,
                enable_highlight_date: cli.enable_highlight_date,
                separate_blocks: cli.separate_blocks,
            },
        })
    }
}

fn resolve(
    flag: Option<String>,
    env: Option<String>,
    default: &str,
    name: &'static str,
) -> Result<String, ConfigError> {
    let value = flag.or(env).unwrap_or_else(|| default.to_string());

    if value.trim().is_empty() {
        return Err(ConfigError::EmptyPath(name));
    }

    Ok(value)
}
