pub mod cli;
pub mod config;
pub mod data;
pub mod encoding;
pub mod error;
pub mod executor;
pub mod expr;
pub mod frame;
pub mod frequency;
pub mod io_utils;
pub mod loader;
pub mod memory;
pub mod optimize;
pub mod profile;
pub mod result;
pub mod schema;
pub mod script;
pub mod security;
pub mod stats;
pub mod table;
pub mod tools;
pub mod transform;
pub mod validate;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    config::Config,
    tools::RunCodeRequest,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("table_scout", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

/// Parses the command line and dispatches; `Ok(false)` means the operation reported a failure.
pub fn run() -> Result<bool> {
    init_logging();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())
        .with_context(|| format!("Loading configuration from {:?}", cli.config))?;
    let output = cli.output.as_deref();
    match cli.command {
        Commands::Metadata(args) => {
            info!("Reading metadata for '{}'", args.file.display());
            let outcome = tools::read_metadata(&config, &args.file, args.sheet.as_deref());
            match outcome {
                Ok(metadata) if args.table => {
                    emit(output, &table::render_profile(&metadata))?;
                    Ok(true)
                }
                other => emit_json(output, tools::respond(other)),
            }
        }
        Commands::Interpret(args) => {
            debug!("Interpreting columns {:?}", args.columns);
            emit_json(
                output,
                tools::respond(tools::interpret_column(
                    &config,
                    &args.file,
                    &args.columns,
                    args.sheet.as_deref(),
                )),
            )
        }
        Commands::Run(args) => {
            let code = match (&args.code, &args.script) {
                (Some(code), _) => code.clone(),
                (None, Some(script)) => fs::read_to_string(script)
                    .with_context(|| format!("Reading script {script:?}"))?,
                (None, None) => anyhow::bail!("either --code or --script is required"),
            };
            let request = RunCodeRequest {
                file_path: args.file,
                sheet: args.sheet,
                code,
            };
            let response = tools::run_code(&config, &request);
            let success = response.success;
            let json = serde_json::to_value(&response).context("Serializing run response")?;
            emit_json(output, (success, json))
        }
        Commands::Config => {
            emit(output, &config.describe())?;
            Ok(true)
        }
    }
}

fn emit_json(output: Option<&Path>, (success, json): (bool, serde_json::Value)) -> Result<bool> {
    let mut text = serde_json::to_string_pretty(&json).context("Rendering JSON response")?;
    text.push('\n');
    emit(output, &text)?;
    Ok(success)
}

fn emit(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Writing output to {path:?}"))?;
            info!("Response written to {path:?}");
        }
        None => print!("{text}"),
    }
    Ok(())
}
