use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use serde_json::{Map, Value};

use scoreline_engine::engine::PredictionEngine;
use scoreline_engine::error::EngineError;
use scoreline_engine::model_cache::global_cache;
use scoreline_engine::settings::Settings;
use scoreline_engine::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "scoreline_engine",
    version,
    about = "Score a match feature payload against the active scoreline model"
)]
struct Cli {
    #[arg(long, help = "Home side, echoed in the response context")]
    team_a: String,
    #[arg(long, help = "Away side, echoed in the response context")]
    team_b: String,
    #[arg(long, help = "JSON object mapping feature name to value")]
    features_json: String,
    #[arg(long, help = "Pretty-print with this many spaces (0 for compact)")]
    indent: Option<usize>,
    #[arg(long, help = "Overrides PREDICTION_ENGINE_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let cli = Cli::parse();

    let payload: Value = match serde_json::from_str(&cli.features_json) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => {
            eprintln!("Invalid --features-json payload: expected a JSON object");
            return ExitCode::from(1);
        }
        Err(err) => {
            eprintln!("Invalid --features-json payload: {err}");
            return ExitCode::from(1);
        }
    };

    let settings = match &cli.base_dir {
        Some(dir) => Settings::with_base_dir(dir),
        None => Settings::from_env(),
    };

    let mut context = Map::new();
    context.insert("team_a".to_string(), Value::String(cli.team_a.clone()));
    context.insert("team_b".to_string(), Value::String(cli.team_b.clone()));

    let response = PredictionEngine::from_settings(&settings, global_cache())
        .and_then(|engine| engine.predict(&payload, Some(&context)));
    match response {
        Ok(response) => match print_json(&response, cli.indent) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("System error: {err:#}");
                ExitCode::from(2)
            }
        },
        Err(err) => report(&err),
    }
}

fn report(err: &EngineError) -> ExitCode {
    if err.is_caller_error() {
        eprintln!("Validation error: {err}");
        ExitCode::from(1)
    } else {
        eprintln!("System error: {err}");
        ExitCode::from(2)
    }
}

fn print_json<T: Serialize>(value: &T, indent: Option<usize>) -> Result<()> {
    let indent = indent.unwrap_or(if io::stdout().is_terminal() { 2 } else { 0 });
    let text = if indent == 0 {
        serde_json::to_string(value)?
    } else {
        let pad = vec![b' '; indent];
        let formatter = serde_json::ser::PrettyFormatter::with_indent(&pad);
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        value.serialize(&mut ser)?;
        String::from_utf8(buf).context("serializer produced invalid utf-8")?
    };
    let mut out = io::stdout().lock();
    writeln!(out, "{text}").context("write stdout")?;
    Ok(())
}
