use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

use scoreline_engine::ensemble::{EnsembleRequest, EnsembleVoter};
use scoreline_engine::error::EngineError;
use scoreline_engine::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(
    name = "ensemble_vote",
    version,
    about = "Combine full-time, half-time, and pattern outcome votes"
)]
struct Cli {
    #[arg(long, help = "Full-time outcome: home_win, draw, or away_win")]
    ft: Option<String>,
    #[arg(long)]
    ft_confidence: Option<f64>,
    #[arg(long, help = "Half-time outcome")]
    ht: Option<String>,
    #[arg(long)]
    ht_confidence: Option<f64>,
    #[arg(long, help = "Pattern model outcome")]
    pt: Option<String>,
    #[arg(long)]
    pt_confidence: Option<f64>,
    #[arg(long, help = r#"Weight override, e.g. '{"ft":0.6,"ht":0.2,"pt":0.2}'"#)]
    weights: Option<String>,
    #[arg(long)]
    indent: Option<usize>,
}

fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    init_tracing();

    let cli = Cli::parse();

    let mut voter = EnsembleVoter::default();
    if let Some(raw) = cli.weights.as_deref() {
        let weights: HashMap<String, f64> = match serde_json::from_str(raw) {
            Ok(w) => w,
            Err(err) => {
                eprintln!("Invalid --weights payload: {err}");
                return ExitCode::from(1);
            }
        };
        if let Err(err) = voter.update_weights(&weights) {
            return report(&err);
        }
    }

    let request = EnsembleRequest {
        full_time_prediction: cli.ft,
        full_time_confidence: cli.ft_confidence,
        half_time_prediction: cli.ht,
        half_time_confidence: cli.ht_confidence,
        pattern_prediction: cli.pt,
        pattern_confidence: cli.pt_confidence,
    };

    match voter.vote(&request) {
        Ok(result) => match print_json(&result, cli.indent) {
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
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(
            &mut buf,
            serde_json::ser::PrettyFormatter::with_indent(&pad),
        );
        value.serialize(&mut ser)?;
        String::from_utf8(buf).context("serializer produced invalid utf-8")?
    };
    writeln!(io::stdout().lock(), "{text}").context("write stdout")?;
    Ok(())
}
