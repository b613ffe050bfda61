//! Canonicalize one extraction result.
//!
//! ```text
//! cargo run --example canonicalize --features all -- analyze-result.json [overrides.json]
//! RUST_LOG=beleg=debug cargo run --example canonicalize --features all -- in.json
//! ```
//!
//! Accepts both the `analyzeResult` layout and the crate's own extraction
//! layout. Prints the corrections report as JSON, then the UBL invoice if
//! the document could be serialized.

use std::process::ExitCode;

use beleg::core::{ProcessingConfig, RawExtraction};
use beleg::{json, pipeline};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(input) = args.next() else {
        eprintln!("usage: canonicalize <extraction.json> [overrides.json]");
        return ExitCode::FAILURE;
    };

    let config = match args.next() {
        Some(path) => match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| json::config_from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => ProcessingConfig::en16931_basic(),
    };

    let raw = match std::fs::read_to_string(&input)
        .map_err(|e| e.to_string())
        .and_then(|text| read_extraction(&text))
    {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("{input}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = match pipeline::process(&config, &raw) {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("processing failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    match json::report_to_string(&outcome.report) {
        Ok(report) => println!("{report}"),
        Err(e) => eprintln!("report: {e}"),
    }
    match outcome.xml {
        Some(xml) => {
            println!("{xml}");
            ExitCode::SUCCESS
        }
        None => {
            for violation in outcome.report.blocking() {
                eprintln!("  {violation}");
            }
            ExitCode::from(2)
        }
    }
}

fn read_extraction(text: &str) -> Result<RawExtraction, String> {
    if text.contains("\"analyzeResult\"") {
        json::extraction_from_azure(text).map_err(|e| e.to_string())
    } else {
        json::extraction_from_str(text).map_err(|e| e.to_string())
    }
}
