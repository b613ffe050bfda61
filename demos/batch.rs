//! Canonicalize every `*.json` extraction in a directory in parallel,
//! giving up on documents not yet started once a time budget is spent.
//!
//! ```text
//! cargo run --example batch --features all -- ./extractions [budget-seconds]
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use beleg::core::{ProcessingConfig, ProcessingState};
use beleg::{json, pipeline};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let dir = PathBuf::from(args.next().unwrap_or_else(|| ".".into()));
    let budget: Option<u64> = args.next().map(|n| n.parse()).transpose()?;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut batch = Vec::with_capacity(paths.len());
    for path in &paths {
        let text = std::fs::read_to_string(path)?;
        batch.push(json::extraction_from_azure(&text)?);
    }

    let config = ProcessingConfig::en16931_basic();
    let (cancel, done) = (&AtomicBool::new(false), &AtomicBool::new(false));

    // Documents already running when the budget runs out finish normally.
    let results = std::thread::scope(|scope| {
        if let Some(budget) = budget {
            let deadline = Instant::now() + Duration::from_secs(budget);
            scope.spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    if Instant::now() >= deadline {
                        cancel.store(true, Ordering::SeqCst);
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
            });
        }
        let results = pipeline::process_batch_cancellable(&config, &batch, cancel);
        done.store(true, Ordering::SeqCst);
        results
    });

    let (mut serialized, mut rejected, mut skipped) = (0, 0, 0);
    for (path, result) in paths.iter().zip(results) {
        match result {
            None => skipped += 1,
            Some(Err(e)) => println!("{}: error: {e}", path.display()),
            Some(Ok(outcome)) => {
                let report = &outcome.report;
                println!(
                    "{}: {} ({} corrections, {} violations)",
                    path.display(),
                    report.state,
                    report.corrections.len(),
                    report.violations.len()
                );
                if report.state == ProcessingState::Serialized {
                    serialized += 1;
                    if let Some(xml) = &outcome.xml {
                        std::fs::write(path.with_extension("xml"), xml)?;
                    }
                } else {
                    rejected += 1;
                }
            }
        }
    }
    println!("{serialized} serialized, {rejected} rejected, {skipped} skipped");
    Ok(())
}
