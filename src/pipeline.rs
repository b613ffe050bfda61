//! End-to-end processing: raw extraction in, corrections report and (when
//! the document is clean enough) UBL out.
//!
//! Every document moves through
//! `Mapped → Correcting → Validated → Serialized`, or stops at `Rejected`
//! when FATAL or ERROR violations survive the engine or the writer fails.
//! A rejected document is not an error: the caller still gets the report
//! explaining why.
//!
//! # Example
//!
//! ```no_run
//! use beleg::core::{ProcessingConfig, ProcessingState, RawExtraction};
//! use beleg::pipeline;
//!
//! let config = ProcessingConfig::en16931_basic();
//! let raw: RawExtraction = todo!(); // from the extraction service
//! let outcome = pipeline::process(&config, &raw).unwrap();
//! match outcome.report.state {
//!     ProcessingState::Serialized => println!("{}", outcome.xml.unwrap()),
//!     _ => eprintln!("{} violation(s)", outcome.report.violations.len()),
//! }
//! ```

use crate::core::{
    BelegError, CorrectionsReport, Engine, FieldMapper, InvoiceDocument, ProcessingConfig,
    ProcessingState, RawExtraction, Violation,
};
use crate::ubl;

/// Everything produced for one document.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub report: CorrectionsReport,
    /// UBL Invoice; present only in state `Serialized`.
    pub xml: Option<String>,
    /// The corrected BT store.
    pub document: InvoiceDocument,
}

impl ProcessingOutcome {
    pub fn state(&self) -> ProcessingState {
        self.report.state
    }

    pub fn is_serialized(&self) -> bool {
        self.report.state == ProcessingState::Serialized
    }
}

/// Rule id of the FATAL violation recorded when the writer fails on a
/// document the engine accepted.
pub const SERIALIZATION_RULE: &str = "UBL-WRITE";

/// Map, correct, validate and serialize one extraction.
///
/// Every document yields a report. Mapping, store and writer failures end
/// up in `report.violations` as FATAL findings; `Err` is reserved for a
/// broken processing lifecycle.
pub fn process(
    config: &ProcessingConfig,
    raw: &RawExtraction,
) -> Result<ProcessingOutcome, BelegError> {
    let registry = config.registry();
    let mapped = FieldMapper::new(config).map(raw);
    let mut document = mapped.document;

    let mut report = CorrectionsReport::new();
    report.document_id = document
        .singular_value(registry, "BT-1")
        .map(ToString::to_string);
    let span = tracing::info_span!(
        "document",
        id = report.document_id.as_deref().unwrap_or("-")
    );
    let _guard = span.enter();

    report.state.transition(ProcessingState::Correcting)?;
    let run = Engine::new(config).run(&mut document);
    report.corrections = mapped.corrections;
    report.corrections.extend(run.corrections);
    report.passes = run.passes;
    report.add_violations(mapped.violations);
    report.add_violations(run.violations);

    if report.has_blocking() {
        report.state.transition(ProcessingState::Rejected)?;
        tracing::info!(
            corrections = report.corrections.len(),
            blocking = report.blocking().count(),
            "document rejected"
        );
        return Ok(ProcessingOutcome {
            report,
            xml: None,
            document,
        });
    }

    report.state.transition(ProcessingState::Validated)?;
    let xml = match ubl::to_ubl_xml(&document, &report.violations, registry) {
        Ok(xml) => xml,
        Err(err) => {
            tracing::warn!(error = %err, "document could not be written");
            report.add_violations([Violation::fatal(SERIALIZATION_RULE, "", err.to_string())]);
            report.state.transition(ProcessingState::Rejected)?;
            return Ok(ProcessingOutcome {
                report,
                xml: None,
                document,
            });
        }
    };
    report.state.transition(ProcessingState::Serialized)?;
    tracing::info!(
        corrections = report.corrections.len(),
        warnings = report.violations.len(),
        bytes = xml.len(),
        "document serialized"
    );

    Ok(ProcessingOutcome {
        report,
        xml: Some(xml),
        document,
    })
}

/// Process documents in parallel. Results keep the input order.
#[cfg(feature = "batch")]
pub fn process_batch(
    config: &ProcessingConfig,
    batch: &[RawExtraction],
) -> Vec<Result<ProcessingOutcome, BelegError>> {
    use rayon::prelude::*;

    tracing::info!(documents = batch.len(), "batch started");
    batch.par_iter().map(|raw| process(config, raw)).collect()
}

/// Like [`process_batch`], but stops dispatching once `cancel` is set.
/// Documents already running finish; the slots of documents never started
/// are `None`.
#[cfg(feature = "batch")]
pub fn process_batch_cancellable(
    config: &ProcessingConfig,
    batch: &[RawExtraction],
    cancel: &std::sync::atomic::AtomicBool,
) -> Vec<Option<Result<ProcessingOutcome, BelegError>>> {
    use rayon::prelude::*;
    use std::sync::atomic::Ordering;

    let results: Vec<_> = batch
        .par_iter()
        .map(|raw| {
            if cancel.load(Ordering::SeqCst) {
                None
            } else {
                Some(process(config, raw))
            }
        })
        .collect();

    let skipped = results.iter().filter(|r| r.is_none()).count();
    if skipped > 0 {
        tracing::warn!(skipped, "batch cancelled");
    }
    results
}
