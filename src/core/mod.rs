//! Canonical invoice model and the processing stages that work on it.
//!
//! The BT registry and codelists are reference data. The field mapper
//! builds an [`InvoiceDocument`] from raw extraction output, the engine
//! corrects and validates it in place, and everything that happened is
//! recorded in a [`CorrectionsReport`].

pub mod codelists;
mod config;
mod engine;
mod error;
pub mod mapping;
mod registry;
mod report;
pub mod rules;
mod state;
mod store;
mod value;

pub use codelists::{Codelist, Codelists};
pub use config::*;
pub use engine::*;
pub use error::*;
pub use mapping::{
    Coercion, FieldMapper, FieldMapping, MappedDocument, MappingTable, RawExtraction, RawField,
    RawRecord, RawValue, Scope,
};
pub use registry::*;
pub use report::*;
pub use rules::{Breach, Remedy, RuleContext, RuleKind, RuleSet, ValidationRule};
pub use state::*;
pub use store::*;
pub use value::*;
