//! EN 16931 Basic serialization as UBL 2.1.
//!
//! [`to_ubl_xml`] writes a corrected [`InvoiceDocument`](crate::core::InvoiceDocument)
//! and refuses while blocking violations remain. [`from_ubl_xml`] reads the
//! same binding back into a BT store, so a serialized document can be
//! compared term by term with the one it came from.
//!
//! # Example
//!
//! ```no_run
//! use beleg::core::*;
//! use beleg::ubl;
//!
//! let config = ProcessingConfig::en16931_basic();
//! let doc: InvoiceDocument = todo!(); // mapped and corrected
//! let report: CorrectionsReport = todo!();
//! let xml = ubl::to_ubl_xml(&doc, &report.violations, config.registry()).unwrap();
//! let back = ubl::from_ubl_xml(&xml, config.registry()).unwrap();
//! assert_eq!(back.snapshot(), doc.snapshot());
//! ```

mod reader;
mod writer;

pub use reader::from_ubl_xml;
pub use writer::to_ubl_xml;

/// UBL 2.1 namespace URIs.
pub mod ubl_ns {
    pub const INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
    pub const CAC: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
    pub const CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
}
