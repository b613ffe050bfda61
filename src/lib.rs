//! # beleg
//!
//! Turns OCR-extracted invoice data into the EN 16931 semantic model,
//! corrects what can be corrected deterministically, and writes the result
//! as an EN 16931 Basic UBL 2.1 Invoice.
//!
//! Raw fields from a document-understanding service are mapped to business
//! terms (BTs), a rule engine recomputes and checks them until nothing
//! changes, and every change and every remaining problem lands in a
//! [`CorrectionsReport`](crate::core::CorrectionsReport). XML is only
//! produced for documents without FATAL or ERROR violations.
//!
//! All monetary values use [`rust_decimal::Decimal`]; rounding is half-even
//! to the currency's minor unit.
//!
//! ## Quick Start
//!
//! ```rust
//! use beleg::core::*;
//! use rust_decimal_macros::dec;
//!
//! let config = ProcessingConfig::en16931_basic();
//! let raw = RawExtraction::new()
//!     .with("InvoiceId", "RE-2024-001")
//!     .with("InvoiceDate", "15.06.2024")
//!     .with("CurrencyCode", "EUR")
//!     .with("VendorName", "ACME GmbH")
//!     .with("VendorTaxId", "DE 123 456 789")
//!     .with("VendorAddress.postalCode", "10115")
//!     .with("CustomerName", "Kunde AG")
//!     .with("CustomerAddress.postalCode", "80331")
//!     .line(
//!         RawRecord::new()
//!             .with("Description", "Beratung")
//!             .with("Quantity", "10")
//!             .with("UnitPrice", "150,00")
//!             .with("TaxRate", "19 %"),
//!     );
//!
//! let mut doc = FieldMapper::new(&config).map(&raw).document;
//! let run = Engine::new(&config).run(&mut doc);
//! assert!(run.converged);
//!
//! let due = doc.singular_value(config.registry(), "BT-115").and_then(BtValue::as_decimal);
//! assert_eq!(due, Some(dec!(1785.00)));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | BT registry, codelists, field mapper, BT store, rule engine, report |
//! | `json` | JSON extraction input (own and Azure layout), config overrides, report output |
//! | `ubl` | EN 16931 Basic UBL writer and reader, single-document pipeline |
//! | `batch` | Parallel batch processing with cancellation |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "ubl")]
pub mod ubl;

#[cfg(feature = "ubl")]
pub mod pipeline;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
