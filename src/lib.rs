//! # Reconcile Core
//!
//! A waterfall reconciliation engine for accounting ledger movements,
//! matching invoices against the payments that settle them.
//!
//! ## Features
//!
//! - **Waterfall matching**: Reference, Exact, CombinedAmount, DateProximity
//!   and FIFO phases tried in strict order, each allocation stamped with the
//!   phase that produced it and a confidence score
//! - **Block partitioning**: Receivables and Payables selected by account
//!   prefix, with the Payables sign normalized so one engine serves both
//! - **Reference extraction**: document numbers pulled out of free text,
//!   including ranges like `FACT 1234-1236`
//! - **Degrading behavior**: unmatched payments become zero-confidence
//!   `Unallocated` records with triage suggestions, never errors
//! - **Deterministic output**: stable document-keys and ordering, so the
//!   same ledger always produces the same report
//!
//! ## Quick Start
//!
//! ```rust
//! use reconcile_core::{CanonicalRow, ReconcileConfig, ReconciliationEngine};
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//! use std::str::FromStr;
//!
//! let rows = vec![
//!     CanonicalRow::new(
//!         "430001",
//!         NaiveDate::from_ymd_opt(2024, 3, 1),
//!         Some(BigDecimal::from_str("250.00").unwrap()),
//!         None,
//!     )
//!     .with_counterparty("ACME")
//!     .with_document("FAC-100"),
//!     CanonicalRow::new(
//!         "430001",
//!         NaiveDate::from_ymd_opt(2024, 3, 10),
//!         None,
//!         Some(BigDecimal::from_str("250.00").unwrap()),
//!     )
//!     .with_counterparty("ACME")
//!     .with_concept("Pago fac 100"),
//! ];
//!
//! let engine = ReconciliationEngine::new(ReconcileConfig::default());
//! let report = engine.reconcile(&rows).unwrap();
//! assert_eq!(report.receivables.summary.matched_count, 1);
//! ```

pub mod engine;
pub mod reference;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use engine::*;
pub use traits::*;
pub use types::*;
pub use utils::suggestions::{Suggestion, SuggestionKind};
