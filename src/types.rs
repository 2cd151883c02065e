//! Core types and data structures for the reconciliation engine

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::utils::suggestions::Suggestion;

/// Ledger block a movement belongs to, selected via account-prefix filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Block {
    /// Money owed to the business (customer accounts)
    Receivables,
    /// Money owed by the business (supplier accounts)
    Payables,
}

impl Block {
    /// Human-readable block label used in summaries
    pub fn label(&self) -> &'static str {
        match self {
            Block::Receivables => "Receivables",
            Block::Payables => "Payables",
        }
    }
}

/// One canonical row as delivered by the ingestion/schema collaborator
///
/// The ingestion layer has already located the header row and mapped
/// heterogeneous column names; this crate only consumes the flat result.
/// Either `debit` or `credit` or both may be present; the net amount is
/// `debit - credit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    /// Ledger account code (e.g. "430001")
    pub account: String,
    /// Movement date; required for in-scope rows
    pub date: Option<NaiveDate>,
    /// Debit amount, if any
    pub debit: Option<BigDecimal>,
    /// Credit amount, if any
    pub credit: Option<BigDecimal>,
    /// Counterparty (customer or supplier) the row belongs to
    pub counterparty: Option<String>,
    /// Document number text (invoice number, etc.)
    pub document: Option<String>,
    /// Free-text concept/description
    pub concept: Option<String>,
    /// Carried from the source: the row was already reconciled upstream
    pub pre_reconciled: bool,
    /// Counterpart document-key supplied by the source for pre-reconciled rows
    pub counterpart_key: Option<String>,
}

impl CanonicalRow {
    /// Create a row with the required fields; optional fields via `with_*`
    pub fn new(
        account: impl Into<String>,
        date: Option<NaiveDate>,
        debit: Option<BigDecimal>,
        credit: Option<BigDecimal>,
    ) -> Self {
        Self {
            account: account.into(),
            date,
            debit,
            credit,
            counterparty: None,
            document: None,
            concept: None,
            pre_reconciled: false,
            counterpart_key: None,
        }
    }

    /// Set the counterparty
    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    /// Set the document number text
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Set the concept/description text
    pub fn with_concept(mut self, concept: impl Into<String>) -> Self {
        self.concept = Some(concept.into());
        self
    }

    /// Mark the row as already reconciled upstream
    pub fn with_pre_reconciled(mut self, counterpart_key: impl Into<String>) -> Self {
        self.pre_reconciled = true;
        self.counterpart_key = Some(counterpart_key.into());
        self
    }

    /// Net amount of the row: `debit - credit`, `None` when neither is present
    pub fn net_amount(&self) -> Option<BigDecimal> {
        match (&self.debit, &self.credit) {
            (None, None) => None,
            (debit, credit) => {
                let d = debit.clone().unwrap_or_else(BigDecimal::zero);
                let c = credit.clone().unwrap_or_else(BigDecimal::zero);
                Some(d - c)
            }
        }
    }
}

/// One ledger line after normalization
///
/// Movements are read-only once built: positive amounts are invoices
/// (amounts owed), negative amounts are payments (amounts settling), in
/// both blocks — the normalizer inverts the raw sign for Payables so the
/// reconciler can be written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    /// Block the movement was partitioned into
    pub block: Block,
    /// Counterparty the movement belongs to
    pub counterparty: String,
    /// Movement date
    pub date: NaiveDate,
    /// Signed normalized amount (positive = invoice, negative = payment)
    pub amount: BigDecimal,
    /// Ledger account code
    pub account: String,
    /// Document number text
    pub document: Option<String>,
    /// Free-text concept/description
    pub concept: Option<String>,
    /// Stable composite identifier (counterparty | document | account | amount)
    pub doc_key: String,
    /// Carried from the source row
    pub pre_reconciled: bool,
    /// Counterpart document-key for pre-reconciled rows
    pub counterpart_key: Option<String>,
    /// Original row index, used as the stable sort tie-break
    pub row_index: usize,
}

impl Movement {
    /// True when the movement opens an amount owed
    pub fn is_invoice(&self) -> bool {
        self.amount > BigDecimal::zero()
    }

    /// True when the movement settles an amount owed
    pub fn is_payment(&self) -> bool {
        self.amount < BigDecimal::zero()
    }
}

/// An invoice currently tracked in a counterparty's open queue
///
/// `remaining` starts equal to `original` and only ever decreases; the
/// reconciler removes the invoice from the queue once it drops to within
/// tolerance of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInvoice {
    /// Document-key of the invoice movement
    pub doc_key: String,
    /// Issue date
    pub date: NaiveDate,
    /// Original invoice amount
    pub original: BigDecimal,
    /// Unsettled amount, mutated only by the reconciler
    pub remaining: BigDecimal,
    /// Candidate reference tokens extracted from the document text
    pub references: Vec<String>,
}

impl OpenInvoice {
    /// True once the remaining balance is within tolerance of zero
    pub fn is_settled(&self, tolerance: &BigDecimal) -> bool {
        &self.remaining <= tolerance
    }
}

/// A payment mid-processing: the unallocated remainder depletes as the
/// waterfall phases split it across open invoices
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    /// Document-key of the payment movement
    pub doc_key: String,
    /// Payment date
    pub date: NaiveDate,
    /// Amount still to allocate (always positive)
    pub remaining: BigDecimal,
    /// Candidate reference tokens extracted from the concept/document text
    pub references: Vec<String>,
}

/// How an allocation was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchMethod {
    /// Phase 1: explicit document reference in the payment text
    Reference,
    /// Phase 2: invoice remaining equals the payment amount
    Exact,
    /// Phase 3: two or three invoices sum to the payment amount
    CombinedAmount,
    /// Phase 4: close dates and roughly matching amounts
    DateProximity,
    /// Phase 5: chronological fallback
    #[serde(rename = "FIFO")]
    Fifo,
    /// Payment remainder no phase could place; the primary review signal
    Unallocated,
    /// Invoice still open at end of stream
    Open,
    /// Row was reconciled upstream and bypassed the waterfall
    PreReconciled,
}

impl MatchMethod {
    /// Stable string tag used in exports
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Reference => "Reference",
            MatchMethod::Exact => "Exact",
            MatchMethod::CombinedAmount => "CombinedAmount",
            MatchMethod::DateProximity => "DateProximity",
            MatchMethod::Fifo => "FIFO",
            MatchMethod::Unallocated => "Unallocated",
            MatchMethod::Open => "Open",
            MatchMethod::PreReconciled => "PreReconciled",
        }
    }
}

/// The atomic output unit of the reconciler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// Grouping identifier: one uninterrupted chain of invoices and payments
    pub set_id: u32,
    /// Counterparty the allocation belongs to
    pub counterparty: String,
    /// Invoice date, `None` for unallocated payments
    pub invoice_date: Option<NaiveDate>,
    /// Payment date, `None` for open invoices
    pub payment_date: Option<NaiveDate>,
    /// Invoice document-key, `None` for unallocated payments
    pub invoice_key: Option<String>,
    /// Payment document-key, `None` for open invoices
    pub payment_key: Option<String>,
    /// Amount allocated in this step
    pub amount: BigDecimal,
    /// Invoice residual immediately after the allocation
    pub residual_after: Option<BigDecimal>,
    /// How the allocation was produced
    pub method: MatchMethod,
    /// Heuristic reliability score in [0, 100]
    pub confidence: f64,
    /// Triage hint, set only on `Unallocated` records
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suggestion: Option<Suggestion>,
}

/// Structural-error report entry
///
/// Structural problems (a row missing its date or amount) never abort the
/// run; they surface here so the caller always gets a partial result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Counterparty the problem belongs to, when known
    pub counterparty: Option<String>,
    /// Original row index, when known
    pub row_index: Option<usize>,
    /// What went wrong
    pub message: String,
}

/// Engine configuration, passed explicitly so counterparty passes stay
/// independently testable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Epsilon below which an amount is treated as zero (ledger currency units)
    pub tolerance: BigDecimal,
    /// Account prefixes selecting the Receivables block
    pub receivable_prefixes: Vec<String>,
    /// Account prefixes selecting the Payables block
    pub payable_prefixes: Vec<String>,
    /// Open-invoice count above which the CombinedAmount phase is skipped
    pub combined_phase_limit: usize,
    /// Reference date for invoice aging; `None` means today
    pub as_of: Option<NaiveDate>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tolerance: BigDecimal::new(1.into(), 2), // 0.01
            receivable_prefixes: vec!["43".to_string()],
            payable_prefixes: vec!["40".to_string(), "41".to_string()],
            combined_phase_limit: 15,
            as_of: None,
        }
    }
}

impl ReconcileConfig {
    /// Create a configuration with a custom tolerance
    pub fn with_tolerance(tolerance: BigDecimal) -> Self {
        Self {
            tolerance,
            ..Self::default()
        }
    }
}

/// Errors that can occur in the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// No meaningful partition exists; aborts the whole run
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// Structurally invalid movement; local to one counterparty
    #[error("Invalid movement for counterparty '{counterparty}': {reason}")]
    InvalidMovement {
        counterparty: String,
        reason: String,
    },
    /// General validation failure
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;
