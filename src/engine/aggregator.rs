//! Report aggregation over raw allocation streams
//!
//! The reconciler emits a flat allocation history; this module rolls it up
//! into the per-block report surfaces: the pending-invoice table with aging
//! and the block totals used for quick summaries.

use bigdecimal::{BigDecimal, Zero};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{Allocation, Block, MatchMethod};

/// One invoice still open at the end of the replay, with aging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRow {
    /// Counterparty that owes (or is owed) the amount
    pub counterparty: String,
    /// Document-key of the open invoice
    pub invoice_key: String,
    /// Issue date
    pub invoice_date: NaiveDate,
    /// Unsettled amount
    pub amount_pending: BigDecimal,
    /// Days between issue and the report date; negative for future invoices
    pub days_outstanding: i64,
}

/// Block-level totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub block: Block,
    /// Allocations carrying a match (every method except Unallocated/Open)
    pub matched_count: usize,
    /// Total amount placed by the matched allocations
    pub matched_total: BigDecimal,
    /// Payment remainders no phase could place
    pub unallocated_count: usize,
    pub unallocated_total: BigDecimal,
    /// Invoices still open at end of stream
    pub pending_count: usize,
    pub pending_total: BigDecimal,
}

/// The complete result surface for one block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReport {
    pub summary: BlockSummary,
    /// Full allocation history, ordered by counterparty then replay order
    pub allocations: Vec<Allocation>,
    /// Open invoices with aging, oldest first
    pub pending: Vec<PendingRow>,
}

impl BlockReport {
    /// An empty report for a block with no movements
    pub fn empty(block: Block) -> Self {
        aggregate(block, Vec::new(), NaiveDate::MIN)
    }
}

/// Roll a block's allocation history up into its report
///
/// `as_of` is the reference date for invoice aging.
pub fn aggregate(block: Block, allocations: Vec<Allocation>, as_of: NaiveDate) -> BlockReport {
    let mut matched_count = 0;
    let mut matched_total = BigDecimal::zero();
    let mut unallocated_count = 0;
    let mut unallocated_total = BigDecimal::zero();
    let mut pending = Vec::new();

    for allocation in &allocations {
        match allocation.method {
            MatchMethod::Unallocated => {
                unallocated_count += 1;
                unallocated_total += &allocation.amount;
            }
            MatchMethod::Open => {
                // Open records carry the residual, not an allocated amount
                let (Some(invoice_key), Some(invoice_date), Some(remaining)) = (
                    allocation.invoice_key.as_ref(),
                    allocation.invoice_date,
                    allocation.residual_after.as_ref(),
                ) else {
                    continue;
                };
                pending.push(PendingRow {
                    counterparty: allocation.counterparty.clone(),
                    invoice_key: invoice_key.clone(),
                    invoice_date,
                    amount_pending: remaining.clone(),
                    days_outstanding: as_of.signed_duration_since(invoice_date).num_days(),
                });
            }
            _ => {
                matched_count += 1;
                matched_total += &allocation.amount;
            }
        }
    }

    pending.sort_by(|a, b| {
        a.invoice_date
            .cmp(&b.invoice_date)
            .then_with(|| a.counterparty.cmp(&b.counterparty))
    });

    let pending_total = pending
        .iter()
        .fold(BigDecimal::zero(), |acc, row| acc + &row.amount_pending);

    BlockReport {
        summary: BlockSummary {
            block,
            matched_count,
            matched_total,
            unallocated_count,
            unallocated_total,
            pending_count: pending.len(),
            pending_total,
        },
        allocations,
        pending,
    }
}
