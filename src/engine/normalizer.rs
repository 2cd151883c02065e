//! Row normalization and partitioning
//!
//! Turns canonical ledger rows into per-counterparty movement streams:
//! classifies rows into the Receivables/Payables blocks by account prefix,
//! nets debit against credit, inverts the Payables sign so both blocks read
//! the same way (positive owes, negative settles), and stamps each movement
//! with its deterministic document-key. Structurally broken rows become
//! diagnostics, never errors.

use std::collections::BTreeMap;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use tracing::debug;

use crate::types::{
    Block, CanonicalRow, Diagnostic, Movement, ReconcileConfig, ReconcileError, ReconcileResult,
};

/// Movements partitioned by block and counterparty, ready for replay
///
/// `BTreeMap` keeps counterparty iteration order deterministic across runs.
#[derive(Debug, Default)]
pub struct NormalizedInput {
    pub receivables: BTreeMap<String, Vec<Movement>>,
    pub payables: BTreeMap<String, Vec<Movement>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Partition canonical rows into normalized per-counterparty streams
///
/// Errors only when the partition itself is meaningless (no row matched
/// either prefix set); everything row-local is reported as a diagnostic
/// and the row is skipped.
pub fn normalize(
    rows: &[CanonicalRow],
    config: &ReconcileConfig,
) -> ReconcileResult<NormalizedInput> {
    let mut input = NormalizedInput::default();

    for (row_index, row) in rows.iter().enumerate() {
        let Some(block) = classify(&row.account, config) else {
            continue;
        };

        let Some(counterparty) = row
            .counterparty
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            input.diagnostics.push(Diagnostic {
                counterparty: None,
                row_index: Some(row_index),
                message: format!("Row on account {} has no counterparty", row.account),
            });
            continue;
        };

        let Some(date) = row.date else {
            input.diagnostics.push(Diagnostic {
                counterparty: Some(counterparty.to_string()),
                row_index: Some(row_index),
                message: "Row has no date".to_string(),
            });
            continue;
        };

        let Some(net) = row.net_amount() else {
            input.diagnostics.push(Diagnostic {
                counterparty: Some(counterparty.to_string()),
                row_index: Some(row_index),
                message: "Row has neither debit nor credit".to_string(),
            });
            continue;
        };

        // Zero-net rows neither owe nor settle
        if net.abs() <= config.tolerance {
            continue;
        }

        // Payables run inverted in the raw ledger: credits open debts,
        // debits settle them. Flip so one reconciler serves both blocks.
        let amount = match block {
            Block::Receivables => net,
            Block::Payables => -net,
        };

        let doc_key = doc_key(counterparty, row, date, &amount);
        let movement = Movement {
            block,
            counterparty: counterparty.to_string(),
            date,
            amount,
            account: row.account.clone(),
            document: row.document.clone(),
            concept: row.concept.clone(),
            doc_key,
            pre_reconciled: row.pre_reconciled,
            counterpart_key: row.counterpart_key.clone(),
            row_index,
        };

        let block_map = match block {
            Block::Receivables => &mut input.receivables,
            Block::Payables => &mut input.payables,
        };
        block_map
            .entry(counterparty.to_string())
            .or_default()
            .push(movement);
    }

    if input.receivables.is_empty() && input.payables.is_empty() {
        return Err(ReconcileError::Configuration(format!(
            "No rows matched the configured account prefixes (receivables: {:?}, payables: {:?})",
            config.receivable_prefixes, config.payable_prefixes
        )));
    }

    for movements in input
        .receivables
        .values_mut()
        .chain(input.payables.values_mut())
    {
        movements.sort_by_key(|m| (m.date, m.row_index));
    }

    debug!(
        receivable_counterparties = input.receivables.len(),
        payable_counterparties = input.payables.len(),
        diagnostics = input.diagnostics.len(),
        "normalization complete"
    );

    Ok(input)
}

/// Block an account belongs to, by longest-prefix convention: a row
/// matching both sets goes to whichever side has the more specific prefix
fn classify(account: &str, config: &ReconcileConfig) -> Option<Block> {
    let receivable = longest_prefix(account, &config.receivable_prefixes);
    let payable = longest_prefix(account, &config.payable_prefixes);
    match (receivable, payable) {
        (Some(r), Some(p)) if r >= p => Some(Block::Receivables),
        (Some(_), Some(_)) => Some(Block::Payables),
        (Some(_), None) => Some(Block::Receivables),
        (None, Some(_)) => Some(Block::Payables),
        (None, None) => None,
    }
}

fn longest_prefix(account: &str, prefixes: &[String]) -> Option<usize> {
    prefixes
        .iter()
        .filter(|p| account.starts_with(p.as_str()))
        .map(|p| p.len())
        .max()
}

/// Deterministic composite identifier for one movement
///
/// `counterparty | document-or-date | account | signed 2dp amount`, stable
/// across runs so re-running the same ledger yields the same keys.
fn doc_key(
    counterparty: &str,
    row: &CanonicalRow,
    date: chrono::NaiveDate,
    amount: &BigDecimal,
) -> String {
    let document = row
        .document
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| date.format("%Y-%m-%d").to_string());
    format!(
        "{counterparty} | {document} | {} | {}",
        row.account,
        format_amount(amount)
    )
}

/// Signed fixed two-decimal rendering, "+" for non-negative amounts
fn format_amount(amount: &BigDecimal) -> String {
    let rounded = amount.with_scale_round(2, RoundingMode::HalfUp);
    if rounded < BigDecimal::zero() {
        rounded.to_string()
    } else {
        format!("+{rounded}")
    }
}
