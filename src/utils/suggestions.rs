//! Triage hints for unallocated payments
//!
//! When no waterfall phase can place a payment, these heuristics guess why
//! and what the bookkeeper should do about it. They are hints for human
//! review, never allocations.

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::types::OpenInvoice;

/// What the heuristic believes happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestionKind {
    /// Tiny amount, likely a bank fee or rounding difference
    SmallAmount,
    /// Concept text suggests a payment on account
    AdvancePayment,
    /// Amount close to the sum of the next open invoices
    FutureInvoices,
    /// Amount one transposition away from an open invoice
    DigitError,
    /// Concept text suggests a credit note
    CreditNote,
    /// No heuristic applied
    Unknown,
}

/// A triage hint attached to an unallocated payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Heuristic that fired
    pub kind: SuggestionKind,
    /// How sure the heuristic is, in [0, 100]
    pub confidence: f64,
    /// Human-readable explanation
    pub message: String,
    /// Recommended next step
    pub action: String,
    /// Open invoice the hint refers to, when applicable
    pub related_invoice: Option<String>,
}

/// Amounts below this are assumed to be bank fees or rounding noise
const SMALL_AMOUNT_LIMIT: f64 = 50.0;

const ADVANCE_KEYWORDS: &[&str] = &[
    "anticipo", "avance", "adelanto", "a cuenta", "advance", "on account",
];

const CREDIT_NOTE_KEYWORDS: &[&str] = &[
    "abono", "devolucion", "devolución", "credit", "nota", "reembolso", "refund",
];

/// Best guess at why a payment went unmatched
///
/// Runs every heuristic and returns the most confident hit, or an
/// `Unknown` suggestion at confidence 0 when none fires.
pub fn suggest(
    amount: &BigDecimal,
    concept: Option<&str>,
    open_invoices: &[OpenInvoice],
) -> Suggestion {
    let mut candidates = Vec::new();
    let amount_f64 = amount.to_f64().unwrap_or(0.0);
    let concept_lower = concept.map(str::to_lowercase).unwrap_or_default();

    if amount_f64 > 0.0 && amount_f64 < SMALL_AMOUNT_LIMIT {
        candidates.push(Suggestion {
            kind: SuggestionKind::SmallAmount,
            confidence: 90.0,
            message: format!(
                "Small amount ({amount_f64:.2}), possibly a bank fee or rounding difference"
            ),
            action: "Classify as a bank charge".to_string(),
            related_invoice: None,
        });
    }

    if ADVANCE_KEYWORDS.iter().any(|kw| concept_lower.contains(kw)) {
        candidates.push(Suggestion {
            kind: SuggestionKind::AdvancePayment,
            confidence: 85.0,
            message: "Concept text suggests an advance payment".to_string(),
            action: "Mark as a payment on account".to_string(),
            related_invoice: None,
        });
    }

    if CREDIT_NOTE_KEYWORDS
        .iter()
        .any(|kw| concept_lower.contains(kw))
    {
        candidates.push(Suggestion {
            kind: SuggestionKind::CreditNote,
            confidence: 80.0,
            message: "Concept text suggests a credit note".to_string(),
            action: "Look for the matching credit note".to_string(),
            related_invoice: None,
        });
    }

    if let Some(s) = future_invoices_suggestion(amount_f64, open_invoices) {
        candidates.push(s);
    }

    if let Some(s) = digit_error_suggestion(amount, open_invoices) {
        candidates.push(s);
    }

    candidates
        .into_iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .unwrap_or_else(|| Suggestion {
            kind: SuggestionKind::Unknown,
            confidence: 0.0,
            message: "Could not determine a cause".to_string(),
            action: "Review manually against bank documentation".to_string(),
            related_invoice: None,
        })
}

/// Does the payment cover the next few open invoices combined?
fn future_invoices_suggestion(
    amount: f64,
    open_invoices: &[OpenInvoice],
) -> Option<Suggestion> {
    if open_invoices.is_empty() || amount <= 0.0 {
        return None;
    }

    let mut sorted: Vec<&OpenInvoice> = open_invoices.iter().collect();
    sorted.sort_by_key(|invoice| invoice.date);
    let upcoming: f64 = sorted
        .iter()
        .take(3)
        .filter_map(|invoice| invoice.remaining.to_f64())
        .sum();

    ((upcoming - amount).abs() < amount * 0.05).then(|| Suggestion {
        kind: SuggestionKind::FutureInvoices,
        confidence: 75.0,
        message: format!("Amount close to the next open invoices combined ({upcoming:.2})"),
        action: "Review the upcoming invoices for this counterparty".to_string(),
        related_invoice: None,
    })
}

/// Is the amount exactly two digits away from an open invoice?
/// Catches keyed-in transpositions like 132.45 for 123.45.
fn digit_error_suggestion(
    amount: &BigDecimal,
    open_invoices: &[OpenInvoice],
) -> Option<Suggestion> {
    let amount_digits = digit_string(amount);

    for invoice in open_invoices {
        let invoice_digits = digit_string(&invoice.remaining);
        if amount_digits.len() != invoice_digits.len() {
            continue;
        }
        let differences = amount_digits
            .chars()
            .zip(invoice_digits.chars())
            .filter(|(a, b)| a != b)
            .count();
        if differences == 2 {
            return Some(Suggestion {
                kind: SuggestionKind::DigitError,
                confidence: 60.0,
                message: format!(
                    "Possible keying error, close to open invoice of {}",
                    invoice.remaining
                ),
                action: "Verify the amount with the bank".to_string(),
                related_invoice: Some(invoice.doc_key.clone()),
            });
        }
    }
    None
}

fn digit_string(amount: &BigDecimal) -> String {
    let rounded = amount.with_scale_round(2, bigdecimal::RoundingMode::HalfUp);
    rounded
        .to_string()
        .chars()
        .filter(char::is_ascii_digit)
        .collect()
}
