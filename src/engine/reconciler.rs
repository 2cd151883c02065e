//! Per-counterparty waterfall state machine
//!
//! Replays one counterparty's movements in chronological order, maintaining
//! the open-invoice queue and emitting the complete allocation history.
//! Data-quality conditions (unmatched payments, partial invoices) are never
//! errors here; they come out as low- or zero-confidence allocations.

use bigdecimal::{BigDecimal, Zero};
use tracing::{debug, trace};

use crate::engine::phases::default_phases;
use crate::reference;
use crate::traits::MatchPhase;
use crate::types::{
    Allocation, MatchMethod, Movement, OpenInvoice, PendingPayment, ReconcileConfig,
    ReconcileError, ReconcileResult,
};
use crate::utils::suggestions;

/// Waterfall reconciler for a single counterparty
///
/// Set semantics: the set counter advances whenever the queue is left empty
/// after a movement, so each set id covers one uninterrupted chain of
/// invoices and the payments that attempt to settle them. Ids are
/// monotonic and never revisited.
pub struct Reconciler {
    counterparty: String,
    tolerance: BigDecimal,
    phases: Vec<Box<dyn MatchPhase>>,
    open_invoices: Vec<OpenInvoice>,
    allocations: Vec<Allocation>,
    set_id: u32,
}

impl Reconciler {
    /// Create a reconciler with the standard five-phase waterfall
    pub fn new(counterparty: impl Into<String>, config: &ReconcileConfig) -> Self {
        Self::with_phases(counterparty, config.tolerance.clone(), default_phases(config))
    }

    /// Create a reconciler with a custom phase sequence
    pub fn with_phases(
        counterparty: impl Into<String>,
        tolerance: BigDecimal,
        phases: Vec<Box<dyn MatchPhase>>,
    ) -> Self {
        Self {
            counterparty: counterparty.into(),
            tolerance,
            phases,
            open_invoices: Vec::new(),
            allocations: Vec::new(),
            set_id: 0,
        }
    }

    /// Invoices still open at this point of the replay
    pub fn open_invoices(&self) -> &[OpenInvoice] {
        &self.open_invoices
    }

    /// Process the next movement in chronological order
    pub fn process(&mut self, movement: &Movement) -> ReconcileResult<()> {
        if movement.counterparty != self.counterparty {
            return Err(ReconcileError::InvalidMovement {
                counterparty: self.counterparty.clone(),
                reason: format!(
                    "movement belongs to counterparty '{}'",
                    movement.counterparty
                ),
            });
        }

        if movement.is_invoice() {
            self.add_invoice(movement);
        } else if movement.is_payment() {
            self.process_payment(movement);
        }
        // zero-amount movements neither owe nor settle; the normalizer
        // drops them, tolerate them here
        Ok(())
    }

    /// Finish the replay: every invoice still open emits an `Open` record
    pub fn finish(mut self) -> Vec<Allocation> {
        for invoice in &self.open_invoices {
            if invoice.is_settled(&self.tolerance) {
                continue;
            }
            self.allocations.push(Allocation {
                set_id: self.set_id,
                counterparty: self.counterparty.clone(),
                invoice_date: Some(invoice.date),
                payment_date: None,
                invoice_key: Some(invoice.doc_key.clone()),
                payment_key: None,
                amount: BigDecimal::zero(),
                residual_after: Some(invoice.remaining.clone()),
                method: MatchMethod::Open,
                confidence: 0.0,
                suggestion: None,
            });
        }
        self.allocations
    }

    fn add_invoice(&mut self, movement: &Movement) {
        let references = movement
            .document
            .as_deref()
            .map(reference::extract_references)
            .unwrap_or_default();

        self.open_invoices.push(OpenInvoice {
            doc_key: movement.doc_key.clone(),
            date: movement.date,
            original: movement.amount.clone(),
            remaining: movement.amount.clone(),
            references,
        });
    }

    fn process_payment(&mut self, movement: &Movement) {
        if movement.pre_reconciled {
            self.allocations.push(Allocation {
                set_id: self.set_id,
                counterparty: self.counterparty.clone(),
                invoice_date: None,
                payment_date: Some(movement.date),
                invoice_key: movement.counterpart_key.clone(),
                payment_key: Some(movement.doc_key.clone()),
                amount: movement.amount.abs(),
                residual_after: None,
                method: MatchMethod::PreReconciled,
                confidence: 100.0,
                suggestion: None,
            });
            self.close_out();
            return;
        }

        let mut references = movement
            .concept
            .as_deref()
            .map(reference::extract_references)
            .unwrap_or_default();
        if let Some(document) = movement.document.as_deref() {
            for token in reference::extract_references(document) {
                if !references.contains(&token) {
                    references.push(token);
                }
            }
        }

        let mut payment = PendingPayment {
            doc_key: movement.doc_key.clone(),
            date: movement.date,
            remaining: movement.amount.abs(),
            references,
        };

        for phase in &self.phases {
            if payment.remaining <= self.tolerance {
                break;
            }
            let hits = phase.attempt(&payment, &self.open_invoices, &self.tolerance);
            if hits.is_empty() {
                continue;
            }
            trace!(
                counterparty = %self.counterparty,
                method = phase.method().as_str(),
                hits = hits.len(),
                "phase produced allocations"
            );
            for hit in hits {
                let invoice = &mut self.open_invoices[hit.queue_index];
                let take = hit
                    .amount
                    .min(invoice.remaining.clone())
                    .min(payment.remaining.clone());
                if take <= BigDecimal::zero() {
                    continue;
                }
                invoice.remaining -= &take;
                payment.remaining -= &take;
                self.allocations.push(Allocation {
                    set_id: self.set_id,
                    counterparty: self.counterparty.clone(),
                    invoice_date: Some(invoice.date),
                    payment_date: Some(payment.date),
                    invoice_key: Some(invoice.doc_key.clone()),
                    payment_key: Some(payment.doc_key.clone()),
                    amount: take,
                    residual_after: Some(invoice.remaining.clone()),
                    method: phase.method(),
                    confidence: hit.confidence,
                    suggestion: None,
                });
            }
        }

        if payment.remaining > self.tolerance {
            let suggestion = suggestions::suggest(
                &payment.remaining,
                movement.concept.as_deref(),
                &self.open_invoices,
            );
            debug!(
                counterparty = %self.counterparty,
                payment = %payment.doc_key,
                remainder = %payment.remaining,
                "payment remainder left unallocated"
            );
            self.allocations.push(Allocation {
                set_id: self.set_id,
                counterparty: self.counterparty.clone(),
                invoice_date: None,
                payment_date: Some(payment.date),
                invoice_key: None,
                payment_key: Some(payment.doc_key.clone()),
                amount: payment.remaining.clone(),
                residual_after: None,
                method: MatchMethod::Unallocated,
                confidence: 0.0,
                suggestion: Some(suggestion),
            });
        }

        self.close_out();
    }

    /// Drop settled invoices; an emptied queue closes the current set
    fn close_out(&mut self) {
        let tolerance = self.tolerance.clone();
        self.open_invoices
            .retain(|invoice| !invoice.is_settled(&tolerance));
        if self.open_invoices.is_empty() {
            debug!(
                counterparty = %self.counterparty,
                set = self.set_id,
                "queue empty, closing set"
            );
            self.set_id += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Block;
    use crate::utils::suggestions::SuggestionKind;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn movement(amount: &str, day: u32, document: Option<&str>, concept: Option<&str>) -> Movement {
        let amount = dec(amount);
        Movement {
            block: Block::Receivables,
            counterparty: "ACME".to_string(),
            date: date(day),
            doc_key: format!("ACME | {} | 430001 | {amount}", day),
            amount,
            account: "430001".to_string(),
            document: document.map(str::to_string),
            concept: concept.map(str::to_string),
            pre_reconciled: false,
            counterpart_key: None,
            row_index: day as usize,
        }
    }

    fn run(movements: &[Movement]) -> Vec<Allocation> {
        let mut reconciler = Reconciler::new("ACME", &ReconcileConfig::default());
        for m in movements {
            reconciler.process(m).unwrap();
        }
        reconciler.finish()
    }

    #[test]
    fn exact_payment_settles_invoice() {
        let history = run(&[
            movement("100.00", 1, Some("FAC-1"), None),
            movement("-100.00", 10, None, None),
        ]);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].method, MatchMethod::Exact);
        assert_eq!(history[0].amount, dec("100.00"));
        assert_eq!(history[0].residual_after, Some(BigDecimal::zero()));
    }

    #[test]
    fn reference_match_takes_precedence_over_exact() {
        // Two same-amount invoices: the referenced one must win even
        // though Exact would have picked the closer date.
        let history = run(&[
            movement("100.00", 1, Some("FAC-123"), None),
            movement("100.00", 9, Some("FAC-456"), None),
            movement("-100.00", 10, None, Some("Pago fac 123")),
        ]);
        let hit = &history[0];
        assert_eq!(hit.method, MatchMethod::Reference);
        assert_eq!(
            hit.invoice_key.as_deref(),
            Some("ACME | 1 | 430001 | 100.00")
        );
        assert!(hit.confidence >= 80.0);
    }

    #[test]
    fn partial_payment_falls_through_to_fifo() {
        let history = run(&[
            movement("100.00", 1, None, None),
            movement("-60.00", 5, None, None),
        ]);
        // the FIFO allocation plus the Open record for the rest
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].method, MatchMethod::Fifo);
        assert_eq!(history[0].amount, dec("60.00"));
        assert_eq!(history[1].method, MatchMethod::Open);
        assert_eq!(history[1].residual_after, Some(dec("40.00")));
    }

    #[test]
    fn unmatched_payment_carries_a_suggestion() {
        let history = run(&[movement("-20.00", 3, None, None)]);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].method, MatchMethod::Unallocated);
        assert_eq!(history[0].confidence, 0.0);
        let suggestion = history[0].suggestion.as_ref().unwrap();
        assert_eq!(suggestion.kind, SuggestionKind::SmallAmount);
    }

    #[test]
    fn set_id_advances_when_the_queue_empties() {
        let history = run(&[
            movement("100.00", 1, None, None),
            movement("-100.00", 2, None, None),
            movement("200.00", 10, None, None),
            movement("-200.00", 12, None, None),
        ]);
        assert_eq!(history[0].set_id, 0);
        assert_eq!(history[1].set_id, 1);
        assert!(history[1].set_id > history[0].set_id);
    }

    #[test]
    fn pre_reconciled_payment_bypasses_the_waterfall() {
        let mut payment = movement("-500.00", 4, None, None);
        payment.pre_reconciled = true;
        payment.counterpart_key = Some("upstream-key".to_string());
        let history = run(&[payment]);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].method, MatchMethod::PreReconciled);
        assert_eq!(history[0].confidence, 100.0);
        assert_eq!(history[0].invoice_key.as_deref(), Some("upstream-key"));
        assert_eq!(history[0].amount, dec("500.00"));
    }

    #[test]
    fn foreign_counterparty_is_rejected() {
        let mut reconciler = Reconciler::new("ACME", &ReconcileConfig::default());
        let mut foreign = movement("100.00", 1, None, None);
        foreign.counterparty = "OTHER".to_string();
        let err = reconciler.process(&foreign).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidMovement { .. }));
    }

    #[test]
    fn unsettled_invoices_emit_open_records() {
        let history = run(&[
            movement("100.00", 1, None, None),
            movement("300.00", 2, None, None),
        ]);
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|a| a.method == MatchMethod::Open));
        assert!(history.iter().all(|a| a.amount == BigDecimal::zero()));
    }

    #[test]
    fn one_payment_settles_combined_invoices() {
        let history = run(&[
            movement("400.00", 1, None, None),
            movement("600.00", 2, None, None),
            movement("-1000.00", 20, None, None),
        ]);
        let combined: Vec<_> = history
            .iter()
            .filter(|a| a.method == MatchMethod::CombinedAmount)
            .collect();
        assert_eq!(combined.len(), 2);
        assert!(!history.iter().any(|a| a.method == MatchMethod::Open));
        assert!(!history.iter().any(|a| a.method == MatchMethod::Unallocated));
    }

    #[test]
    fn allocation_amounts_never_exceed_the_payment() {
        let history = run(&[
            movement("100.00", 1, None, None),
            movement("100.00", 2, None, None),
            movement("-150.00", 10, None, None),
        ]);
        let allocated: BigDecimal = history
            .iter()
            .filter(|a| a.method != MatchMethod::Open)
            .map(|a| a.amount.clone())
            .sum();
        assert_eq!(allocated, dec("150.00"));
    }
}
