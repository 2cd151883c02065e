//! The five waterfall matching phases
//!
//! Evaluated in strict order by the reconciler; each phase sees only the
//! payment remainder the previous phases left behind. Confidence bands per
//! phase: Reference 80–100, Exact 80–90, CombinedAmount 80–85,
//! DateProximity 65–75, FIFO 45–75.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use chrono::NaiveDate;

use crate::reference;
use crate::traits::{MatchPhase, PhaseHit};
use crate::types::{MatchMethod, OpenInvoice, PendingPayment, ReconcileConfig};

/// The standard waterfall in evaluation order
pub fn default_phases(config: &ReconcileConfig) -> Vec<Box<dyn MatchPhase>> {
    vec![
        Box::new(ReferencePhase),
        Box::new(ExactAmountPhase),
        Box::new(CombinedAmountPhase {
            limit: config.combined_phase_limit,
        }),
        Box::new(DateProximityPhase),
        Box::new(FifoPhase),
    ]
}

/// Days from invoice date to payment date (negative when the payment
/// predates the invoice)
fn days_between(invoice: NaiveDate, payment: NaiveDate) -> i64 {
    payment.signed_duration_since(invoice).num_days()
}

/// Phase 1: explicit document reference in the payment text
///
/// Every open invoice is scored by the fuzzy matcher against the payment's
/// candidate tokens; matches are consumed best-score-first.
pub struct ReferencePhase;

impl MatchPhase for ReferencePhase {
    fn method(&self) -> MatchMethod {
        MatchMethod::Reference
    }

    fn attempt(
        &self,
        payment: &PendingPayment,
        queue: &[OpenInvoice],
        tolerance: &BigDecimal,
    ) -> Vec<PhaseHit> {
        if payment.references.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = queue
            .iter()
            .enumerate()
            .filter(|(_, invoice)| !invoice.is_settled(tolerance))
            .filter_map(|(idx, invoice)| {
                reference::best_match(&invoice.references, &payment.references)
                    .map(|score| (idx, score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut left = payment.remaining.clone();
        let mut hits = Vec::new();
        for (idx, score) in scored {
            if &left <= tolerance {
                break;
            }
            let take = queue[idx].remaining.clone().min(left.clone());
            left -= &take;
            hits.push(PhaseHit {
                queue_index: idx,
                amount: take,
                confidence: 80.0 + score * 20.0,
            });
        }
        hits
    }
}

/// Phase 2: an open invoice whose remaining equals the payment remainder
///
/// When several qualify, the one closest in date wins.
pub struct ExactAmountPhase;

impl MatchPhase for ExactAmountPhase {
    fn method(&self) -> MatchMethod {
        MatchMethod::Exact
    }

    fn attempt(
        &self,
        payment: &PendingPayment,
        queue: &[OpenInvoice],
        tolerance: &BigDecimal,
    ) -> Vec<PhaseHit> {
        let best = queue
            .iter()
            .enumerate()
            .filter(|(_, invoice)| !invoice.is_settled(tolerance))
            .filter(|(_, invoice)| {
                (&invoice.remaining - &payment.remaining).abs() <= *tolerance
            })
            .min_by_key(|(_, invoice)| days_between(invoice.date, payment.date).abs());

        let Some((idx, invoice)) = best else {
            return Vec::new();
        };

        let gap = days_between(invoice.date, payment.date).abs();
        let confidence = if gap <= 30 {
            90.0
        } else if gap <= 60 {
            85.0
        } else {
            80.0
        };

        vec![PhaseHit {
            queue_index: idx,
            amount: invoice.remaining.clone().min(payment.remaining.clone()),
            confidence,
        }]
    }
}

/// Phase 3: two or three open invoices summing to the payment remainder
///
/// Enumerating combinations is quadratic/cubic, so the phase is skipped
/// outright when more than `limit` invoices are open; such payments fall
/// through to the later phases.
pub struct CombinedAmountPhase {
    pub limit: usize,
}

impl CombinedAmountPhase {
    fn hits_for(
        indices: &[usize],
        queue: &[OpenInvoice],
        payment_left: &BigDecimal,
        confidence: f64,
    ) -> Vec<PhaseHit> {
        let mut left = payment_left.clone();
        let mut hits = Vec::new();
        for &idx in indices {
            let take = queue[idx].remaining.clone().min(left.clone());
            if take <= BigDecimal::zero() {
                continue;
            }
            left -= &take;
            hits.push(PhaseHit {
                queue_index: idx,
                amount: take,
                confidence,
            });
        }
        hits
    }
}

impl MatchPhase for CombinedAmountPhase {
    fn method(&self) -> MatchMethod {
        MatchMethod::CombinedAmount
    }

    fn attempt(
        &self,
        payment: &PendingPayment,
        queue: &[OpenInvoice],
        tolerance: &BigDecimal,
    ) -> Vec<PhaseHit> {
        let open: Vec<usize> = queue
            .iter()
            .enumerate()
            .filter(|(_, invoice)| !invoice.is_settled(tolerance))
            .map(|(idx, _)| idx)
            .collect();

        if open.len() < 2 || open.len() > self.limit {
            return Vec::new();
        }

        // 2-combinations first (higher confidence), then 3-combinations
        for i in 0..open.len() {
            for j in (i + 1)..open.len() {
                let sum = &queue[open[i]].remaining + &queue[open[j]].remaining;
                if (sum - &payment.remaining).abs() <= *tolerance {
                    return Self::hits_for(
                        &[open[i], open[j]],
                        queue,
                        &payment.remaining,
                        85.0,
                    );
                }
            }
        }

        for i in 0..open.len() {
            for j in (i + 1)..open.len() {
                for k in (j + 1)..open.len() {
                    let sum = &queue[open[i]].remaining
                        + &queue[open[j]].remaining
                        + &queue[open[k]].remaining;
                    if (sum - &payment.remaining).abs() <= *tolerance {
                        return Self::hits_for(
                            &[open[i], open[j], open[k]],
                            queue,
                            &payment.remaining,
                            80.0,
                        );
                    }
                }
            }
        }

        Vec::new()
    }
}

/// Phase 4: date proximity with a roughly matching amount
///
/// Payment 0–45 days after the invoice and between 80% and 120% of its
/// remaining amount; the closest date wins.
pub struct DateProximityPhase;

impl MatchPhase for DateProximityPhase {
    fn method(&self) -> MatchMethod {
        MatchMethod::DateProximity
    }

    fn attempt(
        &self,
        payment: &PendingPayment,
        queue: &[OpenInvoice],
        tolerance: &BigDecimal,
    ) -> Vec<PhaseHit> {
        let payment_amount = match payment.remaining.to_f64() {
            Some(v) if v > 0.0 => v,
            _ => return Vec::new(),
        };

        let best = queue
            .iter()
            .enumerate()
            .filter(|(_, invoice)| !invoice.is_settled(tolerance))
            .filter_map(|(idx, invoice)| {
                let days = days_between(invoice.date, payment.date);
                if !(0..=45).contains(&days) {
                    return None;
                }
                let remaining = invoice.remaining.to_f64()?;
                if remaining <= 0.0 {
                    return None;
                }
                let ratio = payment_amount / remaining;
                (0.8..=1.2).contains(&ratio).then_some((idx, days))
            })
            .min_by_key(|&(_, days)| days);

        let Some((idx, days)) = best else {
            return Vec::new();
        };

        let confidence = if days <= 15 {
            75.0
        } else if days <= 30 {
            70.0
        } else {
            65.0
        };

        vec![PhaseHit {
            queue_index: idx,
            amount: queue[idx].remaining.clone().min(payment.remaining.clone()),
            confidence,
        }]
    }
}

/// Phase 5: chronological fallback
///
/// Walks the queue oldest-first taking `min(remaining, payment_left)` until
/// the payment is exhausted. Confidence starts at 45 and accumulates
/// coverage, date-proximity, first-in-queue and full-settlement bonuses,
/// capped at 75.
pub struct FifoPhase;

impl MatchPhase for FifoPhase {
    fn method(&self) -> MatchMethod {
        MatchMethod::Fifo
    }

    fn attempt(
        &self,
        payment: &PendingPayment,
        queue: &[OpenInvoice],
        tolerance: &BigDecimal,
    ) -> Vec<PhaseHit> {
        let mut left = payment.remaining.clone();
        let mut hits = Vec::new();

        for (idx, invoice) in queue.iter().enumerate() {
            if &left <= tolerance {
                break;
            }
            if invoice.is_settled(tolerance) {
                continue;
            }

            let take = invoice.remaining.clone().min(left.clone());
            let mut confidence: f64 = 45.0;

            if let (Some(taken), Some(remaining)) = (take.to_f64(), invoice.remaining.to_f64()) {
                if remaining > 0.0 {
                    let coverage = taken / remaining;
                    if (0.90..=1.10).contains(&coverage) {
                        confidence += 15.0;
                    } else if (0.80..=1.20).contains(&coverage) {
                        confidence += 10.0;
                    } else if coverage >= 0.40 {
                        confidence += 5.0;
                    }
                }
            }

            let days = days_between(invoice.date, payment.date);
            if (0..=45).contains(&days) {
                confidence += 20.0;
            } else if (0..=75).contains(&days) {
                confidence += 15.0;
            } else if (0..=120).contains(&days) {
                confidence += 10.0;
            } else if (0..=180).contains(&days) {
                confidence += 5.0;
            }

            if idx == 0 {
                confidence += 5.0;
            }
            if &(&invoice.remaining - &take) <= tolerance {
                confidence += 5.0;
            }

            left -= &take;
            hits.push(PhaseHit {
                queue_index: idx,
                amount: take,
                confidence: confidence.min(75.0),
            });
        }

        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(key: &str, d: NaiveDate, amount: &str, document: &str) -> OpenInvoice {
        OpenInvoice {
            doc_key: key.to_string(),
            date: d,
            original: dec(amount),
            remaining: dec(amount),
            references: reference::extract_references(document),
        }
    }

    fn payment(d: NaiveDate, amount: &str, concept: &str) -> PendingPayment {
        PendingPayment {
            doc_key: "pay".to_string(),
            date: d,
            remaining: dec(amount),
            references: reference::extract_references(concept),
        }
    }

    #[test]
    fn reference_phase_prefers_best_score() {
        let queue = vec![
            invoice("a", date(2024, 1, 1), "100.00", "FAC-555"),
            invoice("b", date(2024, 1, 2), "200.00", "FAC-777"),
        ];
        let pay = payment(date(2024, 1, 10), "200.00", "pago fra 777");
        let hits = ReferencePhase.attempt(&pay, &queue, &dec("0.01"));

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].queue_index, 1);
        assert_eq!(hits[0].amount, dec("200.00"));
        assert!(hits[0].confidence >= 80.0 && hits[0].confidence <= 100.0);
    }

    #[test]
    fn reference_phase_splits_across_matched_invoices() {
        let queue = vec![
            invoice("a", date(2024, 1, 1), "100.00", "FAC 1234"),
            invoice("b", date(2024, 1, 2), "150.00", "FAC 1235"),
        ];
        let pay = payment(date(2024, 1, 20), "250.00", "pago fact 1234-1235");
        let hits = ReferencePhase.attempt(&pay, &queue, &dec("0.01"));

        assert_eq!(hits.len(), 2);
        let total: BigDecimal = hits.iter().map(|h| h.amount.clone()).sum();
        assert_eq!(total, dec("250.00"));
    }

    #[test]
    fn exact_phase_picks_closest_date() {
        let queue = vec![
            invoice("far", date(2024, 1, 1), "500.00", ""),
            invoice("near", date(2024, 3, 1), "500.00", ""),
        ];
        let pay = payment(date(2024, 3, 5), "500.00", "transfer");
        let hits = ExactAmountPhase.attempt(&pay, &queue, &dec("0.01"));

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].queue_index, 1);
        assert_eq!(hits[0].confidence, 90.0);
    }

    #[test]
    fn exact_phase_confidence_drops_with_date_gap() {
        let queue = vec![invoice("a", date(2024, 1, 1), "500.00", "")];
        let pay = payment(date(2024, 2, 15), "500.00", "");
        let hits = ExactAmountPhase.attempt(&pay, &queue, &dec("0.01"));
        assert_eq!(hits[0].confidence, 85.0);

        let pay = payment(date(2024, 6, 1), "500.00", "");
        let hits = ExactAmountPhase.attempt(&pay, &queue, &dec("0.01"));
        assert_eq!(hits[0].confidence, 80.0);
    }

    #[test]
    fn combined_phase_finds_pairs_before_triples() {
        let queue = vec![
            invoice("a", date(2024, 1, 1), "300.00", ""),
            invoice("b", date(2024, 1, 2), "700.00", ""),
            invoice("c", date(2024, 1, 3), "400.00", ""),
        ];
        let pay = payment(date(2024, 1, 20), "1000.00", "");
        let phase = CombinedAmountPhase { limit: 15 };
        let hits = phase.attempt(&pay, &queue, &dec("0.01"));

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.confidence == 85.0));
        let total: BigDecimal = hits.iter().map(|h| h.amount.clone()).sum();
        assert_eq!(total, dec("1000.00"));
    }

    #[test]
    fn combined_phase_finds_triples() {
        let queue = vec![
            invoice("a", date(2024, 1, 1), "300.00", ""),
            invoice("b", date(2024, 1, 2), "250.00", ""),
            invoice("c", date(2024, 1, 3), "450.00", ""),
        ];
        let pay = payment(date(2024, 1, 20), "1000.00", "");
        let phase = CombinedAmountPhase { limit: 15 };
        let hits = phase.attempt(&pay, &queue, &dec("0.01"));

        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.confidence == 80.0));
    }

    #[test]
    fn combined_phase_skipped_above_limit() {
        let queue: Vec<OpenInvoice> = (0..4)
            .map(|i| invoice(&format!("i{i}"), date(2024, 1, 1 + i), "250.00", ""))
            .collect();
        let pay = payment(date(2024, 1, 20), "500.00", "");
        let phase = CombinedAmountPhase { limit: 3 };
        assert!(phase.attempt(&pay, &queue, &dec("0.01")).is_empty());
    }

    #[test]
    fn date_proximity_respects_window_and_ratio() {
        let queue = vec![invoice("a", date(2024, 1, 1), "1000.00", "")];
        let tol = dec("0.01");

        // 10 days, 95% of remaining
        let hits = DateProximityPhase.attempt(&payment(date(2024, 1, 11), "950.00", ""), &queue, &tol);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].confidence, 75.0);

        // amount too far off
        let hits = DateProximityPhase.attempt(&payment(date(2024, 1, 11), "500.00", ""), &queue, &tol);
        assert!(hits.is_empty());

        // outside the 45-day window
        let hits = DateProximityPhase.attempt(&payment(date(2024, 3, 15), "950.00", ""), &queue, &tol);
        assert!(hits.is_empty());

        // payment before the invoice
        let hits = DateProximityPhase.attempt(&payment(date(2023, 12, 28), "950.00", ""), &queue, &tol);
        assert!(hits.is_empty());
    }

    #[test]
    fn date_proximity_confidence_ladder() {
        let queue = vec![invoice("a", date(2024, 1, 1), "1000.00", "")];
        let tol = dec("0.01");

        let hits = DateProximityPhase.attempt(&payment(date(2024, 1, 25), "1000.00", ""), &queue, &tol);
        assert_eq!(hits[0].confidence, 70.0);

        let hits = DateProximityPhase.attempt(&payment(date(2024, 2, 10), "1000.00", ""), &queue, &tol);
        assert_eq!(hits[0].confidence, 65.0);
    }

    #[test]
    fn fifo_walks_queue_oldest_first() {
        let queue = vec![
            invoice("a", date(2024, 1, 1), "800.00", ""),
            invoice("b", date(2024, 1, 5), "500.00", ""),
        ];
        let pay = payment(date(2024, 1, 20), "1000.00", "");
        let hits = FifoPhase.attempt(&pay, &queue, &dec("0.01"));

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].queue_index, 0);
        assert_eq!(hits[0].amount, dec("800.00"));
        assert_eq!(hits[1].queue_index, 1);
        assert_eq!(hits[1].amount, dec("200.00"));
    }

    #[test]
    fn fifo_confidence_capped_at_75() {
        // Full coverage (+15), same-day (+20), first in queue (+5),
        // fully settles (+5): 90 raw, capped
        let queue = vec![invoice("a", date(2024, 1, 1), "100.00", "")];
        let pay = payment(date(2024, 1, 1), "100.00", "");
        let hits = FifoPhase.attempt(&pay, &queue, &dec("0.01"));
        assert_eq!(hits[0].confidence, 75.0);
    }

    #[test]
    fn fifo_base_confidence_for_weak_partial() {
        // 10% coverage, 300 days out, second in queue: base 45 only
        let queue = vec![
            invoice("a", date(2024, 1, 1), "10.00", ""),
            invoice("b", date(2024, 1, 2), "1000.00", ""),
        ];
        let pay = payment(date(2024, 10, 28), "110.00", "");
        let hits = FifoPhase.attempt(&pay, &queue, &dec("0.01"));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].confidence, 45.0);
    }
}
