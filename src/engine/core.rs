//! Engine facade
//!
//! Ties the pipeline together: validate the configuration, normalize the
//! canonical rows, replay every counterparty through the waterfall, and
//! aggregate the two block reports. Counterparty-local failures degrade to
//! diagnostics so one bad counterparty never hides the rest of the run.

use chrono::Utc;
use tracing::{info, warn};

use crate::engine::aggregator::{aggregate, BlockReport};
use crate::engine::normalizer::normalize;
use crate::engine::reconciler::Reconciler;
use crate::types::{
    Allocation, Block, CanonicalRow, Diagnostic, Movement, ReconcileConfig, ReconcileResult,
};
use crate::utils::validation::validate_config;

/// Everything one run produces
#[derive(Debug)]
pub struct ReconciliationReport {
    pub receivables: BlockReport,
    pub payables: BlockReport,
    /// Structural problems found on the way; never fatal
    pub diagnostics: Vec<Diagnostic>,
}

/// The reconciliation engine
///
/// Stateless between runs: all state lives in the per-counterparty
/// reconcilers created inside [`reconcile`](Self::reconcile), so one engine
/// can serve any number of independent runs.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    /// Create an engine with the given configuration
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Run the full pipeline over a batch of canonical rows
    ///
    /// Errors only on unusable configuration or an empty partition;
    /// row- and counterparty-local problems surface as diagnostics on the
    /// report instead.
    pub fn reconcile(&self, rows: &[CanonicalRow]) -> ReconcileResult<ReconciliationReport> {
        validate_config(&self.config)?;

        let as_of = self
            .config
            .as_of
            .unwrap_or_else(|| Utc::now().date_naive());

        info!(rows = rows.len(), %as_of, "starting reconciliation run");

        let mut input = normalize(rows, &self.config)?;
        let mut diagnostics = std::mem::take(&mut input.diagnostics);

        let receivable_history =
            self.reconcile_block(Block::Receivables, &input.receivables, &mut diagnostics);
        let payable_history =
            self.reconcile_block(Block::Payables, &input.payables, &mut diagnostics);

        let report = ReconciliationReport {
            receivables: aggregate(Block::Receivables, receivable_history, as_of),
            payables: aggregate(Block::Payables, payable_history, as_of),
            diagnostics,
        };

        info!(
            receivable_matches = report.receivables.summary.matched_count,
            payable_matches = report.payables.summary.matched_count,
            diagnostics = report.diagnostics.len(),
            "reconciliation run complete"
        );
        Ok(report)
    }

    fn reconcile_block(
        &self,
        block: Block,
        counterparties: &std::collections::BTreeMap<String, Vec<Movement>>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<Allocation> {
        let mut history = Vec::new();
        for (counterparty, movements) in counterparties {
            match reconcile_counterparty(counterparty, movements, &self.config) {
                Ok(allocations) => history.extend(allocations),
                Err(err) => {
                    warn!(
                        block = block.label(),
                        %counterparty,
                        error = %err,
                        "counterparty failed, continuing with the rest"
                    );
                    diagnostics.push(Diagnostic {
                        counterparty: Some(counterparty.clone()),
                        row_index: None,
                        message: err.to_string(),
                    });
                }
            }
        }
        history
    }
}

/// Replay one counterparty's movements through the waterfall
///
/// Exposed so callers can reconcile a single counterparty without building
/// the whole pipeline; the engine uses the same path internally.
pub fn reconcile_counterparty(
    counterparty: &str,
    movements: &[Movement],
    config: &ReconcileConfig,
) -> ReconcileResult<Vec<Allocation>> {
    let mut reconciler = Reconciler::new(counterparty, config);
    for movement in movements {
        reconciler.process(movement)?;
    }
    Ok(reconciler.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchMethod, ReconcileError};
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn config() -> ReconcileConfig {
        ReconcileConfig {
            as_of: Some(date(30)),
            ..ReconcileConfig::default()
        }
    }

    #[test]
    fn end_to_end_exact_settlement() {
        let rows = vec![
            CanonicalRow::new("430001", Some(date(1)), Some(dec("250.00")), None)
                .with_counterparty("ACME")
                .with_document("FAC-100"),
            CanonicalRow::new("430001", Some(date(10)), None, Some(dec("250.00")))
                .with_counterparty("ACME")
                .with_concept("Transferencia"),
        ];
        let report = ReconciliationEngine::new(config()).reconcile(&rows).unwrap();
        assert_eq!(report.receivables.summary.matched_count, 1);
        assert_eq!(report.receivables.summary.pending_count, 0);
        assert_eq!(
            report.receivables.allocations[0].method,
            MatchMethod::Exact
        );
        assert!(report.payables.allocations.is_empty());
    }

    #[test]
    fn invalid_configuration_aborts() {
        let mut bad = config();
        bad.receivable_prefixes.clear();
        let engine = ReconciliationEngine::new(bad);
        let err = engine.reconcile(&[]).unwrap_err();
        assert!(matches!(err, ReconcileError::Configuration(_)));
    }

    #[test]
    fn diagnostics_do_not_block_the_run() {
        let rows = vec![
            CanonicalRow::new("430001", Some(date(1)), Some(dec("100.00")), None)
                .with_counterparty("ACME"),
            // missing counterparty: diagnostic, not an error
            CanonicalRow::new("430001", Some(date(2)), Some(dec("50.00")), None),
        ];
        let report = ReconciliationEngine::new(config()).reconcile(&rows).unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.receivables.summary.pending_count, 1);
    }
}
