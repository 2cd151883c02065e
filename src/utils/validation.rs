//! Validation utilities

use bigdecimal::{BigDecimal, Zero};

use crate::types::{ReconcileConfig, ReconcileError, ReconcileResult};

/// Validate that a tolerance is non-negative
pub fn validate_tolerance(tolerance: &BigDecimal) -> ReconcileResult<()> {
    if tolerance < &BigDecimal::zero() {
        return Err(ReconcileError::Configuration(
            "Tolerance cannot be negative".to_string(),
        ));
    }
    Ok(())
}

/// Validate that an account-prefix list is usable
pub fn validate_prefixes(label: &str, prefixes: &[String]) -> ReconcileResult<()> {
    if prefixes.is_empty() {
        return Err(ReconcileError::Configuration(format!(
            "{label} prefix list cannot be empty"
        )));
    }
    for prefix in prefixes {
        if prefix.trim().is_empty() {
            return Err(ReconcileError::Configuration(format!(
                "{label} prefix list contains an empty prefix"
            )));
        }
        if !prefix.chars().all(|c| c.is_ascii_digit()) {
            return Err(ReconcileError::Configuration(format!(
                "{label} prefix '{prefix}' must be numeric"
            )));
        }
    }
    Ok(())
}

/// Validate an engine configuration before a run
pub fn validate_config(config: &ReconcileConfig) -> ReconcileResult<()> {
    validate_tolerance(&config.tolerance)?;
    validate_prefixes("Receivable", &config.receivable_prefixes)?;
    validate_prefixes("Payable", &config.payable_prefixes)?;
    Ok(())
}
