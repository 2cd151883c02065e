//! Traits for the matching waterfall seam
//!
//! The five waterfall phases share one interface and are evaluated in
//! strict order; the reconciler owns the state and applies whatever hits a
//! phase proposes.

use bigdecimal::BigDecimal;

use crate::types::{MatchMethod, OpenInvoice, PendingPayment};

/// One proposed allocation from a phase: which queue slot to charge, how
/// much to take, and how confident the phase is
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseHit {
    /// Index into the open-invoice queue as the phase saw it
    pub queue_index: usize,
    /// Amount to allocate; never exceeds the invoice remaining or the
    /// payment remainder at proposal time
    pub amount: BigDecimal,
    /// Confidence score in [0, 100]
    pub confidence: f64,
}

/// A try-match strategy in the waterfall
///
/// Implementations are pure: they inspect the payment and the open queue
/// and propose hits, but never mutate state — the reconciler applies the
/// hits, updates invoice remainders, and deducts the payment remainder
/// before the next phase runs. A phase that proposes several hits must
/// keep its own running remainder so the proposals never oversubscribe
/// the payment.
pub trait MatchPhase: Send + Sync {
    /// Method tag stamped on allocations produced by this phase
    fn method(&self) -> MatchMethod;

    /// Propose allocations for the payment against the open queue
    ///
    /// `payment.remaining` is the unallocated remainder left over from the
    /// previous phases. Returning an empty vec passes the payment on
    /// unchanged.
    fn attempt(
        &self,
        payment: &PendingPayment,
        queue: &[OpenInvoice],
        tolerance: &BigDecimal,
    ) -> Vec<PhaseHit>;
}
