//! The reconciliation pipeline
//!
//! `normalizer` partitions canonical rows into per-counterparty streams,
//! `reconciler` replays each stream through the `phases` waterfall,
//! `aggregator` rolls the allocation history up into block reports, and
//! `core` ties it all together behind [`ReconciliationEngine`].

pub mod aggregator;
pub mod core;
pub mod normalizer;
pub mod phases;
pub mod reconciler;

pub use aggregator::*;
pub use self::core::*;
pub use normalizer::*;
pub use phases::*;
pub use reconciler::*;
