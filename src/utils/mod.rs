//! Utility modules

pub mod suggestions;
pub mod validation;

pub use suggestions::*;
pub use validation::*;
