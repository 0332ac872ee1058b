//! Atomic fiat/secondary swap

pub mod engine;
pub mod error;
pub mod locks;
pub mod types;

pub use engine::SwapEngine;
pub use error::SwapError;
pub use locks::UserLocks;
pub use types::{SwapOutcome, SwapRequest, SwapSettings, SwapSummary};
