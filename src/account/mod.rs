//! Account module
//!
//! Users and the two balances they hold.

pub mod models;

pub use models::{BalanceSnapshot, User, UserSummary};
