//! Ledger Core - back-office banking ledger
//!
//! Users hold a fiat and a secondary (crypto) balance. Balances only move
//! through atomic postings that also write the ledger; user-submitted
//! deposit, withdrawal and transfer requests live in their own stores and
//! are reconciled with the ledger at read time.
//!
//! # Modules
//!
//! - [`core_types`] - ids, assets, movement sources
//! - [`money`] - strict amount parsing and rounding
//! - [`account`] - users and balances
//! - [`ledger`] - entries, postings and the swap-pair check
//! - [`requests`] - request records, submission and review
//! - [`oracle`] - price oracle client with retry
//! - [`swap`] - atomic fiat/secondary swap
//! - [`normalizer`] - status mapping and the display envelope
//! - [`reconcile`] - merged, paginated movement feed
//! - [`admin`] - corrections, adjustments and the audit trail
//! - [`store`] - store traits with in-memory and PostgreSQL backends
//! - [`db`] - connection pool and schema
//! - [`gateway`] - HTTP surface

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod admin;
pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod normalizer;
pub mod oracle;
pub mod reconcile;
pub mod requests;
pub mod store;
pub mod swap;

// Convenient re-exports at crate root
pub use account::{BalanceSnapshot, User};
pub use admin::{CorrectionService, MovementPatch};
pub use core_types::{Asset, MovementSource, UserId};
pub use ledger::{EntryMetadata, EntryStatus, EntryType, LedgerEntry};
pub use normalizer::MovementView;
pub use oracle::{HttpPriceOracle, OracleConfig, OracleError, PriceOracle};
pub use reconcile::{MovementPage, ReconciledView};
pub use requests::{RequestKind, RequestRecord, RequestService};
pub use store::{Backend, MemoryStore, PgStore, StoreError};
pub use swap::{SwapEngine, SwapError, SwapOutcome, SwapRequest, SwapSettings};
