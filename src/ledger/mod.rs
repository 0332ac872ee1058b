//! Canonical ledger
//!
//! Append-only transaction records with before/after balance snapshots.
//!
//! - [`types`] - entry, type, status and typed metadata
//! - [`posting`] - the atomic unit that moves balances and writes entries
//! - [`integrity`] - swap-pair consistency scan

pub mod integrity;
pub mod posting;
pub mod types;

pub use integrity::{SwapPairIssue, find_unpaired_swaps};
pub use posting::{
    LegError, Posting, PostingLeg, PostingReceipt, RequestTransition, Shortfall,
};
pub use types::{EntryMetadata, EntryStatus, EntryType, LedgerEntry, SwapLeg, SwapMetadata};
