//! User-submitted money-movement requests
//!
//! Requests live in their own stores with their own status vocabularies and
//! reach the ledger only when an admin review posts them.

pub mod service;
pub mod types;

pub use service::{RequestError, RequestService, ReviewAction, ReviewOutcome, SubmitRequest};
pub use types::{
    DepositRequest, RequestKind, RequestRecord, ReviewStatus, TransferRequest, TransferStatus,
    WithdrawalRequest,
};
