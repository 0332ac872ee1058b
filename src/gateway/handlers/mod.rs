//! HTTP handlers
//!
//! Thin adapters: extract the caller, parse path and query, call one
//! service, wrap the result in [`ApiResponse`](super::types::ApiResponse).

pub mod admin;
pub mod balances;
pub mod health;
pub mod movements;
pub mod requests;
pub mod swap;

pub use admin::{adjust_balance, list_audit, review_request};
pub use balances::get_balances;
pub use health::health_check;
pub use movements::{check_swap_integrity, delete_movement, edit_movement, list_movements};
pub use requests::{list_requests, submit_request};
pub use swap::create_swap;

use crate::requests::RequestKind;

use super::types::ApiError;

/// Path segment to category; singular and plural forms accepted
pub(crate) fn parse_category(raw: &str) -> Result<RequestKind, ApiError> {
    raw.parse::<RequestKind>().map_err(ApiError::bad_request)
}
