//! Administrative corrections
//!
//! - [`correction`] - edit and delete of individual movements
//! - [`adjustment`] - manual credit/debit of a user's fiat balance
//! - [`audit`] - the trail every admin mutation leaves

pub mod adjustment;
pub mod audit;
pub mod correction;

pub use adjustment::{AdjustmentDirection, AdjustmentOutcome, AdjustmentRequest};
pub use audit::{AuditAction, AuditRecord};
pub use correction::{CorrectionError, CorrectionService, MovementPatch};
