//! Administrative audit trail
//!
//! One record per admin mutation, written in the same unit of work as the
//! change it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::core_types::{MovementSource, UserId};
use crate::requests::RequestKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Edit,
    Delete,
    Review,
    Adjust,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Edit => "edit",
            AuditAction::Delete => "delete",
            AuditAction::Review => "review",
            AuditAction::Adjust => "adjust",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "edit" => Ok(AuditAction::Edit),
            "delete" => Ok(AuditAction::Delete),
            "review" => Ok(AuditAction::Review),
            "adjust" => Ok(AuditAction::Adjust),
            _ => Err(format!("Invalid audit action: {}", s)),
        }
    }
}

/// Row of `admin_audit_log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor: UserId,
    pub action: AuditAction,
    pub source: MovementSource,
    pub category: RequestKind,
    pub target_id: Uuid,
    /// Snapshot before the change; `null` for creations
    pub before: serde_json::Value,
    /// Snapshot after the change; `null` for deletions
    pub after: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor: UserId,
        action: AuditAction,
        source: MovementSource,
        category: RequestKind,
        target_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            action,
            source,
            category,
            target_id,
            before: serde_json::Value::Null,
            after: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// Attach before/after snapshots; serialization failures record `null`
    pub fn with_snapshots<B: Serialize, A: Serialize>(
        mut self,
        before: Option<&B>,
        after: Option<&A>,
    ) -> Self {
        self.before = before
            .and_then(|b| serde_json::to_value(b).ok())
            .unwrap_or(serde_json::Value::Null);
        self.after = after
            .and_then(|a| serde_json::to_value(a).ok())
            .unwrap_or(serde_json::Value::Null);
        self
    }
}
