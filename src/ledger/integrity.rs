//! Swap pair integrity scan
//!
//! Every swap must leave exactly one `-OUT` debit and one `-IN` credit under
//! the same swap reference, for the same user, priced at the same rate.
//! This finds the swaps that do not.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use super::types::{LedgerEntry, SwapLeg};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapPairIssue {
    pub swap_reference: String,
    pub out_legs: usize,
    pub in_legs: usize,
    pub problem: String,
}

/// Scan swap entries and report every swap reference that is not a clean pair
pub fn find_unpaired_swaps(entries: &[LedgerEntry]) -> Vec<SwapPairIssue> {
    let mut groups: BTreeMap<&str, Vec<&LedgerEntry>> = BTreeMap::new();
    for entry in entries {
        if let Some(meta) = entry.metadata.as_swap() {
            groups
                .entry(meta.swap_reference.as_str())
                .or_default()
                .push(entry);
        }
    }

    let mut issues = Vec::new();
    for (swap_ref, legs) in groups {
        let outs: Vec<&LedgerEntry> = legs
            .iter()
            .copied()
            .filter(|e| e.metadata.as_swap().is_some_and(|m| m.leg == SwapLeg::Out))
            .collect();
        let ins: Vec<&LedgerEntry> = legs
            .iter()
            .copied()
            .filter(|e| e.metadata.as_swap().is_some_and(|m| m.leg == SwapLeg::In))
            .collect();

        let problem = if outs.len() != 1 || ins.len() != 1 {
            Some("expected exactly one OUT and one IN leg".to_string())
        } else {
            check_pair(swap_ref, outs[0], ins[0])
        };

        if let Some(problem) = problem {
            issues.push(SwapPairIssue {
                swap_reference: swap_ref.to_string(),
                out_legs: outs.len(),
                in_legs: ins.len(),
                problem,
            });
        }
    }
    issues
}

fn check_pair(swap_ref: &str, out: &LedgerEntry, inn: &LedgerEntry) -> Option<String> {
    if out.user_id != inn.user_id {
        return Some("legs belong to different users".into());
    }
    if out.entry_type.is_credit() || !inn.entry_type.is_credit() {
        return Some("legs do not have opposite polarity".into());
    }
    if out.reference != SwapLeg::Out.reference(swap_ref)
        || inn.reference != SwapLeg::In.reference(swap_ref)
    {
        return Some("leg references do not match the swap reference".into());
    }
    let rate = |e: &LedgerEntry| e.metadata.as_swap().map(|m| m.rate).unwrap_or(Decimal::ZERO);
    if rate(out) != rate(inn) {
        return Some("legs were priced at different rates".into());
    }
    None
}
