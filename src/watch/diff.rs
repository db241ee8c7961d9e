//! Change detection between two balance snapshots

use crate::store::BalanceMap;

/// A material change of one account's total value
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceChange {
    pub account_id: String,
    pub old: String,
    pub new: String,
    pub diff: f64,
}

/// Accounts whose value moved by strictly more than `threshold`.
///
/// Only accounts present in both snapshots are compared; values that do not
/// parse as numbers are skipped.
pub fn compare_balances(new: &BalanceMap, old: &BalanceMap, threshold: f64) -> Vec<BalanceChange> {
    new.iter()
        .filter_map(|(account_id, new_value)| {
            let old_value = old.get(account_id)?;
            let diff = parse(new_value)? - parse(old_value)?;
            (diff.abs() > threshold).then(|| BalanceChange {
                account_id: account_id.clone(),
                old: old_value.clone(),
                new: new_value.clone(),
                diff,
            })
        })
        .collect()
}

fn parse(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
